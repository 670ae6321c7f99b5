//! # Scout Speculation
//!
//! Resolves symbolic file references that are not literally present in
//! the index: partial paths, misspelled basenames, plain descriptions.
//!
//! Strategies run cheapest-first and stop at the first sufficiently
//! confident match:
//!
//! 1. exact path lookup
//! 2. case-insensitive basename lookup
//! 3. bounded edit distance over basename stems
//! 4. budget-bounded content grep
//!
//! Only the last strategy opens files, and every file it opens is
//! charged against the calling phase's read quota.

mod distance;
mod grep;
mod resolver;

pub use resolver::{
    ResolutionStrategy, ResolverConfig, SpeculationQuery, SpeculationResult, SpeculativeResolver,
};
