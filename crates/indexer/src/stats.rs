use serde::{Deserialize, Serialize};

/// Statistics about one index build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of files indexed
    pub files: usize,

    /// Number of directories walked
    pub dirs: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Entries the walk could not read (logged, not fatal)
    pub walk_errors: usize,
}
