use serde::{Deserialize, Serialize};

use scout_indexer::FileIndex;
use scout_protocol::BudgetTracker;

use crate::distance::bounded_levenshtein;
use crate::grep::bounded_grep;

/// A symbolic file reference: a partial path, a bare basename, or a
/// free-text description of the file being looked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeculationQuery {
    pub reference: String,
}

impl SpeculationQuery {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

/// How a match was found, in decreasing order of trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Exact,
    BasenameInsensitive,
    FuzzyDistance,
    ContentGrep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeculationResult {
    pub path: String,
    pub strategy: ResolutionStrategy,
    pub confidence: f64,
}

/// Tunables with the qualitative defaults from the design notes. None
/// of these are contracts; callers may override any of them.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// A match at or above this confidence stops the strategy chain.
    pub high_confidence: f64,
    pub basename_confidence: f64,
    /// Confidence of a fuzzy match at distance zero (basename equal up
    /// to extension); each edit subtracts `fuzzy_distance_step`.
    pub fuzzy_base_confidence: f64,
    pub fuzzy_distance_step: f64,
    pub grep_confidence: f64,
    /// Ceiling on files opened by the content-grep strategy.
    pub max_grep_files: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            high_confidence: 0.85,
            basename_confidence: 0.85,
            fuzzy_base_confidence: 0.85,
            fuzzy_distance_step: 0.1,
            grep_confidence: 0.5,
            max_grep_files: 12,
        }
    }
}

/// Resolves symbolic references against the index, cheapest strategy
/// first, within the read budget of the calling phase.
///
/// The resolver never escapes the index: excluded subtrees stay
/// invisible to speculation by construction. An empty result is a
/// valid outcome, not an error; callers must not retry on it.
#[derive(Debug, Clone, Default)]
pub struct SpeculativeResolver {
    config: ResolverConfig,
}

impl SpeculativeResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn resolve(
        &self,
        query: &SpeculationQuery,
        index: &FileIndex,
        tracker: &BudgetTracker,
    ) -> Vec<SpeculationResult> {
        let reference = normalize_reference(&query.reference);
        if reference.is_empty() {
            return Vec::new();
        }
        let mut results: Vec<SpeculationResult> = Vec::new();

        // 1. Exact path match.
        if index.lookup(&reference).is_some() {
            results.push(SpeculationResult {
                path: reference.clone(),
                strategy: ResolutionStrategy::Exact,
                confidence: 1.0,
            });
            return finish(results);
        }

        // 2. Case-insensitive basename match.
        let name = basename(&reference);
        for record in index.by_basename(name) {
            push_candidate(
                &mut results,
                SpeculationResult {
                    path: record.path.clone(),
                    strategy: ResolutionStrategy::BasenameInsensitive,
                    confidence: self.config.basename_confidence,
                },
            );
        }
        if best_confidence(&results) >= self.config.high_confidence {
            log::debug!("'{reference}' resolved by basename ({} hits)", results.len());
            return finish(results);
        }

        // 3. Bounded edit distance over basename stems.
        self.fuzzy_matches(&reference, index, &mut results);
        if best_confidence(&results) >= self.config.high_confidence {
            log::debug!("'{reference}' resolved by fuzzy distance");
            return finish(results);
        }

        // 4. Bounded content grep, last because it is the only
        // strategy that opens files.
        if !tracker.exhausted() {
            let tokens = grep_tokens(&query.reference);
            for (path, _matches) in bounded_grep(
                index,
                tracker,
                &query.reference,
                &tokens,
                self.config.max_grep_files,
            ) {
                push_candidate(
                    &mut results,
                    SpeculationResult {
                        path,
                        strategy: ResolutionStrategy::ContentGrep,
                        confidence: self.config.grep_confidence,
                    },
                );
            }
        }

        finish(results)
    }

    fn fuzzy_matches(
        &self,
        reference: &str,
        index: &FileIndex,
        results: &mut Vec<SpeculationResult>,
    ) {
        let query_stem = stem(basename(reference)).to_ascii_lowercase();
        if query_stem.is_empty() {
            return;
        }
        let max_distance = (query_stem.chars().count() / 4).clamp(1, 3);

        // HashMap iteration order is arbitrary; sort the candidate
        // basenames so resolution stays deterministic.
        let mut names: Vec<&str> = index.basenames().collect();
        names.sort_unstable();

        for name in names {
            let candidate_stem = stem(name);
            let Some(distance) =
                bounded_levenshtein(&query_stem, candidate_stem, max_distance)
            else {
                continue;
            };
            let confidence = self.config.fuzzy_base_confidence
                - self.config.fuzzy_distance_step * distance as f64;
            if confidence <= 0.0 {
                continue;
            }
            for path in index.paths_for_basename(name) {
                push_candidate(
                    results,
                    SpeculationResult {
                        path: path.clone(),
                        strategy: ResolutionStrategy::FuzzyDistance,
                        confidence,
                    },
                );
            }
        }
    }
}

/// Keep the best confidence per path; first strategy wins ties.
fn push_candidate(results: &mut Vec<SpeculationResult>, candidate: SpeculationResult) {
    match results.iter_mut().find(|r| r.path == candidate.path) {
        Some(existing) => {
            if candidate.confidence > existing.confidence {
                *existing = candidate;
            }
        }
        None => results.push(candidate),
    }
}

/// Descending confidence, ties broken by lexicographic path order.
fn finish(mut results: Vec<SpeculationResult>) -> Vec<SpeculationResult> {
    results.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.path.cmp(&b.path))
    });
    results
}

fn best_confidence(results: &[SpeculationResult]) -> f64 {
    results
        .iter()
        .map(|r| r.confidence)
        .fold(0.0, f64::max)
}

fn normalize_reference(reference: &str) -> String {
    let mut reference = reference.trim().replace('\\', "/");
    while let Some(stripped) = reference.strip_prefix("./") {
        reference = stripped.to_string();
    }
    reference.trim_matches('/').to_string()
}

fn basename(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Basename with a single trailing extension stripped: `auth.py` and
/// `auth` share the stem `auth`.
fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains(' ') => stem,
        _ => name,
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "what", "when", "where", "which", "how", "why",
    "who", "does", "are", "was", "were", "has", "have", "from", "into", "file", "files", "code",
];

/// Greppable tokens of a free-form reference: identifier-shaped runs
/// of at least three characters, stopwords dropped, capped at five in
/// order of appearance.
fn grep_tokens(reference: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in reference.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        if token.len() < 3 {
            continue;
        }
        let lowered = token.to_ascii_lowercase();
        if STOPWORDS.contains(&lowered.as_str()) {
            continue;
        }
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            tokens.push(token.to_string());
        }
        if tokens.len() == 5 {
            break;
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scout_protocol::{ExclusionRuleset, ExplorationBudget};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fixture() -> (tempfile::TempDir, FileIndex) {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("auth.py"), "def login(user): ...\n").unwrap();
        fs::write(src.join("models.py"), "class User: ...\n").unwrap();
        fs::write(temp.path().join("README.md"), "# demo project\n").unwrap();
        let git = temp.path().join(".git");
        fs::create_dir_all(&git).unwrap();
        fs::write(git.join("config"), "[core]\n").unwrap();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();
        (temp, index)
    }

    fn tracker() -> BudgetTracker {
        let tracker = BudgetTracker::new();
        tracker.start(ExplorationBudget::new(Duration::from_secs(60), 32));
        tracker
    }

    #[test]
    fn exact_match_short_circuits() {
        let (_temp, index) = fixture();
        let resolver = SpeculativeResolver::default();
        let results = resolver.resolve(&SpeculationQuery::new("src/auth.py"), &index, &tracker());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].strategy, ResolutionStrategy::Exact);
        assert_eq!(results[0].confidence, 1.0);
    }

    #[test]
    fn basename_match_is_case_insensitive() {
        let (_temp, index) = fixture();
        let resolver = SpeculativeResolver::default();
        let results = resolver.resolve(&SpeculationQuery::new("AUTH.PY"), &index, &tracker());
        assert_eq!(results[0].path, "src/auth.py");
        assert_eq!(results[0].strategy, ResolutionStrategy::BasenameInsensitive);
        assert_eq!(results[0].confidence, 0.85);
    }

    #[test]
    fn fuzzy_finds_auth_before_readme() {
        let (_temp, index) = fixture();
        let resolver = SpeculativeResolver::default();
        // "auth" misses by basename (no file literally named "auth")
        // but matches the stem of auth.py at distance zero.
        let results = resolver.resolve(&SpeculationQuery::new("auth"), &index, &tracker());
        assert!(!results.is_empty());
        assert_eq!(results[0].path, "src/auth.py");
        assert_eq!(results[0].strategy, ResolutionStrategy::FuzzyDistance);
        assert!(results[0].confidence >= 0.85);
        assert!(results.iter().all(|r| r.path != "README.md"));
    }

    #[test]
    fn fuzzy_tolerates_typos_with_lower_confidence() {
        let (_temp, index) = fixture();
        let resolver = SpeculativeResolver::default();
        let results = resolver.resolve(&SpeculationQuery::new("modells.py"), &index, &tracker());
        assert_eq!(results[0].path, "src/models.py");
        assert_eq!(results[0].strategy, ResolutionStrategy::FuzzyDistance);
        assert!(results[0].confidence < 0.85);
    }

    #[test]
    fn grep_falls_through_for_descriptions() {
        let (_temp, index) = fixture();
        let resolver = SpeculativeResolver::default();
        let results = resolver.resolve(
            &SpeculationQuery::new("where is login defined"),
            &index,
            &tracker(),
        );
        assert!(results
            .iter()
            .any(|r| r.path == "src/auth.py" && r.strategy == ResolutionStrategy::ContentGrep));
    }

    #[test]
    fn no_match_is_an_empty_result_not_an_error() {
        let (_temp, index) = fixture();
        let resolver = SpeculativeResolver::default();
        let results = resolver.resolve(
            &SpeculationQuery::new("zzz_nonexistent_subsystem"),
            &index,
            &tracker(),
        );
        assert_eq!(results, Vec::new());
    }

    #[test]
    fn results_are_confidence_then_path_ordered() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::create_dir_all(temp.path().join("b")).unwrap();
        fs::write(temp.path().join("a/handler.py"), "x\n").unwrap();
        fs::write(temp.path().join("b/handler.py"), "y\n").unwrap();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();

        let resolver = SpeculativeResolver::default();
        let results = resolver.resolve(&SpeculationQuery::new("handler.py"), &index, &tracker());
        let paths: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a/handler.py", "b/handler.py"]);
    }

    #[test]
    fn speculation_never_escapes_the_index() {
        let (_temp, index) = fixture();
        let resolver = SpeculativeResolver::default();
        let results = resolver.resolve(&SpeculationQuery::new("config"), &index, &tracker());
        assert!(results.iter().all(|r| !r.path.starts_with(".git")));
    }
}
