use std::collections::HashMap;
use std::path::Path;

use regex::RegexBuilder;
use scout_indexer::{detect_language, FileIndex, Language};
use scout_protocol::{BudgetTracker, OperationKind};

/// Scan at most `max_files` indexed files for any of the literal
/// tokens, charging one content-scan per opened file. Stops early when
/// the read quota runs out and returns whatever matched so far. The
/// full `reference` steers which languages get scanned first; `tokens`
/// are what actually has to appear in the file.
pub(crate) fn bounded_grep(
    index: &FileIndex,
    tracker: &BudgetTracker,
    reference: &str,
    tokens: &[String],
    max_files: usize,
) -> Vec<(String, usize)> {
    if tokens.is_empty() || max_files == 0 {
        return Vec::new();
    }
    let alternation = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(pattern) = RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
    else {
        return Vec::new();
    };

    let ranks = language_ranks(index, reference);
    let mut candidates: Vec<_> = index.records().filter(|r| !r.binary).collect();
    candidates.sort_by(|a, b| {
        rank_of(&ranks, a.language)
            .cmp(&rank_of(&ranks, b.language))
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut hits = Vec::new();
    let mut scanned = 0usize;
    for record in candidates {
        if scanned >= max_files {
            break;
        }
        if tracker.exhausted() {
            log::debug!("grep stopped early: read quota exhausted after {scanned} files");
            break;
        }
        tracker.charge(OperationKind::ContentScan, 1);
        scanned += 1;
        let Ok(content) = index.read_cached(&record.path) else {
            continue;
        };
        let matches = pattern.find_iter(&content).count();
        if matches > 0 {
            hits.push((record.path.clone(), matches));
        }
    }
    hits
}

/// Scan priority per language: a language the query itself hints at
/// comes first, then languages by descending file count (histogram
/// relevance), names breaking ties. Files with no detected language
/// sort last.
fn language_ranks(index: &FileIndex, term: &str) -> HashMap<Language, usize> {
    let hinted = hint_language(term);
    let mut ordered: Vec<(&Language, &usize)> = index.language_histogram().iter().collect();
    ordered.sort_by(|a, b| {
        let a_hinted = Some(*a.0) == hinted;
        let b_hinted = Some(*b.0) == hinted;
        b_hinted
            .cmp(&a_hinted)
            .then_with(|| b.1.cmp(a.1))
            .then_with(|| a.0.as_str().cmp(b.0.as_str()))
    });
    ordered
        .into_iter()
        .enumerate()
        .map(|(rank, (language, _))| (*language, rank))
        .collect()
}

fn rank_of(ranks: &HashMap<Language, usize>, language: Option<Language>) -> usize {
    language
        .and_then(|l| ranks.get(&l).copied())
        .unwrap_or(usize::MAX)
}

/// Does the reference itself name a language? Either through an
/// extension-looking token (`auth.py`) or a language name (`python`).
fn hint_language(term: &str) -> Option<Language> {
    let lowered = term.to_ascii_lowercase();
    for token in lowered.split(|c: char| c.is_whitespace() || c == ',') {
        if token.contains('.') {
            if let Some(language) = detect_language(Path::new(token)) {
                return Some(language);
            }
        }
    }
    lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(|token| match token {
            "rust" => Some(Language::Rust),
            "python" => Some(Language::Python),
            "javascript" => Some(Language::JavaScript),
            "typescript" => Some(Language::TypeScript),
            "java" => Some(Language::Java),
            "ruby" => Some(Language::Ruby),
            "go" | "golang" => Some(Language::Go),
            _ => None,
        })
}
