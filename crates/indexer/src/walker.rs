use std::collections::BTreeSet;
use std::path::Path;
use std::time::SystemTime;

use ignore::WalkBuilder;
use scout_protocol::ExclusionRuleset;

use crate::error::{IndexerError, Result};
use crate::index::FileRecord;
use crate::language::{detect_language, is_binary_extension};

pub(crate) struct WalkProduct {
    pub files: Vec<(String, FileRecord)>,
    pub dirs: BTreeSet<String>,
    pub walk_errors: usize,
}

/// One-pass deterministic traversal of the tree under `root`.
///
/// Entries come back sorted lexicographically by file name so two walks
/// over an unchanged tree produce identical order. Symbolic links are
/// not followed (no cycles, no double-counting). Exclusion rules are
/// tested before descending into a directory, so an excluded subtree
/// costs one rule check, not a traversal.
pub(crate) fn walk(root: &Path, rules: &ExclusionRuleset) -> Result<WalkProduct> {
    let metadata = std::fs::metadata(root)
        .map_err(|e| IndexerError::InvalidRoot(format!("{}: {e}", root.display())))?;
    if !metadata.is_dir() {
        return Err(IndexerError::InvalidRoot(format!(
            "{}: not a directory",
            root.display()
        )));
    }
    // Readability probe; a directory we cannot list is a fatal error
    // before any phase runs.
    std::fs::read_dir(root)
        .map_err(|e| IndexerError::InvalidRoot(format!("{}: {e}", root.display())))?;

    let mut files = Vec::new();
    let mut dirs = BTreeSet::new();
    let mut walk_errors = 0usize;

    let filter_root = root.to_path_buf();
    let filter_rules = rules.clone();
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b));
    builder.filter_entry(move |entry| {
        match relative_key(entry.path(), &filter_root) {
            // The root itself has an empty key and always passes.
            Some(key) => key.is_empty() || !filter_rules.is_excluded(&key),
            None => false,
        }
    });

    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("walk error: {e}");
                walk_errors += 1;
                continue;
            }
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let Some(key) = relative_key(entry.path(), root) else {
            continue;
        };
        if key.is_empty() {
            continue;
        }

        if file_type.is_dir() {
            dirs.insert(key);
            continue;
        }
        if !file_type.is_file() {
            // Symlinks and other special entries are not indexed.
            continue;
        }

        let (size, modified) = match entry.metadata() {
            Ok(meta) => (
                meta.len(),
                meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            ),
            Err(e) => {
                log::debug!("no metadata for {key}: {e}");
                walk_errors += 1;
                continue;
            }
        };

        let record = FileRecord {
            path: key.clone(),
            size,
            language: detect_language(entry.path()),
            modified,
            binary: is_binary_extension(entry.path()),
        };
        files.push((key, record));
    }

    Ok(WalkProduct {
        files,
        dirs,
        walk_errors,
    })
}

/// Root-relative `/`-separated path, or `None` for paths outside root.
fn relative_key(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let key = relative
        .to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/");
    Some(key)
}
