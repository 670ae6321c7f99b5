use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};

use lru::LruCache;
use scout_protocol::ExclusionRuleset;
use sha2::{Digest, Sha256};

use crate::error::{IndexerError, Result};
use crate::language::Language;
use crate::stats::IndexStats;
use crate::walker;

/// Metadata for one indexed file. Immutable once the walk created it;
/// the lazily-computed content hash and the cached content buffer live
/// in the index's side caches, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Root-relative path, `/`-separated.
    pub path: String,
    pub size: u64,
    pub language: Option<Language>,
    pub modified: SystemTime,
    pub binary: bool,
}

/// Knobs for the content cache. The walk itself takes no options: its
/// behavior is fixed so builds stay deterministic.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Global ceiling for cached content bytes; least-recently-used
    /// entries are evicted when a new read pushes past it.
    pub cache_ceiling_bytes: usize,
    /// Files larger than this are served but never cached.
    pub max_cached_file_bytes: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            cache_ceiling_bytes: 8 * 1024 * 1024,
            max_cached_file_bytes: 1024 * 1024,
        }
    }
}

struct ContentCache {
    entries: LruCache<String, Arc<str>>,
    bytes: usize,
}

/// In-memory catalog of a source tree, built by a single deterministic
/// walk and read-only afterwards.
///
/// Every query takes `&self` and is safe to call concurrently from
/// multiple phases; interior mutability is confined to the two side
/// caches (content, hash), each behind its own lock scoped to map
/// operations only — never held across file IO.
pub struct FileIndex {
    root: PathBuf,
    records: BTreeMap<String, FileRecord>,
    dirs: BTreeSet<String>,
    children: BTreeMap<String, Vec<String>>,
    basenames: HashMap<String, Vec<String>>,
    histogram: BTreeMap<Language, usize>,
    stats: IndexStats,
    options: IndexOptions,
    content_cache: Mutex<ContentCache>,
    hash_cache: Mutex<HashMap<String, String>>,
}

impl FileIndex {
    /// Walk `root` once and build the catalog. Fails only when the root
    /// does not exist or cannot be listed.
    pub fn build(root: impl AsRef<Path>, rules: &ExclusionRuleset) -> Result<Self> {
        Self::build_with_options(root, rules, IndexOptions::default())
    }

    pub fn build_with_options(
        root: impl AsRef<Path>,
        rules: &ExclusionRuleset,
        options: IndexOptions,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let started = Instant::now();
        let product = walker::walk(&root, rules)?;

        let mut records = BTreeMap::new();
        let mut histogram = BTreeMap::new();
        let mut basenames: HashMap<String, Vec<String>> = HashMap::new();
        for (path, record) in product.files {
            if let Some(language) = record.language {
                *histogram.entry(language).or_insert(0) += 1;
            }
            if let Some(name) = basename(&path) {
                basenames
                    .entry(name.to_ascii_lowercase())
                    .or_default()
                    .push(path.clone());
            }
            records.insert(path, record);
        }

        // Shortest path depth first, lexicographic on ties: the order
        // basename lookups and speculation hand out candidates.
        for paths in basenames.values_mut() {
            paths.sort_by(|a, b| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));
        }

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        children.insert(String::new(), Vec::new());
        for dir in &product.dirs {
            children.entry(dir.clone()).or_default();
        }
        for path in records.keys().chain(product.dirs.iter()) {
            children
                .entry(parent_of(path).to_string())
                .or_default()
                .push(path.clone());
        }
        for entries in children.values_mut() {
            entries.sort();
            entries.dedup();
        }

        let stats = IndexStats {
            files: records.len(),
            dirs: product.dirs.len(),
            time_ms: started.elapsed().as_millis() as u64,
            walk_errors: product.walk_errors,
        };
        log::info!(
            "indexed {} files / {} dirs under {} in {}ms",
            stats.files,
            stats.dirs,
            root.display(),
            stats.time_ms
        );

        Ok(Self {
            root,
            records,
            dirs: product.dirs,
            children,
            basenames,
            histogram,
            stats,
            options,
            content_cache: Mutex::new(ContentCache {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            hash_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn lookup(&self, path: &str) -> Option<&FileRecord> {
        self.records.get(&normalize(path))
    }

    /// Case-insensitive basename lookup, ordered by path depth then
    /// lexicographically.
    pub fn by_basename(&self, name: &str) -> Vec<&FileRecord> {
        self.basenames
            .get(&name.trim().to_ascii_lowercase())
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(|p| self.records.get(p))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Immediate children (files and subdirectories) of a directory,
    /// as full root-relative paths in lexicographic order. The tree
    /// root is the empty string.
    pub fn children_of(&self, dir: &str) -> &[String] {
        self.children
            .get(&normalize(dir))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_dir(&self, path: &str) -> bool {
        let path = normalize(path);
        path.is_empty() || self.dirs.contains(&path)
    }

    pub fn language_histogram(&self) -> &BTreeMap<Language, usize> {
        &self.histogram
    }

    pub fn total_files(&self) -> usize {
        self.records.len()
    }

    /// All records in deterministic lexicographic path order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Distinct lowercase basenames present in the index.
    pub fn basenames(&self) -> impl Iterator<Item = &str> {
        self.basenames.keys().map(String::as_str)
    }

    pub fn paths_for_basename(&self, lowercase_name: &str) -> &[String] {
        self.basenames
            .get(lowercase_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a file's content through the bounded LRU cache.
    ///
    /// The cache lock covers only the map lookup and the
    /// insert/evict decision; file IO happens with the lock released,
    /// so concurrent readers of resident entries never serialize on
    /// disk access.
    pub fn read_cached(&self, path: &str) -> Result<Arc<str>> {
        let key = normalize(path);
        let record = self
            .records
            .get(&key)
            .ok_or_else(|| IndexerError::NotIndexed(key.clone()))?;
        if record.binary {
            return Err(IndexerError::BinaryContent(key));
        }

        {
            let mut cache = self.content_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(content) = cache.entries.get(&key) {
                return Ok(Arc::clone(content));
            }
        }

        let bytes = std::fs::read(self.root.join(&key))?;
        let content: Arc<str> = Arc::from(String::from_utf8_lossy(&bytes).into_owned());

        if content.len() <= self.options.max_cached_file_bytes {
            let mut cache = self.content_cache.lock().unwrap_or_else(|e| e.into_inner());
            if !cache.entries.contains(&key) {
                cache.bytes += content.len();
                cache.entries.put(key, Arc::clone(&content));
                while cache.bytes > self.options.cache_ceiling_bytes {
                    match cache.entries.pop_lru() {
                        Some((_, evicted)) => cache.bytes -= evicted.len(),
                        None => break,
                    }
                }
            }
        }
        Ok(content)
    }

    /// Lazily computed, memoized sha256 of the file's raw bytes.
    pub fn content_hash(&self, path: &str) -> Result<String> {
        let key = normalize(path);
        if !self.records.contains_key(&key) {
            return Err(IndexerError::NotIndexed(key));
        }
        {
            let cache = self.hash_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hash) = cache.get(&key) {
                return Ok(hash.clone());
            }
        }
        let bytes = std::fs::read(self.root.join(&key))?;
        let digest = Sha256::digest(&bytes);
        let hash: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.hash_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, hash.clone());
        Ok(hash)
    }

    /// Bytes currently resident in the content cache.
    pub fn cached_bytes(&self) -> usize {
        self.content_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .bytes
    }
}

fn normalize(path: &str) -> String {
    let mut path = path.trim().replace('\\', "/");
    while let Some(stripped) = path.strip_prefix("./") {
        path = stripped.to_string();
    }
    path.trim_matches('/').to_string()
}

fn basename(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|n| !n.is_empty())
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn sample_tree() -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("auth.py"), "def login():\n    pass\n").unwrap();
        fs::write(src.join("models.py"), "class User:\n    pass\n").unwrap();
        fs::write(temp.path().join("README.md"), "# demo\n").unwrap();
        let git = temp.path().join(".git");
        fs::create_dir_all(&git).unwrap();
        fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        temp
    }

    #[test]
    fn build_indexes_files_and_skips_excluded() {
        let temp = sample_tree();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();

        assert_eq!(index.total_files(), 3);
        assert!(index.lookup("src/auth.py").is_some());
        assert!(index.lookup(".git/HEAD").is_none());
        assert!(index.paths().all(|p| !p.starts_with(".git")));
    }

    #[test]
    fn two_builds_are_identical() {
        let temp = sample_tree();
        let rules = ExclusionRuleset::standard();
        let first = FileIndex::build(temp.path(), &rules).unwrap();
        let second = FileIndex::build(temp.path(), &rules).unwrap();

        let a: Vec<&str> = first.paths().collect();
        let b: Vec<&str> = second.paths().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn iteration_order_is_lexicographic() {
        let temp = sample_tree();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();
        let paths: Vec<&str> = index.paths().collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn basename_lookup_is_case_insensitive_and_depth_ordered() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("deep/nested")).unwrap();
        fs::write(temp.path().join("Config.py"), "A = 1\n").unwrap();
        fs::write(temp.path().join("deep/nested/config.py"), "B = 2\n").unwrap();

        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();
        let hits = index.by_basename("CONFIG.PY");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "Config.py");
        assert_eq!(hits[1].path, "deep/nested/config.py");
    }

    #[test]
    fn children_of_lists_immediate_entries_in_order() {
        let temp = sample_tree();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();

        assert_eq!(index.children_of(""), &["README.md", "src"]);
        assert_eq!(index.children_of("src"), &["src/auth.py", "src/models.py"]);
        assert!(index.is_dir("src"));
        assert!(!index.is_dir("src/auth.py"));
    }

    #[test]
    fn every_view_path_is_a_primary_key_or_directory() {
        let temp = sample_tree();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();

        for (dir, entries) in &index.children {
            assert!(dir.is_empty() || index.dirs.contains(dir));
            for entry in entries {
                assert!(
                    index.records.contains_key(entry) || index.dirs.contains(entry),
                    "dangling child {entry}"
                );
            }
        }
        for paths in index.basenames.values() {
            for path in paths {
                assert!(index.records.contains_key(path), "dangling basename {path}");
            }
        }
    }

    #[test]
    fn language_histogram_counts_by_extension() {
        let temp = sample_tree();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();
        assert_eq!(index.language_histogram()[&Language::Python], 2);
        assert_eq!(index.language_histogram()[&Language::Markdown], 1);
    }

    #[test]
    fn lookup_normalizes_separators_and_prefixes() {
        let temp = sample_tree();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();
        assert!(index.lookup("./src/auth.py").is_some());
        assert!(index.lookup("src\\auth.py").is_some());
    }

    #[test]
    fn read_cached_serves_and_bounds_content() {
        let temp = sample_tree();
        let options = IndexOptions {
            cache_ceiling_bytes: 24,
            max_cached_file_bytes: 1024,
        };
        let index =
            FileIndex::build_with_options(temp.path(), &ExclusionRuleset::standard(), options)
                .unwrap();

        let first = index.read_cached("src/auth.py").unwrap();
        assert!(first.contains("def login"));
        let again = index.read_cached("src/auth.py").unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // Pushing more content through evicts least-recently-used
        // entries until the ceiling holds.
        index.read_cached("src/models.py").unwrap();
        index.read_cached("README.md").unwrap();
        assert!(index.cached_bytes() <= 24);
    }

    #[test]
    fn read_cached_refuses_unknown_and_binary() {
        let temp = sample_tree();
        fs::write(temp.path().join("logo.png"), [0u8, 1, 2]).unwrap();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();

        assert!(matches!(
            index.read_cached("missing.rs"),
            Err(IndexerError::NotIndexed(_))
        ));
        assert!(matches!(
            index.read_cached("logo.png"),
            Err(IndexerError::BinaryContent(_))
        ));
    }

    #[test]
    fn content_hash_is_memoized_and_stable() {
        let temp = sample_tree();
        let index = FileIndex::build(temp.path(), &ExclusionRuleset::standard()).unwrap();
        let first = index.content_hash("README.md").unwrap();
        let second = index.content_hash("README.md").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn build_fails_on_missing_root() {
        let err = FileIndex::build("/definitely/not/here", &ExclusionRuleset::standard());
        assert!(matches!(err, Err(IndexerError::InvalidRoot(_))));
    }
}
