use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages the index can tag without opening a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    C,
    Cpp,
    CSharp,
    Css,
    Dart,
    Docker,
    Elixir,
    Go,
    Haskell,
    Html,
    Java,
    JavaScript,
    Json,
    Kotlin,
    Lua,
    Make,
    Markdown,
    Php,
    Python,
    Ruby,
    Rust,
    Scala,
    Shell,
    Sql,
    Swift,
    Toml,
    TypeScript,
    Xml,
    Yaml,
    Zig,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Css => "css",
            Self::Dart => "dart",
            Self::Docker => "docker",
            Self::Elixir => "elixir",
            Self::Go => "go",
            Self::Haskell => "haskell",
            Self::Html => "html",
            Self::Java => "java",
            Self::JavaScript => "javascript",
            Self::Json => "json",
            Self::Kotlin => "kotlin",
            Self::Lua => "lua",
            Self::Make => "make",
            Self::Markdown => "markdown",
            Self::Php => "php",
            Self::Python => "python",
            Self::Ruby => "ruby",
            Self::Rust => "rust",
            Self::Scala => "scala",
            Self::Shell => "shell",
            Self::Sql => "sql",
            Self::Swift => "swift",
            Self::Toml => "toml",
            Self::TypeScript => "typescript",
            Self::Xml => "xml",
            Self::Yaml => "yaml",
            Self::Zig => "zig",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filenames that identify a language regardless of extension.
const FILENAME_OVERRIDES: &[(&str, Language)] = &[
    ("Dockerfile", Language::Docker),
    ("Containerfile", Language::Docker),
    ("Makefile", Language::Make),
    ("makefile", Language::Make),
    ("GNUmakefile", Language::Make),
    ("Gemfile", Language::Ruby),
    ("Rakefile", Language::Ruby),
    ("CMakeLists.txt", Language::Make),
];

const EXTENSIONS: &[(&str, Language)] = &[
    ("c", Language::C),
    ("h", Language::C),
    ("cc", Language::Cpp),
    ("cpp", Language::Cpp),
    ("cxx", Language::Cpp),
    ("hh", Language::Cpp),
    ("hpp", Language::Cpp),
    ("cs", Language::CSharp),
    ("css", Language::Css),
    ("scss", Language::Css),
    ("less", Language::Css),
    ("dart", Language::Dart),
    ("ex", Language::Elixir),
    ("exs", Language::Elixir),
    ("go", Language::Go),
    ("hs", Language::Haskell),
    ("html", Language::Html),
    ("htm", Language::Html),
    ("java", Language::Java),
    ("js", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("json", Language::Json),
    ("kt", Language::Kotlin),
    ("kts", Language::Kotlin),
    ("lua", Language::Lua),
    ("md", Language::Markdown),
    ("mdx", Language::Markdown),
    ("php", Language::Php),
    ("py", Language::Python),
    ("pyw", Language::Python),
    ("pyi", Language::Python),
    ("rb", Language::Ruby),
    ("rs", Language::Rust),
    ("scala", Language::Scala),
    ("sh", Language::Shell),
    ("bash", Language::Shell),
    ("zsh", Language::Shell),
    ("sql", Language::Sql),
    ("swift", Language::Swift),
    ("toml", Language::Toml),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("xml", Language::Xml),
    ("yaml", Language::Yaml),
    ("yml", Language::Yaml),
    ("zig", Language::Zig),
];

/// Extensions whose content is not text. The walk never opens files,
/// so the binary flag is extension-driven only.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "tar", "gz", "bz2", "xz",
    "7z", "jar", "class", "exe", "dll", "so", "dylib", "a", "o", "wasm", "bin", "dat", "db",
    "sqlite", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "avi", "mov", "pyc",
];

/// Detect a file's language from its name alone. Pure: never opens
/// the file.
pub fn detect_language(path: &Path) -> Option<Language> {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if let Some((_, language)) = FILENAME_OVERRIDES.iter().find(|(n, _)| *n == name) {
            return Some(*language);
        }
    }
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, language)| *language)
}

pub fn is_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.iter().any(|b| *b == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extension_detection() {
        assert_eq!(detect_language(Path::new("src/main.rs")), Some(Language::Rust));
        assert_eq!(detect_language(Path::new("app.PY")), Some(Language::Python));
        assert_eq!(detect_language(Path::new("LICENSE")), None);
    }

    #[test]
    fn filename_overrides_beat_extensions() {
        assert_eq!(detect_language(Path::new("Dockerfile")), Some(Language::Docker));
        assert_eq!(
            detect_language(Path::new("deploy/Makefile")),
            Some(Language::Make)
        );
        assert_eq!(
            detect_language(Path::new("CMakeLists.txt")),
            Some(Language::Make)
        );
    }

    #[test]
    fn binary_extensions() {
        assert!(is_binary_extension(Path::new("logo.png")));
        assert!(is_binary_extension(Path::new("cache.PYC")));
        assert!(!is_binary_extension(Path::new("main.rs")));
        assert!(!is_binary_extension(Path::new("README")));
    }
}
