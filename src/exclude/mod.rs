//! Exclude patterns in doublestar format.
//!
//! Patterns are matched against root-relative, forward-slash paths. A trailing
//! `/` restricts a pattern to directories; a single leading `/` is stripped
//! (patterns are root-relative either way). `*` and `?` never cross a path
//! separator, `**` spans any number of components, and `[...]`, `{a,b}` and
//! `\`-escapes follow the usual glob rules. Matching is case-sensitive.

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

/// Result type for exclude-pattern operations.
pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur while compiling exclude patterns.
#[derive(Debug, Error)]
pub enum PatternError {
    /// A pattern failed to compile.
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

// =============================================================================
// ExcludeSet
// =============================================================================

/// A compiled set of exclude patterns.
///
/// Matching is a disjunction: a path is excluded as soon as any pattern
/// matches it.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<CompiledPattern>,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    matcher: GlobMatcher,
    /// Pattern carried a trailing `/`: match directories only.
    dir_only: bool,
}

impl ExcludeSet {
    /// Compile a list of raw patterns.
    ///
    /// All patterns are compiled eagerly so that a syntax error surfaces
    /// before any other work happens.
    pub fn new<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(raw.len());

        for raw in raw {
            let pattern = raw.as_ref().replace('\\', "/");
            let dir_only = pattern.ends_with('/');

            let mut trimmed = pattern.as_str();
            if let Some(rest) = trimmed.strip_suffix('/') {
                trimmed = rest;
            }
            if let Some(rest) = trimmed.strip_prefix('/') {
                trimmed = rest;
            }

            // An empty pattern can never match a path record.
            if trimmed.is_empty() {
                continue;
            }

            let glob = GlobBuilder::new(trimmed)
                .literal_separator(true)
                .backslash_escape(true)
                .build()
                .map_err(|source| PatternError::Invalid {
                    pattern: raw.as_ref().to_string(),
                    source,
                })?;

            patterns.push(CompiledPattern {
                matcher: glob.compile_matcher(),
                dir_only,
            });
        }

        Ok(Self { patterns })
    }

    /// An exclude set that matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether no patterns are present.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Test whether `path` is excluded.
    ///
    /// `is_dir` decides the fate of directory-only patterns. The path is
    /// cleaned lexically before matching, so tar names with a trailing `/`
    /// and walker output can be passed as-is.
    pub fn is_match(&self, path: &str, is_dir: bool) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let cleaned = clean_path(path);
        let candidate = Path::new(cleaned.as_str());

        self.patterns.iter().any(|pattern| {
            pattern.matcher.is_match(candidate) && (!pattern.dir_only || is_dir)
        })
    }
}

// =============================================================================
// Path cleaning
// =============================================================================

/// Lexically clean a path for matching.
///
/// Backslashes become `/`, empty and `.` segments are dropped, and one
/// trailing `/` is removed. `..` segments are kept as-is; they simply fail to
/// match sensible root-relative patterns.
pub fn clean_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let rooted = normalized.starts_with('/');

    let mut cleaned = String::with_capacity(normalized.len());
    if rooted {
        cleaned.push('/');
    }

    for segment in normalized.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if !cleaned.is_empty() && !cleaned.ends_with('/') {
            cleaned.push('/');
        }
        cleaned.push_str(segment);
    }

    if cleaned.is_empty() {
        ".".to_string()
    } else {
        cleaned
    }
}

/// Parse the contents of an excludes file.
///
/// The file is UTF-8 lines; blank lines and `#` comments are ignored. The
/// surviving lines are returned in order, to be appended after any inline
/// patterns.
pub fn parse_excludes_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn excluded(path: &str, is_dir: bool, patterns: &[&str]) -> bool {
        ExcludeSet::new(patterns).unwrap().is_match(path, is_dir)
    }

    #[test]
    fn test_exact_matches() {
        assert!(excluded("foo.txt", false, &["foo.txt"]));
        assert!(excluded("src/main.go", false, &["src/main.go"]));
        assert!(excluded("build", true, &["build"]));
        assert!(!excluded("foo.txt", false, &["bar.txt"]));
        assert!(!excluded("lib/main.go", false, &["src/main.go"]));
    }

    #[test]
    fn test_directory_only_suffix() {
        assert!(excluded("build", true, &["build/"]));
        assert!(!excluded("build", false, &["build/"]));
    }

    #[test]
    fn test_single_star_stays_in_component() {
        assert!(excluded("test.go", false, &["*.go"]));
        assert!(excluded("test_file.go", false, &["test_*.go"]));
        assert!(excluded("test.go", false, &["test*.go"]));
        assert!(excluded("test_main_file.go", false, &["*_*_*.go"]));
        assert!(!excluded("src/main.go", false, &["*.go"]));
        assert!(excluded("src/test.go", false, &["src/*.go"]));
        assert!(!excluded("src/lib/main.go", false, &["src/*.go"]));
        assert!(!excluded("a/b", false, &["a*b"]));
        assert!(!excluded("a/b/c.txt", false, &["*.txt"]));
    }

    #[test]
    fn test_doublestar_spans_components() {
        assert!(excluded("a/b/c/file.go", false, &["**"]));
        assert!(excluded("deep/nested/file.go", false, &["**/*.go"]));
        assert!(excluded("src/any/deep/main.go", false, &["src/**/main.go"]));
        assert!(excluded("src/main.go", false, &["src/**/main.go"]));
        assert!(excluded("a/b/c/d/e.txt", false, &["a/**/e.txt"]));
        assert!(excluded("a/b/c/d/e.txt", false, &["a/**/c/**/e.txt"]));
        assert!(excluded("vendor/pkg", true, &["vendor/**"]));
        assert!(excluded("a/b/c/d/e/f/g/h.txt", false, &["a/**/h.txt"]));
    }

    #[test]
    fn test_question_mark() {
        assert!(excluded("a.txt", false, &["?.txt"]));
        assert!(!excluded("ab.txt", false, &["?.txt"]));
        assert!(!excluded(".txt", false, &["?.txt"]));
        assert!(excluded("ab.txt", false, &["??.txt"]));
        assert!(excluded("src/a.go", false, &["src/?.go"]));
        assert!(!excluded("a/b", true, &["a?b"]));
    }

    #[test]
    fn test_character_classes() {
        assert!(excluded("a.txt", false, &["[a-z].txt"]));
        assert!(!excluded("A.txt", false, &["[a-z].txt"]));
        assert!(excluded("a.txt", false, &["[abc].txt"]));
        assert!(!excluded("d.txt", false, &["[abc].txt"]));
        assert!(excluded("d.txt", false, &["[!abc].txt"]));
        assert!(!excluded("a.txt", false, &["[!abc].txt"]));
        assert!(excluded("1.txt", false, &["[0-9].txt"]));
        assert!(!excluded("ab.txt", false, &["[ab].txt"]));
        assert!(excluded("A.txt", false, &["[A-Z].txt"]));
        assert!(!excluded("a.txt", false, &["[A-Z].txt"]));
    }

    #[test]
    fn test_brace_alternation() {
        for name in ["file.go", "file.py", "file.js"] {
            assert!(excluded(name, false, &["file.{go,py,js}"]), "{name}");
        }
        assert!(!excluded("file.txt", false, &["file.{go,py,js}"]));
        assert!(excluded("src/main.go", false, &["{src,lib}/main.go"]));
        assert!(excluded("a1.txt", false, &["{a,b}{1,2}.txt"]));
        assert!(excluded("test.go", false, &["*.{go,py,js,cpp,c,h,hpp,java,kt,scala,clj}"]));
    }

    #[test]
    fn test_hidden_files() {
        assert!(excluded(".gitignore", false, &[".gitignore"]));
        assert!(excluded(".git", true, &[".git"]));
        assert!(excluded(".bashrc", false, &[".*"]));
        assert!(excluded("project/.git/config", false, &["**/.git/config"]));
        assert!(excluded("a/.hidden/b/file", false, &["**/.hidden/**"]));
        assert!(excluded(".hidden", false, &["*hidden"]));
        assert!(excluded("a/.hidden/file", false, &["a/**"]));
    }

    #[test]
    fn test_slash_handling() {
        assert!(!excluded("a/b/c", false, &["a//b/c"]));
        assert!(!excluded("sub/foo/bar", true, &["foo/bar"]));
        assert!(excluded("foo/bar", true, &["foo/bar"]));
        assert!(excluded("foo/bar", false, &["foo/bar"]));
        assert!(!excluded("sub/foo/bar", true, &["/foo/bar"]));
        assert!(excluded("vendor/lib.go", false, &["/vendor/**"]));
    }

    #[test]
    fn test_real_world_patterns() {
        assert!(excluded("project/node_modules/pkg/index.js", false, &["**/node_modules/**"]));
        assert!(excluded("a/node_modules/pkg/package.json", false, &["**/node_modules/**/package.json"]));
        assert!(excluded("target/release/binary", false, &["target/**"]));
        assert!(excluded("src/utils_test.go", false, &["**/*_test.go"]));
        assert!(excluded("config.bak", false, &["*.bak"]));
        assert!(excluded("app/logs/app.log", false, &["**/*.log"]));
        assert!(excluded(".DS_Store", false, &[".DS_Store"]));
    }

    #[test]
    fn test_multiple_patterns_are_a_disjunction() {
        assert!(excluded("test.go", false, &["*.go", "*.py"]));
        assert!(excluded("test.py", false, &["*.go", "*.py"]));
        assert!(!excluded("test.txt", false, &["*.go", "*.py"]));
        assert!(excluded("src/test.go", false, &["docs/**", "src/**/*.go", "*.tmp"]));
    }

    #[test]
    fn test_unicode_and_spaces() {
        assert!(excluded("файл.txt", false, &["файл.txt"]));
        assert!(excluded("test/файл.go", false, &["test/*.go"]));
        assert!(excluded("my file.txt", false, &["my file.txt"]));
        assert!(excluded("my test.txt", false, &["my *.txt"]));
    }

    #[test]
    fn test_escapes() {
        assert!(excluded("test1.txt", false, &["test[1].txt"]));
        assert!(excluded("test*.txt", false, &["test\\*.txt"]));
        assert!(excluded("what?.txt", false, &["what\\?.txt"]));
        assert!(!excluded("test*a.txt", false, &["test\\*.txt"]));
        assert!(!excluded("what?a.txt", false, &["what\\?.txt"]));
    }

    #[test]
    fn test_empty_pattern_matches_nothing() {
        assert!(!excluded("anything", false, &[""]));
        assert!(excluded("anything", false, &["**"]));
    }

    #[test]
    fn test_case_sensitivity() {
        assert!(excluded("File.TXT", false, &["File.TXT"]));
        assert!(!excluded("file.txt", false, &["File.TXT"]));
        assert!(excluded("FILE.txt", false, &["*.txt"]));
    }

    #[test]
    fn test_trailing_slash_on_candidate_is_cleaned() {
        // Tar directory names carry a trailing slash; matching ignores it.
        assert!(excluded("build/", true, &["build"]));
        assert!(excluded("a/b/", true, &["a/b/"]));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let err = ExcludeSet::new(&["a["]).unwrap_err();
        assert!(err.to_string().contains("pattern"));
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("a//b/./c"), "a/b/c");
        assert_eq!(clean_path("a/b/"), "a/b");
        assert_eq!(clean_path("./a"), "a");
        assert_eq!(clean_path("."), ".");
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("../a"), "../a");
        assert_eq!(clean_path("/a/b"), "/a/b");
        assert_eq!(clean_path("a\\b"), "a/b");
    }

    #[test]
    fn test_parse_excludes_file() {
        let contents = "# comment\n\n*.log\n  build/  \n\t\n# another\nvendor/**\n";
        assert_eq!(
            parse_excludes_file(contents),
            vec!["*.log".to_string(), "build/".to_string(), "vendor/**".to_string()]
        );
    }
}
