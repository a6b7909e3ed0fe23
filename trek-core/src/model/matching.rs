//! src/model/matching.rs
//! ============================================================================
//! # Name matching: hidden-file globs, filters, find and search
//!
//! All pattern semantics share one convention: a leading `!` negates the
//! pattern. Case and diacritic folding follow the smartcase/smartdia rules:
//! folding only applies when the pattern itself is already folded.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use glob::{MatchOptions as GlobOptions, Pattern};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::fs::file_info::FileInfo;
use crate::model::sort::remove_diacritics;
use crate::util::paths::expand_tilde;

const GLOB_OPTIONS: GlobOptions = GlobOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Flags that shape how names are compared against user patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    pub ignorecase: bool,
    pub ignoredia: bool,
    pub smartcase: bool,
    pub smartdia: bool,
    pub globsearch: bool,
    pub anchorfind: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            ignorecase: true,
            ignoredia: true,
            smartcase: true,
            smartdia: false,
            globsearch: false,
            anchorfind: true,
        }
    }
}

/// Shell-style glob match where `*` never crosses a path separator.
pub fn glob_match(pattern: &str, text: &str) -> AppResult<bool> {
    let compiled: Pattern =
        Pattern::new(pattern).map_err(|e| AppError::invalid_pattern(pattern, e.msg))?;

    Ok(compiled.matches_with(text, GLOB_OPTIONS))
}

/// Reject a pattern with bad glob syntax. A leading `!` is not part of the glob.
pub fn validate_pattern(pattern: &str) -> AppResult<()> {
    let body: &str = pattern.strip_prefix('!').unwrap_or(pattern);
    Pattern::new(body).map_err(|e| AppError::invalid_pattern(pattern, e.msg))?;

    Ok(())
}

/// Validate every pattern, stopping at the first bad one.
pub fn validate_patterns<S: AsRef<str>>(patterns: &[S]) -> AppResult<()> {
    patterns
        .iter()
        .try_for_each(|p: &S| validate_pattern(p.as_ref()))
}

/// Match a hiddenfiles pattern. Absolute patterns see the full path,
/// relative ones only the entry name.
pub fn match_pattern(pattern: &str, name: &str, dir: &Path) -> bool {
    let expanded: PathBuf = expand_tilde(pattern);
    let pattern: Cow<'_, str> = expanded.to_string_lossy();

    let subject: String = if expanded.is_absolute() {
        dir.join(name).to_string_lossy().into_owned()
    } else {
        name.to_owned()
    };

    // syntax is checked when the option is set
    glob_match(&pattern, &subject).unwrap_or(false)
}

/// Last matching pattern wins; `!pat` un-hides what an earlier pattern hid.
pub fn is_hidden(file: &FileInfo, dir: &Path, hiddenfiles: &[String]) -> bool {
    let mut hidden: bool = false;

    for pattern in hiddenfiles {
        match pattern.strip_prefix('!') {
            Some(body) => {
                if match_pattern(body, &file.name, dir) {
                    hidden = false;
                }
            }
            None => {
                if match_pattern(pattern, &file.name, dir) {
                    hidden = true;
                }
            }
        }
    }

    hidden
}

fn fold(name: &str, pattern: &str, opts: &MatchOptions) -> (String, String) {
    let mut name: String = name.to_owned();
    let mut pattern: String = pattern.to_owned();

    if opts.ignorecase {
        let lower: String = pattern.to_lowercase();
        if !opts.smartcase || lower == pattern {
            pattern = lower;
            name = name.to_lowercase();
        }
    }

    if opts.ignoredia {
        let plain: String = remove_diacritics(&pattern);
        if !opts.smartdia || plain == pattern {
            pattern = plain;
            name = remove_diacritics(&name);
        }
    }

    (name, pattern)
}

/// Search semantics: glob when `globsearch` is on, otherwise substring.
pub fn search_match(name: &str, pattern: &str, opts: &MatchOptions) -> AppResult<bool> {
    let (name, pattern) = fold(name, pattern, opts);

    if opts.globsearch {
        return glob_match(&pattern, &name);
    }

    Ok(name.contains(&pattern))
}

/// Find semantics: prefix when `anchorfind` is on, otherwise substring.
pub fn find_match(name: &str, pattern: &str, opts: &MatchOptions) -> bool {
    let (name, pattern) = fold(name, pattern, opts);

    if opts.anchorfind {
        name.starts_with(&pattern)
    } else {
        name.contains(&pattern)
    }
}

/// True when the entry should be excluded by the display filter: a plain
/// pattern must match and a `!` pattern must not.
pub fn is_filtered(name: &str, filter: &[String], opts: &MatchOptions) -> bool {
    for pattern in filter {
        let (negated, body) = match pattern.strip_prefix('!') {
            Some(body) => (true, body),
            None => (false, pattern.as_str()),
        };

        let matched: bool = match search_match(name, body, opts) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    marker = "FILTER_ERROR",
                    operation_type = "filter",
                    pattern = %pattern,
                    error = %e,
                    "Filter pattern failed to match"
                );
                return false;
            }
        };

        if negated == matched {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> FileInfo {
        FileInfo::synthetic(PathBuf::from("/d").join(name), false)
    }

    #[test]
    fn test_hidden_negation_overrides_earlier_match() {
        let patterns: Vec<String> = vec![".*".into(), "!.config".into()];
        let dir = Path::new("/d");

        assert!(is_hidden(&entry(".cache"), dir, &patterns));
        assert!(!is_hidden(&entry(".config"), dir, &patterns));
        assert!(!is_hidden(&entry("notes"), dir, &patterns));
    }

    #[test]
    fn test_hidden_absolute_pattern_uses_full_path() {
        let patterns: Vec<String> = vec!["/d/secret".into()];
        assert!(is_hidden(&entry("secret"), Path::new("/d"), &patterns));
        assert!(!is_hidden(&entry("secret"), Path::new("/e"), &patterns));
    }

    #[test]
    fn test_smartcase_only_folds_lowercase_patterns() {
        let opts = MatchOptions::default();
        assert!(find_match("README.md", "read", &opts));
        assert!(!find_match("readme.md", "READ", &opts));
        assert!(find_match("README.md", "READ", &opts));
    }

    #[test]
    fn test_diacritics_are_ignored() {
        let opts = MatchOptions::default();
        assert!(find_match("Élan", "elan", &opts));
        assert!(search_match("café.txt", "cafe", &opts).unwrap());
    }

    #[test]
    fn test_anchorfind_and_globsearch() {
        let mut opts = MatchOptions::default();
        assert!(!find_match("xfoo", "foo", &opts));
        opts.anchorfind = false;
        assert!(find_match("xfoo", "foo", &opts));

        opts.globsearch = true;
        assert!(search_match("main.rs", "*.rs", &opts).unwrap());
        assert!(!search_match("main.rs", "*.go", &opts).unwrap());
    }

    #[test]
    fn test_filter_semantics() {
        let opts = MatchOptions::default();
        let filter: Vec<String> = vec!["rs".into(), "!test".into()];
        assert!(!is_filtered("lib.rs", &filter, &opts));
        assert!(is_filtered("lib.go", &filter, &opts));
        assert!(is_filtered("test.rs", &filter, &opts));
    }

    #[test]
    fn test_validate_patterns() {
        assert!(validate_patterns(&[".*", "!foo"]).is_ok());
        match validate_patterns(&["[abc"]) {
            Err(AppError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "[abc"),
            other => panic!("Expected InvalidPattern, got {other:?}"),
        }
    }
}
