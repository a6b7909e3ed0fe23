//! src/util/paths.rs
//! ============================================================================
//! # Path helpers: tilde expansion and lexical cleaning
//!
//! The navigator never asks the OS to resolve paths for it; breadcrumbs are
//! built from lexically cleaned absolute paths so `..` behaves the same way
//! whether or not a component is a symlink.

use std::{
    path::{Component, Path, PathBuf},
    sync::OnceLock,
};

use directories::BaseDirs;

static HOME: OnceLock<Option<PathBuf>> = OnceLock::new();

/// The user's home directory, resolved once.
pub fn home_dir() -> Option<&'static Path> {
    HOME.get_or_init(|| BaseDirs::new().map(|b: BaseDirs| b.home_dir().to_path_buf()))
        .as_deref()
}

/// Replace a leading `~` with the home directory.
pub fn expand_tilde(input: &str) -> PathBuf {
    if let Some(rest) = input.strip_prefix('~') {
        if let Some(home) = home_dir() {
            let rest: &str = rest.trim_start_matches('/');
            return if rest.is_empty() {
                home.to_path_buf()
            } else {
                home.join(rest)
            };
        }
    }

    PathBuf::from(input)
}

/// Lexically normalize a path: drop `.`, fold `name/..`, collapse separators.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            _ => out.push(comp),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }

    out.iter().collect()
}

/// Resolve `input` against `base` after tilde expansion and cleaning.
pub fn resolve(input: &str, base: &Path) -> PathBuf {
    let expanded: PathBuf = expand_tilde(input);
    let joined: PathBuf = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };

    clean_path(&joined)
}

/// Final path component as a string, empty for the root.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("/a/./b/../c//")), PathBuf::from("/a/c"));
        assert_eq!(clean_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(clean_path(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn test_resolve_relative_against_base() {
        let got: PathBuf = resolve("../x", Path::new("/tmp/y"));
        assert_eq!(got, PathBuf::from("/tmp/x"));
        assert_eq!(resolve("/abs", Path::new("/tmp")), PathBuf::from("/abs"));
    }
}
