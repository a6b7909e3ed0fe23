//! src/model/sort.rs
//! ============================================================================
//! # Sort parameters and primary orderings
//!
//! A [`SortParams`] value is the snapshot of every option that shapes a
//! listing. Each [`Directory`](crate::model::directory::Directory) keeps the
//! snapshot it was last sorted under, so deciding whether a re-sort is due is
//! a plain `!=` against the snapshot taken from the current options.

use std::{borrow::Cow, cmp::Ordering, sync::Arc};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::config::Options;
use crate::fs::file_info::FileInfo;
use crate::model::matching::MatchOptions;

/// Primary ordering of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortMethod {
    #[default]
    Natural,

    Name,

    Size,

    Time,

    Atime,

    Ctime,

    Ext,
}

impl std::str::FromStr for SortMethod {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "natural" => Ok(Self::Natural),
            "name" => Ok(Self::Name),
            "size" => Ok(Self::Size),
            "time" => Ok(Self::Time),
            "atime" => Ok(Self::Atime),
            "ctime" => Ok(Self::Ctime),
            "ext" => Ok(Self::Ext),
            other => Err(crate::error::AppError::invalid_input(
                "sortby",
                format!("unknown sort method: {other}"),
            )),
        }
    }
}

/// Sort method plus the three ordering toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortType {
    pub method: SortMethod,
    pub dirfirst: bool,

    /// Show hidden files (disables the hidden filter stage).
    pub hidden: bool,

    pub reverse: bool,
}

impl Default for SortType {
    fn default() -> Self {
        Self {
            method: SortMethod::Natural,
            dirfirst: true,
            hidden: false,
            reverse: false,
        }
    }
}

/// Everything a sort pass reads, captured at the moment of sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortParams {
    pub sort_type: SortType,
    pub dironly: bool,
    pub hiddenfiles: Vec<String>,
    pub matching: MatchOptions,
}

impl SortParams {
    pub fn from_options(opts: &Options) -> Self {
        Self {
            sort_type: opts.sort,
            dironly: opts.dironly,
            hiddenfiles: opts.hiddenfiles.clone(),
            matching: opts.match_options(),
        }
    }
}

impl Default for SortParams {
    fn default() -> Self {
        Self::from_options(&Options::default())
    }
}

/// Unicode decomposition followed by stripping combining marks.
pub fn remove_diacritics(s: &str) -> String {
    s.nfd().filter(|c: &char| !is_combining_mark(*c)).collect()
}

/// Case and diacritic folding used by name and extension orderings.
pub fn normalize(s: &str, ignorecase: bool, ignoredia: bool) -> Cow<'_, str> {
    let mut out: Cow<'_, str> = Cow::Borrowed(s);

    if ignorecase {
        out = Cow::Owned(out.to_lowercase());
    }
    if ignoredia {
        out = Cow::Owned(remove_diacritics(&out));
    }

    out
}

/// Natural ordering: digit runs compare numerically, other runs bytewise,
/// and a strict prefix sorts first.
pub fn natural_less(s1: &str, s2: &str) -> bool {
    let (b1, b2): (&[u8], &[u8]) = (s1.as_bytes(), s2.as_bytes());
    let (mut hi1, mut hi2): (usize, usize) = (0, 0);

    loop {
        if hi1 >= b1.len() {
            return hi2 != b2.len();
        }
        if hi2 >= b2.len() {
            return false;
        }

        let digit1: bool = b1[hi1].is_ascii_digit();
        let digit2: bool = b2[hi2].is_ascii_digit();

        let lo1: usize = hi1;
        while hi1 < b1.len() && b1[hi1].is_ascii_digit() == digit1 {
            hi1 += 1;
        }
        let lo2: usize = hi2;
        while hi2 < b2.len() && b2[hi2].is_ascii_digit() == digit2 {
            hi2 += 1;
        }

        let (chunk1, chunk2): (&[u8], &[u8]) = (&b1[lo1..hi1], &b2[lo2..hi2]);
        if chunk1 == chunk2 {
            continue;
        }

        if digit1 && digit2 {
            if let (Some(n1), Some(n2)) = (parse_digits(chunk1), parse_digits(chunk2)) {
                return n1 < n2;
            }
        }

        return chunk1 < chunk2;
    }
}

fn parse_digits(chunk: &[u8]) -> Option<u64> {
    chunk.iter().try_fold(0u64, |acc: u64, b: &u8| {
        acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
    })
}

fn less_to_ordering<T: ?Sized>(a: &T, b: &T, less: impl Fn(&T, &T) -> bool) -> Ordering {
    if less(a, b) {
        Ordering::Less
    } else if less(b, a) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// Stable primary ordering of `files` by `params.sort_type.method`.
pub fn primary_order(files: &mut Vec<Arc<FileInfo>>, params: &SortParams) {
    let (ic, id): (bool, bool) = (params.matching.ignorecase, params.matching.ignoredia);

    match params.sort_type.method {
        SortMethod::Natural | SortMethod::Name => {
            let natural: bool = params.sort_type.method == SortMethod::Natural;
            let mut keyed: Vec<(CompactString, Arc<FileInfo>)> = files
                .drain(..)
                .map(|f: Arc<FileInfo>| (CompactString::from(normalize(&f.name, ic, id)), f))
                .collect();

            keyed.sort_by(|a, b| {
                if natural {
                    less_to_ordering(a.0.as_str(), b.0.as_str(), natural_less)
                } else {
                    a.0.cmp(&b.0)
                }
            });

            files.extend(keyed.into_iter().map(|(_, f)| f));
        }
        SortMethod::Size => files.sort_by_key(|f: &Arc<FileInfo>| f.total_size()),
        SortMethod::Time => files.sort_by_key(|f: &Arc<FileInfo>| f.modified),
        SortMethod::Atime => files.sort_by_key(|f: &Arc<FileInfo>| f.accessed),
        SortMethod::Ctime => files.sort_by_key(|f: &Arc<FileInfo>| f.changed),
        SortMethod::Ext => {
            // empty extension sorts before every real one
            let mut keyed: Vec<((CompactString, CompactString), Arc<FileInfo>)> = files
                .drain(..)
                .map(|f: Arc<FileInfo>| {
                    let ext: CompactString = if f.ext.is_empty() {
                        CompactString::from("\0")
                    } else {
                        CompactString::from(normalize(&f.ext, ic, id))
                    };
                    let name: CompactString = CompactString::from(normalize(&f.name, ic, id));
                    ((ext, name), f)
                })
                .collect();

            keyed.sort_by(|a, b| a.0.cmp(&b.0));

            files.extend(keyed.into_iter().map(|(_, f)| f));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_less_numeric_runs() {
        assert!(natural_less("img2", "img10"));
        assert!(natural_less("img10", "img10a"));
        assert!(!natural_less("img10", "img2"));
        assert!(natural_less("a", "ab"));
        assert!(!natural_less("ab", "a"));
        assert!(!natural_less("a", "a"));
    }

    #[test]
    fn test_natural_less_mixed_runs() {
        assert!(natural_less("1a", "a"));
        assert!(natural_less("file9.txt", "file10.txt"));
        // equal values, different spelling: neither is less
        assert!(!natural_less("a007", "a7"));
        assert!(!natural_less("a7", "a007"));
    }

    #[test]
    fn test_natural_less_huge_numbers_fall_back_to_bytes() {
        let big: &str = "99999999999999999999999";
        assert!(natural_less("1", big));
        assert!(natural_less(big, "99999999999999999999999a"));
    }

    #[test]
    fn test_remove_diacritics() {
        assert_eq!(remove_diacritics("résumé"), "resume");
        assert_eq!(remove_diacritics("Ångström"), "Angstrom");
    }

    #[test]
    fn test_ext_order_puts_extensionless_first() {
        let mut files: Vec<Arc<FileInfo>> = ["b.txt", "a.rs", "Makefile", "c.rs"]
            .iter()
            .map(|n| Arc::new(FileInfo::synthetic(format!("/d/{n}").into(), false)))
            .collect();
        let mut params = SortParams::default();
        params.sort_type.method = SortMethod::Ext;

        primary_order(&mut files, &params);

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Makefile", "a.rs", "c.rs", "b.txt"]);
    }

    #[test]
    fn test_sort_method_from_str() {
        assert_eq!("ctime".parse::<SortMethod>().unwrap(), SortMethod::Ctime);
        assert!("bogus".parse::<SortMethod>().is_err());
    }
}
