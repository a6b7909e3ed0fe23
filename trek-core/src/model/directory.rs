//! src/model/directory.rs
//! ============================================================================
//! # Directory: one listing with its cursor and display pipeline
//!
//! `all_files` is the full, unfiltered listing. The displayed entries are the
//! suffix `all_files[offset..]`: every filtering stage stably partitions the
//! current view so excluded entries move to its front, then advances `offset`
//! past them. No entries are copied when a filter is applied.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use crate::fs::file_info::FileInfo;
use crate::model::matching::{is_filtered, is_hidden};
use crate::model::sort::{SortParams, primary_order};

#[derive(Debug, Clone)]
pub struct Directory {
    pub path: PathBuf,
    all_files: Vec<Arc<FileInfo>>,
    offset: usize,

    /// Cursor index into the displayed entries.
    pub ind: usize,

    /// Cursor row inside the viewport.
    pub pos: usize,

    /// Parameters in effect when this listing was last sorted.
    pub params: SortParams,

    /// Display filter patterns, kept across rescans.
    pub filter: Vec<String>,

    pub loading: bool,
    pub load_time: SystemTime,
    pub no_perm: bool,

    /// Precomputed preview lines for directory previews.
    pub lines: Option<Vec<String>>,

    /// The directory previewer exited non-zero.
    pub volatile: bool,
}

impl Directory {
    /// Empty placeholder occupying the cache slot while a scan runs.
    pub fn placeholder(path: PathBuf, params: SortParams) -> Self {
        Self {
            path,
            all_files: Vec::new(),
            offset: 0,
            ind: 0,
            pos: 0,
            params,
            filter: Vec::new(),
            loading: true,
            load_time: SystemTime::now(),
            no_perm: false,
            lines: None,
            volatile: false,
        }
    }

    /// Fresh, unsorted listing as produced by a scan.
    pub fn from_entries(path: PathBuf, files: Vec<Arc<FileInfo>>, load_time: SystemTime) -> Self {
        Self {
            path,
            all_files: files,
            offset: 0,
            ind: 0,
            pos: 0,
            params: SortParams::default(),
            filter: Vec::new(),
            loading: false,
            load_time,
            no_perm: false,
            lines: None,
            volatile: false,
        }
    }

    /// Displayed entries.
    pub fn files(&self) -> &[Arc<FileInfo>] {
        &self.all_files[self.offset..]
    }

    /// Every entry, including those hidden or filtered out.
    pub fn all_files(&self) -> &[Arc<FileInfo>] {
        &self.all_files
    }

    pub fn len(&self) -> usize {
        self.all_files.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current(&self) -> Option<&Arc<FileInfo>> {
        self.files().get(self.ind)
    }

    /// Name under the cursor.
    pub fn name(&self) -> Option<&str> {
        self.current().map(|f: &Arc<FileInfo>| f.name.as_str())
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.files().iter().position(|f: &Arc<FileInfo>| f.name == name)
    }

    /// Mutable access to a displayed entry by name, for size updates.
    pub fn entry_mut(&mut self, name: &str) -> Option<&mut FileInfo> {
        let idx: usize = self.offset + self.position_of(name)?;
        Some(Arc::make_mut(&mut self.all_files[idx]))
    }

    /// Append an entry to the displayed list while a scan is still pending.
    pub fn push_provisional(&mut self, file: FileInfo) {
        self.all_files.push(Arc::new(file));
    }

    /// Recompute the displayed list under `params`.
    pub fn sort(&mut self, params: SortParams) {
        self.params = params;
        self.offset = 0;

        primary_order(&mut self.all_files, &self.params);

        if self.params.sort_type.reverse {
            self.all_files.reverse();
        }

        if self.params.sort_type.dirfirst {
            self.all_files.sort_by_key(|f: &Arc<FileInfo>| !f.is_dir);
        }

        if self.params.dironly {
            self.exclude(|f: &FileInfo, _: &Path, _: &SortParams, _: &[String]| !f.is_dir);
        }

        if !self.params.sort_type.hidden {
            self.exclude(|f: &FileInfo, dir: &Path, params: &SortParams, _: &[String]| {
                is_hidden(f, dir, &params.hiddenfiles)
            });
        }

        if !self.filter.is_empty() {
            self.exclude(|f: &FileInfo, _: &Path, params: &SortParams, filter: &[String]| {
                is_filtered(&f.name, filter, &params.matching)
            });
        }

        self.clamp();
    }

    /// Stable-partition the view so excluded entries lead, then skip them.
    fn exclude<F>(&mut self, excluded: F)
    where
        F: Fn(&FileInfo, &Path, &SortParams, &[String]) -> bool,
    {
        let path: &Path = &self.path;
        let params: &SortParams = &self.params;
        let filter: &[String] = &self.filter;

        let view: &mut [Arc<FileInfo>] = &mut self.all_files[self.offset..];
        view.sort_by_cached_key(|f: &Arc<FileInfo>| !excluded(&**f, path, params, filter));

        let skipped: usize = view
            .iter()
            .take_while(|f: &&Arc<FileInfo>| excluded(&***f, path, params, filter))
            .count();
        self.offset += skipped;
    }

    /// Keep the cursor inside the displayed list.
    pub fn clamp(&mut self) {
        if self.is_empty() {
            self.ind = 0;
            self.pos = 0;
            return;
        }

        self.ind = self.ind.min(self.len() - 1);
        self.pos = self.pos.min(self.ind);
    }

    /// Put the cursor on `name` if present and recompute the viewport row.
    pub fn sel(&mut self, name: &str, height: usize, scrolloff: usize) {
        if self.is_empty() {
            self.ind = 0;
            self.pos = 0;
            return;
        }

        self.ind = self.ind.min(self.len() - 1);

        if self.name() != Some(name) {
            if let Some(idx) = self.position_of(name) {
                self.ind = idx;
            }
        }

        let edge: usize = (height / 2)
            .min(scrolloff)
            .min(self.len() - self.ind - 1);
        self.pos = self.ind.min(height.saturating_sub(edge + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sort::SortMethod;

    fn listing(entries: &[(&str, bool)]) -> Directory {
        let files: Vec<Arc<FileInfo>> = entries
            .iter()
            .map(|(n, d)| Arc::new(FileInfo::synthetic(PathBuf::from("/d").join(n), *d)))
            .collect();
        Directory::from_entries(PathBuf::from("/d"), files, SystemTime::UNIX_EPOCH)
    }

    fn names(dir: &Directory) -> Vec<&str> {
        dir.files().iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_natural_dirfirst_case_insensitive_scenario() {
        let mut dir = listing(&[("b.txt", false), ("A", true), ("a.txt", false)]);
        dir.sort(SortParams::default());

        assert_eq!(names(&dir), vec!["A", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut dir = listing(&[
            ("img10", false),
            ("img2", false),
            ("Docs", true),
            (".git", true),
            ("img10a", false),
            ("bin", true),
        ]);
        dir.sort(SortParams::default());
        let first: Vec<String> = names(&dir).iter().map(|s| s.to_string()).collect();

        dir.sort(SortParams::default());
        let second: Vec<String> = names(&dir).iter().map(|s| s.to_string()).collect();

        assert_eq!(first, second);
        assert_eq!(first, vec!["bin", "Docs", "img2", "img10", "img10a"]);
    }

    #[test]
    fn test_hidden_filter_exact() {
        let mut dir = listing(&[(".a", false), ("b", false), (".keep", false), ("c", false)]);
        let mut params = SortParams::default();
        params.hiddenfiles = vec![".*".into(), "!.keep".into()];
        dir.sort(params.clone());
        assert_eq!(names(&dir), vec![".keep", "b", "c"]);

        params.sort_type.hidden = true;
        dir.sort(params);
        assert_eq!(dir.len(), 4);
        assert_eq!(dir.all_files().len(), 4);
    }

    #[test]
    fn test_all_hidden_gives_empty_view() {
        let mut dir = listing(&[(".a", false), (".b", false)]);
        dir.ind = 1;
        dir.sort(SortParams::default());

        assert!(dir.is_empty());
        assert_eq!(dir.ind, 0);
        assert_eq!(dir.name(), None);
    }

    #[test]
    fn test_dironly_keeps_primary_order() {
        let mut dir = listing(&[("z", true), ("m.txt", false), ("a", true), ("k", true)]);
        let mut params = SortParams::default();
        params.dironly = true;
        params.sort_type.dirfirst = false;
        params.sort_type.reverse = true;
        dir.sort(params);

        assert_eq!(names(&dir), vec!["z", "k", "a"]);
    }

    #[test]
    fn test_dironly_without_dirs_is_empty() {
        let mut dir = listing(&[("x", false), ("y", false)]);
        let mut params = SortParams::default();
        params.dironly = true;
        dir.sort(params);

        assert!(dir.is_empty());
    }

    #[test]
    fn test_filter_preserved_and_applied() {
        let mut dir = listing(&[("main.rs", false), ("lib.rs", false), ("notes.md", false)]);
        dir.filter = vec!["rs".into()];
        dir.sort(SortParams::default());

        assert_eq!(names(&dir), vec!["lib.rs", "main.rs"]);
    }

    #[test]
    fn test_size_sort_uses_total_size() {
        let mut files: Vec<FileInfo> = vec![
            FileInfo::synthetic("/d/big".into(), false),
            FileInfo::synthetic("/d/dir".into(), true),
            FileInfo::synthetic("/d/small".into(), false),
        ];
        files[0].size = 100;
        files[1].size = 4096;
        files[2].size = 10;

        let mut dir = Directory::from_entries(
            "/d".into(),
            files.into_iter().map(Arc::new).collect(),
            SystemTime::UNIX_EPOCH,
        );
        let mut params = SortParams::default();
        params.sort_type.method = SortMethod::Size;
        params.sort_type.dirfirst = false;
        dir.sort(params.clone());
        assert_eq!(names(&dir), vec!["dir", "small", "big"]);

        dir.entry_mut("dir").unwrap().dir_size = Some(1000);
        dir.sort(params);
        assert_eq!(names(&dir), vec!["small", "big", "dir"]);
    }

    #[test]
    fn test_sel_finds_name_and_respects_scrolloff() {
        let entries: Vec<(String, bool)> = (0..50).map(|i| (format!("f{i:02}"), false)).collect();
        let refs: Vec<(&str, bool)> = entries.iter().map(|(n, d)| (n.as_str(), *d)).collect();
        let mut dir = listing(&refs);
        dir.sort(SortParams::default());

        dir.sel("f30", 10, 2);
        assert_eq!(dir.ind, 30);
        assert_eq!(dir.pos, 7);

        dir.sel("f49", 10, 2);
        assert_eq!(dir.ind, 49);
        assert_eq!(dir.pos, 9);

        dir.sel("missing", 10, 2);
        assert_eq!(dir.ind, 49);
    }
}
