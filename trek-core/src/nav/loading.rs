//! Directory cache lookups, staleness checks and breadcrumb rebuilding.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use tracing::{debug, info};

use super::Navigator;
use crate::error::AppResult;
use crate::fs::dir_scanner::DirPreviewJob;
use crate::fs::file_info::FileInfo;
use crate::model::directory::Directory;
use crate::model::matching::validate_pattern;
use crate::model::sort::SortParams;
use crate::util::paths::base_name;

impl Navigator {
    /// Make sure `path` has a cache slot. A cached listing is validated and
    /// kept; otherwise a loading placeholder takes the slot and a scan starts,
    /// so a second request for the same path joins the pending scan.
    pub fn load_dir(&mut self, path: &Path) {
        if self.options.dircache && self.dir_cache.lookup(path).is_some() {
            self.check_dir(path);
            return;
        }

        let params: SortParams = SortParams::from_options(&self.options);
        self.dir_cache
            .insert(path.to_path_buf(), Directory::placeholder(path.to_path_buf(), params));
        self.spawn_scan(path.to_path_buf(), Vec::new());
    }

    fn spawn_scan(&self, path: PathBuf, filter: Vec<String>) {
        let preview: Option<DirPreviewJob> = match (&self.options.previewer, self.options.dirpreviews) {
            (Some(previewer), true) => Some(DirPreviewJob {
                previewer: previewer.clone(),
                window: self.window,
                env: self.preview_env(),
            }),
            _ => None,
        };

        self.scanner.spawn_scan(
            path,
            SortParams::from_options(&self.options),
            filter,
            self.options.dircounts,
            preview,
        );
    }

    /// Rescan when the directory changed on disk, re-sort when the options
    /// it was sorted under are out of date, otherwise leave it alone.
    pub fn check_dir(&mut self, path: &Path) {
        let params: SortParams = SortParams::from_options(&self.options);

        let modified: SystemTime = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                info!("getting directory info: {}", e);
                return;
            }
        };

        let Some(dir) = self.dir_cache.get_mut(path) else {
            return;
        };

        // the pending result will be validated when it is next requested
        if dir.loading {
            return;
        }

        if modified > dir.load_time {
            // some filesystems report modification times in the future
            if modified > SystemTime::now() {
                return;
            }

            debug!(
                marker = "DIR_STALE",
                operation_type = "rescan",
                path = %path.display(),
                "Directory modified since last load"
            );
            self.rescan(path);
        } else if dir.params != params {
            dir.loading = true;
            self.scanner.spawn_resort(dir.clone(), params);
        }
    }

    /// Scan a cached listing again, keeping its filter. The cached entry
    /// stays visible while the scan runs.
    pub(super) fn rescan(&mut self, path: &Path) {
        let Some(dir) = self.dir_cache.get_mut(path) else {
            return;
        };

        dir.loading = true;
        dir.load_time = SystemTime::now();
        let filter: Vec<String> = dir.filter.clone();
        self.spawn_scan(path.to_path_buf(), filter);
    }

    /// Rebuild the breadcrumb stack for `wd`, from the root down, with each
    /// ancestor's cursor on the child leading to `wd`.
    pub(super) fn get_dirs(&mut self, wd: &Path) {
        let mut dirs: Vec<PathBuf> = Vec::new();
        let mut child: String = String::new();

        for curr in wd.ancestors() {
            self.load_dir(curr);
            let (height, scrolloff) = (self.height, self.options.scrolloff);
            if let Some(dir) = self.dir_cache.get_mut(curr) {
                dir.sel(&child, height, scrolloff);
            }

            child = base_name(curr);
            dirs.push(curr.to_path_buf());
        }

        dirs.reverse();
        self.dirs = dirs;

        if !self.options.dircache {
            let dirs: &[PathBuf] = &self.dirs;
            self.dir_cache.retain(|p: &PathBuf, _| dirs.contains(p));
        }
    }

    /// Point each ancestor's cursor at the next breadcrumb.
    pub fn position(&mut self) {
        let (height, scrolloff) = (self.height, self.options.scrolloff);

        for pair in self.dirs.windows(2).rev() {
            let name: String = base_name(&pair[1]);
            if let Some(dir) = self.dir_cache.get_mut(&pair[0]) {
                dir.sel(&name, height, scrolloff);
            }
        }
    }

    /// Install a finished scan or re-sort. The cursor stays on the entry it
    /// was on in the listing being replaced, and the filter in effect now
    /// wins over the one the background task started with. A volatile
    /// preview of the directory under the cursor is handed to the preview
    /// worker for cleaning.
    pub(super) fn install_dir(&mut self, mut dir: Directory) {
        let (height, scrolloff) = (self.height, self.options.scrolloff);

        if !self.options.dircache && !self.dirs.contains(&dir.path) {
            debug!("dropping listing outside the breadcrumbs: {:?}", dir.path);
            return;
        }

        if let Some(prev) = self.dir_cache.get(&dir.path) {
            dir.ind = prev.ind;
            dir.pos = prev.pos;
            if dir.filter != prev.filter {
                dir.filter = prev.filter.clone();
                let params: SortParams = dir.params.clone();
                dir.sort(params);
            }
            let name: String = prev.name().unwrap_or_default().to_string();
            dir.sel(&name, height, scrolloff);
        }

        debug!(
            marker = "DIR_INSTALL",
            operation_type = "install_dir",
            path = %dir.path.display(),
            entries = dir.len(),
            loading = dir.loading,
            "Directory result installed"
        );

        let path: PathBuf = dir.path.clone();
        self.dir_cache.insert(path.clone(), dir);
        self.position();

        if self.curr_file().is_ok_and(|f| f.is_dir && f.path == path) {
            self.track_dir_preview(&path);
        }
    }

    /// Re-validate every open directory and forget selections that vanished.
    pub fn renew(&mut self) {
        let dirs: Vec<PathBuf> = self.dirs.clone();
        for path in &dirs {
            self.check_dir(path);
        }

        self.selections.retain(|p: &Path| {
            !matches!(std::fs::symlink_metadata(p), Err(e) if e.kind() == io::ErrorKind::NotFound)
        });
    }

    /// Drop both caches and rebuild the stack, keeping the current entry
    /// visible until the fresh scan lands.
    pub fn reload(&mut self) {
        let curr: Option<Arc<FileInfo>> = self.curr_file().ok().cloned();
        let wd: PathBuf = self.cwd().to_path_buf();

        self.dir_cache.clear();
        self.preview_cache.clear();
        self.get_dirs(&wd);

        if let (Some(curr), Some(dir)) = (curr, self.curr_dir_mut()) {
            dir.push_provisional(FileInfo::clone(&curr));
        }
    }

    /// Re-sort every open directory under the current options.
    pub fn sort(&mut self) {
        let params: SortParams = SortParams::from_options(&self.options);
        let (height, scrolloff) = (self.height, self.options.scrolloff);

        for path in &self.dirs {
            if let Some(dir) = self.dir_cache.get_mut(path) {
                let name: String = dir.name().unwrap_or_default().to_string();
                dir.sort(params.clone());
                dir.sel(&name, height, scrolloff);
            }
        }
    }

    /// Replace the current directory's display filter. Empty patterns are
    /// dropped; any pattern with bad glob syntax rejects the whole update.
    pub fn set_filter(&mut self, patterns: &[String]) -> AppResult<()> {
        let mut filter: Vec<String> = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            validate_pattern(pattern)?;
            if !pattern.is_empty() {
                filter.push(pattern.clone());
            }
        }

        let params: SortParams = SortParams::from_options(&self.options);
        let (height, scrolloff) = (self.height, self.options.scrolloff);
        if let Some(dir) = self.curr_dir_mut() {
            dir.filter = filter;
            let name: String = dir.name().unwrap_or_default().to_string();
            dir.sort(params);
            dir.sel(&name, height, scrolloff);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::controller::event_loop::NavUpdate;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_concurrent_loads_scan_once() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("fresh");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("x"), b"").unwrap();

        let (mut nav, mut events) =
            Navigator::new(&config_in(temp_dir.path()), temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;
        let before = nav.scan_count();

        nav.load_dir(&target);
        nav.load_dir(&target);
        nav.load_dir(&target);

        settle(&mut nav, &mut events, |n| {
            n.cached_dir(&target).is_some_and(|d| !d.loading)
        })
        .await;

        assert_eq!(nav.scan_count() - before, 1);
        assert_eq!(nav.cached_dir(&target).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_option_change_resorts_without_rescan() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), b"").unwrap();
        fs::write(temp_dir.path().join("b"), b"").unwrap();

        let (mut nav, mut events) =
            Navigator::new(&config_in(temp_dir.path()), temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;
        let before = nav.scan_count();

        nav.options.sort.reverse = true;
        let cwd = nav.cwd().to_path_buf();
        nav.check_dir(&cwd);
        assert!(nav.curr_dir().unwrap().loading);
        settle(&mut nav, &mut events, loaded).await;

        let dir = nav.curr_dir().unwrap();
        assert_eq!(dir.files()[0].name, "b");
        assert!(dir.params.sort_type.reverse);
        assert_eq!(nav.scan_count(), before);
    }

    #[tokio::test]
    async fn test_install_keeps_cursor_on_same_name() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let (mut nav, mut events) =
            Navigator::new(&config_in(temp_dir.path()), temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;
        nav.down(1);
        assert_eq!(nav.curr_file().unwrap().name, "b");

        // a new entry sorting before the cursor must not move it off "b"
        let cwd = nav.cwd().to_path_buf();
        fs::write(temp_dir.path().join("0"), b"").unwrap();
        let rescanned = crate::fs::dir_scanner::new_directory(
            &cwd,
            SortParams::from_options(&nav.options),
            Vec::new(),
            false,
        );
        nav.apply(NavUpdate::Directory(rescanned));

        assert_eq!(nav.curr_file().unwrap().name, "b");
        assert_eq!(nav.curr_dir().unwrap().ind, 2);
    }

    #[tokio::test]
    async fn test_set_filter_validates_and_applies() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("main.rs"), b"").unwrap();
        fs::write(temp_dir.path().join("notes.md"), b"").unwrap();

        let (mut nav, mut events) =
            Navigator::new(&config_in(temp_dir.path()), temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;

        assert!(nav.set_filter(&["[bad".to_string()]).is_err());
        assert_eq!(nav.curr_dir().unwrap().len(), 2);

        nav.set_filter(&[".rs".to_string(), String::new()]).unwrap();
        let dir = nav.curr_dir().unwrap();
        assert_eq!(dir.filter, vec![".rs".to_string()]);
        assert_eq!(dir.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_set_during_rescan_survives_install() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.rs", "b.txt", "c.txt"] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let (mut nav, mut events) =
            Navigator::new(&config_in(temp_dir.path()), temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;

        // directory mtimes come from a coarse clock
        tokio::time::sleep(Duration::from_millis(50)).await;
        fs::write(temp_dir.path().join("d.txt"), b"").unwrap();

        let cwd = nav.cwd().to_path_buf();
        nav.check_dir(&cwd);
        assert!(nav.curr_dir().unwrap().loading);

        nav.set_filter(&[".rs".to_string()]).unwrap();
        settle(&mut nav, &mut events, loaded).await;

        let dir = nav.curr_dir().unwrap();
        assert_eq!(dir.filter, vec![".rs".to_string()]);
        let names: Vec<&str> = dir.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.rs"]);
        assert_eq!(dir.all_files().len(), 4);
    }

    #[tokio::test]
    async fn test_filter_set_during_resort_survives_install() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.rs"), b"").unwrap();
        fs::write(temp_dir.path().join("b.txt"), b"").unwrap();

        let (mut nav, mut events) =
            Navigator::new(&config_in(temp_dir.path()), temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;

        nav.options.sort.reverse = true;
        let cwd = nav.cwd().to_path_buf();
        nav.check_dir(&cwd);
        assert!(nav.curr_dir().unwrap().loading);

        nav.set_filter(&[".rs".to_string()]).unwrap();
        settle(&mut nav, &mut events, loaded).await;

        let dir = nav.curr_dir().unwrap();
        assert_eq!(dir.filter, vec![".rs".to_string()]);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.name(), Some("a.rs"));
        assert!(dir.params.sort_type.reverse);
    }

    #[tokio::test]
    async fn test_future_mtime_does_not_rescan() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), b"").unwrap();

        let (mut nav, mut events) =
            Navigator::new(&config_in(temp_dir.path()), temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;
        let before = nav.scan_count();

        let future = SystemTime::now() + Duration::from_secs(3600);
        fs::File::open(temp_dir.path())
            .unwrap()
            .set_times(fs::FileTimes::new().set_modified(future))
            .unwrap();

        let cwd = nav.cwd().to_path_buf();
        nav.check_dir(&cwd);

        assert!(!nav.curr_dir().unwrap().loading);
        assert_eq!(nav.scan_count(), before);
    }

    #[tokio::test]
    async fn test_hidden_exception_stays_visible() {
        let temp_dir = TempDir::new().unwrap();
        for name in [".cache", ".keep", "b"] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let mut config = config_in(temp_dir.path());
        config.options.hiddenfiles = vec![".*".to_string(), "!.keep".to_string()];
        config.options.sort.hidden = false;

        let (mut nav, mut events) = Navigator::new(&config, temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;

        let names: Vec<&str> = nav
            .curr_dir()
            .unwrap()
            .files()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert!(names.contains(&".keep"));
        assert!(names.contains(&"b"));
        assert!(!names.contains(&".cache"));

        nav.options.sort.hidden = true;
        nav.sort();
        assert_eq!(nav.curr_dir().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_renew_prunes_vanished_selections() {
        let temp_dir = TempDir::new().unwrap();
        let keep = temp_dir.path().join("keep");
        let gone = temp_dir.path().join("gone");
        fs::write(&keep, b"").unwrap();
        fs::write(&gone, b"").unwrap();

        let (mut nav, mut events) =
            Navigator::new(&config_in(temp_dir.path()), temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;

        nav.selections.toggle(&keep);
        nav.selections.toggle(&gone);
        fs::remove_file(&gone).unwrap();
        nav.renew();

        assert_eq!(nav.selections.ordered(|_| true), vec![keep]);
    }

    #[tokio::test]
    async fn test_reload_keeps_current_entry_visible() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), b"").unwrap();
        fs::write(temp_dir.path().join("b"), b"").unwrap();

        let (mut nav, mut events) =
            Navigator::new(&config_in(temp_dir.path()), temp_dir.path(), 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;
        nav.down(1);

        nav.reload();
        assert_eq!(nav.curr_file().unwrap().name, "b");

        settle(&mut nav, &mut events, loaded).await;
        assert_eq!(nav.curr_file().unwrap().name, "b");
        assert_eq!(nav.curr_dir().unwrap().len(), 2);
    }
}
