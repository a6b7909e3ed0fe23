//! File preview cache and requests to the preview worker.

use std::{path::Path, sync::Arc, time::SystemTime};

use tracing::debug;

use super::Navigator;
use crate::fs::file_info::FileInfo;
use crate::tasks::preview_task::{Preview, PreviewEnv, PreviewRequest};

impl Navigator {
    /// Selection context exported to previewer and cleaner processes.
    pub fn preview_env(&self) -> PreviewEnv {
        PreviewEnv {
            file: self.curr_file().ok().map(|f| f.path.clone()),
            selections: self.curr_selections(),
            dir: self.cwd().to_path_buf(),
            filesep: self.options.filesep.clone(),
        }
    }

    fn request_preview(&self, path: &Path) {
        let request: PreviewRequest = PreviewRequest::Show {
            path: path.to_path_buf(),
            window: self.window,
            env: self.preview_env(),
        };

        if self.senders.preview_req_tx.send(request).is_err() {
            debug!("preview worker gone, dropping request for {:?}", path);
        }
    }

    /// Cached preview of `path`, scheduling a load when there is none. With
    /// `volatile` set a volatile cached preview is regenerated too.
    pub fn preview(&mut self, path: &Path, volatile: bool) -> Option<&Preview> {
        let reload: bool = match self.preview_cache.lookup(path) {
            None => true,
            Some(prev) => volatile && prev.volatile,
        };

        if reload {
            self.preview_cache
                .insert(path.to_path_buf(), Preview::placeholder(path.to_path_buf()));
            self.request_preview(path);
        } else {
            self.check_preview(path);
        }

        self.preview_cache.get(path)
    }

    /// Reload a cached preview whose file changed since it was generated.
    fn check_preview(&mut self, path: &Path) {
        let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
            return;
        };

        let now: SystemTime = SystemTime::now();

        // some filesystems report modification times in the future
        if modified > now {
            return;
        }

        let stale: bool = match self.preview_cache.get_mut(path) {
            Some(prev) if modified > prev.load_time => {
                prev.load_time = now;
                true
            }
            _ => false,
        };

        if stale {
            self.request_preview(path);
        }
    }

    pub fn cached_preview(&self, path: &Path) -> Option<&Preview> {
        self.preview_cache.get(path)
    }

    /// Tell the worker the preview pane is empty; a volatile preview gets cleaned.
    pub fn clear_preview(&self) {
        let request: PreviewRequest = PreviewRequest::Clear {
            window: self.window,
            env: self.preview_env(),
        };

        let _ = self.senders.preview_req_tx.send(request);
    }

    /// Hand a finished volatile directory preview to the worker, which cleans
    /// it once the pane moves on.
    pub(super) fn track_dir_preview(&self, path: &Path) {
        if !self.dir_cache.get(path).is_some_and(|d| d.volatile && !d.loading) {
            return;
        }

        let request: PreviewRequest = PreviewRequest::Track {
            path: path.to_path_buf(),
            window: self.window,
            env: self.preview_env(),
        };

        if self.senders.preview_req_tx.send(request).is_err() {
            debug!("preview worker gone, not tracking {:?}", path);
        }
    }

    /// Refresh whatever the preview pane shows for the entry under the cursor:
    /// a directory listing for directories, a file preview otherwise. With
    /// `volatile` set a volatile preview of either kind is regenerated.
    pub fn load_file(&mut self, volatile: bool) {
        let curr: Option<Arc<FileInfo>> = self.curr_file().ok().cloned();

        match curr {
            None => self.clear_preview(),
            Some(f) if f.is_dir => {
                let regenerate: bool = volatile
                    && self.dir_cache.get(&f.path).is_some_and(|d| d.volatile && !d.loading);

                if regenerate {
                    self.rescan(&f.path);
                } else {
                    self.load_dir(&f.path);
                    self.track_dir_preview(&f.path);
                }
            }
            Some(f) => {
                self.preview(&f.path, volatile);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::tasks::preview_task::PreviewWindow;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_preview_loads_and_caches() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let file = root.join("notes.txt");
        fs::write(&file, "first\nsecond\n").unwrap();

        let (mut nav, mut events) = Navigator::new(&config_in(temp_dir.path()), &root, 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;
        nav.resize(10, PreviewWindow { width: 40, height: 5, x: 0, y: 0 });

        let first = nav.preview(&file, false).unwrap();
        assert!(first.loading);

        settle(&mut nav, &mut events, |n| {
            n.cached_preview(&file).is_some_and(|p| !p.loading)
        })
        .await;

        let cached = nav.preview(&file, false).unwrap();
        assert!(!cached.loading);
        assert!(!cached.volatile);
        assert_eq!(cached.lines, vec!["first", "second"]);

        // an unchanged, non-volatile preview is not requested again
        let requested = nav.preview_cache.stats();
        nav.preview(&file, true);
        assert_eq!(nav.preview_cache.stats().hits, requested.hits + 1);
        assert!(events.try_next().is_none());
    }

    #[tokio::test]
    async fn test_future_mtime_keeps_cached_preview() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let file = root.join("notes.txt");
        fs::write(&file, "first\n").unwrap();

        let (mut nav, mut events) = Navigator::new(&config_in(temp_dir.path()), &root, 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;
        nav.resize(10, PreviewWindow { width: 40, height: 5, x: 0, y: 0 });

        nav.preview(&file, false);
        settle(&mut nav, &mut events, |n| {
            n.cached_preview(&file).is_some_and(|p| !p.loading)
        })
        .await;
        let load_time = nav.cached_preview(&file).unwrap().load_time;

        let future = SystemTime::now() + Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_times(fs::FileTimes::new().set_modified(future))
            .unwrap();

        let cached = nav.preview(&file, false).unwrap();
        assert!(!cached.loading);
        assert_eq!(cached.load_time, load_time);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events.try_next().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_volatile_directory_preview_is_regenerated_and_cleaned() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let sub = root.join("sub");
        let file = root.join("z.txt");
        fs::create_dir_all(&sub).unwrap();
        fs::write(&file, "z\n").unwrap();

        let previewer = temp_dir.path().join("pv.sh");
        let cleaner = temp_dir.path().join("clean.sh");
        let log = temp_dir.path().join("cleaned.log");
        fs::write(&previewer, "#!/bin/sh\necho \"$1\"\nexit 1\n").unwrap();
        fs::write(&cleaner, format!("#!/bin/sh\necho \"$1\" >> '{}'\n", log.display())).unwrap();
        for script in [&previewer, &cleaner] {
            fs::set_permissions(script, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut config = config_in(temp_dir.path());
        config.options.previewer = Some(previewer);
        config.options.cleaner = Some(cleaner);
        config.options.dirpreviews = true;

        let (mut nav, mut events) = Navigator::new(&config, &root, 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;
        nav.resize(10, PreviewWindow { width: 40, height: 5, x: 0, y: 0 });

        let shown = |n: &Navigator| n.cached_dir(&sub).is_some_and(|d| !d.loading && d.lines.is_some());

        nav.load_file(false);
        settle(&mut nav, &mut events, &shown).await;
        let dir = nav.cached_dir(&sub).unwrap();
        assert!(dir.volatile);
        assert_eq!(dir.lines, Some(vec![sub.display().to_string()]));

        // a volatile listing preview is regenerated on request
        let before = nav.scan_count();
        nav.load_file(true);
        assert!(nav.cached_dir(&sub).unwrap().loading);
        assert_eq!(nav.scan_count(), before + 1);
        settle(&mut nav, &mut events, &shown).await;

        // moving on to a file cleans the directory preview once
        nav.down(1);
        nav.load_file(false);
        settle(&mut nav, &mut events, |n| {
            n.cached_preview(&file).is_some_and(|p| !p.loading)
        })
        .await;

        let cleaned = fs::read_to_string(&log).unwrap();
        assert_eq!(cleaned.lines().collect::<Vec<_>>(), vec![sub.display().to_string()]);
    }

    #[tokio::test]
    async fn test_load_file_on_directory_loads_listing() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir_all(root.join("sub")).unwrap();

        let (mut nav, mut events) = Navigator::new(&config_in(temp_dir.path()), &root, 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;

        nav.load_file(false);
        assert!(nav.cached_dir(&root.join("sub")).is_some());
    }
}
