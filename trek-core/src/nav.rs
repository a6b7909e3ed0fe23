//! src/nav.rs
//! ============================================================================
//! # Navigator: breadcrumbs, caches and the state every command works on
//!
//! The navigator is owned by one foreground task and mutated only through
//! `&mut self`. Anything that touches the filesystem for longer than a stat
//! runs in the background and reports back through the [`EventLoop`]; the
//! foreground feeds each [`NavUpdate`] into [`Navigator::apply`].
//!
//! The breadcrumb stack holds paths, root first. The listings themselves live
//! in the directory cache, which therefore always contains every path on the
//! stack. With `dircache` off, entries outside the stack are dropped.
//!
//! The implementation is split by concern:
//! - `loading`: cache lookups, staleness checks, stack rebuilding
//! - `movement`: cursor movement, directory changes, find and search
//! - `marks`: selections, tags, marks and their persisted files
//! - `bulk`: copy/cut buffer, paste, delete, directory sizes
//! - `preview`: file preview cache and requests

mod bulk;
mod loading;
mod marks;
mod movement;
mod preview;

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info};

use crate::cache::cache_manager::PathCache;
use crate::config::{Config, DataPaths, Options, ServerConfig};
use crate::controller::event_loop::{
    EventLoop, NavEvent, NavSenders, NavUpdate, Notification, ProgressDelta,
};
use crate::controller::remote::{RemoteClient, RemoteCommand};
use crate::error::{AppError, AppResult};
use crate::fs::backend::{FsBackend, LocalFs};
use crate::fs::copy_engine::{CopyEngine, LocalCopyEngine};
use crate::fs::dir_scanner::DirScanner;
use crate::fs::file_info::FileInfo;
use crate::model::directory::Directory;
use crate::model::persistence::BufferMode;
use crate::model::selection::{JumpList, Marks, Selections, Tags};
use crate::model::viewport::ScrollParams;
use crate::tasks::preview_task::{Preview, PreviewWindow, spawn_preview_worker};
use crate::util::humanize::human_readable_size;
use crate::util::paths::clean_path;

/// Running totals of in-flight bulk operations, maintained from signed deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub copy_bytes: i64,
    pub copy_total: i64,
    pub move_count: i64,
    pub move_total: i64,
    pub delete_count: i64,
    pub delete_total: i64,
}

impl Progress {
    /// Apply one delta. A total falling back to zero resets its counter.
    pub fn apply(&mut self, delta: ProgressDelta) {
        match delta {
            ProgressDelta::CopyBytes(n) => self.copy_bytes += n,
            ProgressDelta::CopyTotal(n) => {
                self.copy_total += n;
                if self.copy_total == 0 {
                    self.copy_bytes = 0;
                }
            }
            ProgressDelta::MoveCount(n) => self.move_count += n,
            ProgressDelta::MoveTotal(n) => {
                self.move_total += n;
                if self.move_total == 0 {
                    self.move_count = 0;
                }
            }
            ProgressDelta::DeleteCount(n) => self.delete_count += n,
            ProgressDelta::DeleteTotal(n) => {
                self.delete_total += n;
                if self.delete_total == 0 {
                    self.delete_count = 0;
                }
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.copy_total == 0 && self.move_total == 0 && self.delete_total == 0
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();

        if self.copy_total > 0 {
            let pct: i64 = self.copy_bytes * 100 / self.copy_total;
            parts.push(format!(
                "[copy {pct}% {}/{}]",
                human_readable_size(self.copy_bytes.max(0) as u64),
                human_readable_size(self.copy_total as u64)
            ));
        }
        if self.move_total > 0 {
            parts.push(format!("[move {}/{}]", self.move_count, self.move_total));
        }
        if self.delete_total > 0 {
            parts.push(format!("[delete {}/{}]", self.delete_count, self.delete_total));
        }

        write!(f, "{}", parts.join(" "))
    }
}

pub struct Navigator {
    pub options: Options,

    /// Viewport rows, shared by every directory.
    pub height: usize,

    /// Preview pane geometry handed to the previewer.
    pub window: PreviewWindow,

    dirs: Vec<PathBuf>,
    dir_cache: PathCache<Directory>,
    preview_cache: PathCache<Preview>,

    pub selections: Selections,
    pub tags: Tags,
    pub marks: Marks,

    /// Membership of the last copy/cut buffer.
    pub saves: HashMap<PathBuf, BufferMode>,

    pub jump_list: JumpList,
    pub progress: Progress,

    pub find: String,
    pub find_backward: bool,
    pub search: String,
    pub search_backward: bool,

    paths: DataPaths,
    server: ServerConfig,
    scanner: DirScanner,
    senders: NavSenders,
    copier: Arc<dyn CopyEngine>,
    fs: Arc<dyn FsBackend>,
    remote: Option<RemoteClient>,
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("dirs", &self.dirs)
            .field("height", &self.height)
            .field("cached_dirs", &self.dir_cache.len())
            .field("cached_previews", &self.preview_cache.len())
            .field("selections", &self.selections.len())
            .finish_non_exhaustive()
    }
}

impl Navigator {
    /// Build a navigator showing `start` and the event loop its background
    /// tasks report to. Must be called inside a Tokio runtime.
    pub fn new(config: &Config, start: &Path, height: usize) -> AppResult<(Self, EventLoop)> {
        Self::with_engines(
            config,
            start,
            height,
            Arc::new(LocalCopyEngine),
            Arc::new(LocalFs),
        )
    }

    /// Like [`Navigator::new`] with explicit copy and filesystem collaborators.
    pub fn with_engines(
        config: &Config,
        start: &Path,
        height: usize,
        copier: Arc<dyn CopyEngine>,
        fs: Arc<dyn FsBackend>,
    ) -> AppResult<(Self, EventLoop)> {
        if !start.is_absolute() {
            return Err(AppError::invalid_input(
                "start",
                format!("start directory must be absolute: {}", start.display()),
            ));
        }

        let (senders, preview_requests, event_loop) = EventLoop::channels();

        spawn_preview_worker(
            preview_requests,
            senders.preview_tx.clone(),
            config.options.previewer.clone(),
            config.options.cleaner.clone(),
        );

        let remote: Option<RemoteClient> = if config.server.single_mode {
            None
        } else {
            Some(RemoteClient::new(config.server.socket_path()))
        };

        let mut nav: Self = Self {
            options: config.options.clone(),
            height: height.max(1),
            window: PreviewWindow::default(),
            dirs: Vec::new(),
            dir_cache: PathCache::new("directories"),
            preview_cache: PathCache::new("previews"),
            selections: Selections::new(),
            tags: Tags::default(),
            marks: Marks::new(),
            saves: HashMap::new(),
            jump_list: JumpList::default(),
            progress: Progress::default(),
            find: String::new(),
            find_backward: false,
            search: String::new(),
            search_backward: false,
            paths: config.paths.clone(),
            server: config.server.clone(),
            scanner: DirScanner::new(senders.dir_tx.clone()),
            senders,
            copier,
            fs,
            remote,
        };

        let wd: PathBuf = clean_path(start);
        nav.get_dirs(&wd);
        nav.jump_list.record(&wd);

        info!(
            marker = "NAV_INIT",
            operation_type = "nav_init",
            wd = %wd.display(),
            single_mode = nav.server.single_mode,
            "Navigator started"
        );

        Ok((nav, event_loop))
    }

    /// Path of the current directory.
    pub fn cwd(&self) -> &Path {
        self.dirs.last().map_or(Path::new("/"), PathBuf::as_path)
    }

    /// Breadcrumb stack, root first.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn curr_dir(&self) -> Option<&Directory> {
        self.dirs.last().and_then(|p: &PathBuf| self.dir_cache.get(p))
    }

    fn curr_dir_mut(&mut self) -> Option<&mut Directory> {
        let path: &PathBuf = self.dirs.last()?;
        self.dir_cache.get_mut(path)
    }

    pub fn cached_dir(&self, path: &Path) -> Option<&Directory> {
        self.dir_cache.get(path)
    }

    /// Entry under the cursor.
    pub fn curr_file(&self) -> AppResult<&Arc<FileInfo>> {
        self.curr_dir()
            .and_then(Directory::current)
            .ok_or(AppError::EmptyDirectory)
    }

    /// Number of filesystem scans started so far.
    pub fn scan_count(&self) -> usize {
        self.scanner.scan_count()
    }

    pub fn scroll_params(&self) -> ScrollParams {
        ScrollParams {
            height: self.height,
            scrolloff: self.options.scrolloff,
            wrapscroll: self.options.wrapscroll,
        }
    }

    /// Change the viewport height and preview geometry.
    pub fn resize(&mut self, height: usize, window: PreviewWindow) {
        self.height = height.max(1);
        self.window = window;

        let (height, scrolloff) = (self.height, self.options.scrolloff);
        if let Some(dir) = self.curr_dir_mut() {
            let name: String = dir.name().unwrap_or_default().to_string();
            dir.sel(&name, height, scrolloff);
        }
        self.position();
    }

    /// Install one background result. Notifications are handed back to the
    /// caller for display.
    pub fn apply(&mut self, update: NavUpdate) -> Option<Notification> {
        match update {
            NavUpdate::Directory(dir) => {
                self.install_dir(dir);
                None
            }
            NavUpdate::Preview(preview) => {
                debug!(
                    marker = "PREVIEW_INSTALL",
                    operation_type = "preview",
                    path = %preview.path.display(),
                    lines = preview.lines.len(),
                    volatile = preview.volatile,
                    "Preview result installed"
                );
                self.preview_cache.insert(preview.path.clone(), preview);
                None
            }
            NavUpdate::Progress(delta) => {
                self.progress.apply(delta);
                None
            }
            NavUpdate::Event(NavEvent::Notify(notification)) => Some(notification),
            NavUpdate::Event(NavEvent::Renew) => {
                self.renew();
                self.load_file(true);
                None
            }
        }
    }

    /// Announce this session to the server. A no-op in single mode.
    pub async fn connect(&self) -> AppResult<()> {
        if let Some(remote) = &self.remote {
            remote.send(RemoteCommand::Conn(self.server.client_id)).await?;
        }

        Ok(())
    }

    /// Flush marks and tags and leave the server.
    pub async fn shutdown(&self) -> AppResult<()> {
        let marks: AppResult<()> = self.write_marks().await;
        let tags: AppResult<()> = self.write_tags().await;

        if let Some(remote) = &self.remote {
            remote.send(RemoteCommand::Drop(self.server.client_id)).await?;
            if self.server.autoquit {
                remote.send(RemoteCommand::Quit).await?;
            }
        }

        info!(
            marker = "NAV_SHUTDOWN",
            operation_type = "nav_shutdown",
            "Navigator state flushed"
        );

        marks.and(tags)
    }

    /// Ask other sessions to re-read marks, tags and the copy buffer.
    async fn broadcast_sync(&self) -> AppResult<()> {
        match &self.remote {
            Some(remote) => remote.send(RemoteCommand::SendSync).await.map(|_| ()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    pub fn config_in(dir: &Path) -> Config {
        let mut config: Config = Config::default();
        config.paths = DataPaths::in_dir(&dir.join("data"));
        config.options.hiddenfiles = Vec::new();
        config
    }

    /// Apply updates until `done` holds or a second passes.
    pub async fn settle(
        nav: &mut Navigator,
        events: &mut EventLoop,
        done: impl Fn(&Navigator) -> bool,
    ) -> Vec<Notification> {
        let mut notes: Vec<Notification> = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);

        while !done(nav) {
            match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(Some(update)) => notes.extend(nav.apply(update)),
                _ => break,
            }
        }

        notes
    }

    pub fn loaded(nav: &Navigator) -> bool {
        nav.dirs()
            .iter()
            .all(|p| nav.cached_dir(p).is_some_and(|d| !d.loading))
    }
}
