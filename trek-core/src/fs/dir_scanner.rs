//! ``src/fs/dir_scanner.rs``
//!
//! # `Directory Scanner`: background listing loads and re-sorts
//!
//! Scans run on the blocking pool and publish finished `Directory` values on
//! a channel. They never touch the navigator's cache; the consumer installs
//! results. Every filesystem scan bumps a shared counter so callers can
//! observe how many reads actually happened.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Instant, SystemTime},
};

use tokio::sync::mpsc::UnboundedSender;
use tokio::task as TokioScheduler;
use tracing::{Instrument, debug, info, info_span};

use crate::fs::file_info::FileInfo;
use crate::model::directory::Directory;
use crate::model::sort::SortParams;
use crate::tasks::preview_task::{PreviewEnv, PreviewWindow, run_previewer};

/// Read every entry of `path`. Entries that vanish mid-scan are skipped, other
/// per-entry failures are logged and skipped. The error opening the directory
/// itself is returned alongside whatever was read.
pub fn read_dir_entries(path: &Path, dircounts: bool) -> (Vec<Arc<FileInfo>>, Option<io::Error>) {
    let read_dir: fs::ReadDir = match fs::read_dir(path) {
        Ok(rd) => rd,
        Err(e) => return (Vec::new(), Some(e)),
    };

    let mut files: Vec<Arc<FileInfo>> = Vec::new();
    for entry in read_dir {
        let entry: fs::DirEntry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                info!("reading directory entry in {:?}: {}", path, e);
                continue;
            }
        };

        let entry_path: PathBuf = entry.path();
        match FileInfo::from_path(&entry_path, dircounts) {
            Ok(info) => files.push(Arc::new(info)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => info!("getting file information of {:?}: {}", entry_path, e),
        }
    }

    (files, None)
}

/// Scan and sort `path` into a finished listing.
pub fn new_directory(path: &Path, params: SortParams, filter: Vec<String>, dircounts: bool) -> Directory {
    let load_time: SystemTime = SystemTime::now();
    let (files, err) = read_dir_entries(path, dircounts);

    let mut dir: Directory = Directory::from_entries(path.to_path_buf(), files, load_time);
    dir.no_perm = err
        .as_ref()
        .is_some_and(|e: &io::Error| e.kind() == io::ErrorKind::PermissionDenied);
    if let Some(e) = err {
        info!("reading directory {:?}: {}", path, e);
    }

    dir.filter = filter;
    dir.sort(params);

    dir
}

/// What to run on a finished scan when directory previews are enabled.
#[derive(Debug, Clone)]
pub struct DirPreviewJob {
    pub previewer: PathBuf,
    pub window: PreviewWindow,
    pub env: PreviewEnv,
}

#[derive(Debug, Clone)]
pub struct DirScanner {
    scans: Arc<AtomicUsize>,
    dir_tx: UnboundedSender<Directory>,
}

impl DirScanner {
    pub fn new(dir_tx: UnboundedSender<Directory>) -> Self {
        Self {
            scans: Arc::new(AtomicUsize::new(0)),
            dir_tx,
        }
    }

    /// Filesystem scans started so far.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Read `path` in the background and publish the sorted listing.
    ///
    /// With a preview job the listing is published once as soon as it is
    /// sorted (still loading) and again with its preview lines filled in.
    pub fn spawn_scan(
        &self,
        path: PathBuf,
        params: SortParams,
        filter: Vec<String>,
        dircounts: bool,
        preview: Option<DirPreviewJob>,
    ) {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let dir_tx: UnboundedSender<Directory> = self.dir_tx.clone();
        let span = info_span!("dir_scan", operation_type = "scan_dir", path = %path.display());

        tokio::spawn(
            async move {
                let start: Instant = Instant::now();
                let scan_path: PathBuf = path.clone();

                let scanned = TokioScheduler::spawn_blocking(move || {
                    new_directory(&scan_path, params, filter, dircounts)
                })
                .await;

                let mut dir: Directory = match scanned {
                    Ok(dir) => dir,
                    Err(e) => {
                        info!("scanning {:?} failed: {}", path, e);
                        return;
                    }
                };

                info!(
                    marker = "PERF_DIRECTORY_SCAN",
                    operation_type = "scan_dir",
                    entries = dir.all_files().len(),
                    no_perm = dir.no_perm,
                    duration_ms = start.elapsed().as_millis(),
                    "Directory scan completed"
                );

                let Some(job) = preview else {
                    let _ = dir_tx.send(dir);
                    return;
                };

                dir.loading = true;
                let _ = dir_tx.send(dir.clone());

                match run_previewer(&job.previewer, &path, job.window, &job.env).await {
                    Ok(out) => {
                        dir.lines = Some(out.lines);
                        dir.volatile = out.volatile;
                    }
                    Err(e) => info!("previewing dir: {}", e),
                }
                dir.loading = false;
                let _ = dir_tx.send(dir);
            }
            .instrument(span),
        );
    }

    /// Re-sort an already loaded listing under new parameters without reading disk.
    pub fn spawn_resort(&self, mut dir: Directory, params: SortParams) {
        let dir_tx: UnboundedSender<Directory> = self.dir_tx.clone();

        debug!(
            marker = "DIR_RESORT",
            operation_type = "resort",
            path = %dir.path.display(),
            "Re-sorting listing under changed parameters"
        );

        TokioScheduler::spawn_blocking(move || {
            dir.sort(params);
            dir.loading = false;
            let _ = dir_tx.send(dir);
        });
    }
}
