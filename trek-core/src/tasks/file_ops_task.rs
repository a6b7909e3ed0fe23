//! ``src/tasks/file_ops_task.rs``
//! ============================================================================
//! # File Operations Task: bulk copy, move and delete in the background
//!
//! One task per invocation, never one per file. Per-item failures are counted
//! and reported as numbered error notifications while the remaining items
//! carry on. Progress totals are published as signed deltas and always
//! retracted at the end, however many items failed. When the operation
//! finishes the task asks for a refresh: locally in single-session mode, or
//! through the session server otherwise.

use std::{
    fmt,
    fs::Metadata,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use tokio::sync::mpsc::{Sender, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};

use crate::controller::event_loop::{NavEvent, Notification, ProgressDelta};
use crate::controller::remote::{RemoteClient, RemoteCommand};
use crate::error::AppError;
use crate::fs::backend::{FsBackend, free_destination, same_file};
use crate::fs::copy_engine::{CopyEngine, CopyEvent, CopyStreams};
use crate::tasks::size_task::total_size;

/// Types of bulk operations supported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOperation {
    Copy { srcs: Vec<PathBuf>, dst_dir: PathBuf },
    Move { srcs: Vec<PathBuf>, dst_dir: PathBuf },
    Delete { paths: Vec<PathBuf> },
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ret_str: &'static str = match self {
            Self::Copy { .. } => "copy",
            Self::Move { .. } => "move",
            Self::Delete { .. } => "delete",
        };

        write!(f, "{ret_str}")
    }
}

/// Channels and collaborators a bulk operation works through.
#[derive(Debug, Clone)]
pub struct BulkContext {
    pub progress_tx: Sender<ProgressDelta>,
    pub event_tx: UnboundedSender<NavEvent>,
    pub copier: Arc<dyn CopyEngine>,
    pub fs: Arc<dyn FsBackend>,

    /// Session server to notify; `None` in single-session mode.
    pub remote: Option<RemoteClient>,
}

/// Outcome of a finished operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkReport {
    /// Numbered per-item errors reported.
    pub errors: usize,

    /// The operation stopped before touching any item.
    pub aborted: bool,
}

/// Numbers per-item errors and forwards them as notifications.
struct ErrorLog<'a> {
    event_tx: &'a UnboundedSender<NavEvent>,
    count: usize,
}

impl ErrorLog<'_> {
    fn numbered(&mut self, err: impl fmt::Display) {
        self.count += 1;
        let _ = self.event_tx.send(NavEvent::Notify(Notification::error(format!(
            "[{}] {err}",
            self.count
        ))));
    }

    fn plain(&self, err: impl fmt::Display) {
        let _ = self
            .event_tx
            .send(NavEvent::Notify(Notification::error(err.to_string())));
    }
}

#[derive(Debug)]
pub struct BulkOperationTask {
    pub operation_id: String,
    pub operation: BulkOperation,
    ctx: BulkContext,
}

impl BulkOperationTask {
    /// Create new bulk operation task with unique ID
    pub fn new(operation: BulkOperation, ctx: BulkContext) -> Self {
        Self {
            operation_id: nanoid::nanoid!(),
            operation,
            ctx,
        }
    }

    pub fn spawn(self) -> JoinHandle<BulkReport> {
        let span = info_span!(
            "bulk_operation",
            operation_id = %self.operation_id,
            operation_type = %self.operation
        );

        tokio::spawn(async move { self.execute().await }.instrument(span))
    }

    pub async fn execute(&self) -> BulkReport {
        let start: Instant = Instant::now();
        let mut log: ErrorLog<'_> = ErrorLog {
            event_tx: &self.ctx.event_tx,
            count: 0,
        };

        info!(
            marker = "BULK_OP",
            operation_type = "bulk_start",
            operation = %self.operation,
            "Bulk operation started"
        );

        let completed: bool = match &self.operation {
            BulkOperation::Copy { srcs, dst_dir } => self.copy(srcs, dst_dir, &mut log).await,
            BulkOperation::Move { srcs, dst_dir } => self.move_all(srcs, dst_dir, &mut log).await,
            BulkOperation::Delete { paths } => {
                self.delete(paths, &mut log).await;
                true
            }
        };

        if completed {
            self.refresh(&mut log).await;

            if log.count == 0 {
                let done: Option<&str> = match self.operation {
                    BulkOperation::Copy { .. } => Some("Copied successfully"),
                    BulkOperation::Move { .. } => Some("Moved successfully"),
                    BulkOperation::Delete { .. } => None,
                };
                if let Some(msg) = done {
                    let _ = self.ctx.event_tx.send(NavEvent::Notify(Notification::info(msg)));
                }
            }
        }

        info!(
            marker = "BULK_OP",
            operation_type = "bulk_finish",
            operation = %self.operation,
            errors = log.count,
            aborted = !completed,
            duration_ms = start.elapsed().as_millis(),
            "Bulk operation finished"
        );

        BulkReport {
            errors: log.count,
            aborted: !completed,
        }
    }

    async fn progress(&self, delta: ProgressDelta) {
        // a closed channel only means nobody is displaying progress
        let _ = self.ctx.progress_tx.send(delta).await;
    }

    /// The destination must exist; anything else is left to the per-item steps.
    async fn check_destination(&self, dst_dir: &Path, log: &ErrorLog<'_>) -> bool {
        match self.ctx.fs.stat(dst_dir).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log.plain(AppError::FsMetadata {
                    path: dst_dir.to_path_buf(),
                    source: e,
                });
                false
            }
            _ => true,
        }
    }

    async fn pump_copy(&self, mut streams: CopyStreams, log: &mut ErrorLog<'_>) {
        while let Some(event) = streams.next().await {
            match event {
                CopyEvent::Bytes(n) => self.progress(ProgressDelta::CopyBytes(as_delta(n))).await,
                CopyEvent::Error(e) => log.numbered(e),
            }
        }
    }

    async fn copy(&self, srcs: &[PathBuf], dst_dir: &Path, log: &mut ErrorLog<'_>) -> bool {
        if !self.check_destination(dst_dir, log).await {
            return false;
        }

        let total: u64 = match total_size(srcs.to_vec()).await {
            Ok(total) => total,
            Err(e) => {
                log.plain(e);
                return false;
            }
        };

        self.progress(ProgressDelta::CopyTotal(as_delta(total))).await;

        let streams: CopyStreams = self.ctx.copier.copy(srcs.to_vec(), dst_dir.to_path_buf());
        self.pump_copy(streams, log).await;

        self.progress(ProgressDelta::CopyTotal(-as_delta(total))).await;

        true
    }

    async fn move_all(&self, srcs: &[PathBuf], dst_dir: &Path, log: &mut ErrorLog<'_>) -> bool {
        if !self.check_destination(dst_dir, log).await {
            return false;
        }

        let n: i64 = as_delta(srcs.len() as u64);
        self.progress(ProgressDelta::MoveTotal(n)).await;

        for src in srcs {
            self.progress(ProgressDelta::MoveCount(1)).await;
            self.move_one(src, dst_dir, log).await;
        }

        self.progress(ProgressDelta::MoveTotal(-n)).await;

        true
    }

    async fn move_one(&self, src: &Path, dst_dir: &Path, log: &mut ErrorLog<'_>) {
        let fs: &dyn FsBackend = &*self.ctx.fs;

        let src_meta: Metadata = match fs.lstat(src).await {
            Ok(m) => m,
            Err(e) => {
                log.numbered(AppError::from_io_at(src, e));
                return;
            }
        };

        let Some(name) = src.file_name() else {
            log.numbered(AppError::file_operation_failed("move", src, "cannot move a filesystem root"));
            return;
        };

        let mut dst: PathBuf = dst_dir.join(name);
        match fs.stat(&dst).await {
            Ok(dst_meta) if same_file(&src_meta, &dst_meta) => {
                log.numbered(AppError::SelfMove {
                    src: src.to_path_buf(),
                    dst,
                });
                return;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            _ => dst = free_destination(fs, &dst).await,
        }

        match fs.rename(src, &dst).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                self.move_across_devices(src, dst_dir, log).await;
            }
            Err(e) => log.numbered(AppError::file_operation_failed(
                "rename",
                src,
                e.to_string(),
            )),
        }
    }

    /// Copy then delete; the source stays unless the copy reported no errors.
    async fn move_across_devices(&self, src: &Path, dst_dir: &Path, log: &mut ErrorLog<'_>) {
        let total: u64 = match total_size(vec![src.to_path_buf()]).await {
            Ok(total) => total,
            Err(e) => {
                log.plain(e);
                return;
            }
        };

        info!(
            marker = "BULK_OP",
            operation_type = "move_cross_device",
            src = %src.display(),
            bytes = total,
            "Rename crossed devices, falling back to copy"
        );

        self.progress(ProgressDelta::CopyTotal(as_delta(total))).await;

        let before: usize = log.count;
        let streams: CopyStreams = self
            .ctx
            .copier
            .copy(vec![src.to_path_buf()], dst_dir.to_path_buf());
        self.pump_copy(streams, log).await;

        self.progress(ProgressDelta::CopyTotal(-as_delta(total))).await;

        if log.count == before {
            if let Err(e) = self.ctx.fs.remove_all(src).await {
                log.numbered(AppError::file_operation_failed("remove", src, e.to_string()));
            }
        } else {
            warn!(
                marker = "BULK_OP",
                operation_type = "move_cross_device",
                src = %src.display(),
                "Copy reported errors, source kept"
            );
        }
    }

    async fn delete(&self, paths: &[PathBuf], log: &mut ErrorLog<'_>) {
        let n: i64 = as_delta(paths.len() as u64);
        self.progress(ProgressDelta::DeleteTotal(n)).await;

        for path in paths {
            self.progress(ProgressDelta::DeleteCount(1)).await;

            if let Err(e) = self.ctx.fs.remove_all(path).await {
                log.numbered(AppError::file_operation_failed("delete", path, e.to_string()));
            }
        }

        self.progress(ProgressDelta::DeleteTotal(-n)).await;
    }

    async fn refresh(&self, log: &mut ErrorLog<'_>) {
        match &self.ctx.remote {
            None => {
                let _ = self.ctx.event_tx.send(NavEvent::Renew);
            }
            Some(remote) => {
                if let Err(e) = remote.send(RemoteCommand::SendLoad).await {
                    log.numbered(e);
                }
            }
        }
    }
}

fn as_delta(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::backend::LocalFs;
    use crate::fs::copy_engine::LocalCopyEngine;
    use async_trait::async_trait;
    use std::io;
    use tempfile::TempDir;
    use tokio::fs as TokioFs;
    use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver};

    /// Local filesystem whose renames always cross devices.
    #[derive(Debug)]
    struct CrossDeviceFs;

    #[async_trait]
    impl FsBackend for CrossDeviceFs {
        async fn lstat(&self, path: &Path) -> io::Result<Metadata> {
            LocalFs.lstat(path).await
        }

        async fn stat(&self, path: &Path) -> io::Result<Metadata> {
            LocalFs.stat(path).await
        }

        async fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
            Err(io::Error::from(ErrorKind::CrossesDevices))
        }

        async fn remove_all(&self, path: &Path) -> io::Result<()> {
            LocalFs.remove_all(path).await
        }
    }

    /// Copy engine that writes nothing and reports one error.
    #[derive(Debug)]
    struct FailingCopier;

    impl CopyEngine for FailingCopier {
        fn copy(&self, srcs: Vec<PathBuf>, _dst_dir: PathBuf) -> CopyStreams {
            let (_progress_tx, progress_rx) = mpsc::channel(1);
            let (error_tx, error_rx) = mpsc::unbounded_channel();
            for src in srcs {
                let _ = error_tx.send(AppError::file_operation_failed("copy", src, "disk full"));
            }
            CopyStreams::new(progress_rx, error_rx)
        }
    }

    struct Harness {
        ctx: BulkContext,
        progress_rx: Receiver<ProgressDelta>,
        event_rx: UnboundedReceiver<NavEvent>,
    }

    fn harness(fs: Arc<dyn FsBackend>, copier: Arc<dyn CopyEngine>) -> Harness {
        let (progress_tx, progress_rx) = mpsc::channel(1024);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Harness {
            ctx: BulkContext {
                progress_tx,
                event_tx,
                copier,
                fs,
                remote: None,
            },
            progress_rx,
            event_rx,
        }
    }

    fn events(rx: &mut UnboundedReceiver<NavEvent>) -> Vec<NavEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn test_move_collision_suffixes() {
        let temp_dir = TempDir::new().unwrap();
        let src_dir = temp_dir.path().join("src");
        let dst_dir = temp_dir.path().join("dst");
        TokioFs::create_dir_all(&src_dir).await.unwrap();
        TokioFs::create_dir_all(&dst_dir).await.unwrap();
        TokioFs::write(dst_dir.join("name"), b"existing").await.unwrap();

        let mut h = harness(Arc::new(LocalFs), Arc::new(LocalCopyEngine));

        for round in 1..=2 {
            let src = src_dir.join("name");
            TokioFs::write(&src, format!("round {round}")).await.unwrap();

            let task = BulkOperationTask::new(
                BulkOperation::Move {
                    srcs: vec![src.clone()],
                    dst_dir: dst_dir.clone(),
                },
                h.ctx.clone(),
            );
            let report = task.execute().await;
            assert_eq!(report.errors, 0);
            assert!(!src.exists());
        }

        assert_eq!(TokioFs::read(dst_dir.join("name")).await.unwrap(), b"existing");
        assert_eq!(TokioFs::read(dst_dir.join("name.~1~")).await.unwrap(), b"round 1");
        assert_eq!(TokioFs::read(dst_dir.join("name.~2~")).await.unwrap(), b"round 2");

        let seen = events(&mut h.event_rx);
        assert!(seen.contains(&NavEvent::Renew));
        assert!(seen.contains(&NavEvent::Notify(Notification::info("Moved successfully"))));
    }

    #[tokio::test]
    async fn test_move_onto_itself_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("same");
        TokioFs::write(&file, b"x").await.unwrap();

        let mut h = harness(Arc::new(LocalFs), Arc::new(LocalCopyEngine));
        let report = BulkOperationTask::new(
            BulkOperation::Move {
                srcs: vec![file.clone()],
                dst_dir: temp_dir.path().to_path_buf(),
            },
            h.ctx.clone(),
        )
        .execute()
        .await;

        assert_eq!(report.errors, 1);
        assert!(file.exists());
        match events(&mut h.event_rx).first() {
            Some(NavEvent::Notify(n)) => {
                assert!(n.message.starts_with("[1] rename"), "{}", n.message);
                assert!(n.message.contains("same file"));
            }
            other => panic!("expected numbered error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cross_device_move_copies_then_removes() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("payload");
        let dst_dir = temp_dir.path().join("other");
        TokioFs::create_dir_all(src.join("inner")).await.unwrap();
        TokioFs::write(src.join("inner/data"), b"bytes").await.unwrap();
        TokioFs::create_dir_all(&dst_dir).await.unwrap();

        let mut h = harness(Arc::new(CrossDeviceFs), Arc::new(LocalCopyEngine));
        let report = BulkOperationTask::new(
            BulkOperation::Move {
                srcs: vec![src.clone()],
                dst_dir: dst_dir.clone(),
            },
            h.ctx.clone(),
        )
        .execute()
        .await;

        assert_eq!(report.errors, 0);
        assert!(!src.exists());
        assert_eq!(
            TokioFs::read(dst_dir.join("payload/inner/data")).await.unwrap(),
            b"bytes"
        );

        let mut copy_total: i64 = 0;
        let mut copied: i64 = 0;
        while let Ok(delta) = h.progress_rx.try_recv() {
            match delta {
                ProgressDelta::CopyTotal(n) => copy_total += n,
                ProgressDelta::CopyBytes(n) => copied += n,
                _ => {}
            }
        }
        assert_eq!(copy_total, 0);
        assert_eq!(copied, 5);
    }

    #[tokio::test]
    async fn test_cross_device_move_keeps_source_on_copy_error() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("precious");
        let dst_dir = temp_dir.path().join("other");
        TokioFs::write(&src, b"keep me").await.unwrap();
        TokioFs::create_dir_all(&dst_dir).await.unwrap();

        let mut h = harness(Arc::new(CrossDeviceFs), Arc::new(FailingCopier));
        let report = BulkOperationTask::new(
            BulkOperation::Move {
                srcs: vec![src.clone()],
                dst_dir,
            },
            h.ctx.clone(),
        )
        .execute()
        .await;

        assert_eq!(report.errors, 1);
        assert!(src.exists());
        let seen = events(&mut h.event_rx);
        assert!(!seen.contains(&NavEvent::Notify(Notification::info("Moved successfully"))));
    }

    #[tokio::test]
    async fn test_delete_progress_and_missing_paths() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present");
        TokioFs::write(&present, b"x").await.unwrap();

        let mut h = harness(Arc::new(LocalFs), Arc::new(LocalCopyEngine));
        let report = BulkOperationTask::new(
            BulkOperation::Delete {
                paths: vec![present.clone(), temp_dir.path().join("absent")],
            },
            h.ctx.clone(),
        )
        .execute()
        .await;

        assert_eq!(report, BulkReport::default());
        assert!(!present.exists());

        let mut deltas = Vec::new();
        while let Ok(d) = h.progress_rx.try_recv() {
            deltas.push(d);
        }
        assert_eq!(
            deltas,
            vec![
                ProgressDelta::DeleteTotal(2),
                ProgressDelta::DeleteCount(1),
                ProgressDelta::DeleteCount(1),
                ProgressDelta::DeleteTotal(-2),
            ]
        );
    }

    #[tokio::test]
    async fn test_copy_to_missing_destination_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("f");
        TokioFs::write(&src, b"x").await.unwrap();

        let mut h = harness(Arc::new(LocalFs), Arc::new(LocalCopyEngine));
        let report = BulkOperationTask::new(
            BulkOperation::Copy {
                srcs: vec![src],
                dst_dir: temp_dir.path().join("nowhere"),
            },
            h.ctx.clone(),
        )
        .spawn()
        .await
        .unwrap();

        assert!(report.aborted);
        assert!(h.progress_rx.try_recv().is_err());
        let seen = events(&mut h.event_rx);
        assert_eq!(seen.len(), 1);
        assert!(!seen.contains(&NavEvent::Renew));
    }
}
