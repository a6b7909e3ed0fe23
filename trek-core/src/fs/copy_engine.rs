//! ``src/fs/copy_engine.rs``
//! ============================================================================
//! # Copy Engine: streaming recursive copy with progress and error streams
//!
//! `copy(srcs, dst_dir)` returns immediately with two receivers: byte counts
//! per written chunk, and per-item errors. A failing entry never stops the
//! rest of the copy. Both streams close when the copy is finished.

use std::{
    fmt::Debug,
    fs::Metadata,
    io,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use bytes::BytesMut;
use tokio::fs as TokioFs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{
    Mutex, MutexGuard,
    mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender},
};
use tracing::{Instrument, debug, info_span};

use crate::error::AppError;
use crate::fs::backend::{LocalFs, free_destination};

const BUFFER_SIZE: usize = 64 * 1024;
const PROGRESS_CAPACITY: usize = 1024;

/// Global buffer pool so concurrent copies reuse their chunk buffers
static BUFFER_POOL: OnceLock<BufferPool> = OnceLock::new();

struct BufferPool {
    buffers: Arc<Mutex<Vec<BytesMut>>>,
}

impl BufferPool {
    fn new() -> Self {
        Self {
            buffers: Arc::new(Mutex::new(Vec::with_capacity(8))),
        }
    }

    async fn get_buffer(&self) -> BytesMut {
        let mut buffers: MutexGuard<'_, Vec<BytesMut>> = self.buffers.lock().await;

        buffers
            .pop()
            .unwrap_or_else(|| -> BytesMut { BytesMut::with_capacity(BUFFER_SIZE) })
    }

    async fn return_buffer(&self, mut buffer: BytesMut) {
        buffer.clear();
        if buffer.capacity() >= BUFFER_SIZE {
            let mut buffers: MutexGuard<'_, Vec<BytesMut>> = self.buffers.lock().await;
            if buffers.len() < 8 {
                buffers.push(buffer);
            }
        }
    }

    fn global() -> &'static Self {
        BUFFER_POOL.get_or_init(Self::new)
    }
}

/// One item pulled from a running copy.
#[derive(Debug)]
pub enum CopyEvent {
    Bytes(u64),
    Error(AppError),
}

/// Receivers handed back by a started copy.
#[derive(Debug)]
pub struct CopyStreams {
    progress: Receiver<u64>,
    errors: UnboundedReceiver<AppError>,
    progress_open: bool,
    errors_open: bool,
}

impl CopyStreams {
    pub fn new(progress: Receiver<u64>, errors: UnboundedReceiver<AppError>) -> Self {
        Self {
            progress,
            errors,
            progress_open: true,
            errors_open: true,
        }
    }

    /// Next byte count or error; `None` once both streams have closed.
    pub async fn next(&mut self) -> Option<CopyEvent> {
        while self.progress_open || self.errors_open {
            tokio::select! {
                n = self.progress.recv(), if self.progress_open => match n {
                    Some(n) => return Some(CopyEvent::Bytes(n)),
                    None => self.progress_open = false,
                },
                e = self.errors.recv(), if self.errors_open => match e {
                    Some(e) => return Some(CopyEvent::Error(e)),
                    None => self.errors_open = false,
                },
            }
        }

        None
    }
}

pub trait CopyEngine: Send + Sync + Debug {
    /// Start copying each of `srcs` into `dst_dir`.
    fn copy(&self, srcs: Vec<PathBuf>, dst_dir: PathBuf) -> CopyStreams;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCopyEngine;

impl CopyEngine for LocalCopyEngine {
    fn copy(&self, srcs: Vec<PathBuf>, dst_dir: PathBuf) -> CopyStreams {
        let (progress_tx, progress_rx): (Sender<u64>, Receiver<u64>) =
            mpsc::channel(PROGRESS_CAPACITY);
        let (error_tx, error_rx): (UnboundedSender<AppError>, UnboundedReceiver<AppError>) =
            mpsc::unbounded_channel();

        let span = info_span!(
            "copy_engine",
            operation_type = "copy",
            sources = srcs.len(),
            dst = %dst_dir.display()
        );

        tokio::spawn(
            async move {
                for src in srcs {
                    copy_one(&src, &dst_dir, &progress_tx, &error_tx).await;
                }
            }
            .instrument(span),
        );

        CopyStreams::new(progress_rx, error_rx)
    }
}

fn copy_error(path: &Path, e: impl ToString) -> AppError {
    AppError::file_operation_failed("copy", path, e.to_string())
}

async fn copy_one(
    src: &Path,
    dst_dir: &Path,
    progress_tx: &Sender<u64>,
    error_tx: &UnboundedSender<AppError>,
) {
    let Some(name) = src.file_name() else {
        let _ = error_tx.send(copy_error(src, "cannot copy a filesystem root"));
        return;
    };

    if dst_dir.starts_with(src) {
        let _ = error_tx.send(copy_error(src, "cannot copy a directory into itself"));
        return;
    }

    let dst_root: PathBuf = free_destination(&LocalFs, &dst_dir.join(name)).await;

    debug!(
        marker = "COPY_ENGINE",
        operation_type = "copy_item",
        src = %src.display(),
        dst = %dst_root.display(),
        "Copying entry"
    );

    let mut stack: Vec<(PathBuf, PathBuf)> = vec![(src.to_path_buf(), dst_root)];

    while let Some((from, to)) = stack.pop() {
        let meta: Metadata = match TokioFs::symlink_metadata(&from).await {
            Ok(m) => m,
            Err(e) => {
                let _ = error_tx.send(copy_error(&from, e));
                continue;
            }
        };

        let result: io::Result<()> = if meta.file_type().is_symlink() {
            copy_symlink(&from, &to).await
        } else if meta.is_dir() {
            match copy_dir_shell(&from, &to, &meta).await {
                Ok(children) => {
                    stack.extend(children);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else {
            copy_file(&from, &to, &meta, progress_tx).await
        };

        if let Err(e) = result {
            let _ = error_tx.send(copy_error(&from, e));
        }
    }
}

/// Create `to` with `from`'s permissions and list the child pairs to copy.
async fn copy_dir_shell(
    from: &Path,
    to: &Path,
    meta: &Metadata,
) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    TokioFs::create_dir_all(to).await?;
    TokioFs::set_permissions(to, meta.permissions()).await?;

    let mut children: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut entries: TokioFs::ReadDir = TokioFs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        children.push((from.join(&name), to.join(&name)));
    }

    Ok(children)
}

#[cfg(unix)]
async fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target: PathBuf = TokioFs::read_link(from).await?;
    TokioFs::symlink(target, to).await
}

#[cfg(not(unix))]
async fn copy_symlink(from: &Path, _to: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot copy symlink {}", from.display()),
    ))
}

/// Streaming copy through a pooled buffer, reporting each written chunk.
async fn copy_file(
    from: &Path,
    to: &Path,
    meta: &Metadata,
    progress_tx: &Sender<u64>,
) -> io::Result<()> {
    let mut src_file: TokioFs::File = TokioFs::File::open(from).await?;
    let mut dst_file: TokioFs::File = TokioFs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(to)
        .await?;

    let pool: &'static BufferPool = BufferPool::global();
    let mut buffer: BytesMut = pool.get_buffer().await;
    buffer.resize(BUFFER_SIZE, 0);

    let result: io::Result<()> = async {
        loop {
            let bytes_read: usize = src_file.read(&mut buffer[..]).await?;
            if bytes_read == 0 {
                break;
            }

            dst_file.write_all(&buffer[..bytes_read]).await?;

            // A dropped receiver only means nobody is watching progress.
            let _ = progress_tx.send(bytes_read as u64).await;
        }

        dst_file.flush().await
    }
    .await;

    pool.return_buffer(buffer).await;
    result?;

    TokioFs::set_permissions(to, meta.permissions()).await
}
