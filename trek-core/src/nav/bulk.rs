//! Copy/cut buffer, paste, delete and directory sizes.

use std::{path::PathBuf, sync::Arc};

use tokio::task::JoinHandle;
use tracing::info;

use super::Navigator;
use crate::error::{AppError, AppResult};
use crate::fs::file_info::FileInfo;
use crate::model::persistence::{self, BufferMode, CopyBuffer};
use crate::tasks::file_ops_task::{BulkContext, BulkOperation, BulkOperationTask, BulkReport};
use crate::tasks::size_task::total_size;
use crate::util::paths::base_name;

impl Navigator {
    fn bulk_context(&self) -> BulkContext {
        BulkContext {
            progress_tx: self.senders.progress_tx.clone(),
            event_tx: self.senders.event_tx.clone(),
            copier: Arc::clone(&self.copier),
            fs: Arc::clone(&self.fs),
            remote: self.remote.clone(),
        }
    }

    fn spawn_bulk(&self, operation: BulkOperation) -> JoinHandle<BulkReport> {
        let task: BulkOperationTask = BulkOperationTask::new(operation, self.bulk_context());

        info!(
            marker = "BULK_OP",
            operation_type = "bulk_spawn",
            operation_id = %task.operation_id,
            operation = %task.operation,
            "Spawning bulk operation"
        );

        task.spawn()
    }

    /// Put the current entry or the selection into the copy/cut buffer.
    pub async fn save(&mut self, mode: BufferMode) -> AppResult<()> {
        let list: Vec<PathBuf> = self.curr_file_or_selections()?;
        persistence::write_copy_buffer(&self.paths.files, &list, mode).await?;

        self.saves = list.into_iter().map(|p: PathBuf| (p, mode)).collect();

        Ok(())
    }

    /// Copy or move the buffer into the current directory in the background.
    /// A move empties the buffer and makes every session re-read it.
    pub async fn paste(&mut self) -> AppResult<JoinHandle<BulkReport>> {
        let buffer: CopyBuffer = persistence::read_copy_buffer(&self.paths.files)
            .await?
            .filter(|b: &CopyBuffer| !b.paths.is_empty())
            .ok_or(AppError::EmptyCopyBuffer)?;

        let dst_dir: PathBuf = self.cwd().to_path_buf();

        let handle: JoinHandle<BulkReport> = match buffer.mode {
            BufferMode::Copy => self.spawn_bulk(BulkOperation::Copy {
                srcs: buffer.paths,
                dst_dir,
            }),
            BufferMode::Move => {
                let handle: JoinHandle<BulkReport> = self.spawn_bulk(BulkOperation::Move {
                    srcs: buffer.paths,
                    dst_dir,
                });

                persistence::write_copy_buffer(&self.paths.files, &[], BufferMode::Move)
                    .await
                    .map_err(|e| e.with_context("clearing copy/cut buffer"))?;

                if self.remote.is_none() {
                    self.sync().await.map_err(|e| e.with_context("paste"))?;
                } else {
                    self.broadcast_sync().await.map_err(|e| e.with_context("paste"))?;
                }

                handle
            }
        };

        Ok(handle)
    }

    /// Delete the current entry or the selection in the background.
    pub fn del(&mut self) -> AppResult<JoinHandle<BulkReport>> {
        let paths: Vec<PathBuf> = self.curr_file_or_selections()?;
        Ok(self.spawn_bulk(BulkOperation::Delete { paths }))
    }

    /// Compute the aggregate size of the current directory entry, or of every
    /// selected directory, and store it on the cached entries.
    pub async fn calc_dir_size(&mut self) -> AppResult<()> {
        let targets: Vec<PathBuf> = if self.selections.is_empty() {
            let curr: &Arc<FileInfo> = self.curr_file().map_err(|_| AppError::NoFileSelected)?;
            if curr.is_dir { vec![curr.path.clone()] } else { Vec::new() }
        } else {
            self.selections
                .ordered(|_| true)
                .into_iter()
                .filter(|p: &PathBuf| std::fs::symlink_metadata(p).is_ok_and(|m| m.is_dir()))
                .collect()
        };

        for path in targets {
            let total: u64 = total_size(vec![path.clone()]).await?;

            let Some(parent) = path.parent() else {
                continue;
            };
            let name: String = base_name(&path);
            if let Some(entry) = self
                .dir_cache
                .get_mut(parent)
                .and_then(|d| d.entry_mut(&name))
            {
                entry.dir_size = Some(total);
            }
        }

        Ok(())
    }
}
