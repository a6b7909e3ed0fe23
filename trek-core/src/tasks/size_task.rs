//! ``src/tasks/size_task.rs``
//! ============================================================================
//! # Size Task: recursive byte totals off the foreground task
//!
//! Sums the `lstat` sizes of every path below each source, directories
//! included. Used to publish a copy's byte total before it starts and to fill
//! in directory sizes on request.

use std::{
    io,
    path::{Path, PathBuf},
    time::Instant,
};

use tokio::task as TokioScheduler;
use tracing::{Instrument, info, info_span, warn};
use walkdir::WalkDir;

use crate::error::{AppError, AppResult};

/// Total size of `paths`, failing on the first top-level path that does not exist.
pub async fn total_size(paths: Vec<PathBuf>) -> AppResult<u64> {
    let count: usize = paths.len();

    async move {
        let start: Instant = Instant::now();

        let result: AppResult<u64> = TokioScheduler::spawn_blocking(move || walk_total(&paths))
            .await
            .map_err(|e| AppError::Other(format!("size walk panicked: {e}")))?;

        match &result {
            Ok(bytes) => info!(
                marker = "SIZE_TASK",
                operation_type = "size_calculation_success",
                bytes = *bytes,
                duration_ms = start.elapsed().as_millis(),
                "Size walk completed"
            ),
            Err(e) => warn!(
                marker = "SIZE_TASK",
                operation_type = "size_calculation_failure",
                error = %e,
                "Size walk failed"
            ),
        }

        result
    }
    .instrument(info_span!(
        "size_calculation",
        operation_type = "size_calculation",
        paths = count
    ))
    .await
}

fn walk_total(paths: &[PathBuf]) -> AppResult<u64> {
    let mut total: u64 = 0;

    for path in paths {
        if let Err(e) = std::fs::symlink_metadata(path) {
            if e.kind() == io::ErrorKind::NotFound {
                return Err(AppError::NotFound(path.clone()));
            }
        }

        for entry in WalkDir::new(path) {
            let entry: walkdir::DirEntry = entry.map_err(|e| walk_error(path, &e))?;
            let meta: std::fs::Metadata = entry.metadata().map_err(|e| walk_error(path, &e))?;
            total += meta.len();
        }
    }

    Ok(total)
}

fn walk_error(root: &Path, e: &walkdir::Error) -> AppError {
    let at: &Path = e.path().unwrap_or(root);
    AppError::file_operation_failed("walk", at, e.to_string())
}
