//! src/model/persistence.rs
//! ============================================================================
//! # Marks, tags and copy-buffer files
//!
//! Line formats:
//! - marks: `c:/abs/path`, sorted by mark, temporary marks never written
//! - tags: `/abs/path:c`, sorted by path, split on the *last* colon
//! - copy buffer: `copy` or `move`, then one path per line
//!
//! A missing file reads as empty. Writers create the parent directory.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Write as _,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use compact_str::CompactString;
use tokio::fs as TokioFs;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::model::selection::{Marks, Tags};

/// Whether pasting the buffer copies or moves its paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    Copy,
    Move,
}

impl BufferMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
        }
    }
}

/// Contents of the copy/cut buffer file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyBuffer {
    pub mode: BufferMode,
    pub paths: Vec<PathBuf>,
}

async fn read_optional(path: &Path) -> AppResult<Option<String>> {
    match TokioFs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::from_io_at(path, e)),
    }
}

async fn write_creating_parent(path: &Path, content: String) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        TokioFs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::from_io_at(parent, e))?;
    }

    TokioFs::write(path, content)
        .await
        .map_err(|e| AppError::from_io_at(path, e))
}

fn malformed(path: &Path, line: usize, reason: &str) -> AppError {
    AppError::MalformedState {
        path: path.to_path_buf(),
        line,
        reason: reason.to_string(),
    }
}

// ------------------------------------------------------------
// Marks
// ------------------------------------------------------------

/// Read the marks file; for a repeated mark the first line wins.
pub async fn read_marks(path: &Path) -> AppResult<Marks> {
    let mut marks: Marks = BTreeMap::new();
    let Some(text) = read_optional(path).await? else {
        return Ok(marks);
    };

    for (idx, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }

        let (key, target) = line
            .split_once(':')
            .ok_or_else(|| malformed(path, idx + 1, "expected 'mark:path'"))?;

        let mut chars = key.chars();
        let (Some(mark), None) = (chars.next(), chars.next()) else {
            return Err(malformed(path, idx + 1, "mark must be a single character"));
        };

        marks.entry(mark).or_insert_with(|| PathBuf::from(target));
    }

    debug!(
        marker = "STATE_READ",
        operation_type = "read_marks",
        count = marks.len(),
        "Marks loaded"
    );

    Ok(marks)
}

/// Write every mark `is_temp` rejects, in mark order.
pub async fn write_marks(path: &Path, marks: &Marks, is_temp: impl Fn(char) -> bool) -> AppResult<()> {
    let mut out: String = String::new();
    for (mark, target) in marks.iter().filter(|(m, _)| !is_temp(**m)) {
        let _ = writeln!(out, "{mark}:{}", target.display());
    }

    write_creating_parent(path, out).await
}

// ------------------------------------------------------------
// Tags
// ------------------------------------------------------------

pub async fn read_tags(path: &Path) -> AppResult<HashMap<PathBuf, CompactString>> {
    let mut tags: HashMap<PathBuf, CompactString> = HashMap::new();
    let Some(text) = read_optional(path).await? else {
        return Ok(tags);
    };

    for (idx, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }

        let (target, tag) = line
            .rsplit_once(':')
            .ok_or_else(|| malformed(path, idx + 1, "expected 'path:tag'"))?;

        tags.insert(PathBuf::from(target), CompactString::from(tag));
    }

    Ok(tags)
}

pub async fn write_tags(path: &Path, tags: &Tags) -> AppResult<()> {
    let mut out: String = String::new();
    for (target, tag) in tags.sorted() {
        let _ = writeln!(out, "{}:{tag}", target.display());
    }

    write_creating_parent(path, out).await
}

// ------------------------------------------------------------
// Copy buffer
// ------------------------------------------------------------

/// Read the copy buffer. Paths end at the first empty line.
pub async fn read_copy_buffer(path: &Path) -> AppResult<Option<CopyBuffer>> {
    let Some(text) = read_optional(path).await? else {
        return Ok(None);
    };

    let mut lines = text.lines();
    let mode: BufferMode = match lines.next() {
        None | Some("") => return Ok(None),
        Some("copy") => BufferMode::Copy,
        Some("move") => BufferMode::Move,
        Some(other) => {
            return Err(malformed(
                path,
                1,
                &format!("unexpected option to copy file(s): {other}"),
            ));
        }
    };

    let paths: Vec<PathBuf> = lines
        .take_while(|l: &&str| !l.is_empty())
        .map(PathBuf::from)
        .collect();

    Ok(Some(CopyBuffer { mode, paths }))
}

/// Write the copy buffer; an empty path list clears it.
pub async fn write_copy_buffer(path: &Path, paths: &[PathBuf], mode: BufferMode) -> AppResult<()> {
    let mut out: String = String::new();
    if !paths.is_empty() {
        out.push_str(mode.as_str());
        out.push('\n');
        for p in paths {
            let _ = writeln!(out, "{}", p.display());
        }
    }

    write_creating_parent(path, out).await
}
