//! `src/fs/file_info.rs`
//! ============================================================
//! Filesystem metadata for one directory entry.
//!
//! Goals
//! -----
//! • Plain value type, shared between listings via `Arc`.
//! • Symlinks report the target's metadata when the target resolves,
//!   and their own metadata (marked broken) when it does not.
//! • Directory size is never implied by metadata; it stays unknown
//!   until an explicit size walk fills it in.

// ------------------------------------------------------------
// Standard-library imports
// ------------------------------------------------------------

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

// ------------------------------------------------------------
// Third-party crate imports
// ------------------------------------------------------------

use chrono::{DateTime, Local};
use compact_str::CompactString;
use tracing::info;

/// Entries read when counting a subdirectory's children.
const DIR_COUNT_LIMIT: usize = 1000;

// ------------------------------------------------------------
// LinkState — symlink resolution outcome.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    NotLink,
    Working,
    Broken,
}

// ------------------------------------------------------------
// DirCount — child count shown next to directories.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirCount {
    /// Counting disabled or entry is not a directory.
    #[default]
    Unknown,
    Unreadable,
    Count(usize),
}

// ------------------------------------------------------------
// FileInfo — one entry of a listing.
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub name: CompactString,

    /// Extension including the dot; empty for directories and bare names.
    pub ext: CompactString,

    pub size: u64,
    pub mode: u32,
    pub modified: SystemTime,
    pub accessed: SystemTime,
    pub changed: SystemTime,
    pub is_dir: bool,
    pub link_state: LinkState,
    pub link_target: Option<PathBuf>,
    pub dir_count: DirCount,

    /// Aggregate size from an explicit walk, `None` until computed.
    pub dir_size: Option<u64>,
}

impl FileInfo {
    /// Build an entry from `lstat`, resolving symlinks.
    ///
    /// Returns the `lstat` error untouched so scanners can tell a vanished
    /// entry (`NotFound`) from other failures.
    pub fn from_path(path: &Path, dircounts: bool) -> io::Result<Self> {
        let lstat: Metadata = fs::symlink_metadata(path)?;

        let mut link_state: LinkState = LinkState::NotLink;
        let mut link_target: Option<PathBuf> = None;
        let mut meta: Metadata = lstat;

        if meta.file_type().is_symlink() {
            match fs::metadata(path) {
                Ok(target) => {
                    link_state = LinkState::Working;
                    meta = target;
                }
                Err(_) => link_state = LinkState::Broken,
            }

            match fs::read_link(path) {
                Ok(target) => link_target = Some(target),
                Err(e) => info!("reading link target of {:?}: {}", path, e),
            }
        }

        let mut info: Self = Self::from_metadata(path, &meta);
        info.link_state = link_state;
        info.link_target = link_target;

        if info.is_dir && dircounts {
            info.dir_count = count_children(path);
        }

        Ok(info)
    }

    /// Build an entry from metadata already in hand.
    pub fn from_metadata(path: &Path, meta: &Metadata) -> Self {
        let name: CompactString = path
            .file_name()
            .map(|n| CompactString::from(n.to_string_lossy()))
            .unwrap_or_default();

        let is_dir: bool = meta.is_dir();
        let ext: CompactString = if is_dir {
            CompactString::default()
        } else {
            extension_of(&name)
        };

        let modified: SystemTime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let accessed: SystemTime = meta.accessed().unwrap_or(modified);

        Self {
            path: path.to_path_buf(),
            name,
            ext,
            size: meta.len(),
            mode: mode_bits(meta),
            modified,
            accessed,
            changed: change_time(meta).unwrap_or(modified),
            is_dir,
            link_state: LinkState::NotLink,
            link_target: None,
            dir_count: DirCount::Unknown,
            dir_size: None,
        }
    }

    /// Own size for files, computed aggregate (or 0) for directories.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        if self.is_dir {
            self.dir_size.unwrap_or(0)
        } else {
            self.size
        }
    }

    #[must_use]
    pub fn modified_display(&self) -> String {
        let dt: DateTime<Local> = self.modified.into();
        dt.format("%Y-%m-%d %H:%M").to_string()
    }

    /// Fixed-time entry for tests that do not touch the disk.
    #[cfg(test)]
    pub(crate) fn synthetic(path: PathBuf, is_dir: bool) -> Self {
        let name: CompactString = path
            .file_name()
            .map(|n| CompactString::from(n.to_string_lossy()))
            .unwrap_or_default();
        let ext: CompactString = if is_dir {
            CompactString::default()
        } else {
            extension_of(&name)
        };

        Self {
            path,
            name,
            ext,
            size: 0,
            mode: 0,
            modified: SystemTime::UNIX_EPOCH,
            accessed: SystemTime::UNIX_EPOCH,
            changed: SystemTime::UNIX_EPOCH,
            is_dir,
            link_state: LinkState::NotLink,
            link_target: None,
            dir_count: DirCount::Unknown,
            dir_size: None,
        }
    }
}

/// Suffix from the last dot, dot included. A leading-dot name is all extension.
fn extension_of(name: &str) -> CompactString {
    match name.rfind('.') {
        Some(idx) => CompactString::from(&name[idx..]),
        None => CompactString::default(),
    }
}

fn count_children(path: &Path) -> DirCount {
    match fs::read_dir(path) {
        Ok(rd) => DirCount::Count(rd.take(DIR_COUNT_LIMIT).count()),
        Err(_) => DirCount::Unreadable,
    }
}

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o644 }
}

#[cfg(unix)]
fn change_time(meta: &Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    use std::time::Duration;

    let secs: u64 = u64::try_from(meta.ctime()).ok()?;
    let nanos: u32 = u32::try_from(meta.ctime_nsec()).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn change_time(_meta: &Metadata) -> Option<SystemTime> {
    None
}
