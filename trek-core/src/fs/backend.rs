//! ``src/fs/backend.rs``
//!
//! # `FsBackend`: the filesystem calls bulk operations make
//!
//! Move and delete go through this trait so a test can fail a rename with
//! `CrossesDevices` without a second filesystem mounted.

use async_trait::async_trait;
use std::{
    ffi::OsString,
    fs::Metadata,
    io,
    path::{Path, PathBuf},
};
use tokio::fs as TokioFs;

#[async_trait]
pub trait FsBackend: Send + Sync + std::fmt::Debug {
    async fn lstat(&self, path: &Path) -> io::Result<Metadata>;

    async fn stat(&self, path: &Path) -> io::Result<Metadata>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Recursive removal; a path that is already gone is not an error.
    async fn remove_all(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

#[async_trait]
impl FsBackend for LocalFs {
    async fn lstat(&self, path: &Path) -> io::Result<Metadata> {
        TokioFs::symlink_metadata(path).await
    }

    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        TokioFs::metadata(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        TokioFs::rename(from, to).await
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let meta: Metadata = match TokioFs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let result: io::Result<()> = if meta.is_dir() {
            TokioFs::remove_dir_all(path).await
        } else {
            TokioFs::remove_file(path).await
        };

        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// `path` if nothing occupies it, else the first free `path.~N~` with N from 1.
pub async fn free_destination<B: FsBackend + ?Sized>(fs: &B, path: &Path) -> PathBuf {
    if fs.lstat(path).await.is_err() {
        return path.to_path_buf();
    }

    let mut n: u64 = 1;
    loop {
        let mut name: OsString = path.as_os_str().to_owned();
        name.push(format!(".~{n}~"));
        let candidate: PathBuf = PathBuf::from(name);

        if fs.lstat(&candidate).await.is_err() {
            return candidate;
        }
        n += 1;
    }
}

/// Whether two metadata values describe the same inode.
#[cfg(unix)]
pub fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
pub fn same_file(_a: &Metadata, _b: &Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_remove_all_tolerates_missing() {
        let temp_dir = TempDir::new().unwrap();
        let gone = temp_dir.path().join("gone");
        LocalFs.remove_all(&gone).await.unwrap();

        let tree = temp_dir.path().join("tree/nested");
        TokioFs::create_dir_all(&tree).await.unwrap();
        TokioFs::write(tree.join("f"), b"x").await.unwrap();
        LocalFs.remove_all(&temp_dir.path().join("tree")).await.unwrap();
        assert!(!temp_dir.path().join("tree").exists());
    }

    #[tokio::test]
    async fn test_free_destination_suffixes() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("a.txt");
        assert_eq!(free_destination(&LocalFs, &target).await, target);

        TokioFs::write(&target, b"x").await.unwrap();
        let first = free_destination(&LocalFs, &target).await;
        assert_eq!(first, temp_dir.path().join("a.txt.~1~"));

        TokioFs::write(&first, b"y").await.unwrap();
        let second = free_destination(&LocalFs, &target).await;
        assert_eq!(second, temp_dir.path().join("a.txt.~2~"));
    }

    #[tokio::test]
    async fn test_same_file_through_hard_link() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        TokioFs::write(&a, b"x").await.unwrap();
        TokioFs::hard_link(&a, &b).await.unwrap();

        let ma = LocalFs.lstat(&a).await.unwrap();
        let mb = LocalFs.lstat(&b).await.unwrap();
        assert_eq!(same_file(&ma, &mb), cfg!(unix));
    }
}
