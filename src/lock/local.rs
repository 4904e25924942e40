// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{LockDescriptor, LockPrimitive};

/// Advisory exclusive lock on `<root>/<table>/<usage>.lock`.
///
/// The lock is held by the open file handle. It excludes other processes as well as other
/// `LocalFileLock`s of the same process.
pub struct LocalFileLock {
    path: PathBuf,
    file: Option<File>,
}

impl LocalFileLock {
    pub fn new(root: impl AsRef<Path>, descriptor: &LockDescriptor) -> Self {
        let path = root
            .as_ref()
            .join(&descriptor.table)
            .join(format!("{}.lock", descriptor.usage));
        Self { path, file: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> std::io::Result<File> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
    }
}

impl LockPrimitive for LocalFileLock {
    fn try_acquire_once(&mut self) -> bool {
        if self.file.is_some() {
            return true;
        }
        let file = match self.open() {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to open lock file");
                return false;
            }
        };
        match fs2::FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                self.file = Some(file);
                true
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                debug!(path = %self.path.display(), %err, "lock file is held");
                false
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to lock file");
                false
            }
        }
    }

    fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = fs2::FileExt::unlock(&file) {
                warn!(path = %self.path.display(), %err, "failed to unlock file");
            }
        }
    }
}

impl Drop for LocalFileLock {
    fn drop(&mut self) {
        self.release();
    }
}
