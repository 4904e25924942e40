// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! File access used by the side files of a segment.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Minimal file system interface needed by delete deltas.
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> std::io::Result<bool>;

    fn read_to_string(&self, path: &Path) -> std::io::Result<String>;

    /// Replace the content of `path` so that readers see either the old or the new content.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> std::io::Result<()>;
}

/// [`FileSystem`] over the local disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> std::io::Result<bool> {
        path.try_exists()
    }

    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(data)?;
        file.as_file().sync_data()?;
        file.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}
