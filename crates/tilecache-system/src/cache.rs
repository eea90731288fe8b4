//! Tile cache storage on disk.

use std::fs;
use std::io;
use std::path::PathBuf;

use tilecache_core::{CacheAdmin, SystemError};
use tracing::{info, warn};

/// Directory the cache server keeps its tiles in.
#[derive(Debug, Clone)]
pub struct CacheDirectory {
    root: PathBuf,
}

impl CacheDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CacheAdmin for CacheDirectory {
    /// Removes everything under the root and keeps the root itself.
    fn clear(&self) -> Result<(), SystemError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let result = if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };

            if let Err(e) = result {
                warn!("Failed to remove {:?}: {}", path, e);
                return Err(e.into());
            }
            removed += 1;
        }

        info!("Cleared {} cache entries from {:?}", removed, self.root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn clear_removes_files_and_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        fs::create_dir_all(root.join("mt1").join("17")).unwrap();
        fs::write(root.join("mt1").join("17").join("tile.jpg"), b"jpeg").unwrap();
        fs::write(root.join("index"), b"idx").unwrap();

        let cache = CacheDirectory::new(&root);
        cache.clear().unwrap();
        assert!(root.exists());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn clear_missing_root_is_ok() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("absent");
        CacheDirectory::new(&root).clear().unwrap();
        assert!(!root.exists());
    }
}
