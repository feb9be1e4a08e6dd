//! Watermark checkpoint
//!
//! The highest activity event id already considered, persisted as a plain
//! integer in a text file so it survives restarts. A missing or corrupt
//! file resets to zero, which is safe: replayed events land in the session
//! dedup window instead of duplicating.

use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::error::Result;

pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Last persisted watermark, or zero when none exists yet
    pub fn load(&self) -> i64 {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match contents.trim().parse() {
                Ok(watermark) => watermark,
                Err(_) => {
                    warn!(
                        path = %self.path.display(),
                        "Unreadable watermark file, restarting from zero"
                    );
                    0
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Failed to read watermark file, restarting from zero"
                );
                0
            }
        }
    }

    pub fn store(&self, watermark: i64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, watermark.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("sync_state.txt"));

        assert_eq!(store.load(), 0);
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("sync_state.txt"));

        store.store(42).unwrap();
        assert_eq!(store.load(), 42);

        store.store(1000).unwrap();
        assert_eq!(store.load(), 1000);
    }

    #[test]
    fn test_garbage_contents_load_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_state.txt");
        fs::write(&path, "not a number\n").unwrap();

        assert_eq!(WatermarkStore::new(path).load(), 0);
    }

    #[test]
    fn test_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/sync_state.txt");
        let store = WatermarkStore::new(&path);

        store.store(7).unwrap();
        assert_eq!(store.load(), 7);
    }

    #[test]
    fn test_load_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_state.txt");
        fs::write(&path, "  99\n").unwrap();

        assert_eq!(WatermarkStore::new(path).load(), 99);
    }
}
