//! Atomic TOML file operations.
//!
//! Every write goes to a temporary sibling file that is fsynced and renamed
//! over the target, so a reader never sees a half-written document.
//! Read-modify-write cycles hold an exclusive lock file for their duration.

use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parley_core::ParleyError;
use serde::{Serialize, de::DeserializeOwned};

/// A handle to a TOML document on disk.
pub struct AtomicTomlFile<T> {
    path: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> AtomicTomlFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and deserializes the document.
    ///
    /// - `Ok(Some(T))`: loaded
    /// - `Ok(None)`: the file doesn't exist or is blank
    pub fn load(&self) -> Result<Option<T>, ParleyError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(toml::from_str(&content)?))
    }

    /// Serializes `data` and replaces the document atomically.
    pub fn save(&self, data: &T) -> Result<(), ParleyError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(data)?;

        let tmp_path = self.temp_path()?;
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(toml_string.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Runs a locked read-modify-write cycle.
    ///
    /// `f` receives the current document (or `default_value` if there is
    /// none). The document is written back only if `f` succeeds; its return
    /// value is passed through.
    pub fn update<F, R>(&self, default_value: T, f: F) -> Result<R, ParleyError>
    where
        F: FnOnce(&mut T) -> Result<R, ParleyError>,
    {
        let _lock = FileLock::acquire(&self.path)?;

        let mut data = self.load()?.unwrap_or(default_value);
        let result = f(&mut data)?;
        self.save(&data)?;

        Ok(result)
    }

    fn temp_path(&self) -> Result<PathBuf, ParleyError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| ParleyError::io("Path has no parent directory"))?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| ParleyError::io("Path has no file name"))?;

        Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
    }
}

/// Exclusive lock held for the lifetime of the guard.
struct FileLock {
    #[allow(dead_code)]
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, ParleyError> {
        let lock_path = path.with_extension("lock");

        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|e| ParleyError::io(format!("Failed to acquire lock: {}", e)))?;
        }

        Ok(FileLock { file, lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock happens when the handle closes; removing the file is best effort.
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    type Table = BTreeMap<String, String>;

    #[test]
    fn test_load_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<Table>::new(temp_dir.path().join("missing.toml"));
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_update_returns_closure_result() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<Table>::new(temp_dir.path().join("state.toml"));

        let previous = file
            .update(Table::new(), |table| {
                Ok(table.insert("k".to_string(), "v1".to_string()))
            })
            .unwrap();
        assert_eq!(previous, None);

        let previous = file
            .update(Table::new(), |table| {
                Ok(table.insert("k".to_string(), "v2".to_string()))
            })
            .unwrap();
        assert_eq!(previous.as_deref(), Some("v1"));
        assert_eq!(file.load().unwrap().unwrap()["k"], "v2");
    }

    #[test]
    fn test_failed_update_leaves_file_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<Table>::new(temp_dir.path().join("state.toml"));
        file.save(&Table::from([("k".to_string(), "v".to_string())]))
            .unwrap();

        let result: Result<(), ParleyError> = file.update(Table::new(), |table| {
            table.clear();
            Err(ParleyError::internal("abort"))
        });
        assert!(result.is_err());
        assert_eq!(file.load().unwrap().unwrap()["k"], "v");
    }

    #[test]
    fn test_no_temp_or_lock_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.toml");
        let file = AtomicTomlFile::<Table>::new(path.clone());
        file.update(Table::new(), |table| {
            table.insert("a".to_string(), "b".to_string());
            Ok(())
        })
        .unwrap();

        assert!(path.exists());
        assert!(!temp_dir.path().join(".state.toml.tmp").exists());
        assert!(!temp_dir.path().join("state.lock").exists());
    }
}
