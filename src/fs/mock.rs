// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct MockEntry {
    pub content: Vec<u8>,
    pub modified: SystemTime,
}

/// In-memory filesystem with explicit modification times.
///
/// Directories are implicit; only files are tracked. Clones share state, so
/// a test can keep one handle and mutate files while the code under test
/// polls through another.
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    now: Arc<Mutex<SystemTime>>,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            now: Arc::new(Mutex::new(SystemTime::UNIX_EPOCH)),
        }
    }

    /// Time stamped on files created through the trait (`touch`, `write`).
    pub fn set_now(&self, now: SystemTime) {
        *self.now.lock().unwrap() = now;
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>, modified: SystemTime) {
        let mut files = self.files.lock().unwrap();
        files.insert(
            path.as_ref().to_path_buf(),
            MockEntry {
                content: content.into(),
                modified,
            },
        );
    }

    /// Append bytes and bump the mtime, like a writer still producing output.
    pub fn append(&self, path: impl AsRef<Path>, bytes: &[u8], modified: SystemTime) {
        let mut files = self.files.lock().unwrap();
        let entry = files
            .entry(path.as_ref().to_path_buf())
            .or_insert_with(|| MockEntry {
                content: Vec::new(),
                modified,
            });
        entry.content.extend_from_slice(bytes);
        entry.modified = modified;
    }

    pub fn files(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn stamp(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(entry) => {
                String::from_utf8(entry.content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let now = self.stamp();
        self.add_file(path, contents, now);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .map(|e| e.modified)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn len(&self, path: &Path) -> Result<u64> {
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .map(|e| e.content.len() as u64)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn touch(&self, path: &Path) -> Result<()> {
        let now = self.stamp();
        self.append(path, &[], now);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<bool> {
        Ok(self.files.lock().unwrap().remove(path).is_some())
    }

    fn create_dir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let entry = files
            .get(from)
            .cloned()
            .ok_or_else(|| anyhow!("File not found: {:?}", from))?;
        files.insert(to.to_path_buf(), entry);
        Ok(())
    }
}
