// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEntry {
    File { contents: Vec<u8>, mode: u32 },
    Dir { mode: u32 },
}

/// In-memory filesystem that records every directory and file it is asked
/// to create, together with the requested mode.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<BTreeMap<PathBuf, MockEntry>>>,
    fail_writes: Arc<Mutex<Option<String>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent `write_file` fail with `message`.
    pub fn fail_writes(&self, message: impl Into<String>) {
        *self
            .fail_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    pub fn file_contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().get(path.as_ref()) {
            Some(MockEntry::File { contents, .. }) => Some(contents.clone()),
            _ => None,
        }
    }

    pub fn mode_of(&self, path: impl AsRef<Path>) -> Option<u32> {
        match self.lock().get(path.as_ref()) {
            Some(MockEntry::File { mode, .. }) | Some(MockEntry::Dir { mode }) => Some(*mode),
            None => None,
        }
    }

    /// Every file written so far, in path order.
    pub fn files(&self) -> Vec<PathBuf> {
        self.lock()
            .iter()
            .filter(|(_, e)| matches!(e, MockEntry::File { .. }))
            .map(|(p, _)| p.clone())
            .collect()
    }
}

impl FileSystem for MockFileSystem {
    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let mut entries = self.lock();
        for dir in path.ancestors().filter(|p| !p.as_os_str().is_empty()) {
            match entries.get(dir) {
                Some(MockEntry::File { .. }) => {
                    return Err(anyhow!("Not a directory: {:?}", dir));
                }
                Some(MockEntry::Dir { .. }) => {}
                None => {
                    entries.insert(dir.to_path_buf(), MockEntry::Dir { mode });
                }
            }
        }
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> Result<()> {
        if let Some(msg) = self
            .fail_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Err(anyhow!("writing {:?}: {}", path, msg));
        }

        let mut entries = self.lock();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !matches!(entries.get(parent), Some(MockEntry::Dir { .. })) {
                return Err(anyhow!("Parent directory not found: {:?}", parent));
            }
        }
        entries.insert(
            path.to_path_buf(),
            MockEntry::File {
                contents: contents.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lock().get(path) {
            Some(MockEntry::File { contents, .. }) => {
                String::from_utf8(contents.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir { .. }) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::Dir { .. }))
    }
}
