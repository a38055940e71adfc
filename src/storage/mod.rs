//! Per-chat scratch storage.
//!
//! Each in-flight session owns one directory under the configured root.
//! `acquire` is idempotent; `release` is a recursive delete that treats an
//! already-absent directory as success, so terminal handlers can call it
//! unconditionally on every exit path.

use std::io;
use std::path::{Path, PathBuf};

/// Allocates and tears down per-chat scratch directories.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    root: PathBuf,
}

impl ScratchStore {
    /// Create a store rooted at `<root>/paperpress`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().join("paperpress"),
        }
    }

    /// The directory owned by `chat_id`, whether or not it exists yet.
    pub fn dir_for(&self, chat_id: i64) -> PathBuf {
        self.root.join(chat_id.to_string())
    }

    /// Create (or re-use) the scratch directory for a chat.
    pub fn acquire(&self, chat_id: i64) -> io::Result<PathBuf> {
        let dir = self.dir_for(chat_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Remove a chat's scratch directory and everything in it.
    ///
    /// A directory that is already gone is not an error.
    pub fn release(&self, chat_id: i64) -> io::Result<()> {
        let dir = self.dir_for(chat_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
