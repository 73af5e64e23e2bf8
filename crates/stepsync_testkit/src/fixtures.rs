//! Test fixtures.

use std::ops::Deref;
use stepsync_protocol::{DocId, SessionId};
use stepsync_store::FileStepStore;
use tempfile::TempDir;

/// A file-backed store in a temporary directory, removed on drop.
pub struct TempFileStore {
    store: FileStepStore,
    dir: TempDir,
}

impl TempFileStore {
    /// Opens a store in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStepStore::open(dir.path()).expect("Failed to open file store");
        Self { store, dir }
    }

    /// Drops the open store and reopens the same directory.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(store);
        let store = FileStepStore::open(dir.path()).expect("Failed to reopen file store");
        Self { store, dir }
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TempFileStore {
    type Target = FileStepStore;

    fn deref(&self) -> &FileStepStore {
        &self.store
    }
}

/// Parses a document id, panicking on invalid input.
pub fn doc(id: &str) -> DocId {
    DocId::new(id).expect("Invalid document id")
}

/// Shorthand for a session id.
pub fn session(id: &str) -> SessionId {
    SessionId::new(id)
}
