//! File-backed step store.
//!
//! Directory layout:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK                 # Advisory lock for single-process access
//! └─ <hex(doc id)>.log    # One JSON record per line: {"step": ..., "origin": ...}
//! ```
//!
//! A document's file is created by its first commit. Each commit writes all
//! of its lines and syncs before the in-memory view is updated; if any write
//! fails, the file is truncated back to its previous length so a partial
//! batch is never visible. A torn trailing line (crash mid-write) is dropped
//! the next time the document is loaded.

use crate::backend::StepStore;
use crate::error::{StoreError, StoreResult};
use crate::log::{CommitOutcome, CommittedStep, DocumentLog, StepLog};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepsync_protocol::{DocId, SessionId, Step};
use tracing::{debug, warn};

const LOCK_FILE: &str = "LOCK";
const LOG_EXTENSION: &str = "log";

/// One loaded document.
#[derive(Debug)]
struct FileDocument {
    path: PathBuf,
    /// Open handle, present once the file exists.
    file: Option<File>,
    /// Length of the file in bytes (all complete lines).
    len: u64,
    log: DocumentLog,
}

impl FileDocument {
    fn load(path: PathBuf) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self {
                path,
                file: None,
                len: 0,
                log: DocumentLog::new(),
            });
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let complete = contents
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        if complete < contents.len() {
            warn!(
                path = %path.display(),
                dropped = contents.len() - complete,
                "dropping torn trailing record"
            );
            file.set_len(complete as u64)?;
            file.sync_data()?;
        }

        let mut entries = Vec::new();
        for (index, line) in contents[..complete]
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .enumerate()
        {
            let entry: CommittedStep = serde_json::from_slice(line).map_err(|e| {
                StoreError::Corrupted(format!("{}: record {index}: {e}", path.display()))
            })?;
            entries.push(entry);
        }

        Ok(Self {
            path,
            file: Some(file),
            len: complete as u64,
            log: DocumentLog::from_entries(entries),
        })
    }

    fn handle(&mut self) -> StoreResult<&mut File> {
        match self.file {
            Some(ref mut file) => Ok(file),
            None => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&self.path)?;
                Ok(self.file.insert(file))
            }
        }
    }

    /// Writes `bytes` at the end of the file and syncs, undoing the write on
    /// failure.
    fn write_durably(&mut self, bytes: &[u8]) -> StoreResult<()> {
        let len = self.len;
        let file = self.handle()?;
        let result = file
            .seek(SeekFrom::Start(len))
            .and_then(|_| file.write_all(bytes))
            .and_then(|_| file.sync_data());
        if let Err(e) = result {
            if let Err(undo) = file.set_len(len) {
                warn!(error = %undo, "failed to roll back partial write");
            }
            return Err(StoreError::unavailable(format!("write failed: {e}")));
        }
        self.len += bytes.len() as u64;
        Ok(())
    }

    fn commit(
        &mut self,
        expected: u64,
        steps: Vec<Step>,
        origins: Vec<SessionId>,
    ) -> StoreResult<CommitOutcome> {
        if let Some(tail) = self.log.check(expected, &steps, &origins)? {
            return Ok(CommitOutcome::Conflict(tail));
        }
        if steps.is_empty() {
            return Ok(CommitOutcome::Committed {
                version: self.log.version(),
            });
        }

        let mut buffer = Vec::new();
        for (step, origin) in steps.iter().zip(&origins) {
            let record = CommittedStep {
                step: step.clone(),
                origin: origin.clone(),
            };
            serde_json::to_writer(&mut buffer, &record)
                .map_err(|e| StoreError::unavailable(format!("encode failed: {e}")))?;
            buffer.push(b'\n');
        }
        self.write_durably(&buffer)?;

        let version = self.log.append(steps, origins);
        Ok(CommitOutcome::Committed { version })
    }

    fn reset(&mut self) -> StoreResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.set_len(0)?;
            file.sync_data()?;
        }
        self.len = 0;
        self.log.clear();
        Ok(())
    }
}

/// A step store persisting each document as a JSON-lines file.
///
/// # Thread Safety
///
/// The store holds an exclusive advisory lock on its directory, so only one
/// process may open it at a time. Within the process each document has its
/// own lock.
///
/// # Example
///
/// ```no_run
/// use stepsync_protocol::DocId;
/// use stepsync_store::{FileStepStore, StepStore};
/// use std::path::Path;
///
/// let store = FileStepStore::open(Path::new("collab-data")).unwrap();
/// let version = store.version(&DocId::new("doc1").unwrap()).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStepStore {
    path: PathBuf,
    _lock_file: File,
    docs: Mutex<HashMap<DocId, Arc<RwLock<FileDocument>>>>,
}

impl FileStepStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// - `Locked` if another process holds the directory
    /// - `Io` if the directory cannot be created or the lock file opened
    pub fn open(path: &Path) -> StoreResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        debug!(path = %path.display(), "opened step store");
        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
            docs: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the log file backing `doc`.
    #[must_use]
    pub fn document_path(&self, doc: &DocId) -> PathBuf {
        let mut name = String::with_capacity(doc.as_str().len() * 2 + 4);
        for byte in doc.as_str().bytes() {
            let _ = write!(name, "{byte:02x}");
        }
        self.path.join(name).with_extension(LOG_EXTENSION)
    }

    /// Lists the documents that have a log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn documents(&self) -> StoreResult<Vec<DocId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(id) = decode_hex(stem).and_then(|raw| DocId::new(raw).ok()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn document(&self, doc: &DocId) -> StoreResult<Arc<RwLock<FileDocument>>> {
        let mut docs = self.docs.lock();
        if let Some(loaded) = docs.get(doc) {
            return Ok(Arc::clone(loaded));
        }
        let loaded = Arc::new(RwLock::new(FileDocument::load(self.document_path(doc))?));
        docs.insert(doc.clone(), Arc::clone(&loaded));
        Ok(loaded)
    }
}

fn decode_hex(text: &str) -> Option<String> {
    if text.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

impl StepStore for FileStepStore {
    fn read(&self, doc: &DocId, since: u64) -> StoreResult<StepLog> {
        let document = self.document(doc)?;
        let document = document.read();
        document.log.read(since)
    }

    fn commit_if_version_matches(
        &self,
        doc: &DocId,
        expected: u64,
        steps: Vec<Step>,
        origins: Vec<SessionId>,
    ) -> StoreResult<CommitOutcome> {
        let document = self.document(doc)?;
        let mut document = document.write();
        let count = steps.len();
        let outcome = document.commit(expected, steps, origins)?;
        if let CommitOutcome::Committed { version } = &outcome {
            debug!(%doc, count, version, "persisted steps");
        }
        Ok(outcome)
    }

    fn reset(&self, doc: &DocId) -> StoreResult<()> {
        let document = self.document(doc)?;
        document.write().reset()?;
        debug!(%doc, "document reset");
        Ok(())
    }

    fn version(&self, doc: &DocId) -> StoreResult<u64> {
        let document = self.document(doc)?;
        let version = document.read().log.version();
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn doc(id: &str) -> DocId {
        DocId::new(id).unwrap()
    }

    fn step(n: u64) -> Step {
        Step::new(json!({ "n": n }))
    }

    fn origins(name: &str, n: usize) -> Vec<SessionId> {
        vec![SessionId::new(name); n]
    }

    #[test]
    fn read_does_not_create_file() {
        let dir = tempdir().unwrap();
        let store = FileStepStore::open(dir.path()).unwrap();
        assert_eq!(store.read(&doc("doc1"), 0).unwrap().version, 0);
        assert!(!store.document_path(&doc("doc1")).exists());
    }

    #[test]
    fn commits_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FileStepStore::open(dir.path()).unwrap();
            store
                .commit_if_version_matches(&doc("doc1"), 0, vec![step(1), step(2)], origins("a", 2))
                .unwrap();
            store
                .commit_if_version_matches(&doc("doc1"), 2, vec![step(3)], origins("b", 1))
                .unwrap();
        }

        let store = FileStepStore::open(dir.path()).unwrap();
        let log = store.read(&doc("doc1"), 0).unwrap();
        assert_eq!(log.version, 3);
        assert_eq!(log.steps, vec![step(1), step(2), step(3)]);
        assert_eq!(
            log.origin_ids,
            vec![SessionId::new("a"), SessionId::new("a"), SessionId::new("b")]
        );
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileStepStore::open(dir.path()).unwrap();
        assert!(matches!(
            FileStepStore::open(dir.path()),
            Err(StoreError::Locked)
        ));
    }

    #[test]
    fn rejected_commit_leaves_file_bytes_identical() {
        let dir = tempdir().unwrap();
        let store = FileStepStore::open(dir.path()).unwrap();
        store
            .commit_if_version_matches(&doc("doc1"), 0, vec![step(1)], origins("a", 1))
            .unwrap();
        let path = store.document_path(&doc("doc1"));
        let before = fs::read(&path).unwrap();

        let outcome = store
            .commit_if_version_matches(&doc("doc1"), 0, vec![step(2)], origins("b", 1))
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Conflict(_)));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn torn_trailing_record_is_dropped() {
        let dir = tempdir().unwrap();
        let path = {
            let store = FileStepStore::open(dir.path()).unwrap();
            store
                .commit_if_version_matches(&doc("doc1"), 0, vec![step(1)], origins("a", 1))
                .unwrap();
            store.document_path(&doc("doc1"))
        };
        let intact = fs::read(&path).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"step":{"n":2},"orig"#).unwrap();
        drop(file);

        let store = FileStepStore::open(dir.path()).unwrap();
        assert_eq!(store.version(&doc("doc1")).unwrap(), 1);
        assert_eq!(fs::read(&path).unwrap(), intact);

        let outcome = store
            .commit_if_version_matches(&doc("doc1"), 1, vec![step(2)], origins("a", 1))
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Committed { version: 2 });
    }

    #[test]
    fn corrupted_record_is_reported() {
        let dir = tempdir().unwrap();
        let path = {
            let store = FileStepStore::open(dir.path()).unwrap();
            store.document_path(&doc("doc1"))
        };
        fs::write(&path, b"not json\n").unwrap();

        let store = FileStepStore::open(dir.path()).unwrap();
        let err = store.read(&doc("doc1"), 0).unwrap_err();
        assert!(matches!(err, StoreError::Corrupted(_)));
        assert!(err.is_unavailable());
    }

    #[test]
    fn reset_truncates_file() {
        let dir = tempdir().unwrap();
        let store = FileStepStore::open(dir.path()).unwrap();
        store
            .commit_if_version_matches(&doc("doc1"), 0, vec![step(1)], origins("a", 1))
            .unwrap();
        store.reset(&doc("doc1")).unwrap();
        store.reset(&doc("doc1")).unwrap();

        assert_eq!(store.version(&doc("doc1")).unwrap(), 0);
        assert_eq!(fs::metadata(store.document_path(&doc("doc1"))).unwrap().len(), 0);
    }

    #[test]
    fn lists_documents() {
        let dir = tempdir().unwrap();
        let store = FileStepStore::open(dir.path()).unwrap();
        for id in ["beta", "alpha.v2"] {
            store
                .commit_if_version_matches(&doc(id), 0, vec![step(1)], origins("a", 1))
                .unwrap();
        }
        assert_eq!(store.documents().unwrap(), vec![doc("alpha.v2"), doc("beta")]);
    }
}
