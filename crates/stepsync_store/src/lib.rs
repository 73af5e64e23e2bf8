//! # stepsync store
//!
//! Per-document, append-only step logs with an optimistic-concurrency
//! commit gate.
//!
//! ## Design Principles
//!
//! - A store is a dumb ledger: it never interprets step payloads
//! - `version == number of committed steps`, always
//! - Check-and-append is one critical section per document; documents never
//!   contend with each other
//! - A failed write is never partially visible
//!
//! ## Available Stores
//!
//! - [`MemoryStepStore`] - For tests and ephemeral servers
//! - [`FileStepStore`] - One JSON-lines log file per document
//!
//! ## Example
//!
//! ```rust
//! use stepsync_protocol::{DocId, SessionId, Step};
//! use stepsync_store::{CommitOutcome, MemoryStepStore, StepStore};
//!
//! let store = MemoryStepStore::new();
//! let doc = DocId::new("doc1").unwrap();
//! let step = Step::new(serde_json::json!({"insert": "a"}));
//!
//! let outcome = store
//!     .commit_if_version_matches(&doc, 0, vec![step], vec![SessionId::new("a")])
//!     .unwrap();
//! assert_eq!(outcome, CommitOutcome::Committed { version: 1 });
//! assert_eq!(store.version(&doc).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod error;
mod file;
mod log;
mod memory;

pub use backend::StepStore;
pub use error::{StoreError, StoreResult};
pub use file::FileStepStore;
pub use log::{CommitOutcome, CommittedStep, DocumentLog, StepLog};
pub use memory::MemoryStepStore;
