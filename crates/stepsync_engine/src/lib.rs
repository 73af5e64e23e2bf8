//! # stepsync engine
//!
//! Client-side sync engine for stepsync.
//!
//! This crate provides:
//! - Per-document session state (confirmed version, unconfirmed steps)
//! - The fetch → rebase → push cycle with a single-flight guard
//! - A background scheduler with a fixed interval and debounced edit wakes
//! - Per-request timeouts and backoff after failed cycles
//! - HTTP transport abstraction plus an in-process loopback client
//!
//! ## Architecture
//!
//! The engine implements a **fetch-then-push** model against a server that
//! only accepts a batch when its base version is current:
//! 1. Fetch steps since the confirmed version and rebase local steps over them
//! 2. Push local steps at the confirmed version
//! 3. On conflict, merge the returned tail and push again next cycle
//!
//! Rebasing is delegated to a [`StepTransform`] supplied by the editor; the
//! engine never looks inside a step.
//!
//! ## Key Invariants
//!
//! - Local state is always a replay of a prefix of the server log plus the
//!   session's own unconfirmed steps
//! - The confirmed version only moves forward, except on an explicit reset
//! - At most one cycle is in flight per document
//! - Network and store failures never end the session
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stepsync_engine::{HttpTransport, LoopbackClient, SyncConfig, SyncEngine, SyncScheduler};
//!
//! let server = Arc::new(SyncServer::new(ServerConfig::default()));
//! let transport = HttpTransport::new("http://local", LoopbackClient::new(server));
//! let engine = Arc::new(SyncEngine::new(SyncConfig::new(doc_id), editor, transport));
//!
//! let handle = SyncScheduler::spawn(Arc::clone(&engine));
//! handle.edit(step)?;
//! handle.shutdown().await;
//! ```
//!
//! [`StepTransform`]: stepsync_protocol::StepTransform

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod scheduler;
mod session;
mod state;
mod transport;

pub use config::{BackoffConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient};
pub use scheduler::{SyncHandle, SyncScheduler};
pub use session::{ClientSession, Received};
pub use state::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use transport::{MockTransport, SyncTransport};
