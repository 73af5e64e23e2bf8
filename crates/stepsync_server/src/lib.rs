//! # stepsync server
//!
//! Reference sync service for stepsync.
//!
//! This crate provides:
//! - The three collab endpoints (get steps, post steps, reset) plus health
//! - Optimistic-concurrency commits through a pluggable [`StepStore`]
//! - A uniform JSON error taxonomy
//!
//! # Architecture
//!
//! The server is a linearizable ledger per document. It checks the client's
//! base version, appends on a match and hands back the missed tail on a
//! mismatch. It never transforms steps; rebasing happens on the client.
//!
//! [`SyncService`] holds the protocol operations, [`RequestHandler`] maps
//! HTTP-shaped requests onto them and [`SyncServer`] wires both to a store.
//!
//! # Endpoints
//!
//! | Method | Path                         | Success | Other          |
//! |--------|------------------------------|---------|----------------|
//! | GET    | `/collab/{docId}/steps`      | 200     | 400, 503       |
//! | POST   | `/collab/{docId}/steps`      | 200     | 409, 400, 413  |
//! | POST   | `/collab/{docId}/reset`      | 200     | 503            |
//! | GET    | `/health`                    | 200     |                |
//!
//! [`StepStore`]: stepsync_store::StepStore

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod service;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::SyncServer;
pub use service::SyncService;
