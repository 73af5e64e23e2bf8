//! # stepsync protocol
//!
//! Wire types and the step transform contract shared by the stepsync server
//! and client engine.
//!
//! This crate provides:
//! - [`DocId`], [`SessionId`] and the opaque [`Step`] payload
//! - Protocol messages for the three collab endpoints
//! - JSON encoding/decoding via [`WireMessage`]
//! - HTTP-shaped request/response values ([`HttpRequest`], [`HttpResponse`])
//!   so transports and servers can be wired without a framework
//! - The [`StepTransform`] capability consumed by the client engine
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire contract
//!
//! ```text
//! GET  /collab/{docId}/steps?version={v}  -> 200 { steps, originIds, version }
//! POST /collab/{docId}/steps               -> 200 { version }
//!                                          -> 409 { error, steps, originIds, version }
//! POST /collab/{docId}/reset               -> 200 { message }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod http;
mod ids;
mod messages;
mod step;
mod transform;

pub use error::{ProtocolError, ProtocolResult};
pub use http::{paths, HttpRequest, HttpResponse, HttpService, Method, Route};
pub use ids::{DocId, SessionId, MAX_DOC_ID_LEN};
pub use messages::{
    ErrorCode, ErrorResponse, HealthResponse, PostStepsAccepted, PostStepsRequest,
    PostStepsResponse, ResetResponse, StepsResponse, WireMessage, CONFLICT_ERROR,
    RESET_MESSAGE,
};
pub use step::Step;
pub use transform::{StepTransform, TransformError};
