//! # stepsync testkit
//!
//! Test utilities for stepsync.
//!
//! This crate provides:
//! - [`PlainText`], a small OT engine over strings
//! - Property-based generators for edits and multi-session schedules
//! - [`FaultyStore`] for injecting storage failures
//! - Temporary file-store fixtures
//!
//! ## Usage
//!
//! ```rust
//! use stepsync_protocol::StepTransform;
//! use stepsync_testkit::prelude::*;
//!
//! let doc = PlainText.apply(&String::new(), &PlainText::insert(0, "hi")).unwrap();
//! assert_eq!(doc, "hi");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod text;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::text::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use text::*;
