//! The step transform capability.
//!
//! Applying a step to a document and rebasing one step over another are
//! owned by the editing core (an OT engine), not by the sync protocol. The
//! client engine consumes this trait and never interprets step payloads.

use crate::step::Step;
use thiserror::Error;

/// A step could not be applied or transformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("step could not be merged: {message}")]
pub struct TransformError {
    /// What went wrong.
    pub message: String,
}

impl TransformError {
    /// Creates a transform error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Apply/transform capability supplied by an OT engine.
///
/// Both operations are pure and synchronous.
///
/// # Contract
///
/// For steps produced by a compatible schema:
/// - `apply` succeeds when the step was produced against `doc`
/// - `transform(step, against)` returns a step with the same intent as
///   `step` that is valid on a document to which `against` has already been
///   applied (`step` and `against` must share the same starting document)
pub trait StepTransform: Send + Sync {
    /// Local document state.
    type Doc: Clone + Default + Send + Sync;

    /// Applies `step` to `doc`, returning the new state.
    fn apply(&self, doc: &Self::Doc, step: &Step) -> Result<Self::Doc, TransformError>;

    /// Rebases `step` so it can be applied after `against`.
    fn transform(&self, step: &Step, against: &Step) -> Result<Step, TransformError>;

    /// Applies a sequence of steps in order.
    fn apply_all<'a, I>(&self, doc: &Self::Doc, steps: I) -> Result<Self::Doc, TransformError>
    where
        I: IntoIterator<Item = &'a Step>,
    {
        let mut current = doc.clone();
        for step in steps {
            current = self.apply(&current, step)?;
        }
        Ok(current)
    }
}

impl<T: StepTransform + ?Sized> StepTransform for std::sync::Arc<T> {
    type Doc = T::Doc;

    fn apply(&self, doc: &Self::Doc, step: &Step) -> Result<Self::Doc, TransformError> {
        (**self).apply(doc, step)
    }

    fn transform(&self, step: &Step, against: &Step) -> Result<Step, TransformError> {
        (**self).transform(step, against)
    }
}
