//! A plain-text OT engine for tests.
//!
//! Documents are `String`s and steps are character-indexed inserts and
//! deletes. Positions are clamped on apply, so every step applies to every
//! document; this keeps randomized tests from tripping over their own
//! generators.

use serde::{Deserialize, Serialize};
use stepsync_protocol::{Step, StepTransform, TransformError};

/// A plain-text edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum TextStep {
    /// Inserts `text` before character `pos`.
    Insert {
        /// Character offset.
        pos: usize,
        /// Inserted text.
        text: String,
    },
    /// Removes `len` characters starting at `pos`.
    Delete {
        /// Character offset.
        pos: usize,
        /// Number of characters.
        len: usize,
    },
}

impl TextStep {
    /// Encodes this edit as a protocol step.
    pub fn to_step(&self) -> Step {
        match Step::from_payload(self) {
            Ok(step) => step,
            Err(_) => unreachable!("text steps always serialize"),
        }
    }

    /// Decodes a protocol step.
    pub fn from_step(step: &Step) -> Result<Self, TransformError> {
        step.to_payload()
            .map_err(|e| TransformError::new(format!("not a text step: {e}")))
    }
}

/// [`StepTransform`] over plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl PlainText {
    /// Builds an insert step.
    pub fn insert(pos: usize, text: impl Into<String>) -> Step {
        TextStep::Insert {
            pos,
            text: text.into(),
        }
        .to_step()
    }

    /// Builds a delete step.
    pub fn delete(pos: usize, len: usize) -> Step {
        TextStep::Delete { pos, len }.to_step()
    }
}

fn byte_offset(doc: &str, pos: usize) -> usize {
    doc.char_indices().nth(pos).map_or(doc.len(), |(i, _)| i)
}

/// Characters of the range `[start, start + len)` that lie before `pos`.
fn removed_before(pos: usize, start: usize, len: usize) -> usize {
    pos.saturating_sub(start).min(len)
}

impl StepTransform for PlainText {
    type Doc = String;

    fn apply(&self, doc: &String, step: &Step) -> Result<String, TransformError> {
        let mut out = doc.clone();
        match TextStep::from_step(step)? {
            TextStep::Insert { pos, text } => {
                out.insert_str(byte_offset(doc, pos), &text);
            }
            TextStep::Delete { pos, len } => {
                let start = byte_offset(doc, pos);
                let end = byte_offset(doc, pos.saturating_add(len));
                out.replace_range(start..end, "");
            }
        }
        Ok(out)
    }

    fn transform(&self, step: &Step, against: &Step) -> Result<Step, TransformError> {
        let mine = TextStep::from_step(step)?;
        let theirs = TextStep::from_step(against)?;

        let rebased = match (mine, theirs) {
            (
                TextStep::Insert { pos, text },
                TextStep::Insert {
                    pos: other_pos,
                    text: other_text,
                },
            ) => {
                // Same position: the lexically smaller text goes first.
                let shift = other_pos < pos || (other_pos == pos && other_text <= text);
                let pos = if shift {
                    pos.saturating_add(other_text.chars().count())
                } else {
                    pos
                };
                TextStep::Insert { pos, text }
            }
            (TextStep::Insert { pos, text }, TextStep::Delete { pos: start, len }) => {
                if start < pos && pos < start.saturating_add(len) {
                    // Inserted strictly inside a deleted range: the delete wins.
                    TextStep::Insert {
                        pos: start,
                        text: String::new(),
                    }
                } else {
                    TextStep::Insert {
                        pos: pos - removed_before(pos, start, len),
                        text,
                    }
                }
            }
            (TextStep::Delete { pos, len }, TextStep::Insert { pos: at, text }) => {
                let inserted = text.chars().count();
                if at <= pos {
                    TextStep::Delete {
                        pos: pos.saturating_add(inserted),
                        len,
                    }
                } else if at < pos.saturating_add(len) {
                    TextStep::Delete {
                        pos,
                        len: len.saturating_add(inserted),
                    }
                } else {
                    TextStep::Delete { pos, len }
                }
            }
            (TextStep::Delete { pos, len }, TextStep::Delete { pos: start, len: other }) => {
                let end = pos.saturating_add(len);
                let new_start = pos - removed_before(pos, start, other);
                let new_end = end - removed_before(end, start, other);
                TextStep::Delete {
                    pos: new_start,
                    len: new_end - new_start,
                }
            }
        };
        Ok(rebased.to_step())
    }
}
