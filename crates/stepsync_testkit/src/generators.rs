//! Property-based test generators using proptest.
//!
//! Positions and lengths are kept small so that random edits collide
//! often, which is where rebasing gets interesting.

use crate::text::TextStep;
use proptest::prelude::*;
use stepsync_protocol::{DocId, Step};

/// Strategy for valid document ids.
pub fn doc_id_strategy() -> impl Strategy<Value = DocId> {
    prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9_.-]{0,31}")
        .expect("Invalid regex")
        .prop_map(|id| DocId::new(id).expect("regex only yields valid ids"))
}

/// Strategy for a single plain-text edit.
pub fn text_step_strategy() -> impl Strategy<Value = TextStep> {
    prop_oneof![
        3 => (0usize..12, "[a-z]{1,3}").prop_map(|(pos, text)| TextStep::Insert { pos, text }),
        1 => (0usize..12, 1usize..4).prop_map(|(pos, len)| TextStep::Delete { pos, len }),
    ]
}

/// Strategy for a plain-text edit encoded as a protocol step.
pub fn step_strategy() -> impl Strategy<Value = Step> {
    text_step_strategy().prop_map(|step| step.to_step())
}

/// One action in a multi-session schedule.
#[derive(Debug, Clone)]
pub enum SessionAction {
    /// Session `session` makes a local edit.
    Edit {
        /// Session index.
        session: usize,
        /// The edit.
        step: TextStep,
    },
    /// Session `session` runs one sync cycle.
    Sync {
        /// Session index.
        session: usize,
    },
    /// Two sessions run cycles concurrently: both fetch before either
    /// pushes, so the second push lands on a stale base version.
    Race {
        /// Session index.
        first: usize,
        /// Session index, distinct from `first` when there are two or more
        /// sessions.
        second: usize,
    },
}

/// Strategy for interleaved edit/sync schedules across `sessions` clients.
pub fn schedule_strategy(
    sessions: usize,
    max_actions: usize,
) -> impl Strategy<Value = Vec<SessionAction>> {
    let action = prop_oneof![
        2 => (0..sessions, text_step_strategy())
            .prop_map(|(session, step)| SessionAction::Edit { session, step }),
        1 => (0..sessions).prop_map(|session| SessionAction::Sync { session }),
        1 => (0..sessions, 1..sessions.max(2)).prop_map(move |(first, offset)| {
            SessionAction::Race {
                first,
                second: (first + offset) % sessions,
            }
        }),
    ];
    prop::collection::vec(action, 1..max_actions)
}
