//! Per-document client session state.
//!
//! A session holds two documents: the *confirmed* document, which is an
//! exact replay of the server log up to `confirmed_version`, and the local
//! document, which is the confirmed document plus every unconfirmed local
//! step. Every transition computes on copies and only commits once all
//! apply/transform calls have succeeded, so a failed merge leaves the
//! session exactly as it was.

use stepsync_protocol::{PostStepsRequest, SessionId, Step, StepTransform, TransformError};

/// What a call to [`ClientSession::receive`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Received {
    /// Foreign steps applied (and rebased over).
    pub applied: usize,
    /// Own steps found in the log and moved out of the unconfirmed buffer.
    pub acknowledged: usize,
}

/// Client-side state for one open document.
pub struct ClientSession<T: StepTransform> {
    transform: T,
    session_id: SessionId,
    confirmed_version: u64,
    confirmed_doc: T::Doc,
    unconfirmed: Vec<Step>,
    doc: T::Doc,
}

impl<T: StepTransform> ClientSession<T> {
    /// Opens an empty document at version 0.
    pub fn new(transform: T, session_id: SessionId) -> Self {
        Self {
            transform,
            session_id,
            confirmed_version: 0,
            confirmed_doc: T::Doc::default(),
            unconfirmed: Vec::new(),
            doc: T::Doc::default(),
        }
    }

    /// This session's origin id.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Last server version fully incorporated.
    pub fn confirmed_version(&self) -> u64 {
        self.confirmed_version
    }

    /// Local document: confirmed state plus unconfirmed steps.
    pub fn document(&self) -> &T::Doc {
        &self.doc
    }

    /// Replay of the server log up to [`confirmed_version`](Self::confirmed_version).
    pub fn confirmed_document(&self) -> &T::Doc {
        &self.confirmed_doc
    }

    /// Local steps not yet acknowledged by the server, oldest first.
    pub fn unconfirmed(&self) -> &[Step] {
        &self.unconfirmed
    }

    /// Applies a local edit and buffers it for the next push.
    pub fn apply_local(&mut self, step: Step) -> Result<(), TransformError> {
        self.doc = self.transform.apply(&self.doc, &step)?;
        self.unconfirmed.push(step);
        Ok(())
    }

    /// Incorporates a log tail that starts at `confirmed_version` and ends
    /// at `version`.
    ///
    /// Leading steps tagged with this session's id that equal the head of
    /// the unconfirmed buffer are our own earlier pushes whose answer never
    /// arrived; they are acknowledged rather than applied a second time.
    /// Every other step is applied to the confirmed document and the
    /// unconfirmed buffer is rebased over it.
    pub fn receive(
        &mut self,
        steps: &[Step],
        origins: &[SessionId],
        version: u64,
    ) -> Result<Received, TransformError> {
        let mut confirmed = self.confirmed_doc.clone();
        let mut pending = self.unconfirmed.clone();
        let mut received = Received::default();

        for (i, step) in steps.iter().enumerate() {
            confirmed = self.transform.apply(&confirmed, step)?;

            let own = origins.get(i) == Some(&self.session_id);
            if own && received.applied == 0 && pending.first() == Some(step) {
                pending.remove(0);
                received.acknowledged += 1;
                continue;
            }

            let mut incoming = step.clone();
            for local in pending.iter_mut() {
                let rebased = self.transform.transform(local, &incoming)?;
                incoming = self.transform.transform(&incoming, local)?;
                *local = rebased;
            }
            received.applied += 1;
        }

        let doc = self.transform.apply_all(&confirmed, &pending)?;

        self.confirmed_doc = confirmed;
        self.unconfirmed = pending;
        self.doc = doc;
        self.confirmed_version = version;
        Ok(received)
    }

    /// Marks the first `count` unconfirmed steps as committed at `version`.
    pub fn confirm(&mut self, count: usize, version: u64) -> Result<(), TransformError> {
        let count = count.min(self.unconfirmed.len());
        let confirmed = self
            .transform
            .apply_all(&self.confirmed_doc, &self.unconfirmed[..count])?;

        self.confirmed_doc = confirmed;
        self.unconfirmed.drain(..count);
        self.confirmed_version = version;
        Ok(())
    }

    /// The push request for the current unconfirmed buffer, if any.
    pub fn sendable(&self) -> Option<PostStepsRequest> {
        if self.unconfirmed.is_empty() {
            return None;
        }
        Some(PostStepsRequest::new(
            self.confirmed_version,
            self.unconfirmed.clone(),
            self.session_id.clone(),
        ))
    }

    /// Drops everything: empty document, version 0, no unconfirmed steps.
    pub fn reset(&mut self) {
        self.confirmed_version = 0;
        self.confirmed_doc = T::Doc::default();
        self.unconfirmed.clear();
        self.doc = T::Doc::default();
    }
}
