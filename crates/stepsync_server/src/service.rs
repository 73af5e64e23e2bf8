//! The sync service: protocol operations over a step store.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use stepsync_protocol::{
    DocId, PostStepsRequest, PostStepsResponse, ResetResponse, StepsResponse,
};
use stepsync_store::{CommitOutcome, StepStore};
use tracing::{debug, info};

/// Server-side protocol surface.
///
/// The service is a linearizable ledger: it checks base versions and
/// appends, and hands conflict tails back to the client. It never rebases
/// steps itself.
pub struct SyncService<S: StepStore> {
    config: ServerConfig,
    store: S,
}

impl<S: StepStore> SyncService<S> {
    /// Creates a service over `store`.
    pub fn new(config: ServerConfig, store: S) -> Self {
        Self { config, store }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the steps committed after `since` and the current version.
    ///
    /// If `since` equals the current version the batch is empty.
    ///
    /// # Errors
    ///
    /// `OutOfRangeVersion` if `since` is past the current version.
    pub fn get_steps(&self, doc: &DocId, since: u64) -> ServerResult<StepsResponse> {
        let log = self.store.read(doc, since)?;
        debug!(%doc, since, returned = log.steps.len(), version = log.version, "get steps");
        Ok(log.into())
    }

    /// Appends steps iff `request.base_version` is the current version.
    ///
    /// On a stale base the tail since `base_version` is returned so the
    /// client can rebase and retry.
    pub fn post_steps(
        &self,
        doc: &DocId,
        request: PostStepsRequest,
    ) -> ServerResult<PostStepsResponse> {
        if request.steps.len() > self.config.max_push_batch {
            return Err(ServerError::PayloadTooLarge(format!(
                "too many steps: {} > {}",
                request.steps.len(),
                self.config.max_push_batch
            )));
        }
        let origins = request.resolved_origins().ok_or_else(|| {
            ServerError::InvalidRequest(format!(
                "originIds has {} entries for {} steps",
                request.origin_ids.as_ref().map_or(0, Vec::len),
                request.steps.len()
            ))
        })?;

        let base = request.base_version;
        let count = request.steps.len();
        match self
            .store
            .commit_if_version_matches(doc, base, request.steps, origins)?
        {
            CommitOutcome::Committed { version } => {
                info!(%doc, session = %request.session_id, count, version, "steps accepted");
                Ok(PostStepsResponse::Accepted { version })
            }
            CommitOutcome::Conflict(tail) => {
                info!(
                    %doc,
                    session = %request.session_id,
                    base,
                    current = tail.version,
                    "version conflict"
                );
                Ok(PostStepsResponse::Conflict(tail.into()))
            }
        }
    }

    /// Truncates the document to version 0. Idempotent.
    pub fn reset_document(&self, doc: &DocId) -> ServerResult<ResetResponse> {
        self.store.reset(doc)?;
        info!(%doc, "document reset");
        Ok(ResetResponse {
            message: self.config.reset_message.clone(),
        })
    }

    /// Current version of a document.
    pub fn version(&self, doc: &DocId) -> ServerResult<u64> {
        Ok(self.store.version(doc)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepsync_protocol::{SessionId, Step};
    use stepsync_store::MemoryStepStore;

    fn service() -> SyncService<MemoryStepStore> {
        SyncService::new(ServerConfig::default(), MemoryStepStore::new())
    }

    fn doc() -> DocId {
        DocId::new("doc1").unwrap()
    }

    fn step(name: &str) -> Step {
        Step::new(json!({ "name": name }))
    }

    fn push(base: u64, steps: Vec<Step>, session: &str) -> PostStepsRequest {
        PostStepsRequest::new(base, steps, SessionId::new(session))
    }

    #[test]
    fn get_steps_on_fresh_document() {
        let response = service().get_steps(&doc(), 0).unwrap();
        assert!(response.steps.is_empty());
        assert_eq!(response.version, 0);
    }

    #[test]
    fn post_tags_every_step_with_session() {
        let service = service();
        service
            .post_steps(&doc(), push(0, vec![step("a"), step("b")], "s1"))
            .unwrap();

        let response = service.get_steps(&doc(), 0).unwrap();
        assert_eq!(
            response.origin_ids,
            vec![SessionId::new("s1"), SessionId::new("s1")]
        );
    }

    #[test]
    fn explicit_origin_ids_are_stored() {
        let service = service();
        let mut request = push(0, vec![step("a"), step("b")], "relay");
        request.origin_ids = Some(vec![SessionId::new("x"), SessionId::new("y")]);
        service.post_steps(&doc(), request).unwrap();

        let response = service.get_steps(&doc(), 0).unwrap();
        assert_eq!(response.origin_ids, vec![SessionId::new("x"), SessionId::new("y")]);
    }

    #[test]
    fn mismatched_origin_ids_are_rejected() {
        let mut request = push(0, vec![step("a"), step("b")], "relay");
        request.origin_ids = Some(vec![SessionId::new("x")]);
        let err = service().post_steps(&doc(), request).unwrap_err();
        assert!(matches!(err, ServerError::InvalidRequest(_)));
    }

    #[test]
    fn conflict_returns_tail_since_base() {
        let service = service();
        service.post_steps(&doc(), push(0, vec![step("a")], "s1")).unwrap();
        service.post_steps(&doc(), push(1, vec![step("b")], "s1")).unwrap();

        let response = service
            .post_steps(&doc(), push(1, vec![step("c")], "s2"))
            .unwrap();
        match response {
            PostStepsResponse::Conflict(tail) => {
                assert_eq!(tail.steps, vec![step("b")]);
                assert_eq!(tail.version, 2);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(service.version(&doc()).unwrap(), 2);
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let service = SyncService::new(
            ServerConfig::default().with_max_push_batch(1),
            MemoryStepStore::new(),
        );
        let err = service
            .post_steps(&doc(), push(0, vec![step("a"), step("b")], "s1"))
            .unwrap_err();
        assert!(matches!(err, ServerError::PayloadTooLarge(_)));
        assert_eq!(service.version(&doc()).unwrap(), 0);
    }

    #[test]
    fn reset_document_twice() {
        let service = service();
        service.post_steps(&doc(), push(0, vec![step("a")], "s1")).unwrap();

        let first = service.reset_document(&doc()).unwrap();
        let second = service.reset_document(&doc()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.message, "Document reset successfully.");
        assert_eq!(service.version(&doc()).unwrap(), 0);
    }
}
