//! Main sync server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use stepsync_protocol::{
    DocId, HttpRequest, HttpResponse, HttpService, PostStepsRequest, PostStepsResponse,
    ResetResponse, StepsResponse,
};
use stepsync_store::{MemoryStepStore, StepStore};
use std::sync::Arc;

/// The sync server.
///
/// Owns a step store and answers the collab endpoints over it. The server
/// is transport-agnostic: mount [`SyncServer::handle`] behind any HTTP
/// framework, or call it in-process through [`HttpService`].
///
/// # Example
///
/// ```
/// use stepsync_protocol::{HttpRequest, HttpService};
/// use stepsync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let response = server.call(HttpRequest::get("/collab/doc1/steps?version=0"));
/// assert_eq!(response.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a server backed by an in-memory store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStepStore::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn StepStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles an HTTP-shaped request.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self.handler.handle(request)
    }

    /// `GetSteps` without the HTTP layer.
    pub fn get_steps(&self, doc: &DocId, since: u64) -> ServerResult<StepsResponse> {
        self.context.service.get_steps(doc, since)
    }

    /// `PostSteps` without the HTTP layer.
    pub fn post_steps(
        &self,
        doc: &DocId,
        request: PostStepsRequest,
    ) -> ServerResult<PostStepsResponse> {
        self.context.service.post_steps(doc, request)
    }

    /// `ResetDocument` without the HTTP layer.
    pub fn reset_document(&self, doc: &DocId) -> ServerResult<ResetResponse> {
        self.context.service.reset_document(doc)
    }

    /// Returns the current version of a document.
    pub fn document_version(&self, doc: &DocId) -> ServerResult<u64> {
        self.context.service.version(doc)
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        self.context.config()
    }
}

impl HttpService for SyncServer {
    fn call(&self, request: HttpRequest) -> HttpResponse {
        self.handle(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepsync_protocol::{SessionId, Step};
    use stepsync_store::FileStepStore;

    fn doc() -> DocId {
        DocId::new("doc1").unwrap()
    }

    #[test]
    fn server_lifecycle() {
        let server = SyncServer::new(ServerConfig::default());
        assert_eq!(server.document_version(&doc()).unwrap(), 0);
        assert_eq!(server.config().max_push_batch, 100);
    }

    #[test]
    fn file_backed_server_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Arc::new(FileStepStore::open(dir.path()).unwrap());
            let server = SyncServer::with_store(ServerConfig::default(), store);
            let push = PostStepsRequest::new(
                0,
                vec![Step::new(json!({ "s": 1 }))],
                SessionId::new("a"),
            );
            assert!(server.post_steps(&doc(), push).unwrap().is_accepted());
        }

        let store = Arc::new(FileStepStore::open(dir.path()).unwrap());
        let server = SyncServer::with_store(ServerConfig::default(), store);
        assert_eq!(server.document_version(&doc()).unwrap(), 1);
        let steps = server.get_steps(&doc(), 0).unwrap();
        assert_eq!(steps.origin_ids, vec![SessionId::new("a")]);
    }
}
