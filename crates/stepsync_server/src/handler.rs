//! Request handlers for the collab endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::service::SyncService;
use stepsync_protocol::{
    paths, HealthResponse, HttpRequest, HttpResponse, Method, PostStepsAccepted,
    PostStepsRequest, PostStepsResponse, Route, WireMessage,
};
use stepsync_store::StepStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Context for request handling.
pub struct HandlerContext {
    /// Service shared across all handlers.
    pub service: SyncService<Arc<dyn StepStore>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<dyn StepStore>) -> Self {
        Self {
            service: SyncService::new(config, store),
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        self.service.config()
    }
}

/// Maps HTTP-shaped requests onto the sync service.
///
/// Every outcome, including malformed input and storage faults, is turned
/// into a response; the handler never panics on client input.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles one request.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    warn!(method = request.method.as_str(), path = request.path(), error = %err, "request failed");
                } else {
                    debug!(method = request.method.as_str(), path = request.path(), error = %err, "request rejected");
                }
                HttpResponse::json(err.status_code(), &err.to_response())
            }
        }
    }

    fn dispatch(&self, request: &HttpRequest) -> ServerResult<HttpResponse> {
        let limit = self.context.config().max_request_bytes;
        if request.body.len() > limit {
            return Err(ServerError::PayloadTooLarge(format!(
                "request body is {} bytes, limit is {limit}",
                request.body.len()
            )));
        }

        let path = request.path();
        let route = Route::resolve(path)?
            .ok_or_else(|| ServerError::NotFound(path.to_string()))?;
        let service = &self.context.service;

        match (route, request.method) {
            (Route::Health, Method::Get) => Ok(HttpResponse::json(200, &HealthResponse::ok())),
            (Route::Steps(doc), Method::Get) => {
                let since = paths::parse_version(request.query_param("version"))?;
                let steps = service.get_steps(&doc, since)?;
                Ok(HttpResponse::json(200, &steps))
            }
            (Route::Steps(doc), Method::Post) => {
                let push = PostStepsRequest::decode(&request.body)?;
                match service.post_steps(&doc, push)? {
                    PostStepsResponse::Accepted { version } => {
                        Ok(HttpResponse::json(200, &PostStepsAccepted { version }))
                    }
                    PostStepsResponse::Conflict(tail) => {
                        Ok(HttpResponse::json(409, &tail.into_conflict()))
                    }
                }
            }
            (Route::Reset(doc), Method::Post) => {
                let reset = service.reset_document(&doc)?;
                Ok(HttpResponse::json(200, &reset))
            }
            (_, method) => Err(ServerError::MethodNotAllowed {
                method: method.as_str(),
                path: path.to_string(),
            }),
        }
    }
}
