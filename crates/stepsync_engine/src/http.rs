//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so that any library
//! (reqwest, hyper, ureq) or an in-process loopback can carry the requests.
//! Bodies are JSON as defined by [`stepsync_protocol`].

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use stepsync_protocol::{
    paths, DocId, ErrorCode, ErrorResponse, HttpRequest, HttpResponse, HttpService,
    PostStepsAccepted, PostStepsRequest, PostStepsResponse, ResetResponse, StepsResponse,
    WireMessage,
};

/// HTTP client abstraction.
///
/// Implementations send the request to `request.target` (an absolute URL
/// built from the transport's base URL) and return whatever status the
/// server answered. `Err` is reserved for failures that produced no
/// response at all.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// HTTP-based sync transport.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the server (e.g. `"https://collab.example.com"`).
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Last transport-level error.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport-level error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn send(&self, mut request: HttpRequest) -> SyncResult<HttpResponse> {
        request.target = format!("{}{}", self.base_url, request.target);
        match self.client.send(request).await {
            Ok(response) => {
                *self.last_error.write() = None;
                Ok(response)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.clone());
                Err(SyncError::transport_retryable(e))
            }
        }
    }
}

fn decode<M: WireMessage>(response: &HttpResponse) -> SyncResult<M> {
    response
        .decode()
        .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
}

/// Maps a non-success response onto the error taxonomy.
fn error_from(response: &HttpResponse, requested: Option<u64>) -> SyncError {
    let Ok(body) = response.decode::<ErrorResponse>() else {
        return SyncError::Server {
            status: response.status,
            message: format!("HTTP {}", response.status),
        };
    };
    match (body.code, requested) {
        (ErrorCode::OutOfRangeVersion, Some(requested)) => SyncError::OutOfRangeVersion {
            requested,
            current: body.version.unwrap_or(0),
        },
        (ErrorCode::StorageUnavailable, _) => SyncError::StorageUnavailable(body.error),
        _ => SyncError::Server {
            status: response.status,
            message: body.error,
        },
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn get_steps(&self, doc: &DocId, since: u64) -> SyncResult<StepsResponse> {
        let response = self
            .send(HttpRequest::get(paths::steps_since(doc, since)))
            .await?;
        if response.status == 200 {
            decode(&response)
        } else {
            Err(error_from(&response, Some(since)))
        }
    }

    async fn post_steps(
        &self,
        doc: &DocId,
        request: &PostStepsRequest,
    ) -> SyncResult<PostStepsResponse> {
        let request = HttpRequest::post_message(paths::steps(doc), request)?;
        let response = self.send(request).await?;
        match response.status {
            200 => {
                let accepted: PostStepsAccepted = decode(&response)?;
                Ok(PostStepsResponse::Accepted {
                    version: accepted.version,
                })
            }
            409 => Ok(PostStepsResponse::Conflict(decode(&response)?)),
            _ => Err(error_from(&response, None)),
        }
    }

    async fn reset(&self, doc: &DocId) -> SyncResult<ResetResponse> {
        let response = self
            .send(HttpRequest::post(paths::reset(doc), Vec::new()))
            .await?;
        if response.status == 200 {
            decode(&response)
        } else {
            Err(error_from(&response, None))
        }
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead. Can be switched
/// offline to simulate an unreachable server.
pub struct LoopbackClient<S: HttpService> {
    server: S,
    offline: AtomicBool,
}

impl<S: HttpService> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            offline: AtomicBool::new(false),
        }
    }

    /// Simulates losing (or regaining) the network.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

/// Drops `scheme://host` from an absolute URL.
fn strip_origin(target: &str) -> &str {
    match target.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("/", |i| &rest[i..]),
        None => target,
    }
}

#[async_trait]
impl<S: HttpService> HttpClient for LoopbackClient<S> {
    async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, String> {
        if self.offline.load(Ordering::SeqCst) {
            return Err("connection refused".to_string());
        }
        request.target = strip_origin(&request.target).to_string();
        Ok(self.server.call(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepsync_protocol::{SessionId, Step};
    use stepsync_server::{ServerConfig, SyncServer};
    use std::sync::Arc;

    fn doc() -> DocId {
        DocId::new("doc1").unwrap()
    }

    fn transport() -> (Arc<SyncServer>, HttpTransport<LoopbackClient<Arc<SyncServer>>>) {
        let server = Arc::new(SyncServer::new(ServerConfig::default()));
        let client = LoopbackClient::new(Arc::clone(&server));
        (server, HttpTransport::new("http://collab.test/", client))
    }

    fn push(base: u64, who: &str) -> PostStepsRequest {
        PostStepsRequest::new(base, vec![Step::new(json!({ "n": base }))], SessionId::new(who))
    }

    #[test]
    fn origin_is_stripped() {
        assert_eq!(strip_origin("http://host:80/collab/a/steps?version=1"), "/collab/a/steps?version=1");
        assert_eq!(strip_origin("https://host"), "/");
        assert_eq!(strip_origin("/health"), "/health");
    }

    #[tokio::test]
    async fn push_conflict_and_fetch() {
        let (_server, transport) = transport();
        assert_eq!(transport.base_url(), "http://collab.test");

        let accepted = transport.post_steps(&doc(), &push(0, "a")).await.unwrap();
        assert_eq!(accepted, PostStepsResponse::Accepted { version: 1 });

        match transport.post_steps(&doc(), &push(0, "b")).await.unwrap() {
            PostStepsResponse::Conflict(tail) => {
                assert_eq!(tail.version, 1);
                assert_eq!(tail.origin_ids, vec![SessionId::new("a")]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        let fetched = transport.get_steps(&doc(), 0).await.unwrap();
        assert_eq!(fetched.steps.len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_maps_to_error() {
        let (_server, transport) = transport();
        transport.post_steps(&doc(), &push(0, "a")).await.unwrap();

        let err = transport.get_steps(&doc(), 4).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::OutOfRangeVersion {
                requested: 4,
                current: 1
            }
        ));
    }

    #[tokio::test]
    async fn offline_is_retryable() {
        let server = Arc::new(SyncServer::new(ServerConfig::default()));
        let client = LoopbackClient::new(Arc::clone(&server));
        client.set_offline(true);
        let transport = HttpTransport::new("http://collab.test", client);

        let err = transport.get_steps(&doc(), 0).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.last_error().as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn reset_round_trip() {
        let (server, transport) = transport();
        transport.post_steps(&doc(), &push(0, "a")).await.unwrap();
        let reset = transport.reset(&doc()).await.unwrap();
        assert_eq!(reset, ResetResponse::default());
        assert_eq!(server.document_version(&doc()).unwrap(), 0);
    }
}
