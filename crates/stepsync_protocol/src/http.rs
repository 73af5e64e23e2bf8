//! HTTP-shaped request and response values.
//!
//! The protocol is defined over HTTP, but neither side of this workspace
//! depends on an HTTP framework. Transports build [`HttpRequest`] values,
//! servers answer them with [`HttpResponse`] values, and whatever moves the
//! bytes in between only has to implement [`HttpService`] (or the client-side
//! equivalent in the engine crate).

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::DocId;
use crate::messages::WireMessage;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
}

impl Method {
    /// Method name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A request addressed to a stepsync server.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Path plus optional query, e.g. `/collab/doc1/steps?version=3`.
    pub target: String,
    /// Request body (JSON), empty for GET.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a GET request.
    pub fn get(target: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            target: target.into(),
            body: Vec::new(),
        }
    }

    /// Creates a POST request with a raw body.
    pub fn post(target: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            target: target.into(),
            body,
        }
    }

    /// Creates a POST request with an encoded message body.
    pub fn post_message<M: WireMessage>(
        target: impl Into<String>,
        message: &M,
    ) -> ProtocolResult<Self> {
        Ok(Self::post(target, message.encode()?))
    }

    /// The path component of the target.
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    /// Looks up a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.target.split_once('?')?;
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }
}

/// A response from a stepsync server.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body (JSON).
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response from a status and an encodable message.
    ///
    /// Falls back to a bare 500 if the message cannot be encoded.
    pub fn json<M: WireMessage>(status: u16, message: &M) -> Self {
        match message.encode() {
            Ok(body) => Self { status, body },
            Err(_) => Self {
                status: 500,
                body: br#"{"error":"failed to encode response","code":"internal"}"#.to_vec(),
            },
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as `M`.
    pub fn decode<M: WireMessage>(&self) -> ProtocolResult<M> {
        M::decode(&self.body)
    }
}

/// Anything that can answer stepsync HTTP requests in-process.
pub trait HttpService: Send + Sync {
    /// Handles one request.
    fn call(&self, request: HttpRequest) -> HttpResponse;
}

impl<S: HttpService + ?Sized> HttpService for std::sync::Arc<S> {
    fn call(&self, request: HttpRequest) -> HttpResponse {
        (**self).call(request)
    }
}

/// A request target resolved to a protocol endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/health`.
    Health,
    /// `/collab/{docId}/steps`.
    Steps(DocId),
    /// `/collab/{docId}/reset`.
    Reset(DocId),
}

impl Route {
    /// Resolves a request path. Returns `Ok(None)` for unknown paths.
    pub fn resolve(path: &str) -> ProtocolResult<Option<Route>> {
        if path == paths::HEALTH {
            return Ok(Some(Route::Health));
        }
        let Some(rest) = path.strip_prefix("/collab/") else {
            return Ok(None);
        };
        let Some((doc, endpoint)) = rest.split_once('/') else {
            return Ok(None);
        };
        let route: fn(DocId) -> Route = match endpoint {
            "steps" => Route::Steps,
            "reset" => Route::Reset,
            _ => return Ok(None),
        };
        Ok(Some(route(DocId::new(doc)?)))
    }
}

/// Builders for request targets.
pub mod paths {
    use super::*;

    /// Health check path.
    pub const HEALTH: &str = "/health";

    /// `/collab/{docId}/steps`.
    pub fn steps(doc: &DocId) -> String {
        format!("/collab/{doc}/steps")
    }

    /// `/collab/{docId}/steps?version={since}`.
    pub fn steps_since(doc: &DocId, since: u64) -> String {
        format!("/collab/{doc}/steps?version={since}")
    }

    /// `/collab/{docId}/reset`.
    pub fn reset(doc: &DocId) -> String {
        format!("/collab/{doc}/reset")
    }

    /// Parses the `version` query parameter; absent means 0.
    pub fn parse_version(raw: Option<&str>) -> ProtocolResult<u64> {
        match raw {
            None | Some("") => Ok(0),
            Some(value) => value.parse().map_err(|_| {
                ProtocolError::invalid_request(format!("version must be an unsigned integer, got {value:?}"))
            }),
        }
    }
}
