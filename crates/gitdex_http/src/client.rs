//! HTTP client abstraction.
//!
//! The actual HTTP client is abstracted via a trait so that different
//! implementations (reqwest, hyper, ureq, a loopback for tests) can be
//! plugged in without this workspace depending on any of them.

use crate::error::{HttpError, HttpResult};
use serde::de::DeserializeOwned;
use std::fmt;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Returns the method name as sent on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL including any query string.
    pub url: String,
    /// Optional body (JSON for every caller in this workspace).
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a request without a body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
        }
    }

    /// Creates a request with a JSON body.
    pub fn json(method: Method, url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self {
            method,
            url: url.into(),
            body: Some(body.to_string().into_bytes()),
        }
    }

    /// Returns the path and query part of the URL (everything after the
    /// authority), or the whole URL if it has no scheme.
    pub fn path(&self) -> &str {
        match self.url.split_once("://") {
            Some((_, rest)) => rest.find('/').map_or("/", |i| &rest[i..]),
            None => &self.url,
        }
    }
}

/// A response as returned by an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns `self` if successful, otherwise a [`HttpError::Status`].
    pub fn error_for_status(self) -> HttpResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HttpError::Status {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> HttpResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Calls are
/// blocking. Non-2xx statuses are returned as responses, not errors; an
/// `Err` means the request never produced a response.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        (**self).send(request)
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a request addressed to `request.path()`.
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

/// A loopback HTTP client that routes requests directly to a server value.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        Ok(self.server.handle(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoServer {
        seen: Mutex<Vec<String>>,
    }

    impl LoopbackServer for EchoServer {
        fn handle(&self, request: &HttpRequest) -> HttpResponse {
            self.seen.lock().unwrap().push(request.path().to_string());
            match request.method {
                Method::Get => HttpResponse::json_body(200, &serde_json::json!({"ok": true})),
                _ => HttpResponse::new(404, "missing"),
            }
        }
    }

    #[test]
    fn request_path_strips_authority() {
        let req = HttpRequest::new(Method::Get, "http://localhost:9200/idx/_doc/1?refresh=true");
        assert_eq!(req.path(), "/idx/_doc/1?refresh=true");

        let req = HttpRequest::new(Method::Get, "http://localhost:9200");
        assert_eq!(req.path(), "/");

        let req = HttpRequest::new(Method::Get, "/already/a/path");
        assert_eq!(req.path(), "/already/a/path");
    }

    #[test]
    fn loopback_routes_to_server() {
        let client = LoopbackClient::new(EchoServer {
            seen: Mutex::new(Vec::new()),
        });
        let resp = client
            .send(HttpRequest::new(Method::Get, "http://example.org/a/b"))
            .unwrap();
        assert!(resp.is_success());
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(client.server().seen.lock().unwrap().as_slice(), ["/a/b"]);
    }

    #[test]
    fn error_for_status_keeps_body() {
        let err = HttpResponse::new(404, "missing").error_for_status().unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 404, ref body } if body == "missing"));
    }
}
