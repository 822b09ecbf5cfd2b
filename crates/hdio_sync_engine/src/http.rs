//! HTTP client abstraction.
//!
//! The transport client talks to the server through [`HttpClient`], so the
//! actual HTTP stack can be swapped out. [`ReqwestClient`] is the production
//! implementation; [`MockHttpClient`] scripts responses for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL, query included.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a request with no headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Returns the first value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Canonical reason phrase for the status.
    pub status_text: String,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a 200 response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            status_text: "OK".into(),
            body: body.into(),
        }
    }

    /// Creates a response with an arbitrary status.
    pub fn with_status(
        status: u16,
        status_text: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only when no response was received; non-2xx
/// responses are returned as `Ok` and interpreted by the caller.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| e.to_string())?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body: body.to_vec(),
        })
    }
}

/// A scripted [`HttpClient`] for tests.
///
/// Responses are matched by URL fragment. One-shot responses queued with
/// [`MockHttpClient::push_response`] are used before the standing response
/// set with [`MockHttpClient::set_response`]. Requests to a held fragment
/// are recorded immediately but answered only after
/// [`MockHttpClient::release`].
#[derive(Debug, Default)]
pub struct MockHttpClient {
    standing: Mutex<Vec<(String, HttpResponse)>>,
    queued: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    gates: Mutex<Vec<(String, watch::Sender<bool>)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    /// Creates a client with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response returned for every URL containing `fragment`.
    pub fn set_response(&self, fragment: &str, response: HttpResponse) {
        let mut standing = self.standing.lock();
        standing.retain(|(f, _)| f != fragment);
        standing.push((fragment.to_string(), response));
    }

    /// Queues a response for the next URL containing `fragment`.
    pub fn push_response(&self, fragment: &str, response: HttpResponse) {
        self.queued
            .lock()
            .entry(fragment.to_string())
            .or_default()
            .push_back(response);
    }

    /// Holds requests to URLs containing `fragment` until released.
    pub fn hold(&self, fragment: &str) {
        let (tx, _) = watch::channel(false);
        self.gates.lock().push((fragment.to_string(), tx));
    }

    /// Releases held requests to URLs containing `fragment`.
    pub fn release(&self, fragment: &str) {
        for (f, tx) in self.gates.lock().iter() {
            if f == fragment {
                tx.send_replace(true);
            }
        }
    }

    /// All requests sent so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests whose URL contains `fragment`.
    pub fn requests_to(&self, fragment: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .cloned()
            .collect()
    }

    fn scripted(&self, url: &str) -> Option<HttpResponse> {
        let mut queued = self.queued.lock();
        for (fragment, queue) in queued.iter_mut() {
            if url.contains(fragment.as_str()) {
                if let Some(response) = queue.pop_front() {
                    return Some(response);
                }
            }
        }
        drop(queued);
        self.standing
            .lock()
            .iter()
            .find(|(f, _)| url.contains(f.as_str()))
            .map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().push(request.clone());

        let gate = self
            .gates
            .lock()
            .iter()
            .find(|(f, _)| request.url.contains(f.as_str()))
            .map(|(_, tx)| tx.subscribe());
        if let Some(mut gate) = gate {
            gate.wait_for(|open| *open)
                .await
                .map_err(|_| "gate dropped".to_string())?;
        }

        self.scripted(&request.url)
            .ok_or_else(|| format!("no mock response for {}", request.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn request_builder() {
        let request = HttpRequest::new(Method::Post, "https://h/files")
            .with_header("Authorization", "Bearer s")
            .with_body(vec![1, 2, 3]);
        assert_eq!(request.header("authorization"), Some("Bearer s"));
        assert_eq!(request.header("session"), None);
        assert_eq!(request.body, vec![1, 2, 3]);
        assert_eq!(request.method.to_string(), "POST");
    }

    #[test]
    fn response_helpers() {
        assert!(HttpResponse::ok("token").is_success());
        assert_eq!(HttpResponse::ok("token").text(), "token");
        assert!(!HttpResponse::with_status(404, "Not Found", "").is_success());
    }

    #[tokio::test]
    async fn mock_prefers_queued_responses() {
        let mock = MockHttpClient::new();
        mock.set_response("/sessions", HttpResponse::ok("standing"));
        mock.push_response("/sessions", HttpResponse::ok("once"));

        let request = HttpRequest::new(Method::Get, "https://h/sessions");
        assert_eq!(mock.send(request.clone()).await.unwrap().text(), "once");
        assert_eq!(mock.send(request).await.unwrap().text(), "standing");
        assert_eq!(mock.requests_to("/sessions").len(), 2);
    }

    #[tokio::test]
    async fn mock_without_response_errors() {
        let mock = MockHttpClient::new();
        let result = mock
            .send(HttpRequest::new(Method::Get, "https://h/unknown"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mock_holds_until_released() {
        let mock = Arc::new(MockHttpClient::new());
        mock.set_response("/sessions", HttpResponse::ok("token"));
        mock.hold("/sessions");

        let task = {
            let mock = Arc::clone(&mock);
            tokio::spawn(async move {
                mock.send(HttpRequest::new(Method::Get, "https://h/sessions"))
                    .await
            })
        };

        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        mock.release("/sessions");
        assert_eq!(task.await.unwrap().unwrap().text(), "token");
    }
}
