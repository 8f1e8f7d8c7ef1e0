//! HTTP transport types and the `Transport` seam.
//!
//! # Design
//! Requests and responses are plain data. The request builder produces
//! `HttpRequest` values without touching the network, and operations hand
//! them to a `Transport`, which is the only place real I/O happens. Tests
//! plug in scripted transports; production uses `UreqTransport`.
//!
//! All fields use owned types (`String`, `Vec`) so values can move freely
//! between tasks.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::TransportError;

/// HTTP method for a request. This subsystem only ever issues GETs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: String) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            headers: vec![("accept".to_string(), "application/json".to_string())],
        }
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Map a non-2xx status to `TransportError::Status`.
pub(crate) fn check_status(response: &HttpResponse) -> Result<(), TransportError> {
    if (200..300).contains(&response.status) {
        return Ok(());
    }
    Err(TransportError::Status {
        status: response.status,
        body: response.body.clone(),
    })
}

pub type TransportFuture =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'static>>;

/// Executes an `HttpRequest`.
///
/// Dropping the returned future aborts the request as far as the
/// implementation allows; its eventual reply, if any, is discarded.
pub trait Transport: Send + Sync + fmt::Debug {
    fn execute(&self, request: HttpRequest) -> TransportFuture;
}

/// Blocking `ureq` agent driven from Tokio's blocking pool.
///
/// Non-2xx statuses come back as data so the operation can classify them.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }

    fn execute_blocking(agent: &ureq::Agent, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => agent.get(&request.url),
        };
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        let mut response = builder.call().map_err(classify)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.body_mut().read_to_string().map_err(classify)?;

        Ok(HttpResponse { status, headers, body })
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> TransportFuture {
        let agent = self.agent.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::execute_blocking(&agent, &request))
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?
        })
    }
}

fn classify(error: ureq::Error) -> TransportError {
    match error {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Connect(error.to_string())
        }
        ureq::Error::StatusCode(status) => TransportError::Status {
            status,
            body: String::new(),
        },
        other => TransportError::Io(other.to_string()),
    }
}
