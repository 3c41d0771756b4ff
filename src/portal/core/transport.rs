//! Transport contract shared by the portal client and its implementations.
//!
//! The engine never talks to an HTTP library directly: every request goes
//! through [`HttpTransport`], which keeps cookies between calls so a portal
//! session behaves like a single browser.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

use super::response::PortalResponse;

/// Fully prepared request handed to a transport.
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub follow_redirects: bool,
    pub timeout: Duration,
}

impl PortalRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            follow_redirects: true,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Option<Bytes>) -> Self {
        self.body = body;
        self
    }
}

impl std::fmt::Display for PortalRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if let Some(ref body) = self.body {
            write!(f, "\n{}", String::from_utf8_lossy(body))?;
        }
        Ok(())
    }
}

/// Contract that abstracts the HTTP implementation used during a run.
///
/// Implementations must preserve cookies between calls, including cookies
/// staged through [`HttpTransport::set_cookie`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &PortalRequest) -> Result<PortalResponse, TransportError>;

    fn set_cookie(&self, url: &Url, name: &str, value: &str);

    fn cookies(&self, url: &Url) -> Vec<(String, String)>;
}

/// Network and protocol level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("too many follow-up requests")]
    TooManyRedirects,
    #[error("request cancelled")]
    Cancelled,
    #[error("unknown exception (retries={retries})")]
    NoAttempts { retries: u32 },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
}
