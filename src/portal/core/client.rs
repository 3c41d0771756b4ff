//! Stateful HTTP client used by every backend.
//!
//! [`PortalClient`] wraps an [`HttpTransport`] with browser-like default
//! headers, a follow-redirects switch, per-request retries, optional random
//! delays and response interceptors. All waiting observes the client's
//! cancellation token.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use url::Url;
use url::form_urlencoded;

use super::response::PortalResponse;
use super::retry::{RETRY_BACKOFF, with_retries};
use super::transport::{HttpTransport, PortalRequest, TransportError};
use crate::config::AuthConfig;
use crate::portal::user_agents::Randomizer;

pub const HEADER_ACCEPT: &str = "Accept";
pub const HEADER_ACCEPT_LANGUAGE: &str = "Accept-Language";
pub const HEADER_USER_AGENT: &str = "User-Agent";
pub const HEADER_REFERER: &str = "Referer";
pub const HEADER_CSRF: &str = "X-CSRF-Token";
pub const HEADER_LOCATION: &str = "Location";
pub const HEADER_UPGRADE_INSECURE_REQUESTS: &str = "Upgrade-Insecure-Requests";
pub const HEADER_DO_NOT_TRACK: &str = "DNT";

pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=UTF-8";

/// Hook invoked after every response whose request URL matches its pattern.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, headers: &mut HeaderMap, request: &PortalRequest, response: &PortalResponse);
}

/// Interceptor bound to the URLs it applies to.
#[derive(Clone)]
pub struct RegisteredInterceptor {
    pattern: Regex,
    hook: Arc<dyn Interceptor>,
}

impl RegisteredInterceptor {
    /// The pattern must match the whole request URL.
    pub fn new(pattern: &Regex, hook: Arc<dyn Interceptor>) -> Self {
        let anchored = Regex::new(&format!("^(?:{})$", pattern.as_str()))
            .unwrap_or_else(|_| pattern.clone());
        Self {
            pattern: anchored,
            hook,
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl fmt::Debug for RegisteredInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredInterceptor")
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

pub struct PortalClient {
    transport: Arc<dyn HttpTransport>,
    headers: HeaderMap,
    follow_redirects: bool,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
    delays_enabled: bool,
    random: Randomizer,
    interceptors: Vec<RegisteredInterceptor>,
    cancel: CancellationToken,
}

impl PortalClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            headers: HeaderMap::new(),
            follow_redirects: true,
            timeout: Duration::from_secs(5),
            retries: 3,
            backoff: RETRY_BACKOFF,
            delays_enabled: false,
            random: Randomizer::default(),
            interceptors: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_randomizer(mut self, random: Randomizer) -> Self {
        self.random = random;
        self
    }

    /// Apply run configuration and the browser-like default headers.
    pub fn configure(&mut self, config: &AuthConfig) {
        self.timeout = config.timeout_duration();
        self.retries = config.retry_count;
        self.backoff = config.retry_backoff();
        self.delays_enabled = config.delay_always;
        self.random.set_delay(config.random_delay());

        let profile = self.random.profile();
        let defaults = [
            (HEADER_USER_AGENT, profile.user_agent.as_str()),
            (HEADER_ACCEPT, profile.accept.as_str()),
            (HEADER_ACCEPT_LANGUAGE, profile.accept_language.as_str()),
            (HEADER_UPGRADE_INSECURE_REQUESTS, "1"),
            (HEADER_DO_NOT_TRACK, "1"),
        ];
        for (name, value) in defaults {
            if let Err(err) = self.set_header(name, value) {
                log::warn!("skipping default header: {err}");
            }
        }
    }

    pub fn get(&mut self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, url.into())
    }

    /// POST whose body is built from `.form(..)` parameters.
    pub fn post_form(&mut self, url: impl Into<String>) -> RequestBuilder<'_> {
        let mut builder = RequestBuilder::new(self, Method::POST, url.into());
        builder.content_type = Some(CONTENT_TYPE_FORM.to_string());
        builder.body = Some(Bytes::new());
        builder
    }

    pub fn post_body(
        &mut self,
        url: impl Into<String>,
        body: impl Into<Bytes>,
        content_type: &str,
    ) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, url.into()).body(body, content_type)
    }

    /// GET the probe URL with redirect following disabled for this call only.
    pub async fn probe(&mut self, url: &str) -> Result<PortalResponse, TransportError> {
        let previous = self.follow_redirects;
        self.follow_redirects = false;
        let result = self.get(url).retry().send().await;
        self.follow_redirects = previous;
        result
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn reset_headers(&mut self) {
        self.headers.clear();
    }

    pub fn set_cookie(&self, url: &str, name: &str, value: &str) -> Result<(), TransportError> {
        let url = Url::parse(url).map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        self.transport.set_cookie(&url, name, value);
        Ok(())
    }

    pub fn cookies(&self, url: &str) -> Vec<(String, String)> {
        match Url::parse(url) {
            Ok(url) => self.transport.cookies(&url),
            Err(_) => Vec::new(),
        }
    }

    pub fn set_follow_redirects(&mut self, follow: bool) {
        self.follow_redirects = follow;
    }

    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_retries(&mut self, retries: u32) {
        self.retries = retries;
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn set_backoff(&mut self, backoff: Duration) {
        self.backoff = backoff;
    }

    pub fn set_delays_enabled(&mut self, enabled: bool) {
        self.delays_enabled = enabled;
    }

    pub fn randomizer(&mut self) -> &mut Randomizer {
        &mut self.random
    }

    pub fn add_interceptor(&mut self, interceptor: RegisteredInterceptor) {
        log::debug!("interceptor registered: {}", interceptor.pattern());
        self.interceptors.push(interceptor);
    }

    pub fn clear_interceptors(&mut self) {
        self.interceptors.clear();
    }

    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn execute(
        &mut self,
        request: PortalRequest,
        tries: u32,
    ) -> Result<PortalResponse, TransportError> {
        log::debug!(">>> {request}");

        let transport = &self.transport;
        let cancel = &self.cancel;
        let request_ref = &request;
        let delay = self.delays_enabled.then(|| self.random.delay());

        let response = with_retries(tries, cancel, self.backoff, move |_| async move {
            if let Some(delay) = delay
                && !delay.wait(cancel).await
            {
                return Err(TransportError::Cancelled);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                result = transport.execute(request_ref) => result,
            }
        })
        .await?;

        log::debug!("<<< {}", response.header_dump());

        for interceptor in &self.interceptors {
            if interceptor.matches(request.url.as_str()) {
                interceptor
                    .hook
                    .intercept(&mut self.headers, &request, &response);
            }
        }

        Ok(response)
    }
}

impl fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalClient")
            .field("follow_redirects", &self.follow_redirects)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

/// Single request under construction.
pub struct RequestBuilder<'a> {
    client: &'a mut PortalClient,
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    body: Option<Bytes>,
    content_type: Option<String>,
    tries: u32,
}

impl<'a> RequestBuilder<'a> {
    fn new(client: &'a mut PortalClient, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            query: Vec::new(),
            form: Vec::new(),
            body: None,
            content_type: None,
            tries: 1,
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>, content_type: &str) -> Self {
        self.body = Some(body.into());
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Use the client's configured retry count.
    pub fn retry(mut self) -> Self {
        self.tries = self.client.retries;
        self
    }

    pub fn tries(mut self, tries: u32) -> Self {
        self.tries = tries;
        self
    }

    pub async fn send(self) -> Result<PortalResponse, TransportError> {
        let mut url =
            Url::parse(&self.url).map_err(|err| TransportError::InvalidUrl(format!("{}: {err}", self.url)))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }

        let body = if self.form.is_empty() {
            self.body
        } else {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.form)
                .finish();
            Some(Bytes::from(encoded))
        };

        let mut headers = self.client.headers.clone();
        if let Some(content_type) = self.content_type.filter(|_| body.is_some()) {
            let value = HeaderValue::from_str(&content_type)
                .map_err(|_| TransportError::InvalidHeader(CONTENT_TYPE.to_string()))?;
            headers.insert(CONTENT_TYPE, value);
        }

        let mut request = PortalRequest::new(self.method, url)
            .with_headers(headers)
            .with_body(body);
        request.follow_redirects = self.client.follow_redirects;
        request.timeout = self.client.timeout;

        self.client.execute(request, self.tries).await
    }
}
