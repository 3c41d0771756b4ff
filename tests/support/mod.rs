//! Scripted transport used by the scenario tests.
//!
//! Routes are keyed by method and URL prefix; the longest matching prefix
//! wins. Each route holds a queue of replies and the last one repeats.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::Method;
use metrowifi_rs::{
    AuthConfig, Authenticator, HttpTransport, MemoryHandler, PortalRequest, PortalResponse,
    TransportError,
};
use url::Url;

pub const PROBE_URL: &str = "http://connectivitycheck.gstatic.com/generate_204";

#[derive(Debug, Clone)]
pub enum Reply {
    Page {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
    Fail(TransportError),
    /// Never answers; only cancellation ends the request.
    Hang,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Reply::Page {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Reply::Page {
            status: 200,
            headers: vec![("content-type".into(), "text/html".into())],
            body: body.into(),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Reply::Page {
            status: 200,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.into(),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Reply::Page {
            status: 302,
            headers: vec![("location".into(), location.into())],
            body: String::new(),
        }
    }

    pub fn with_body(self, text: impl Into<String>) -> Self {
        match self {
            Reply::Page {
                status, headers, ..
            } => Reply::Page {
                status,
                headers,
                body: text.into(),
            },
            fail => fail,
        }
    }
}

struct Route {
    method: Method,
    prefix: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<PortalRequest>>,
    cookies: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, prefix: &str, replies: Vec<Reply>) -> &Self {
        self.routes.lock().unwrap().push(Route {
            method,
            prefix: prefix.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn get(&self, prefix: &str, replies: Vec<Reply>) -> &Self {
        self.on(Method::GET, prefix, replies)
    }

    pub fn post(&self, prefix: &str, replies: Vec<Reply>) -> &Self {
        self.on(Method::POST, prefix, replies)
    }

    pub fn requests(&self) -> Vec<PortalRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `METHOD url` of every request, in order.
    pub fn journal(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| format!("{} {}", request.method, request.url))
            .collect()
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<PortalRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url.as_str().starts_with(prefix))
            .collect()
    }

    pub fn staged_cookies(&self) -> Vec<(String, String, String)> {
        self.cookies.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &PortalRequest) -> Result<PortalResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            let url = request.url.as_str();
            let route = routes
                .iter_mut()
                .filter(|route| route.method == request.method && url.starts_with(&route.prefix))
                .max_by_key(|route| route.prefix.len());
            match route {
                Some(route) if route.replies.len() > 1 => route.replies.pop_front(),
                Some(route) => route.replies.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Page {
                status,
                headers,
                body,
            }) => {
                let mut response = PortalResponse::from_parts(request.url.clone(), status, body);
                for (name, value) in &headers {
                    response = response.with_header(name, value);
                }
                Ok(response)
            }
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(PortalResponse::from_parts(request.url.clone(), 404, "not found")),
        }
    }

    fn set_cookie(&self, url: &Url, name: &str, value: &str) {
        self.cookies
            .lock()
            .unwrap()
            .push((url.to_string(), name.to_string(), value.to_string()));
    }

    fn cookies(&self, url: &Url) -> Vec<(String, String)> {
        let host = url.host_str().unwrap_or_default().to_string();
        self.cookies
            .lock()
            .unwrap()
            .iter()
            .filter(|(staged, _, _)| {
                Url::parse(staged).is_ok_and(|staged| staged.host_str() == Some(host.as_str()))
            })
            .map(|(_, name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Configuration without any waiting between attempts.
pub fn fast_config() -> AuthConfig {
    AuthConfig {
        delay_min_ms: 0,
        delay_max_ms: 0,
        wait_interval_ms: 0,
        retry_backoff_ms: 0,
        retry_count: 2,
        ..AuthConfig::default()
    }
}

pub fn authenticator(
    transport: Arc<ScriptedTransport>,
    config: AuthConfig,
) -> (Authenticator, Arc<MemoryHandler>) {
    let memory = Arc::new(MemoryHandler::new(512));
    let authenticator = Authenticator::builder()
        .with_config(config)
        .with_transport(transport)
        .with_handler(memory.clone())
        .build()
        .expect("authenticator");
    (authenticator, memory)
}

pub fn probe_redirect(location: &str) -> PortalResponse {
    PortalResponse::from_parts(Url::parse(PROBE_URL).unwrap(), 302, "")
        .with_header("location", location)
}
