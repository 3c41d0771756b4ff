//! Reqwest-based implementation of the [`HttpTransport`] trait.
//!
//! Keeps two `reqwest::Client`s over one cookie jar: one follows redirects,
//! the other returns 3xx responses untouched so backends can inspect them.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use url::Url;

use super::response::PortalResponse;
use super::transport::{HttpTransport, PortalRequest, TransportError};

/// Maximum redirects followed by the following client.
pub const MAX_FOLLOWED_REDIRECTS: usize = 10;

/// Reqwest-backed transport used for live runs.
pub struct ReqwestTransport {
    following: Client,
    direct: Client,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_options(false)
    }

    /// Portal login pages are often served with certificates for the wrong
    /// host, so certificate checks may be relaxed.
    pub fn with_options(accept_invalid_certs: bool) -> Result<Self, TransportError> {
        let jar = Arc::new(Jar::default());

        let base = |policy: Policy| -> ClientBuilder {
            Client::builder()
                .cookie_provider(jar.clone())
                .redirect(policy)
                .danger_accept_invalid_certs(accept_invalid_certs)
        };

        let following = base(Policy::limited(MAX_FOLLOWED_REDIRECTS))
            .build()
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        let direct = base(Policy::none())
            .build()
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        Ok(Self {
            following,
            direct,
            jar,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &PortalRequest) -> Result<PortalResponse, TransportError> {
        let client = if request.follow_redirects {
            &self.following
        } else {
            &self.direct
        };

        let mut builder = client
            .request(request.method.clone(), request.url.as_str())
            .headers(request.headers.clone())
            .timeout(request.timeout);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(map_error)?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(map_error)?;

        Ok(PortalResponse::new(url, status, headers, body))
    }

    fn set_cookie(&self, url: &Url, name: &str, value: &str) {
        let domain = url.host_str().unwrap_or_default();
        self.jar
            .add_cookie_str(&format!("{name}={value}; Domain={domain}; Path=/"), url);
    }

    fn cookies(&self, url: &Url) -> Vec<(String, String)> {
        let Some(header) = self.jar.cookies(url) else {
            return Vec::new();
        };
        header
            .to_str()
            .unwrap_or_default()
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_redirect() {
        TransportError::TooManyRedirects
    } else {
        TransportError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_cookies_are_visible_for_the_host() {
        let transport = ReqwestTransport::new().unwrap();
        let url = Url::parse("http://auth.wi-fi.ru").unwrap();
        transport.set_cookie(&url, "_ym_uid", "1234567890123456789");

        let cookies = transport.cookies(&Url::parse("http://auth.wi-fi.ru/auth").unwrap());
        assert!(cookies.contains(&("_ym_uid".to_string(), "1234567890123456789".to_string())));
        assert!(
            transport
                .cookies(&Url::parse("http://other.example/").unwrap())
                .is_empty()
        );
    }
}
