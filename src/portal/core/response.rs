//! Parsed HTTP response and the redirect-extraction helpers portals rely on.
//!
//! Captive portals announce their next hop in several ways: a meta refresh
//! tag, an inline script assigning `location`, or a plain `Location` header.
//! [`PortalResponse::parse_any_redirect`] tries them in that order.

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use http::header::LOCATION;
use http::{HeaderMap, HeaderName, HeaderValue};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// Failures while extracting structured data from a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseParseError {
    #[error("redirect not found in response")]
    RedirectNotFound,
    #[error("response is not a redirect (status {0})")]
    NotRedirect(u16),
    #[error("meta tag '{0}' not found")]
    MetaNotFound(String),
    #[error("response is not JSON")]
    NotJson,
    #[error("JSON response is not an object")]
    NotObject,
}

#[derive(Debug, Clone)]
pub struct PortalResponse {
    url: Url,
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

impl PortalResponse {
    pub fn new(url: Url, status: u16, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            url,
            status,
            headers,
            body,
        }
    }

    /// Convenience constructor for hosts and tests that build responses by hand.
    pub fn from_parts(url: Url, status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(url, status, HeaderMap::new(), body.into())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// URL of the request that produced this response.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Meta refresh first, then an inline script redirect, then `Location`.
    pub fn parse_any_redirect(&self) -> Result<String, ResponseParseError> {
        if let Some(target) = self.meta_refresh_target() {
            return Ok(self.resolve(&target));
        }

        if let Some(target) = self.script_redirect_target() {
            return Ok(self.resolve(&target));
        }

        if let Some(target) = self.location().filter(|value| !value.is_empty()) {
            return Ok(self.resolve(target));
        }

        Err(ResponseParseError::RedirectNotFound)
    }

    /// The `Location` header of a 3xx response.
    pub fn get_300_redirect(&self) -> Result<String, ResponseParseError> {
        if !self.is_redirect() {
            return Err(ResponseParseError::NotRedirect(self.status));
        }

        self.location()
            .filter(|value| !value.is_empty())
            .map(|target| self.resolve(target))
            .ok_or(ResponseParseError::RedirectNotFound)
    }

    pub fn parse_meta_content(&self, name: &str) -> Result<String, ResponseParseError> {
        let document = Html::parse_document(&self.text());
        document
            .select(&META_SELECTOR)
            .filter(|meta| {
                meta.value()
                    .attr("name")
                    .is_some_and(|value| value.eq_ignore_ascii_case(name))
            })
            .find_map(|meta| meta.value().attr("content").map(str::to_string))
            .ok_or_else(|| ResponseParseError::MetaNotFound(name.to_string()))
    }

    /// Inner HTML of the first element with the given tag name.
    pub fn first_tag_html(&self, tag: &str) -> Option<String> {
        let selector = Selector::parse(tag).ok()?;
        let document = Html::parse_document(&self.text());
        document.select(&selector).next().map(|element| element.inner_html())
    }

    pub fn json(&self) -> Result<Map<String, Value>, ResponseParseError> {
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ResponseParseError::NotObject),
            Err(_) => Err(ResponseParseError::NotJson),
        }
    }

    /// Reduce a URL to `scheme://host[:port]`.
    pub fn remove_path_from_url(url: &str) -> String {
        match Url::parse(url) {
            Ok(parsed) => origin_from_url(&parsed),
            Err(_) => {
                let start = url.find("://").map(|index| index + 3).unwrap_or(0);
                match url[start..].find(['/', '?', '#']) {
                    Some(end) => url[..start + end].to_string(),
                    None => url.to_string(),
                }
            }
        }
    }

    pub fn header_dump(&self) -> String {
        let mut dump = format!("{} {}", self.status, self.url);
        for (name, value) in &self.headers {
            dump.push('\n');
            dump.push_str(name.as_str());
            dump.push_str(": ");
            dump.push_str(value.to_str().unwrap_or("<binary>"));
        }
        dump
    }

    fn meta_refresh_target(&self) -> Option<String> {
        let document = Html::parse_document(&self.text());
        document
            .select(&META_SELECTOR)
            .filter(|meta| {
                meta.value()
                    .attr("http-equiv")
                    .is_some_and(|value| value.eq_ignore_ascii_case("refresh"))
            })
            .find_map(|meta| meta.value().attr("content").and_then(refresh_url))
    }

    /// Only inline `<script>` bodies count; event handler attributes do not.
    fn script_redirect_target(&self) -> Option<String> {
        let document = Html::parse_document(&self.text());
        document.select(&SCRIPT_SELECTOR).find_map(|script| {
            let source: String = script.text().collect();
            let captures = SCRIPT_REDIRECT_RE.captures(&source)?;
            let raw = captures.name("href").or_else(|| captures.name("call"))?;
            let target = html_escape::decode_html_entities(raw.as_str()).replace("\\/", "/");
            (!target.is_empty()).then_some(target)
        })
    }

    fn resolve(&self, target: &str) -> String {
        match Url::parse(target) {
            Ok(absolute) if absolute.has_host() => absolute.to_string(),
            _ => self
                .url
                .join(target)
                .map(|joined| joined.to_string())
                .unwrap_or_else(|_| target.to_string()),
        }
    }
}

impl fmt::Display for PortalResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}", self.header_dump(), self.text())
    }
}

/// Build origin string from URL (`scheme://host[:port]`).
pub fn origin_from_url(url: &Url) -> String {
    let mut origin = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port() {
        origin.push(':');
        origin.push_str(&port.to_string());
    }
    origin
}

/// `0;url=http://...`, `5; URL='...'` and friends.
fn refresh_url(content: &str) -> Option<String> {
    let (_, rest) = content.split_once(';')?;
    let rest = rest.trim();
    let value = match rest.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("url=") => &rest[4..],
        _ => rest,
    };
    let value = value.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    (!value.is_empty()).then(|| value.to_string())
}

static META_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta").expect("invalid meta selector"));

static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("invalid script selector"));

static SCRIPT_REDIRECT_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(
        r#"(?:(?:window|document|top|self)\.)?location(?:\.href)?\s*=\s*["'](?P<href>[^"']+)["']|location\.(?:replace|assign)\(\s*["'](?P<call>[^"']+)["']\s*\)"#,
    )
    .case_insensitive(true)
    .build()
    .expect("invalid script redirect regex")
});
