//! Supported captive portal backends.
//!
//! Each backend exposes `matches(response, config)` for dispatch and
//! `build(response, config)` returning its task sequence.

pub mod auth_wifi;
pub mod mcc_redirector;
pub mod unknown;
pub mod welcome_gateway;

use std::fmt;

/// Identifies a backend in logs, reports and the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// auth.wi-fi.ru with its default, regional and metro branches.
    AuthWifi,
    /// Intermediate redirector serving `/www/login.chi`.
    MccRedirector,
    /// welcome.wi-fi.ru gateway.
    WelcomeGateway,
    Unknown,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::AuthWifi => "AuthWifi",
            ProviderKind::MccRedirector => "MccRedirector",
            ProviderKind::WelcomeGateway => "WelcomeGateway",
            ProviderKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const LABEL_REDIRECT: &str = "Following redirect";
pub const LABEL_AUTH_PAGE: &str = "Loading auth page";
pub const LABEL_WAITING: &str = "Waiting";
pub const LABEL_AUTH_FORM: &str = "Submitting auth form";
pub const LABEL_CHECKING: &str = "Checking connection";
pub const LABEL_SUCCESS_PAGE: &str = "Loading success page";

pub const MSG_CONNECTED: &str = "Connected";
pub const MSG_ALREADY_CONNECTED: &str = "Already connected";
pub const MSG_NOT_SUPPORTED: &str = "This network is not supported";

pub const MSG_ERROR_REDIRECT: &str = "redirect not found";
pub const MSG_ERROR_SERVER: &str = "server error";
pub const MSG_ERROR_AUTH_PAGE: &str = "failed to load auth page";
pub const MSG_ERROR_CONNECTION: &str = "no Internet connection after login";
pub const MSG_ERROR_NOT_REGISTERED: &str = "device is not registered in the network";
pub const MSG_ERROR_CSRF: &str = "CSRF token not found";
pub const MSG_ERROR_AUTH_LOOP: &str = "auth loop detected";
pub const MSG_ERROR_TOO_MANY_REDIRECTS: &str = "too many redirects";

pub fn label_continue(kind: ProviderKind) -> String {
    format!("Continuing with {kind}")
}
