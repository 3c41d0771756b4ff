//! auth.wi-fi.ru backend.
//!
//! Detection: any redirect pointing to `*.wi-fi.ru` except `login.wi-fi.ru`.
//!
//! The first redirect selects a branch that decides every later endpoint:
//!
//! | branch               | auth page                  | login                | check                 |
//! |----------------------|----------------------------|----------------------|-----------------------|
//! | default              | `/auth?segment=`           | `/auth/init`         | `/auth/check`         |
//! | spb                  | `/spb/gapi/auth/start`     | `/spb/gapi/auth/init`| `/spb/gapi/auth/check`|
//! | metro, metro-ruckus  | `/gapi/auth/start`         | `/gapi/auth/init`    | `/gapi/auth/check`    |

use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use super::{
    LABEL_AUTH_FORM, LABEL_AUTH_PAGE, LABEL_CHECKING, LABEL_REDIRECT, LABEL_WAITING,
    MSG_ERROR_AUTH_PAGE, MSG_ERROR_NOT_REGISTERED, MSG_ERROR_REDIRECT, MSG_ERROR_SERVER,
    ProviderKind,
};
use crate::config::AuthConfig;
use crate::portal::core::{
    HEADER_CSRF, Interceptor, PortalRequest, PortalResponse, TransportError,
};
use crate::portal::engine::session::{VAR_BRANCH, VAR_MAC, VAR_SEGMENT, VAR_V3_BYPASS};
use crate::portal::engine::{AuthResult, Branch, Provider, ResponseHandler, Step, Task, TaskContext};
use crate::portal::user_agents::DIGITS;

pub const DEFAULT_REDIRECT: &str = "https://auth.wi-fi.ru/?segment=metro";
pub const DEFAULT_SEGMENT: &str = "metro";
pub const AUTH_HOST: &str = "auth.wi-fi.ru";
const COOKIE_URL: &str = "http://auth.wi-fi.ru";

/// Pages that carry the `csrf-token` meta tag.
static CSRF_PAGES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://auth\.wi-fi\.ru/(auth|metro|(spb/)?new)(\?.*)?")
        .expect("invalid csrf page pattern")
});

pub fn matches(response: &PortalResponse, _config: &AuthConfig) -> bool {
    response
        .parse_any_redirect()
        .map(|redirect| redirect.contains(".wi-fi.ru") && !redirect.contains("login.wi-fi.ru"))
        .unwrap_or(false)
}

pub fn build(response: PortalResponse, config: &AuthConfig) -> Provider {
    let mut provider = Provider::new(ProviderKind::AuthWifi);
    provider.add(Task::initial_check(response, InitialCheck));

    if !config.welcome_gateway_v3 {
        provider.add(Task::plain(AuthWifiStep::WelcomeBypass));
    }

    provider
        .add(Task::named(LABEL_REDIRECT, AuthWifiStep::Redirect))
        .add(Task::interceptor(&CSRF_PAGES, Arc::new(CsrfInterceptor)))
        .add(Task::named(LABEL_AUTH_PAGE, AuthWifiStep::AuthPage))
        .add(Task::plain(AuthWifiStep::SetToken));

    if !config.delay_always {
        provider.add(Task::named(LABEL_WAITING, AuthWifiStep::Delay));
    }

    provider
        .add(Task::named(LABEL_AUTH_FORM, AuthWifiStep::Login))
        .add(Task::named(LABEL_CHECKING, AuthWifiStep::Check))
        .add(Task::final_check(LABEL_CHECKING));
    provider
}

/// Branch, segment and MAC encoded in the first redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInfo {
    pub branch: Branch,
    pub segment: String,
    pub mac: Option<String>,
}

pub fn classify_redirect(redirect: &str) -> RedirectInfo {
    let Ok(url) = Url::parse(redirect) else {
        return RedirectInfo {
            branch: Branch::Unknown,
            segment: DEFAULT_SEGMENT.to_string(),
            mac: None,
        };
    };

    let query = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    let path = url.path();
    let branch = if path.starts_with("/auth") {
        Branch::Default
    } else if path.starts_with("/spb") {
        Branch::Spb
    } else if path.is_empty() || path == "/" || path.starts_with("/new") {
        if query("dn").is_some_and(|dn| dn.contains("ruckus")) {
            Branch::MetroRuckus
        } else {
            Branch::Metro
        }
    } else {
        Branch::Unknown
    };

    RedirectInfo {
        branch,
        segment: query("segment").unwrap_or_else(|| DEFAULT_SEGMENT.to_string()),
        mac: query("client_mac").or_else(|| query("mac")),
    }
}

/// Outcome of the login POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted,
    NotJson,
    NotRegistered,
    ServerError,
}

pub fn classify_login(response: &PortalResponse, config: &AuthConfig) -> LoginOutcome {
    let Ok(data) = response.json() else {
        return LoginOutcome::NotJson;
    };

    if let Some(code) = data.get("auth_error_code").and_then(Value::as_str)
        && config.is_not_registered(code)
    {
        return LoginOutcome::NotRegistered;
    }

    let rejected = data.get("result") == Some(&Value::Bool(false))
        || data.get("auth_status").and_then(Value::as_str) == Some("fail");
    if rejected {
        LoginOutcome::ServerError
    } else {
        LoginOutcome::Accepted
    }
}

/// Drop personal data from a `gapi/auth/start` reply before it is logged.
pub fn strip_private(json: &mut Map<String, Value>) {
    if let Some(Value::Object(data)) = json.get_mut("data") {
        data.remove("segmentParams");
        data.remove("userParams");
    }
}

fn endpoint(ctx: &TaskContext<'_>, plain: &str, gapi: &str) -> String {
    let base = PortalResponse::remove_path_from_url(&ctx.session.redirect);
    let branch = ctx.session.branch;
    if branch.uses_gapi() {
        format!("{base}{}{gapi}", branch.path_prefix())
    } else {
        format!("{base}{plain}")
    }
}

struct InitialCheck;

#[async_trait]
impl ResponseHandler for InitialCheck {
    async fn handle_response(&self, ctx: &mut TaskContext<'_>, response: &PortalResponse) -> bool {
        let redirect = match response.parse_any_redirect() {
            Ok(redirect) => redirect,
            Err(err) => {
                ctx.debug(format!("{err}, using default"));
                DEFAULT_REDIRECT.to_string()
            }
        };
        ctx.debug(redirect.clone());

        let info = classify_redirect(&redirect);
        if info.branch == Branch::Unknown {
            ctx.debug(format!("Warning: unknown path in {redirect}"));
        }
        ctx.debug(format!("Branch: {}", info.branch));
        ctx.debug(format!("Segment: {}", info.segment));

        let session = &mut *ctx.session;
        session.redirect = redirect;
        session.branch = info.branch;
        session.vars.set(VAR_BRANCH, info.branch.as_str());
        session.vars.set(VAR_SEGMENT, info.segment.clone());
        session.segment = info.segment;
        // Keep a MAC learned before a hand-off when this redirect has none.
        if let Some(mac) = info.mac {
            session.vars.set(VAR_MAC, mac.clone());
            session.mac = Some(mac);
        }
        true
    }
}

/// Copies the page's `csrf-token` meta tag into the default headers.
struct CsrfInterceptor;

impl Interceptor for CsrfInterceptor {
    fn intercept(&self, headers: &mut HeaderMap, _request: &PortalRequest, response: &PortalResponse) {
        match response.parse_meta_content("csrf-token") {
            Ok(token) => {
                log::debug!("CSRF token: {token}");
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(HEADER_CSRF.as_bytes()),
                    HeaderValue::from_str(&token),
                ) {
                    headers.insert(name, value);
                }
            }
            Err(_) => log::debug!("CSRF token not found"),
        }
    }
}

enum AuthWifiStep {
    WelcomeBypass,
    Redirect,
    AuthPage,
    SetToken,
    Delay,
    Login,
    Check,
}

#[async_trait]
impl Step for AuthWifiStep {
    async fn run(&self, ctx: &mut TaskContext<'_>) -> bool {
        match self {
            AuthWifiStep::WelcomeBypass => welcome_bypass(ctx).await,
            AuthWifiStep::Redirect => follow_redirect(ctx).await,
            AuthWifiStep::AuthPage => auth_page(ctx).await,
            AuthWifiStep::SetToken => set_token(ctx).await,
            AuthWifiStep::Delay => {
                let delay = ctx.client.randomizer().delay();
                delay.wait(ctx.cancellation()).await
            }
            AuthWifiStep::Login => login(ctx).await,
            AuthWifiStep::Check => check(ctx).await,
        }
    }
}

/// Legacy path for welcome.wi-fi.ru: touch it once, then continue on auth.wi-fi.ru.
async fn welcome_bypass(ctx: &mut TaskContext<'_>) -> bool {
    let redirect = ctx.session.redirect.clone();
    if !redirect.contains("welcome.wi-fi.ru") {
        return true;
    }
    ctx.debug("Found redirect to welcome.wi-fi.ru");

    match ctx.client.get(redirect.as_str()).retry().send().await {
        Ok(response) => ctx.debug(response.to_string()),
        Err(err) => ctx.debug(err.to_string()),
    }

    if let Ok(mut url) = Url::parse(&redirect)
        && url.set_host(Some(AUTH_HOST)).is_ok()
    {
        let _ = url.set_port(None);
        ctx.session.redirect = url.to_string();
    }
    ctx.session.vars.set(VAR_V3_BYPASS, "true");
    ctx.debug(ctx.session.redirect.clone());
    true
}

async fn follow_redirect(ctx: &mut TaskContext<'_>) -> bool {
    let redirect = ctx.session.redirect.clone();
    let valid = Url::parse(&redirect)
        .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host());
    if !valid {
        ctx.debug(format!("Invalid URL: {redirect}"));
        return ctx.fail(MSG_ERROR_REDIRECT);
    }

    match ctx.client.get(redirect).retry().send().await {
        Ok(response) => {
            ctx.debug(response.to_string());
            true
        }
        Err(err) => {
            ctx.debug(err.to_string());
            ctx.fail(MSG_ERROR_REDIRECT)
        }
    }
}

async fn auth_page(ctx: &mut TaskContext<'_>) -> bool {
    let url = endpoint(ctx, "/auth", "/gapi/auth/start");
    let gapi = ctx.session.branch.uses_gapi();
    let segment = ctx.session.segment.clone();
    let mac = ctx.session.mac.clone();

    let random = ctx.client.randomizer();
    let prefix = format!("0:{}:", random.string(8));
    let cookies = [
        ("_ym_uid", random.string_from(DIGITS, 19)),
        ("_mts", format!("{prefix}{}~{}", random.string(11), random.string(20))),
        ("_mtp", format!("{prefix}{}_{}", random.string(21), random.string(10))),
    ];
    for (name, value) in &cookies {
        if let Err(err) = ctx.client.set_cookie(COOKIE_URL, name, value) {
            ctx.debug(format!("cookie {name} not set: {err}"));
        }
    }

    let mut request = ctx.client.get(url).query("segment", segment);
    if gapi && let Some(mac) = mac {
        request = request.query("clientMac", mac);
    }

    match request.retry().send().await {
        Ok(response) if gapi => {
            ctx.debug(response.header_dump());
            match response.json() {
                Ok(mut json) => {
                    strip_private(&mut json);
                    ctx.debug(Value::Object(json).to_string());
                }
                Err(_) => ctx.debug(response.text().into_owned()),
            }
            true
        }
        Ok(response) => {
            ctx.debug(response.to_string());
            true
        }
        Err(err) => {
            ctx.debug(err.to_string());
            ctx.fail(MSG_ERROR_AUTH_PAGE)
        }
    }
}

/// Default branch only. Failures are ignored.
async fn set_token(ctx: &mut TaskContext<'_>) -> bool {
    if ctx.session.branch.uses_gapi() {
        return true;
    }

    let token = ctx.client.randomizer().string(6);
    ctx.debug(format!("Trying to set auth token: {token}"));

    let url = format!(
        "{}/auth/set_token",
        PortalResponse::remove_path_from_url(&ctx.session.redirect)
    );
    match ctx.client.get(url).query("token", token).send().await {
        Ok(response) => ctx.debug(response.text().into_owned()),
        Err(err) => ctx.debug(err.to_string()),
    }
    true
}

async fn login(ctx: &mut TaskContext<'_>) -> bool {
    let url = endpoint(ctx, "/auth/init", "/gapi/auth/init");
    let segment = ctx.session.segment.clone();

    let response = match ctx
        .client
        .post_form(url)
        .form("mode", "0")
        .form("segment", segment)
        .retry()
        .send()
        .await
    {
        Ok(response) => response,
        // The portal sometimes redirects through itself once login is accepted.
        Err(TransportError::TooManyRedirects) => {
            ctx.debug("Too many redirects after login, ignoring");
            return true;
        }
        Err(err) => {
            ctx.debug(err.to_string());
            return ctx.fail(MSG_ERROR_SERVER);
        }
    };
    ctx.debug(response.to_string());

    match classify_login(&response, ctx.config()) {
        LoginOutcome::Accepted => true,
        LoginOutcome::NotJson => {
            ctx.debug("Unable to parse: response is not JSON");
            true
        }
        LoginOutcome::NotRegistered => {
            ctx.session.vars.set_result(AuthResult::NotRegistered);
            ctx.fail(MSG_ERROR_NOT_REGISTERED)
        }
        LoginOutcome::ServerError => {
            ctx.debug("Server returned an error");
            ctx.fail(MSG_ERROR_SERVER)
        }
    }
}

async fn check(ctx: &mut TaskContext<'_>) -> bool {
    let url = endpoint(ctx, "/auth/check", "/gapi/auth/check");
    let segment = ctx.session.segment.clone();

    match ctx.client.get(url).query("segment", segment).retry().send().await {
        Ok(response) => {
            ctx.debug(response.to_string());
            true
        }
        Err(err) => {
            ctx.debug(err.to_string());
            ctx.fail(MSG_ERROR_SERVER)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> PortalResponse {
        PortalResponse::from_parts(
            Url::parse("http://auth.wi-fi.ru/auth/init").unwrap(),
            status,
            body.to_string(),
        )
    }

    #[test]
    fn classifies_branches_from_redirect() {
        let default = classify_redirect("http://auth.wi-fi.ru/auth?segment=metro");
        assert_eq!(default.branch, Branch::Default);
        assert_eq!(default.segment, "metro");

        let spb = classify_redirect("https://auth.wi-fi.ru/spb/new?segment=spb&mac=AA-BB");
        assert_eq!(spb.branch, Branch::Spb);
        assert_eq!(spb.mac.as_deref(), Some("AA-BB"));

        let ruckus = classify_redirect("https://auth.wi-fi.ru/?dn=ruckus1&client_mac=cc&mac=dd");
        assert_eq!(ruckus.branch, Branch::MetroRuckus);
        assert_eq!(ruckus.segment, DEFAULT_SEGMENT);
        assert_eq!(ruckus.mac.as_deref(), Some("cc"));

        assert_eq!(classify_redirect("https://auth.wi-fi.ru/new").branch, Branch::Metro);
        assert_eq!(classify_redirect("https://auth.wi-fi.ru/identification").branch, Branch::Unknown);
    }

    #[test]
    fn login_replies_are_classified() {
        let config = AuthConfig::default();
        assert_eq!(classify_login(&response(200, r#"{"result": true}"#), &config), LoginOutcome::Accepted);
        assert_eq!(
            classify_login(
                &response(200, r#"{"result": false, "auth_error_code": "err_device_not_identified_x"}"#),
                &config
            ),
            LoginOutcome::NotRegistered
        );
        assert_eq!(classify_login(&response(200, r#"{"result": false}"#), &config), LoginOutcome::ServerError);
        assert_eq!(
            classify_login(&response(200, r#"{"auth_status": "fail"}"#), &config),
            LoginOutcome::ServerError
        );
        assert_eq!(classify_login(&response(200, "<html>ok</html>"), &config), LoginOutcome::NotJson);
    }

    #[test]
    fn private_fields_are_stripped() {
        let mut json: Map<String, Value> = serde_json::from_str(
            r#"{"result": true, "data": {"segmentParams": {"a": 1}, "userParams": {"b": 2}, "segment": "metro"}}"#,
        )
        .unwrap();
        strip_private(&mut json);
        assert_eq!(
            Value::Object(json),
            serde_json::json!({"result": true, "data": {"segment": "metro"}})
        );
    }

    #[test]
    fn detection_ignores_login_host() {
        let config = AuthConfig::default();
        let redirect = |target: &str| response(302, "").with_header("location", target);
        assert!(matches(&redirect("http://auth.wi-fi.ru/?segment=metro"), &config));
        assert!(!matches(&redirect("http://login.wi-fi.ru/am/UI/Login"), &config));
        assert!(!matches(&response(200, "<html></html>"), &config));
    }

    #[test]
    fn optional_tasks_follow_configuration() {
        let probe = response(302, "").with_header("location", DEFAULT_REDIRECT);
        let full = build(probe.clone(), &AuthConfig {
            welcome_gateway_v3: false,
            ..AuthConfig::default()
        });
        let lean = build(probe, &AuthConfig {
            delay_always: true,
            ..AuthConfig::default()
        });
        assert_eq!(full.len(), 10);
        assert_eq!(lean.len(), 8);
        assert!(!lean.labels().contains(&Some(LABEL_WAITING)));
    }
}
