//! Intermediate redirector in front of the metro portals.
//!
//! Detection: a 3xx `Location` containing `/www/login.chi` and a page whose
//! first `<h2>` reads `Browser error!`.
//!
//! Every hop is requested with redirect following disabled. If one of them
//! leads to a recognizable portal, that portal takes over; otherwise the
//! redirector gets a MAC based login and its own redirects are drained.

use async_trait::async_trait;
use url::Url;

use super::{
    LABEL_CHECKING, LABEL_REDIRECT, MSG_ERROR_REDIRECT, MSG_ERROR_SERVER,
    MSG_ERROR_TOO_MANY_REDIRECTS, ProviderKind, label_continue,
};
use crate::config::AuthConfig;
use crate::portal::core::PortalResponse;
use crate::portal::engine::session::VAR_MAC;
use crate::portal::engine::{
    Exhausted, Provider, ResponseHandler, Step, Task, TaskContext, WaitCondition, WaitTask,
};

pub const LOGIN_URL: &str = "http://hotspot.maximatelecom/login";
pub const PLACEHOLDER_MAC: &str = "00-00-00-00-00-00";
pub const PLACEHOLDER_PASSWORD: &str = "placeholder";
pub const MAX_HOPS: u32 = 5;

pub fn matches(response: &PortalResponse, _config: &AuthConfig) -> bool {
    let Ok(redirect) = response.get_300_redirect() else {
        return false;
    };
    redirect.contains("/www/login.chi")
        && response.first_tag_html("h2").as_deref() == Some("Browser error!")
}

pub fn build(response: PortalResponse, config: &AuthConfig) -> Provider {
    let mut provider = Provider::new(ProviderKind::MccRedirector);
    provider
        .add(Task::initial_check(response, InitialCheck))
        .add(Task::wait(
            LABEL_REDIRECT,
            WaitTask::new(Detect)
                .tries(MAX_HOPS)
                .interval(config.wait_interval())
                .follow_redirects(false)
                .on_exhausted(Exhausted::Continue),
        ))
        .add(Task::named(LABEL_CHECKING, Switch))
        .add(Task::named(label_continue(ProviderKind::MccRedirector), MacLogin))
        .add(Task::wait(
            LABEL_REDIRECT,
            WaitTask::new(Drain)
                .tries(MAX_HOPS)
                .interval(config.wait_interval())
                .follow_redirects(false)
                .exhausted_message(MSG_ERROR_TOO_MANY_REDIRECTS),
        ))
        .add(Task::final_check(LABEL_CHECKING));
    provider
}

/// MAC from the `loginurl` parameter when present, else from `mac`.
pub fn extract_mac(redirect: &str) -> Option<String> {
    let url = Url::parse(redirect).ok()?;
    let query = |url: &Url, name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    let target = query(&url, "loginurl")
        .filter(|login| !login.is_empty())
        .and_then(|login| Url::parse(&login).ok())
        .unwrap_or(url);
    query(&target, "mac")
}

struct InitialCheck;

#[async_trait]
impl ResponseHandler for InitialCheck {
    async fn handle_response(&self, ctx: &mut TaskContext<'_>, response: &PortalResponse) -> bool {
        let redirect = match response.parse_any_redirect() {
            Ok(redirect) => redirect,
            Err(err) => {
                ctx.debug(err.to_string());
                return ctx.fail(MSG_ERROR_REDIRECT);
            }
        };

        let mac = extract_mac(&redirect);
        if let Some(ref mac) = mac {
            ctx.session.vars.set(VAR_MAC, mac.clone());
        }
        ctx.session.mac = mac;
        ctx.session.redirect = redirect;
        true
    }
}

/// Walks one hop and stops once a different portal shows up.
struct Detect;

#[async_trait]
impl WaitCondition for Detect {
    async fn until(&self, ctx: &mut TaskContext<'_>) -> bool {
        let redirect = ctx.session.redirect.clone();
        let response = match ctx.client.get(redirect).retry().send().await {
            Ok(response) => response,
            Err(err) => {
                ctx.debug(err.to_string());
                ctx.fail(MSG_ERROR_SERVER);
                ctx.stop();
                return false;
            }
        };
        ctx.debug(response.to_string());

        let kind = ctx.dispatcher().detect(&response, ctx.config());
        if !matches!(kind, ProviderKind::Unknown | ProviderKind::MccRedirector) {
            let provider = ctx.dispatcher().build(kind, response, ctx.config());
            ctx.session.detected = Some(provider);
            return true;
        }

        match response.get_300_redirect() {
            Ok(next) => {
                ctx.session.redirect = next;
                false
            }
            Err(_) => {
                ctx.debug("No more redirects to follow");
                true
            }
        }
    }
}

struct Switch;

#[async_trait]
impl Step for Switch {
    async fn run(&self, ctx: &mut TaskContext<'_>) -> bool {
        if let Some(provider) = ctx.session.detected.take() {
            ctx.info(label_continue(provider.kind()));
            ctx.splice(provider);
        }
        true
    }
}

struct MacLogin;

#[async_trait]
impl Step for MacLogin {
    async fn run(&self, ctx: &mut TaskContext<'_>) -> bool {
        let username = ctx
            .session
            .mac
            .clone()
            .filter(|mac| !mac.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_MAC.to_string())
            .to_lowercase();

        let previous = ctx.client.follow_redirects();
        ctx.client.set_follow_redirects(false);
        let result = ctx
            .client
            .get(LOGIN_URL)
            .query("username", username)
            .query("password", PLACEHOLDER_PASSWORD)
            .retry()
            .send()
            .await;
        ctx.client.set_follow_redirects(previous);

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                ctx.debug(err.to_string());
                return ctx.fail(MSG_ERROR_SERVER);
            }
        };
        ctx.debug(response.to_string());

        match response.get_300_redirect() {
            Ok(redirect) => {
                ctx.session.redirect = redirect;
                true
            }
            Err(err) => {
                ctx.debug(err.to_string());
                ctx.fail(MSG_ERROR_REDIRECT)
            }
        }
    }
}

/// Follows `Location` redirects until the first non-3xx response.
struct Drain;

#[async_trait]
impl WaitCondition for Drain {
    async fn until(&self, ctx: &mut TaskContext<'_>) -> bool {
        let redirect = ctx.session.redirect.clone();
        match ctx.client.get(redirect).retry().send().await {
            Ok(response) => {
                ctx.debug(response.to_string());
                match response.get_300_redirect() {
                    Ok(next) => {
                        ctx.session.redirect = next;
                        false
                    }
                    Err(_) => true,
                }
            }
            Err(err) => {
                ctx.debug(err.to_string());
                ctx.fail(MSG_ERROR_SERVER);
                ctx.stop();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_prefers_login_url() {
        assert_eq!(
            extract_mac(
                "http://10.0.0.1/www/login.chi?mac=11-11&loginurl=http%3A%2F%2Fhotspot.example%2Flogin%3Fmac%3DAA-BB"
            )
            .as_deref(),
            Some("AA-BB")
        );
        assert_eq!(
            extract_mac("http://10.0.0.1/www/login.chi?mac=11-11&loginurl=").as_deref(),
            Some("11-11")
        );
        assert_eq!(extract_mac("http://10.0.0.1/www/login.chi"), None);
    }

    #[test]
    fn detection_requires_both_markers() {
        let config = AuthConfig::default();
        let base = |status: u16, body: &str| {
            PortalResponse::from_parts(
                Url::parse("http://connectivitycheck.gstatic.com/generate_204").unwrap(),
                status,
                body.to_string(),
            )
            .with_header("location", "http://10.0.0.1/www/login.chi?mac=1")
        };

        assert!(matches(&base(302, "<h2>Browser error!</h2>"), &config));
        assert!(!matches(&base(302, "<h2>Welcome</h2>"), &config));
        assert!(!matches(&base(200, "<h2>Browser error!</h2>"), &config));
    }
}
