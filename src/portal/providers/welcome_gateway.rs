//! welcome.wi-fi.ru gateway.
//!
//! Detection: any redirect containing `welcome.wi-fi.ru`, only while the
//! gateway algorithm is enabled in the configuration.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{
    LABEL_AUTH_FORM, LABEL_AUTH_PAGE, LABEL_CHECKING, LABEL_SUCCESS_PAGE, MSG_CONNECTED,
    MSG_ERROR_AUTH_LOOP, MSG_ERROR_AUTH_PAGE, MSG_ERROR_CSRF, MSG_ERROR_SERVER, ProviderKind,
};
use crate::config::AuthConfig;
use crate::portal::core::{CONTENT_TYPE_JSON, PortalResponse};
use crate::portal::engine::session::{VAR_MAC, VAR_TOKEN};
use crate::portal::engine::{AuthResult, Provider, ResponseHandler, Step, Task, TaskContext};

pub const DEFAULT_REDIRECT: &str = "http://welcome.wi-fi.ru/?client_mac=00-00-00-00-00-00";
pub const PLACEHOLDER_MAC: &str = "00-00-00-00-00-00";

pub fn matches(response: &PortalResponse, config: &AuthConfig) -> bool {
    config.welcome_gateway_v3
        && response
            .parse_any_redirect()
            .is_ok_and(|redirect| redirect.contains("welcome.wi-fi.ru"))
}

pub fn build(response: PortalResponse, _config: &AuthConfig) -> Provider {
    let mut provider = Provider::new(ProviderKind::WelcomeGateway);
    provider
        .add(Task::initial_check(response, InitialCheck))
        .add(Task::named(LABEL_AUTH_PAGE, WelcomeStep::AuthPage))
        .add(Task::named(LABEL_AUTH_FORM, WelcomeStep::Init))
        .add(Task::named(LABEL_CHECKING, WelcomeStep::Check))
        .add(Task::named(LABEL_SUCCESS_PAGE, WelcomeStep::Success))
        .add(Task::named(LABEL_CHECKING, WelcomeStep::Verify));
    provider
}

/// `client_mac` of the redirect, or the placeholder.
pub fn extract_mac(redirect: &str) -> String {
    url::Url::parse(redirect)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "client_mac")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|mac| !mac.is_empty())
        .unwrap_or_else(|| PLACEHOLDER_MAC.to_string())
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

        let mac = extract_mac(&redirect);
        ctx.session.vars.set(VAR_MAC, mac.clone());
        ctx.session.mac = Some(mac);
        ctx.session.redirect = PortalResponse::remove_path_from_url(&redirect);
        true
    }
}

enum WelcomeStep {
    AuthPage,
    Init,
    Check,
    Success,
    Verify,
}

#[async_trait]
impl Step for WelcomeStep {
    async fn run(&self, ctx: &mut TaskContext<'_>) -> bool {
        match self {
            WelcomeStep::AuthPage => auth_page(ctx).await,
            WelcomeStep::Init => init(ctx).await,
            WelcomeStep::Check => check(ctx).await,
            WelcomeStep::Success => success(ctx).await,
            WelcomeStep::Verify => verify(ctx).await,
        }
    }
}

fn mac(ctx: &TaskContext<'_>) -> String {
    ctx.session
        .mac
        .clone()
        .unwrap_or_else(|| PLACEHOLDER_MAC.to_string())
}

async fn auth_page(ctx: &mut TaskContext<'_>) -> bool {
    let url = format!("{}/", ctx.session.redirect);
    let mac = mac(ctx);

    let response = match ctx.client.get(url).query("client_mac", mac).retry().send().await {
        Ok(response) => response,
        Err(err) => {
            ctx.debug(err.to_string());
            return ctx.fail(MSG_ERROR_AUTH_PAGE);
        }
    };
    ctx.debug(response.to_string());

    match response.parse_meta_content("csrf-token") {
        Ok(token) => {
            ctx.session.vars.set(VAR_TOKEN, token);
            true
        }
        Err(err) => {
            ctx.debug(err.to_string());
            ctx.fail(MSG_ERROR_CSRF)
        }
    }
}

async fn init(ctx: &mut TaskContext<'_>) -> bool {
    let url = format!("{}/auth/init", ctx.session.redirect);
    let body = json!({
        "authenticity_token": ctx.session.vars.get_str(VAR_TOKEN).unwrap_or_default(),
        "client_mac": mac(ctx),
        "client_ip": "",
    })
    .to_string();

    let response = match ctx
        .client
        .post_body(url, body, CONTENT_TYPE_JSON)
        .retry()
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            ctx.debug(err.to_string());
            return ctx.fail(MSG_ERROR_SERVER);
        }
    };
    ctx.debug(response.to_string());

    match response.json() {
        Ok(answer) if answer.get("result") == Some(&Value::Bool(true)) => true,
        Ok(_) => {
            ctx.debug("Unexpected answer: false");
            ctx.fail(MSG_ERROR_SERVER)
        }
        Err(err) => {
            ctx.debug(err.to_string());
            ctx.fail(MSG_ERROR_SERVER)
        }
    }
}

/// Failures here are logged only.
async fn check(ctx: &mut TaskContext<'_>) -> bool {
    let url = format!("{}/auth/check", ctx.session.redirect);
    let mac = mac(ctx);

    match ctx
        .client
        .get(url)
        .query("client_mac", mac)
        .query("client_ip", "")
        .retry()
        .send()
        .await
    {
        Ok(response) => ctx.debug(response.to_string()),
        Err(err) => ctx.debug(err.to_string()),
    }
    true
}

async fn success(ctx: &mut TaskContext<'_>) -> bool {
    let url = format!("{}/success", ctx.session.redirect);
    let mac = mac(ctx);

    match ctx.client.get(url).query("client_mac", mac).retry().send().await {
        Ok(response) => {
            ctx.debug(response.to_string());
            ctx.session.pending_response = Some(response);
            true
        }
        Err(err) => {
            ctx.debug(err.to_string());
            ctx.fail(MSG_ERROR_SERVER)
        }
    }
}

/// Classifies the success page and decides how the run continues.
async fn verify(ctx: &mut TaskContext<'_>) -> bool {
    let Some(response) = ctx.session.pending_response.take() else {
        return ctx.fail(MSG_ERROR_SERVER);
    };

    match ctx.dispatcher().detect(&response, ctx.config()) {
        ProviderKind::WelcomeGateway => ctx.fail(MSG_ERROR_AUTH_LOOP),
        ProviderKind::Unknown => {
            if ctx.is_connected().await {
                ctx.info(MSG_CONNECTED);
                ctx.session.vars.set_result(AuthResult::Connected);
                return true;
            }

            ctx.info("Unknown redirect, checking the network again");
            match ctx.probe().await {
                Ok(probe) => {
                    let provider = ctx.dispatcher().find(probe, ctx.config());
                    ctx.splice(provider);
                    true
                }
                Err(err) => {
                    ctx.debug(err.to_string());
                    ctx.fail(MSG_ERROR_SERVER)
                }
            }
        }
        kind => {
            let provider = ctx.dispatcher().build(kind, response, ctx.config());
            ctx.splice(provider);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn redirect_to(target: &str) -> PortalResponse {
        PortalResponse::from_parts(
            Url::parse("http://connectivitycheck.gstatic.com/generate_204").unwrap(),
            302,
            "",
        )
        .with_header("location", target)
    }

    #[test]
    fn mac_falls_back_to_placeholder() {
        assert_eq!(extract_mac("http://welcome.wi-fi.ru/?client_mac=AA-BB"), "AA-BB");
        assert_eq!(extract_mac("http://welcome.wi-fi.ru/"), PLACEHOLDER_MAC);
        assert_eq!(extract_mac("not a url"), PLACEHOLDER_MAC);
    }

    #[test]
    fn detection_honors_configuration() {
        let response = redirect_to(DEFAULT_REDIRECT);
        assert!(matches(&response, &AuthConfig::default()));
        assert!(!matches(
            &response,
            &AuthConfig {
                welcome_gateway_v3: false,
                ..AuthConfig::default()
            }
        ));
        assert!(!matches(&redirect_to("http://auth.wi-fi.ru/"), &AuthConfig::default()));
    }
}
