//! Fallback for responses no signature recognizes.
//!
//! A 204 means the device is already online. Anything else is walked hop by
//! hop with redirect following disabled, re-running detection on each
//! response, until a known portal appears or the hop limit is hit.

use async_trait::async_trait;

use super::{MSG_ALREADY_CONNECTED, MSG_ERROR_TOO_MANY_REDIRECTS, MSG_NOT_SUPPORTED, ProviderKind};
use crate::config::AuthConfig;
use crate::portal::core::PortalResponse;
use crate::portal::engine::session::VAR_SWITCH;
use crate::portal::engine::{AuthResult, Provider, ResponseHandler, Task, TaskContext};

pub fn build(response: PortalResponse, _config: &AuthConfig) -> Provider {
    let mut provider = Provider::new(ProviderKind::Unknown);
    provider.add(Task::initial_check(response, InitialCheck));
    provider
}

enum Walk {
    Found(Provider),
    Failed(String),
}

struct InitialCheck;

#[async_trait]
impl ResponseHandler for InitialCheck {
    async fn handle_response(&self, ctx: &mut TaskContext<'_>, response: &PortalResponse) -> bool {
        if response.status() == 204 {
            ctx.info(MSG_ALREADY_CONNECTED);
            ctx.session.vars.set_result(AuthResult::AlreadyConnected);
            return true;
        }
        ctx.debug(response.to_string());

        let previous = ctx.client.follow_redirects();
        ctx.client.set_follow_redirects(false);
        let walk = walk(ctx, response.clone()).await;
        ctx.client.set_follow_redirects(previous);

        match walk {
            Walk::Found(provider) => {
                let kind = provider.kind();
                ctx.session.vars.set(VAR_SWITCH, kind.name());
                ctx.info(format!("Switching to {kind}"));
                ctx.splice(provider);
                true
            }
            Walk::Failed(reason) => {
                ctx.debug(reason);
                let failed = ctx.fail(MSG_NOT_SUPPORTED);
                ctx.session.vars.set_result(AuthResult::NotSupported);
                failed
            }
        }
    }
}

async fn walk(ctx: &mut TaskContext<'_>, mut response: PortalResponse) -> Walk {
    let hops = ctx.config().max_redirect_hops;
    ctx.debug("Attempting to follow all redirects");

    for _ in 0..hops {
        let kind = ctx.dispatcher().detect(&response, ctx.config());
        if kind != ProviderKind::Unknown {
            return Walk::Found(ctx.dispatcher().build(kind, response, ctx.config()));
        }

        let redirect = match response.parse_any_redirect() {
            Ok(redirect) => redirect,
            Err(err) => return Walk::Failed(err.to_string()),
        };

        response = match ctx.client.get(redirect).retry().send().await {
            Ok(next) => next,
            Err(err) => return Walk::Failed(err.to_string()),
        };
        ctx.debug(response.to_string());
    }

    Walk::Failed(MSG_ERROR_TOO_MANY_REDIRECTS.to_string())
}
