//! Units of work in a provider's login sequence.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::context::TaskContext;
use super::session::AuthResult;
use crate::portal::core::{Interceptor, PortalResponse, RegisteredInterceptor, sleep_cancellable};
use crate::portal::providers::{MSG_CONNECTED, MSG_ERROR_CONNECTION};

/// A step of a login sequence. Returning `false` stops the run; the step is
/// expected to have reported why.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, ctx: &mut TaskContext<'_>) -> bool;
}

/// Classifies the probe response handed to a provider at construction.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn handle_response(&self, ctx: &mut TaskContext<'_>, response: &PortalResponse) -> bool;
}

/// Predicate evaluated by a [`WaitTask`] after each poll.
#[async_trait]
pub trait WaitCondition: Send + Sync {
    async fn until(&self, ctx: &mut TaskContext<'_>) -> bool;
}

/// What a [`WaitTask`] does when its tries run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exhausted {
    #[default]
    Stop,
    Continue,
}

pub struct WaitTask {
    condition: Box<dyn WaitCondition>,
    tries: u32,
    interval: Duration,
    follow_redirects: Option<bool>,
    exhausted: Exhausted,
    exhausted_message: Option<String>,
}

impl WaitTask {
    pub fn new(condition: impl WaitCondition + 'static) -> Self {
        Self {
            condition: Box::new(condition),
            tries: 10,
            interval: Duration::from_secs(1),
            follow_redirects: None,
            exhausted: Exhausted::Stop,
            exhausted_message: None,
        }
    }

    pub fn tries(mut self, tries: u32) -> Self {
        self.tries = tries;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override redirect following while polling. The previous value is restored afterwards.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    pub fn on_exhausted(mut self, exhausted: Exhausted) -> Self {
        self.exhausted = exhausted;
        self
    }

    pub fn exhausted_message(mut self, message: impl Into<String>) -> Self {
        self.exhausted_message = Some(message.into());
        self
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> bool {
        let previous = ctx.client.follow_redirects();
        if let Some(follow) = self.follow_redirects {
            ctx.client.set_follow_redirects(follow);
        }

        let mut satisfied = false;
        for attempt in 0..self.tries {
            if ctx.is_cancelled() {
                break;
            }
            if self.condition.until(ctx).await {
                satisfied = true;
                break;
            }
            if ctx.is_stopped() {
                break;
            }
            if attempt + 1 < self.tries
                && !sleep_cancellable(self.interval, ctx.cancellation()).await
            {
                break;
            }
        }

        ctx.client.set_follow_redirects(previous);

        if satisfied {
            return true;
        }
        if ctx.is_stopped() || ctx.is_cancelled() {
            return false;
        }

        match self.exhausted {
            Exhausted::Continue => true,
            Exhausted::Stop => match self.exhausted_message {
                Some(ref message) => ctx.fail(message.clone()),
                None => false,
            },
        }
    }
}

pub enum TaskKind {
    Step(Box<dyn Step>),
    InitialConnectionCheck {
        response: PortalResponse,
        handler: Box<dyn ResponseHandler>,
    },
    FinalConnectionCheck,
    Interceptor(RegisteredInterceptor),
    Wait(WaitTask),
}

/// A possibly labelled entry of a provider's sequence.
pub struct Task {
    label: Option<String>,
    kind: TaskKind,
}

impl Task {
    /// Anonymous step without a progress label.
    pub fn plain(step: impl Step + 'static) -> Self {
        Self {
            label: None,
            kind: TaskKind::Step(Box::new(step)),
        }
    }

    pub fn named(label: impl Into<String>, step: impl Step + 'static) -> Self {
        Self {
            label: Some(label.into()),
            kind: TaskKind::Step(Box::new(step)),
        }
    }

    /// Always first: classifies the probe response the provider was built from.
    pub fn initial_check(response: PortalResponse, handler: impl ResponseHandler + 'static) -> Self {
        Self {
            label: None,
            kind: TaskKind::InitialConnectionCheck {
                response,
                handler: Box::new(handler),
            },
        }
    }

    pub fn final_check(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            kind: TaskKind::FinalConnectionCheck,
        }
    }

    /// Registers `hook` on the client for every later response whose request URL matches.
    pub fn interceptor(pattern: &Regex, hook: Arc<dyn Interceptor>) -> Self {
        Self {
            label: None,
            kind: TaskKind::Interceptor(RegisteredInterceptor::new(pattern, hook)),
        }
    }

    pub fn wait(label: impl Into<String>, wait: WaitTask) -> Self {
        Self {
            label: Some(label.into()),
            kind: TaskKind::Wait(wait),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub async fn run(&self, ctx: &mut TaskContext<'_>) -> bool {
        match &self.kind {
            TaskKind::Step(step) => step.run(ctx).await,
            TaskKind::InitialConnectionCheck { response, handler } => {
                handler.handle_response(ctx, response).await
            }
            TaskKind::FinalConnectionCheck => {
                if ctx.is_connected().await {
                    ctx.info(MSG_CONNECTED);
                    ctx.session.vars.set_result(AuthResult::Connected);
                    true
                } else {
                    ctx.fail(MSG_ERROR_CONNECTION)
                }
            }
            TaskKind::Interceptor(interceptor) => {
                ctx.client.add_interceptor(interceptor.clone());
                true
            }
            TaskKind::Wait(wait) => wait.run(ctx).await,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            TaskKind::Step(_) => "step",
            TaskKind::InitialConnectionCheck { .. } => "initial-check",
            TaskKind::FinalConnectionCheck => "final-check",
            TaskKind::Interceptor(_) => "interceptor",
            TaskKind::Wait(_) => "wait",
        };
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("kind", &kind)
            .finish()
    }
}
