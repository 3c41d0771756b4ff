//! Execution context handed to every task.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::provider::Provider;
use super::session::Session;
use super::task::Task;
use crate::config::AuthConfig;
use crate::modules::events::DiagnosticDispatcher;
use crate::portal::core::{PortalClient, PortalResponse, TransportError};
use crate::portal::detectors::Dispatcher;
use crate::portal::providers::ProviderKind;

/// Collaborators shared by all runs of one authenticator.
pub struct RunEnv {
    pub config: AuthConfig,
    pub diagnostics: Arc<DiagnosticDispatcher>,
    pub dispatcher: Dispatcher,
}

impl RunEnv {
    pub fn new(config: AuthConfig, diagnostics: Arc<DiagnosticDispatcher>) -> Self {
        Self {
            config,
            diagnostics,
            dispatcher: Dispatcher::default(),
        }
    }
}

pub struct TaskContext<'a> {
    pub session: &'a mut Session,
    pub client: &'a mut PortalClient,
    env: &'a RunEnv,
    position: usize,
    splice: Vec<Task>,
    switched: Vec<ProviderKind>,
    stopped: bool,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        session: &'a mut Session,
        client: &'a mut PortalClient,
        env: &'a RunEnv,
        position: usize,
    ) -> Self {
        Self {
            session,
            client,
            env,
            position,
            splice: Vec::new(),
            switched: Vec::new(),
            stopped: false,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.env.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.env.dispatcher
    }

    /// Index of the running task in the provider sequence.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn info(&self, message: impl Into<String>) {
        self.env.diagnostics.info(message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.env.diagnostics.debug(message);
    }

    /// Report an error and yield `false` for the task to return.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.info(format!("Error: {message}"));
        self.session.error = Some(message);
        false
    }

    /// Abort the run after the current task.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.client.cancellation()
    }

    pub fn is_cancelled(&self) -> bool {
        self.client.cancellation().is_cancelled()
    }

    /// Hand off to `provider`: its tasks run right after the current one.
    pub fn splice(&mut self, provider: Provider) {
        self.debug(format!("Switching to {}", provider.kind()));
        self.switched.push(provider.kind());
        self.splice.extend(provider.into_tasks());
    }

    pub fn splice_tasks(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.splice.extend(tasks);
    }

    /// Probe the configured connectivity URL.
    pub async fn probe(&mut self) -> Result<PortalResponse, TransportError> {
        let url = self.env.config.probe_url.clone();
        self.client.probe(&url).await
    }

    pub async fn is_connected(&mut self) -> bool {
        match self.probe().await {
            Ok(response) => response.status() == 204,
            Err(err) => {
                self.debug(format!("connectivity probe failed: {err}"));
                false
            }
        }
    }

    pub(crate) fn finish(self) -> (Vec<Task>, Vec<ProviderKind>, bool) {
        (self.splice, self.switched, self.stopped)
    }
}
