//! High level authentication orchestration.
//!
//! Wires the HTTP client, provider dispatch and diagnostics together into one
//! entry point: probe the network, pick the backend that recognizes the
//! captive portal and run its login sequence.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{AuthConfig, SettingsError, SettingsReader};
use crate::modules::events::{
	DiagnosticDispatcher, DiagnosticEvent, DiagnosticHandler, LoggingHandler, ProgressHandler,
};
use crate::modules::identity::{InstallIdentity, RandomIdentity};
use crate::portal::core::{
	HttpTransport, PortalClient, PortalResponse, ReqwestTransport, TransportError,
};
use crate::portal::engine::{AuthResult, RunEnv};
use crate::portal::providers::ProviderKind;
use crate::portal::user_agents::{Randomizer, UserAgentError, UserAgentOptions, select_profile};

/// Result alias used across the orchestration layer.
pub type AuthenticatorResult<T> = Result<T, AuthenticatorError>;

/// High-level error surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum AuthenticatorError {
	#[error("transport error: {0}")]
	Transport(#[from] TransportError),
	#[error("settings error: {0}")]
	Settings(#[from] SettingsError),
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error("user-agent initialisation failed: {0}")]
	UserAgent(#[from] UserAgentError),
}

/// Summary of one authentication attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthOutcome {
	/// Terminal result, `None` when a step failed before reaching one.
	pub result: Option<AuthResult>,
	pub error: Option<String>,
	/// Backend picked for the probe response.
	pub provider: ProviderKind,
	/// Backends handed off to during the run, in order.
	pub switched: Vec<ProviderKind>,
	pub vars: Map<String, Value>,
	/// Last progress label reached.
	pub progress: Option<String>,
	pub cancelled: bool,
}

impl AuthOutcome {
	pub fn is_success(&self) -> bool {
		self.result.is_some_and(|result| result.is_success())
	}
}

/// Fluent builder for [`Authenticator`].
pub struct AuthenticatorBuilder {
	config: AuthConfig,
	user_agent: UserAgentOptions,
	transport: Option<Arc<dyn HttpTransport>>,
	handlers: Vec<Arc<dyn DiagnosticHandler>>,
	identity: Option<Arc<dyn InstallIdentity>>,
	cancel: Option<CancellationToken>,
	logging: bool,
}

impl AuthenticatorBuilder {
	pub fn new() -> Self {
		Self {
			config: AuthConfig::default(),
			user_agent: UserAgentOptions::default(),
			transport: None,
			handlers: Vec::new(),
			identity: None,
			cancel: None,
			logging: true,
		}
	}

	pub fn with_config(mut self, config: AuthConfig) -> Self {
		self.config = config;
		self
	}

	/// Read the configuration from a host settings store.
	pub fn with_settings(mut self, reader: &dyn SettingsReader) -> Self {
		self.config = AuthConfig::from_settings(reader);
		self
	}

	pub fn with_config_json(mut self, raw: &str) -> AuthenticatorResult<Self> {
		self.config = AuthConfig::from_json_str(raw)?;
		Ok(self)
	}

	pub fn with_user_agent_options(mut self, options: UserAgentOptions) -> Self {
		self.user_agent = options;
		self
	}

	pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn with_handler(mut self, handler: Arc<dyn DiagnosticHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn with_identity(mut self, identity: Arc<dyn InstallIdentity>) -> Self {
		self.identity = Some(identity);
		self
	}

	/// Parent token: cancelling it stops the current and all future runs.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancel = Some(token);
		self
	}

	pub fn disable_logging(mut self) -> Self {
		self.logging = false;
		self
	}

	pub fn build(self) -> AuthenticatorResult<Authenticator> {
		select_profile(&self.user_agent)?;

		let transport: Arc<dyn HttpTransport> = match self.transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestTransport::new()?),
		};

		let progress = Arc::new(ProgressHandler::new());
		let mut diagnostics = DiagnosticDispatcher::new();
		if self.logging {
			diagnostics.register_handler(Arc::new(LoggingHandler));
		}
		diagnostics.register_handler(progress.clone());
		for handler in self.handlers {
			diagnostics.register_handler(handler);
		}

		let random = Randomizer::new(self.user_agent);
		let client = PortalClient::new(transport.clone()).with_randomizer(random.clone());
		let probe_client = PortalClient::new(transport).with_randomizer(random);
		let cancel = self.cancel.unwrap_or_default();

		Ok(Authenticator {
			env: RunEnv::new(self.config, Arc::new(diagnostics)),
			client: Mutex::new(client),
			probe_client: Mutex::new(probe_client),
			identity: self
				.identity
				.unwrap_or_else(|| Arc::new(RandomIdentity::new())),
			progress,
			running: StdMutex::new(cancel.child_token()),
			cancel,
		})
	}
}

impl Default for AuthenticatorBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Main authentication orchestrator.
///
/// Runs and probes use separate clients over one transport, so cookies are
/// shared while a connectivity check never waits for a run to finish.
pub struct Authenticator {
	env: RunEnv,
	client: Mutex<PortalClient>,
	probe_client: Mutex<PortalClient>,
	identity: Arc<dyn InstallIdentity>,
	progress: Arc<ProgressHandler>,
	cancel: CancellationToken,
	/// Parent of every probe and run in flight; replaced on `stop()`.
	running: StdMutex<CancellationToken>,
}

impl Authenticator {
	/// Construct an authenticator with default configuration and the reqwest transport.
	pub fn new() -> AuthenticatorResult<Self> {
		AuthenticatorBuilder::new().build()
	}

	pub fn builder() -> AuthenticatorBuilder {
		AuthenticatorBuilder::new()
	}

	pub fn config(&self) -> &AuthConfig {
		&self.env.config
	}

	pub fn diagnostics(&self) -> &DiagnosticDispatcher {
		&self.env.diagnostics
	}

	/// GET the configured probe URL without following redirects.
	///
	/// Does not contend with a run in progress; `stop()` aborts it.
	pub async fn probe(&self) -> AuthenticatorResult<PortalResponse> {
		let token = self.run_token();
		let mut client = self.probe_client.lock().await;
		client.configure(&self.env.config);
		client.set_cancellation(token);
		let url = self.env.config.probe_url.clone();
		Ok(client.probe(&url).await?)
	}

	pub async fn is_connected(&self) -> bool {
		match self.probe().await {
			Ok(response) => response.status() == 204,
			Err(err) => {
				log::debug!("connectivity probe failed: {err}");
				false
			}
		}
	}

	/// Probe the network and authenticate against whatever answered.
	pub async fn connect(&self) -> AuthenticatorResult<AuthOutcome> {
		let response = self.probe().await?;
		Ok(self.start(response).await)
	}

	/// Authenticate against the portal that produced `response`.
	///
	/// Runs are serialized: a second `start()` waits for the first to end.
	/// `probe()` and `is_connected()` stay available meanwhile.
	pub async fn start(&self, response: PortalResponse) -> AuthOutcome {
		let token = self.run_token();

		let mut client = self.client.lock().await;
		client.reset_headers();
		client.clear_interceptors();
		client.configure(&self.env.config);
		client.set_follow_redirects(true);
		client.set_cancellation(token.clone());
		self.progress.reset();

		let mut provider = self.env.dispatcher.find(response, &self.env.config);
		let kind = provider.kind();
		self.env
			.diagnostics
			.debug(format!("install {}", self.identity.uuid()));
		self.env.diagnostics.info(format!("Provider: {kind}"));

		let report = provider.run(&self.env, &mut client).await;
		drop(client);

		self.env.diagnostics.dispatch(DiagnosticEvent::Finished {
			result: report.result,
			error: report.error.clone(),
		});

		AuthOutcome {
			result: report.result,
			error: report.error,
			provider: kind,
			switched: report.switched,
			vars: report.vars.into_map(),
			progress: self.progress.latest(),
			cancelled: token.is_cancelled(),
		}
	}

	/// Cancel the run and any probe in progress. Later calls are unaffected.
	pub fn stop(&self) {
		let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
		running.cancel();
		*running = self.cancel.child_token();
	}

	/// Parent token of every run.
	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancel
	}

	fn run_token(&self) -> CancellationToken {
		self.running
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.child_token()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::portal::core::PortalRequest;
	use async_trait::async_trait;
	use url::Url;

	struct Online;

	#[async_trait]
	impl HttpTransport for Online {
		async fn execute(&self, request: &PortalRequest) -> Result<PortalResponse, TransportError> {
			Ok(PortalResponse::from_parts(request.url.clone(), 204, ""))
		}

		fn set_cookie(&self, _: &Url, _: &str, _: &str) {}

		fn cookies(&self, _: &Url) -> Vec<(String, String)> {
			Vec::new()
		}
	}

	fn authenticator() -> Authenticator {
		Authenticator::builder()
			.with_transport(Arc::new(Online))
			.disable_logging()
			.build()
			.unwrap()
	}

	#[tokio::test]
	async fn connected_network_reports_already_connected() {
		let auth = authenticator();
		assert!(auth.is_connected().await);

		let outcome = auth.connect().await.unwrap();
		assert_eq!(outcome.provider, ProviderKind::Unknown);
		assert_eq!(outcome.result, Some(AuthResult::AlreadyConnected));
		assert!(outcome.is_success());
		assert!(!outcome.cancelled);
	}

	#[tokio::test]
	async fn cancelled_parent_stops_runs_before_the_first_task() {
		let token = CancellationToken::new();
		let auth = Authenticator::builder()
			.with_transport(Arc::new(Online))
			.with_cancellation(token.clone())
			.disable_logging()
			.build()
			.unwrap();
		token.cancel();

		let probe = PortalResponse::from_parts(
			Url::parse("http://connectivitycheck.gstatic.com/generate_204").unwrap(),
			204,
			"",
		);
		let outcome = auth.start(probe).await;
		assert!(outcome.cancelled);
		assert_eq!(outcome.result, None);
	}

	#[test]
	fn invalid_json_config_is_rejected() {
		assert!(matches!(
			Authenticator::builder().with_config_json("{ not json"),
			Err(AuthenticatorError::Settings(_))
		));
	}
}
