//! # metrowifi-rs
//!
//! Captive portal autologin engine for public transit Wi-Fi networks.
//!
//! A connectivity probe is matched against the known portal signatures, the
//! matching backend's login sequence is run step by step, and the run ends
//! with a terminal result such as `CONNECTED` or `NOT_REGISTERED`.
//!
//! ## Features
//!
//! - Async HTTP client with per-request retries, cancellation and cookie jar
//! - Portal detection with ordered signatures and a redirect-walking fallback
//! - Login sequences that can hand off to another backend mid-run
//! - Randomized browser identity (user agent, headers, delays)
//! - Diagnostics bus with logging, in-memory and progress handlers
//!
//! ## Example
//!
//! ```no_run
//! use metrowifi_rs::Authenticator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let authenticator = Authenticator::new()?;
//!     let outcome = authenticator.connect().await?;
//!     println!("{:?} via {}", outcome.result, outcome.provider);
//!     Ok(())
//! }
//! ```

mod authenticator;

pub mod config;
pub mod modules;
pub mod portal;

pub use crate::authenticator::{
    AuthOutcome,
    Authenticator,
    AuthenticatorBuilder,
    AuthenticatorError,
    AuthenticatorResult,
};

pub use crate::config::{
    AuthConfig,
    MapSettings,
    SettingsError,
    SettingsReader,
};

pub use crate::portal::core::{
    HttpTransport,
    PortalClient,
    PortalRequest,
    PortalResponse,
    ReqwestTransport,
    ResponseParseError,
    TransportError,
};

pub use crate::portal::detectors::{
    Dispatcher,
    ProviderSignature,
};

pub use crate::portal::engine::{
    AuthResult,
    Branch,
    Provider,
    RunEnv,
    RunReport,
    Session,
    Task,
    TaskContext,
    Vars,
};

pub use crate::portal::providers::ProviderKind;

pub use crate::portal::user_agents::{
    BrowserProfile,
    Randomizer,
    UserAgentError,
    UserAgentOptions,
};

pub use crate::modules::{
    DiagnosticDispatcher,
    DiagnosticEvent,
    DiagnosticHandler,
    InstallIdentity,
    LogLevel,
    LoggingHandler,
    MemoryHandler,
    ProgressHandler,
    RandomIdentity,
    StaticIdentity,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
