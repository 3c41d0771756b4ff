//! Ambient collaborators of the engine: diagnostics and install identity.

pub mod events;
pub mod identity;

pub use events::{
    DiagnosticDispatcher, DiagnosticEvent, DiagnosticHandler, LogLevel, LoggingHandler,
    MemoryHandler, ProgressHandler,
};
pub use identity::{InstallIdentity, RandomIdentity, StaticIdentity};
