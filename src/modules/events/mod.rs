//! Diagnostic event system.
//!
//! Providers report progress labels, user-facing messages and raw
//! request/response dumps through a [`DiagnosticDispatcher`]. Handlers decide
//! where they end up: the `log` crate, an in-memory buffer for crash report
//! attachments, or a live progress label for the host UI.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::portal::engine::AuthResult;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Raw request/response dumps.
    Debug,
    /// User-facing progress and results.
    Info,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => f.write_str("DEBUG"),
            LogLevel::Info => f.write_str("INFO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// A labelled task started.
    Progress { label: String },
    Message { level: LogLevel, text: String },
    /// The run ended, with or without a terminal result.
    Finished {
        result: Option<AuthResult>,
        error: Option<String>,
    },
}

/// Trait implemented by diagnostic handlers. Handlers must not panic.
pub trait DiagnosticHandler: Send + Sync {
    fn handle(&self, event: &DiagnosticEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct DiagnosticDispatcher {
    handlers: Vec<Arc<dyn DiagnosticHandler>>,
}

impl DiagnosticDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn DiagnosticHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: DiagnosticEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.dispatch(DiagnosticEvent::Message {
            level: LogLevel::Info,
            text: text.into(),
        });
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.dispatch(DiagnosticEvent::Message {
            level: LogLevel::Debug,
            text: text.into(),
        });
    }

    pub fn progress(&self, label: impl Into<String>) {
        self.dispatch(DiagnosticEvent::Progress {
            label: label.into(),
        });
    }
}

impl fmt::Debug for DiagnosticDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl DiagnosticHandler for LoggingHandler {
    fn handle(&self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::Progress { label } => log::info!("> {label}"),
            DiagnosticEvent::Message {
                level: LogLevel::Info,
                text,
            } => log::info!("{text}"),
            DiagnosticEvent::Message {
                level: LogLevel::Debug,
                text,
            } => log::debug!("{text}"),
            DiagnosticEvent::Finished { result, error } => match (result, error) {
                (Some(result), _) => log::info!("finished: {result}"),
                (None, Some(error)) => log::warn!("finished without result: {error}"),
                (None, None) => log::warn!("finished without result"),
            },
        }
    }
}

/// Keeps the most recent timestamped lines for crash report attachments.
#[derive(Debug)]
pub struct MemoryHandler {
    capacity: usize,
    min_level: LogLevel,
    lines: Mutex<VecDeque<(DateTime<Utc>, LogLevel, String)>>,
}

impl MemoryHandler {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            min_level: LogLevel::Debug,
            lines: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines
                .iter()
                .map(|(timestamp, level, text)| {
                    format!("{} [{level}] {text}", timestamp.format("%H:%M:%S%.3f"))
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Plain messages without timestamps, as shown to the user.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines
                .iter()
                .filter(|(_, line_level, _)| *line_level >= level)
                .map(|(_, _, text)| text.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn dump(&self) -> String {
        self.lines().join("\n")
    }

    fn push(&self, level: LogLevel, text: String) {
        if level < self.min_level {
            return;
        }
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == self.capacity {
                lines.pop_front();
            }
            lines.push_back((Utc::now(), level, text));
        }
    }
}

impl DiagnosticHandler for MemoryHandler {
    fn handle(&self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::Progress { label } => self.push(LogLevel::Info, format!("> {label}")),
            DiagnosticEvent::Message { level, text } => self.push(*level, text.clone()),
            DiagnosticEvent::Finished { result, .. } => {
                let text = match result {
                    Some(result) => format!("Result: {result}"),
                    None => "Result: none".to_string(),
                };
                self.push(LogLevel::Info, text);
            }
        }
    }
}

/// Remembers the latest progress label.
#[derive(Debug, Default)]
pub struct ProgressHandler {
    latest: Mutex<Option<String>>,
}

impl ProgressHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<String> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    pub fn reset(&self) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }
}

impl DiagnosticHandler for ProgressHandler {
    fn handle(&self, event: &DiagnosticEvent) {
        if let DiagnosticEvent::Progress { label } = event
            && let Ok(mut latest) = self.latest.lock()
        {
            *latest = Some(label.clone());
        }
    }
}
