//! Per-run state shared by every task of a provider run.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::provider::Provider;
use crate::portal::core::PortalResponse;

pub const VAR_RESULT: &str = "result";
pub const VAR_BRANCH: &str = "branch";
pub const VAR_SEGMENT: &str = "segment";
pub const VAR_MAC: &str = "mac";
pub const VAR_TOKEN: &str = "token";
pub const VAR_SWITCH: &str = "switch";
pub const VAR_V3_BYPASS: &str = "v3_bypass";

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthResult {
    Connected,
    AlreadyConnected,
    NotRegistered,
    NotSupported,
}

impl AuthResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthResult::Connected => "CONNECTED",
            AuthResult::AlreadyConnected => "ALREADY_CONNECTED",
            AuthResult::NotRegistered => "NOT_REGISTERED",
            AuthResult::NotSupported => "NOT_SUPPORTED",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthResult::Connected | AuthResult::AlreadyConnected)
    }
}

impl fmt::Display for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loosely typed execution context. Keys are only removed explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars(Map<String, Value>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn result(&self) -> Option<AuthResult> {
        self.0
            .get(VAR_RESULT)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn set_result(&mut self, result: AuthResult) {
        self.0
            .insert(VAR_RESULT.to_string(), Value::String(result.as_str().to_string()));
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Protocol sub-flow of the auth.wi-fi.ru backend, chosen from the first redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Branch {
    #[default]
    Default,
    Spb,
    Metro,
    MetroRuckus,
    Unknown,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Default => "default",
            Branch::Spb => "spb",
            Branch::Metro => "metro",
            Branch::MetroRuckus => "metro-ruckus",
            Branch::Unknown => "unknown",
        }
    }

    /// Regional and metro branches talk to the JSON `gapi` endpoints.
    pub fn uses_gapi(&self) -> bool {
        matches!(self, Branch::Spb | Branch::Metro | Branch::MetroRuckus)
    }

    pub fn path_prefix(&self) -> &'static str {
        match self {
            Branch::Spb => "/spb",
            _ => "",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state of one run, passed to every task through its context.
#[derive(Debug, Default)]
pub struct Session {
    pub vars: Vars,
    /// Current redirect target; rewritten by initial checks and redirect walks.
    pub redirect: String,
    pub branch: Branch,
    pub segment: String,
    pub mac: Option<String>,
    /// Response handed from an initial check to a later step.
    pub pending_response: Option<PortalResponse>,
    /// Provider recognized while polling, waiting to be spliced.
    pub detected: Option<Provider>,
    /// Last diagnostic reported through a task failure.
    pub error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_round_trips_through_vars() {
        let mut vars = Vars::new();
        assert_eq!(vars.result(), None);
        vars.set_result(AuthResult::NotRegistered);
        assert_eq!(vars.get_str(VAR_RESULT), Some("NOT_REGISTERED"));
        assert_eq!(vars.result(), Some(AuthResult::NotRegistered));

        vars.set(VAR_RESULT, "garbage");
        assert_eq!(vars.result(), None);
    }

    #[test]
    fn branches_select_endpoint_family() {
        assert!(!Branch::Default.uses_gapi());
        assert!(!Branch::Unknown.uses_gapi());
        assert!(Branch::MetroRuckus.uses_gapi());
        assert_eq!(Branch::Spb.path_prefix(), "/spb");
        assert_eq!(Branch::Metro.path_prefix(), "");
    }
}
