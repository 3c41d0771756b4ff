//! Per-install identity used to correlate diagnostics.

use std::sync::Arc;

use uuid::Uuid;

/// Stable random string identifying one installation.
pub trait InstallIdentity: Send + Sync {
    fn uuid(&self) -> String;
}

/// Identity supplied by the host.
#[derive(Debug, Clone)]
pub struct StaticIdentity(String);

impl StaticIdentity {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self(uuid.into())
    }
}

impl InstallIdentity for StaticIdentity {
    fn uuid(&self) -> String {
        self.0.clone()
    }
}

/// Identity generated once on construction.
#[derive(Debug, Clone)]
pub struct RandomIdentity(Arc<str>);

impl RandomIdentity {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }
}

impl Default for RandomIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallIdentity for RandomIdentity {
    fn uuid(&self) -> String {
        self.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_identity_is_stable_per_instance() {
        let identity = RandomIdentity::new();
        assert_eq!(identity.uuid(), identity.uuid());
        assert_eq!(identity.uuid().len(), 36);
        assert_ne!(identity.uuid(), RandomIdentity::new().uuid());
    }
}
