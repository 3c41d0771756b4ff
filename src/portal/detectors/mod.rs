//! Provider detection module.
//!
//! Matches a probe response against the known portal signatures in a fixed
//! priority order and builds the provider for the first match. Signatures
//! overlap (a welcome.wi-fi.ru redirect is also a `.wi-fi.ru` redirect), so
//! the order of [`SIGNATURES`] is significant.

use crate::config::AuthConfig;
use crate::portal::core::PortalResponse;
use crate::portal::engine::Provider;
use crate::portal::providers::{
    ProviderKind, auth_wifi, mcc_redirector, unknown, welcome_gateway,
};

type MatchFn = fn(&PortalResponse, &AuthConfig) -> bool;
type BuildFn = fn(PortalResponse, &AuthConfig) -> Provider;

/// Signature of one backend.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSignature {
    pub kind: ProviderKind,
    pub matches: MatchFn,
    pub build: BuildFn,
}

/// Known backends, most specific first.
pub static SIGNATURES: &[ProviderSignature] = &[
    ProviderSignature {
        kind: ProviderKind::WelcomeGateway,
        matches: welcome_gateway::matches,
        build: welcome_gateway::build,
    },
    ProviderSignature {
        kind: ProviderKind::MccRedirector,
        matches: mcc_redirector::matches,
        build: mcc_redirector::build,
    },
    ProviderSignature {
        kind: ProviderKind::AuthWifi,
        matches: auth_wifi::matches,
        build: auth_wifi::build,
    },
];

/// Selects the provider that can handle a response.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    signatures: &'static [ProviderSignature],
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            signatures: SIGNATURES,
        }
    }
}

impl Dispatcher {
    pub fn new(signatures: &'static [ProviderSignature]) -> Self {
        Self { signatures }
    }

    /// Kind of the first signature matching `response`, `Unknown` if none does.
    pub fn detect(&self, response: &PortalResponse, config: &AuthConfig) -> ProviderKind {
        self.signatures
            .iter()
            .find(|signature| (signature.matches)(response, config))
            .map(|signature| signature.kind)
            .unwrap_or(ProviderKind::Unknown)
    }

    pub fn find(&self, response: PortalResponse, config: &AuthConfig) -> Provider {
        let kind = self.detect(&response, config);
        log::debug!("provider detected: {kind}");
        self.build(kind, response, config)
    }

    pub fn build(&self, kind: ProviderKind, response: PortalResponse, config: &AuthConfig) -> Provider {
        match self.signatures.iter().find(|signature| signature.kind == kind) {
            Some(signature) => (signature.build)(response, config),
            None => unknown::build(response, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn probe(status: u16, body: &str, location: Option<&str>) -> PortalResponse {
        let response = PortalResponse::from_parts(
            Url::parse("http://connectivitycheck.gstatic.com/generate_204").unwrap(),
            status,
            body.to_string(),
        );
        match location {
            Some(location) => response.with_header("location", location),
            None => response,
        }
    }

    fn welcome() -> PortalResponse {
        probe(302, "", Some("http://welcome.wi-fi.ru/?client_mac=aa-bb-cc-dd-ee-ff"))
    }

    fn mcc() -> PortalResponse {
        probe(
            302,
            "<html><body><h2>Browser error!</h2></body></html>",
            Some("http://10.1.2.3/www/login.chi?loginurl=x"),
        )
    }

    fn auth() -> PortalResponse {
        probe(
            200,
            r#"<meta http-equiv="refresh" content="0;URL=http://auth.wi-fi.ru/auth?segment=metro">"#,
            None,
        )
    }

    #[test]
    fn each_signature_matches_only_its_own_response() {
        let config = AuthConfig::default();
        let cases = [
            (welcome(), ProviderKind::WelcomeGateway),
            (mcc(), ProviderKind::MccRedirector),
            (auth(), ProviderKind::AuthWifi),
        ];

        for (response, expected) in &cases {
            for signature in SIGNATURES {
                let matched = (signature.matches)(response, &config);
                if signature.kind == *expected {
                    assert!(matched, "{expected} should match its response");
                } else if signature.kind != ProviderKind::AuthWifi
                    || *expected != ProviderKind::WelcomeGateway
                {
                    assert!(!matched, "{} matched a {expected} response", signature.kind);
                }
            }
            assert_eq!(Dispatcher::default().detect(response, &config), *expected);
        }
    }

    #[test]
    fn unmatched_responses_fall_back_to_unknown() {
        let config = AuthConfig::default();
        let dispatcher = Dispatcher::default();
        assert_eq!(dispatcher.detect(&probe(204, "", None), &config), ProviderKind::Unknown);
        assert_eq!(
            dispatcher.detect(&probe(302, "", Some("http://login.wi-fi.ru/x")), &config),
            ProviderKind::Unknown
        );
        assert_eq!(dispatcher.find(probe(200, "hello", None), &config).kind(), ProviderKind::Unknown);
    }

    #[test]
    fn welcome_gateway_can_be_disabled() {
        let config = AuthConfig {
            welcome_gateway_v3: false,
            ..AuthConfig::default()
        };
        assert_eq!(
            Dispatcher::default().detect(&welcome(), &config),
            ProviderKind::AuthWifi
        );
    }
}
