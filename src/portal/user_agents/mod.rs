//! Browser identity randomizer.
//!
//! Responsibilities:
//! - Load browser profiles (user agent + accept headers) from the embedded `browsers.json`.
//! - Pick a profile once per randomizer and keep it for the whole run.
//! - Generate the random strings portals expect in tokens and tracking cookies.

use once_cell::sync::Lazy;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashMap;

use crate::portal::core::RandomDelay;

const BROWSERS_JSON: &str = include_str!("browsers.json");

const ALPHANUMERIC: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
pub const DIGITS: &str = "0123456789";

/// Top level representation of `browsers.json`.
#[derive(Debug, Deserialize)]
struct BrowserData {
    headers: HashMap<String, HeaderProfile>,
    user_agents: HashMap<DeviceKind, HashMap<String, HashMap<String, Vec<String>>>>,
}

#[derive(Debug, Deserialize, Clone)]
struct HeaderProfile {
    #[serde(rename = "Accept")]
    accept: String,
    #[serde(rename = "Accept-Language")]
    accept_language: String,
}

#[derive(Debug, Deserialize, Eq, PartialEq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum DeviceKind {
    Desktop,
    Mobile,
}

/// Options to filter/select a profile.
#[derive(Debug, Clone)]
pub struct UserAgentOptions {
    pub custom: Option<String>,
    pub platform: Option<String>,
    pub browser: Option<String>,
    pub desktop: bool,
    pub mobile: bool,
}

impl Default for UserAgentOptions {
    /// Portals serve their mobile layout to phones, so mobile Android is the default.
    fn default() -> Self {
        Self {
            custom: None,
            platform: Some("android".into()),
            browser: None,
            desktop: false,
            mobile: true,
        }
    }
}

/// Selected browser identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

static BROWSER_DATA: Lazy<Result<BrowserData, UserAgentError>> =
    Lazy::new(|| serde_json::from_str(BROWSERS_JSON).map_err(UserAgentError::InvalidJson));

/// Pick a profile matching the given options.
pub fn select_profile(opts: &UserAgentOptions) -> Result<BrowserProfile, UserAgentError> {
    let data = BROWSER_DATA
        .as_ref()
        .map_err(|err| UserAgentError::InitializationFailure(err.to_string()))?;

    if !opts.desktop && !opts.mobile {
        return Err(UserAgentError::InvalidOptions(
            "Desktop and mobile cannot both be disabled".into(),
        ));
    }

    if let Some(ref custom) = opts.custom {
        return Ok(custom_profile(data, custom));
    }

    let mut candidates: Vec<(&String, &Vec<String>)> = Vec::new();
    for (kind, platforms) in &data.user_agents {
        let allowed = match kind {
            DeviceKind::Desktop => opts.desktop,
            DeviceKind::Mobile => opts.mobile,
        };
        if !allowed {
            continue;
        }
        for (platform, browsers) in platforms {
            if opts.platform.as_ref().is_some_and(|wanted| wanted != platform) {
                continue;
            }
            for (browser, agents) in browsers {
                if opts.browser.as_ref().is_some_and(|wanted| wanted != browser) {
                    continue;
                }
                if !agents.is_empty() {
                    candidates.push((browser, agents));
                }
            }
        }
    }

    let mut rng = rand::thread_rng();
    let (browser, agents) = candidates
        .choose(&mut rng)
        .ok_or(UserAgentError::ProfileNotFound)?;
    let user_agent = agents
        .choose(&mut rng)
        .cloned()
        .ok_or(UserAgentError::ProfileNotFound)?;
    let headers = data
        .headers
        .get(*browser)
        .ok_or(UserAgentError::ProfileNotFound)?;

    Ok(BrowserProfile {
        user_agent,
        accept: headers.accept.clone(),
        accept_language: headers.accept_language.clone(),
    })
}

fn custom_profile(data: &BrowserData, custom: &str) -> BrowserProfile {
    let matched = data.user_agents.values().flat_map(HashMap::values).find_map(|browsers| {
        browsers
            .iter()
            .find(|(_, agents)| agents.iter().any(|agent| agent.contains(custom)))
            .and_then(|(browser, _)| data.headers.get(browser))
    });

    match matched {
        Some(headers) => BrowserProfile {
            user_agent: custom.to_string(),
            accept: headers.accept.clone(),
            accept_language: headers.accept_language.clone(),
        },
        None => BrowserProfile {
            user_agent: custom.to_string(),
            accept: DEFAULT_ACCEPT.into(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.into(),
        },
    }
}

pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7";

/// Random identity generator shared by the client and the backends.
#[derive(Debug, Clone)]
pub struct Randomizer {
    options: UserAgentOptions,
    cached: Option<BrowserProfile>,
    delay: RandomDelay,
}

impl Randomizer {
    pub fn new(options: UserAgentOptions) -> Self {
        Self {
            options,
            cached: None,
            delay: RandomDelay::default(),
        }
    }

    pub fn with_delay(mut self, delay: RandomDelay) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_delay(&mut self, delay: RandomDelay) {
        self.delay = delay;
    }

    pub fn delay(&self) -> RandomDelay {
        self.delay
    }

    /// Random alphanumeric string.
    pub fn string(&self, length: usize) -> String {
        self.string_from(ALPHANUMERIC, length)
    }

    pub fn string_from(&self, alphabet: &str, length: usize) -> String {
        let chars: Vec<char> = alphabet.chars().collect();
        if chars.is_empty() {
            return String::new();
        }
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| chars[rng.gen_range(0..chars.len())])
            .collect()
    }

    /// Browser profile, selected on first use and then reused.
    pub fn profile(&mut self) -> BrowserProfile {
        if let Some(ref profile) = self.cached {
            return profile.clone();
        }

        let profile = select_profile(&self.options).unwrap_or_else(|err| {
            log::warn!("falling back to default browser profile: {err}");
            BrowserProfile {
                user_agent: self
                    .options
                    .custom
                    .clone()
                    .unwrap_or_else(|| FALLBACK_USER_AGENT.to_string()),
                accept: DEFAULT_ACCEPT.into(),
                accept_language: DEFAULT_ACCEPT_LANGUAGE.into(),
            }
        });
        self.cached = Some(profile.clone());
        profile
    }

    pub fn cached_user_agent(&mut self) -> String {
        self.profile().user_agent
    }
}

impl Default for Randomizer {
    fn default() -> Self {
        Self::new(UserAgentOptions::default())
    }
}

const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum UserAgentError {
    #[error("user-agent JSON invalid: {0}")]
    InvalidJson(serde_json::Error),
    #[error("invalid user-agent options: {0}")]
    InvalidOptions(Cow<'static, str>),
    #[error("no matching user-agent profile found")]
    ProfileNotFound,
    #[error("user-agent data initialization failed: {0}")]
    InitializationFailure(String),
}
