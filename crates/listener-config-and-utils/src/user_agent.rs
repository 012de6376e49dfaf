//! User-agent selection for the WebSocket handshake.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const FIREFOX: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";
const SAFARI: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";
const EDGE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";

const FALLBACK_USER_AGENTS: &[&str] = &[
    CHROME,
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    FIREFOX,
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    SAFARI,
    EDGE,
];

/// User-agent settings from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAgentOptions {
    /// Always used when set; disables rotation.
    pub custom: Option<String>,
    pub rotation_interval_secs: u64,
}

impl Default for UserAgentOptions {
    fn default() -> Self {
        Self {
            custom: None,
            rotation_interval_secs: 3_600,
        }
    }
}

/// Browser family for [`UserAgentPool::by_browser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chrome,
    Firefox,
    Safari,
    Edge,
}

impl BrowserKind {
    /// Parse a browser name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "chrome" => Some(Self::Chrome),
            "firefox" => Some(Self::Firefox),
            "safari" => Some(Self::Safari),
            "edge" => Some(Self::Edge),
            _ => None,
        }
    }
}

/// Holds one user agent per rotation window.
#[derive(Debug)]
pub struct UserAgentPool {
    custom: Option<String>,
    rotation_interval: Duration,
    current: Option<(String, Instant)>,
}

impl UserAgentPool {
    pub fn new(options: &UserAgentOptions) -> Self {
        Self {
            custom: options
                .custom
                .as_deref()
                .map(str::trim)
                .filter(|ua| !ua.is_empty())
                .map(str::to_string),
            rotation_interval: Duration::from_secs(options.rotation_interval_secs),
            current: None,
        }
    }

    /// Current user agent, picking a new one when the window has elapsed.
    pub fn get(&mut self) -> String {
        self.get_at(Instant::now())
    }

    fn get_at(&mut self, now: Instant) -> String {
        if let Some(custom) = &self.custom {
            return custom.clone();
        }

        match &self.current {
            Some((agent, picked_at)) if now.duration_since(*picked_at) <= self.rotation_interval => {
                agent.clone()
            }
            _ => {
                let agent = random_user_agent();
                self.current = Some((agent.clone(), now));
                agent
            }
        }
    }

    /// A user agent for a specific browser family.
    pub fn by_browser(&self, kind: BrowserKind) -> String {
        if let Some(custom) = &self.custom {
            return custom.clone();
        }
        match kind {
            BrowserKind::Chrome => CHROME,
            BrowserKind::Firefox => FIREFOX,
            BrowserKind::Safari => SAFARI,
            BrowserKind::Edge => EDGE,
        }
        .to_string()
    }
}

fn random_user_agent() -> String {
    FALLBACK_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(CHROME)
        .to_string()
}
