//! Configuration management for the listener.

use crate::{parse_level, CoreError, CoreResult, Paths, UserAgentOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Generic edge endpoint used when neither an override nor a region is set.
pub const DEFAULT_EDGE_HOST: &str = "wss://edge-chat.facebook.com/chat";

const DEFAULT_ORIGIN: &str = "https://www.facebook.com";

/// Topics subscribed after every handshake.
const DEFAULT_TOPICS: &[&str] = &[
    "/ls_req",
    "/ls_resp",
    "/legacy_web",
    "/webrtc",
    "/rtc_multi",
    "/onevc",
    "/br_sr",
    "/sr_res",
    "/t_ms",
    "/thread_typing",
    "/orca_typing_notifications",
    "/notify_disconnect",
    "/orca_presence",
    "/inbox",
    "/mercury",
    "/messaging_events",
    "/orca_message_notifications",
    "/pp",
    "/webrtc_response",
];

/// Main listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub listen: ListenOptions,
    #[serde(default)]
    pub connection: ConnectionOptions,
    #[serde(default)]
    pub protocol: ProtocolConstants,
    #[serde(default)]
    pub user_agent: UserAgentOptions,
    /// Checkpoint codes that are handled automatically upstream and must not
    /// be reported as a credential problem.
    #[serde(default)]
    pub ignored_checkpoint_codes: Vec<String>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Consumer-facing listen flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenOptions {
    /// Reconnect after transport loss instead of terminating.
    pub auto_reconnect: bool,
    /// Deliver messages sent by the session owner.
    pub self_listen: bool,
    /// Presence flag advertised in the session identity.
    pub online: bool,
    /// Foreground flag advertised in the session identity.
    pub foreground: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            self_listen: false,
            online: true,
            foreground: false,
        }
    }
}

/// Endpoint selection, keepalive and reconnect timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Region hint, e.g. "ATN" or "PRN".
    pub region: Option<String>,
    /// Full endpoint URL that replaces region-based selection.
    pub endpoint_override: Option<String>,
    /// HTTP proxy URL used to tunnel the WebSocket.
    pub proxy: Option<String>,
    pub origin: String,
    /// Keepalive interval in seconds, sent in CONNECT and used for pings.
    pub keepalive_secs: u16,
    /// Upper bound for socket open plus handshake.
    pub connect_timeout_secs: u64,
    /// Delay before the first reconnect attempt.
    pub reconnect_base_delay_ms: u64,
    /// Cap for the doubling reconnect delay.
    pub reconnect_max_delay_ms: u64,
    pub clean_session: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_override: None,
            proxy: None,
            origin: DEFAULT_ORIGIN.to_string(),
            keepalive_secs: 60,
            connect_timeout_secs: 30,
            reconnect_base_delay_ms: 3_000,
            reconnect_max_delay_ms: 30_000,
            clean_session: true,
        }
    }
}

/// Versioned wire constants. The edge changes these without notice, so they
/// live in config rather than in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConstants {
    pub default_host: String,
    pub client_id: String,
    pub protocol_name: String,
    pub protocol_level: u8,
    /// Application id advertised as `aid`.
    pub app_id: String,
    /// Client type advertised as `ct`.
    pub client_type: String,
    /// Capability bitmask advertised as `cp`.
    pub capabilities: u32,
    /// Endpoint capability bitmask advertised as `ecp`.
    pub endpoint_capabilities: u32,
    pub topics: Vec<String>,
    /// The only topic whose payloads are decoded.
    pub delta_topic: String,
    pub sync_queue_topic: String,
    pub sync_api_version: u32,
    pub max_deltas_able_to_process: u32,
    pub delta_batch_size: u32,
    pub encoding: String,
}

impl Default for ProtocolConstants {
    fn default() -> Self {
        Self {
            default_host: DEFAULT_EDGE_HOST.to_string(),
            client_id: "mqttwsclient".to_string(),
            protocol_name: "MQIsdp".to_string(),
            protocol_level: 3,
            app_id: "219994525426954".to_string(),
            client_type: "websocket".to_string(),
            capabilities: 3,
            endpoint_capabilities: 10,
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            delta_topic: "/t_ms".to_string(),
            sync_queue_topic: "/messenger_sync_create_queue".to_string(),
            sync_api_version: 11,
            max_deltas_able_to_process: 100,
            delta_batch_size: 500,
            encoding: "JSON".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            listen: ListenOptions::default(),
            connection: ConnectionOptions::default(),
            protocol: ProtocolConstants::default(),
            user_agent: UserAgentOptions::default(),
            ignored_checkpoint_codes: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| CoreError::MalformedConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(level) = env_value("EDGE_LISTENER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(region) = env_value("EDGE_LISTENER_REGION") {
            self.connection.region = Some(region);
        }
        if let Some(endpoint) = env_value("EDGE_LISTENER_ENDPOINT") {
            self.connection.endpoint_override = Some(endpoint);
        }
        if let Some(proxy) = env_value("EDGE_LISTENER_PROXY") {
            self.connection.proxy = Some(proxy);
        }
    }

    /// Reject configurations the session cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if parse_level(&self.log_level).is_none() {
            return Err(invalid("log_level", format!("unknown level {:?}", self.log_level)));
        }

        if let Some(endpoint) = &self.connection.endpoint_override {
            check_url("connection.endpoint_override", endpoint)?;
        }
        if let Some(proxy) = &self.connection.proxy {
            check_url("connection.proxy", proxy)?;
        }
        check_url("protocol.default_host", &self.protocol.default_host)?;

        if self.connection.keepalive_secs == 0 {
            return Err(invalid("connection.keepalive_secs", "must be positive"));
        }
        if self.connection.reconnect_max_delay_ms < self.connection.reconnect_base_delay_ms {
            return Err(invalid(
                "connection.reconnect_max_delay_ms",
                "must not be below reconnect_base_delay_ms",
            ));
        }
        if !self.protocol.topics.contains(&self.protocol.delta_topic) {
            return Err(invalid(
                "protocol.delta_topic",
                format!("{} is not in the subscribed topic set", self.protocol.delta_topic),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidSetting {
        field,
        reason: reason.into(),
    }
}

fn check_url(field: &'static str, raw: &str) -> CoreResult<()> {
    Url::parse(raw)
        .map(|_| ())
        .map_err(|source| CoreError::InvalidUrl { field, source })
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}
