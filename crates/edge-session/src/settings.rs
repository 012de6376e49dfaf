use listener_config_and_utils::{
    AppState, Config, ConnectionOptions, ListenOptions, ProtocolConstants, UserAgentPool,
};
use parking_lot::Mutex;
use std::sync::Arc;
use url::Url;

/// Everything a listener needs, resolved from config and credentials.
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub user_id: String,
    /// `Cookie` header sent with the WebSocket upgrade.
    pub cookie_header: String,
    /// Used when no pool is attached.
    pub user_agent: String,
    /// Consulted on every connection attempt, so a reconnect past the
    /// rotation window presents a fresh user agent.
    pub user_agents: Option<Arc<Mutex<UserAgentPool>>>,
    pub listen: ListenOptions,
    pub connection: ConnectionOptions,
    pub protocol: ProtocolConstants,
    /// Cursor to resume from on the first connection.
    pub resume_from: Option<i64>,
}

impl ListenerSettings {
    pub fn from_config(config: &Config, appstate: &AppState, user_agent: impl Into<String>) -> Self {
        let origin_host = Url::parse(&config.connection.origin)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default();

        Self {
            user_id: appstate.user_id().unwrap_or_default().to_string(),
            cookie_header: appstate.cookie_header(&origin_host),
            user_agent: user_agent.into(),
            user_agents: None,
            listen: config.listen.clone(),
            connection: config.connection.clone(),
            protocol: config.protocol.clone(),
            resume_from: None,
        }
    }

    pub fn with_resume_from(mut self, cursor: Option<i64>) -> Self {
        self.resume_from = cursor;
        self
    }

    pub fn with_user_agent_pool(mut self, pool: UserAgentPool) -> Self {
        self.user_agents = Some(Arc::new(Mutex::new(pool)));
        self
    }

    /// User agent for the next connection attempt.
    pub fn current_user_agent(&self) -> String {
        match &self.user_agents {
            Some(pool) => pool.lock().get(),
            None => self.user_agent.clone(),
        }
    }

    /// `Referer` header value derived from the origin.
    pub fn referer(&self) -> String {
        format!("{}/", self.connection.origin.trim_end_matches('/'))
    }
}
