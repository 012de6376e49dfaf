//! Configuration, paths, and collaborator utilities for the edge listener.
//!
//! Everything here sits outside the listening core: config loading, the
//! cookie file the session consumes, user-agent selection, and logging setup.

mod config;
mod credentials;
mod error;
mod logging;
mod paths;
mod user_agent;

pub use config::{
    Config, ConnectionOptions, ListenOptions, ProtocolConstants, DEFAULT_EDGE_HOST,
    DEFAULT_LOG_LEVEL,
};
pub use credentials::{AppState, CookieEntry, CredentialsError, USER_ID_COOKIE};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
pub use user_agent::{BrowserKind, UserAgentOptions, UserAgentPool};
