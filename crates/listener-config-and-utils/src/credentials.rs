//! Cookie-jar export consumed by the session.
//!
//! The listener never logs in. It expects an `appstate.json` exported from a
//! logged-in browser: a JSON array of cookie entries. The `c_user` cookie
//! names the session owner.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Cookie carrying the logged-in user's id.
pub const USER_ID_COOKIE: &str = "c_user";

/// Errors raised while loading the cookie file.
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("appstate file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("appstate file is empty: {}", .0.display())]
    Empty(PathBuf),

    #[error("appstate file {} is not a valid cookie array: {source}", .path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("appstate has no c_user cookie")]
    MissingUserCookie,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One exported cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEntry {
    /// Browser extensions export either `key` or `name`.
    #[serde(alias = "name")]
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl CookieEntry {
    /// Whether this cookie would be sent to `host`.
    fn applies_to(&self, host: &str) -> bool {
        match self.domain.as_deref() {
            None => true,
            Some(domain) => {
                let domain = domain.trim_start_matches('.');
                host == domain || host.ends_with(&format!(".{domain}"))
            }
        }
    }
}

/// Loaded cookie jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    cookies: Vec<CookieEntry>,
}

impl AppState {
    /// Load and validate the cookie file at `path`.
    pub fn load(path: &Path) -> Result<Self, CredentialsError> {
        if !path.exists() {
            return Err(CredentialsError::Missing(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, CredentialsError> {
        if content.trim().is_empty() {
            return Err(CredentialsError::Empty(path.to_path_buf()));
        }

        let cookies: Vec<CookieEntry> =
            serde_json::from_str(content).map_err(|source| CredentialsError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;
        if cookies.is_empty() {
            return Err(CredentialsError::Empty(path.to_path_buf()));
        }

        let state = Self { cookies };
        if state.user_id().is_none() {
            return Err(CredentialsError::MissingUserCookie);
        }
        Ok(state)
    }

    /// Build from already-parsed entries.
    pub fn from_cookies(cookies: Vec<CookieEntry>) -> Result<Self, CredentialsError> {
        let state = Self { cookies };
        if state.user_id().is_none() {
            return Err(CredentialsError::MissingUserCookie);
        }
        Ok(state)
    }

    pub fn cookies(&self) -> &[CookieEntry] {
        &self.cookies
    }

    /// The session owner's user id.
    pub fn user_id(&self) -> Option<&str> {
        self.cookies
            .iter()
            .find(|cookie| cookie.key == USER_ID_COOKIE)
            .map(|cookie| cookie.value.as_str())
    }

    /// `Cookie` header value for requests to `host`.
    pub fn cookie_header(&self, host: &str) -> String {
        self.cookies
            .iter()
            .filter(|cookie| cookie.applies_to(host))
            .map(|cookie| format!("{}={}", cookie.key, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
