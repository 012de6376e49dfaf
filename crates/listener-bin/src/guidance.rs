//! One-line, actionable guidance for the errors a user can fix.

use edge_session::ListenError;
use listener_config_and_utils::{AppState, CoreError, CredentialsError};

/// Cookie set while the account is held at a checkpoint.
const CHECKPOINT_COOKIE: &str = "checkpoint";

/// MQTT return codes meaning the credentials were not accepted.
const BAD_CREDENTIALS: u8 = 4;
const NOT_AUTHORIZED: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guidance {
    pub kind: &'static str,
    pub message: String,
}

impl Guidance {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Guidance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

pub fn for_credentials_error(error: &CredentialsError) -> Guidance {
    match error {
        CredentialsError::Missing(path) => Guidance::new(
            "missing_appstate",
            format!(
                "No cookie file at {}. Export your cookies as a JSON array and save them there.",
                path.display()
            ),
        ),
        CredentialsError::Empty(path) => Guidance::new(
            "empty_appstate",
            format!(
                "{} is empty. Add cookies in the form [{{\"key\":\"c_user\",\"value\":\"...\"}}].",
                path.display()
            ),
        ),
        CredentialsError::InvalidJson { path, source } => Guidance::new(
            "invalid_json",
            format!(
                "{} is not valid JSON ({source}). Fix the syntax or export fresh cookies.",
                path.display()
            ),
        ),
        CredentialsError::MissingUserCookie => Guidance::new(
            "expired_cookies",
            "The cookie file has no c_user cookie. Log in again and export fresh cookies.",
        ),
        CredentialsError::Io(e) => {
            Guidance::new("appstate_unreadable", format!("Could not read the cookie file: {e}"))
        }
    }
}

pub fn for_config_error(error: &CoreError) -> Guidance {
    Guidance::new(
        "invalid_config",
        format!("{error}. Fix config.json or the EDGE_LISTENER_* environment variables."),
    )
}

pub fn for_listen_error(error: &ListenError) -> Guidance {
    match error {
        ListenError::StopListen { .. } => Guidance::new(
            "network_error",
            "Lost the connection to the edge. Check your network, then restart or enable auto-reconnect.",
        ),
        ListenError::Handshake(rejected)
            if matches!(rejected.code(), BAD_CREDENTIALS | NOT_AUTHORIZED) =>
        {
            Guidance::new(
                "expired_cookies",
                "The edge rejected the session. Log in again in a private window and export fresh cookies.",
            )
        }
        ListenError::Handshake(rejected) => Guidance::new(
            "handshake_rejected",
            format!("The edge refused the connection ({rejected}). Try again later."),
        ),
    }
}

/// Guidance when the account is held at a checkpoint.
///
/// Checkpoints whose value carries one of `ignored_codes` are cleared
/// automatically upstream and yield nothing.
pub fn for_checkpoint(appstate: &AppState, ignored_codes: &[String]) -> Option<Guidance> {
    let checkpoint = appstate
        .cookies()
        .iter()
        .find(|cookie| cookie.key == CHECKPOINT_COOKIE)?;

    if ignored_codes
        .iter()
        .any(|code| !code.is_empty() && checkpoint.value.contains(code.as_str()))
    {
        return None;
    }

    Some(Guidance::new(
        "checkpoint",
        "The account is held at a checkpoint. Complete the verification in a browser, then export fresh cookies.",
    ))
}
