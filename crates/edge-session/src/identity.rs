//! Session identity and endpoint selection.

use listener_config_and_utils::{ConnectionOptions, ProtocolConstants};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Largest integer a JSON consumer on the edge can represent exactly.
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Descriptor sent as the CONNECT username.
///
/// Built once per connection attempt and never changed after it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Owner user id.
    pub u: String,
    /// Session nonce.
    pub s: u64,
    pub chat_on: bool,
    pub fg: bool,
    /// Client instance id.
    pub d: String,
    pub ct: String,
    pub aid: String,
    pub aids: Option<String>,
    pub mqtt_sid: String,
    pub cp: u32,
    pub ecp: u32,
    pub st: Vec<String>,
    pub pm: Vec<String>,
    pub dc: String,
    pub no_auto_fg: bool,
    pub gas: Option<String>,
    pub pack: Vec<String>,
    pub p: Option<String>,
    pub php_override: String,
}

impl SessionIdentity {
    pub fn new(
        user_id: &str,
        nonce: u64,
        client_instance_id: &str,
        online: bool,
        foreground: bool,
        protocol: &ProtocolConstants,
    ) -> Self {
        Self {
            u: user_id.to_string(),
            s: nonce,
            chat_on: online,
            fg: foreground,
            d: client_instance_id.to_string(),
            ct: protocol.client_type.clone(),
            aid: protocol.app_id.clone(),
            aids: None,
            mqtt_sid: String::new(),
            cp: protocol.capabilities,
            ecp: protocol.endpoint_capabilities,
            st: Vec::new(),
            pm: Vec::new(),
            dc: String::new(),
            no_auto_fg: true,
            gas: None,
            pack: Vec::new(),
            p: None,
            php_override: String::new(),
        }
    }

    /// JSON form carried in the CONNECT username field.
    pub fn to_username(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Random session nonce in `1..=2^53-1`.
pub fn new_session_nonce() -> u64 {
    rand::thread_rng().gen_range(1..=MAX_SAFE_INTEGER)
}

/// Endpoint for one connection attempt.
///
/// An explicit override wins, then a region-qualified default host, then the
/// plain default host.
pub fn endpoint_url(
    connection: &ConnectionOptions,
    protocol: &ProtocolConstants,
    nonce: u64,
    client_instance_id: &str,
) -> String {
    if let Some(endpoint) = &connection.endpoint_override {
        return format!("{endpoint}&sid={nonce}&cid={client_instance_id}");
    }
    match &connection.region {
        Some(region) => format!(
            "{}?region={}&sid={nonce}&cid={client_instance_id}",
            protocol.default_host,
            region.to_lowercase()
        ),
        None => format!(
            "{}?sid={nonce}&cid={client_instance_id}",
            protocol.default_host
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_fields() {
        let protocol = ProtocolConstants::default();
        let identity = SessionIdentity::new("1000", 42, "guid-1", true, false, &protocol);
        let json: serde_json::Value = serde_json::from_str(&identity.to_username().unwrap()).unwrap();

        assert_eq!(json["u"], "1000");
        assert_eq!(json["s"], 42);
        assert_eq!(json["chat_on"], true);
        assert_eq!(json["fg"], false);
        assert_eq!(json["d"], "guid-1");
        assert_eq!(json["ct"], "websocket");
        assert_eq!(json["aid"], "219994525426954");
        assert_eq!(json["cp"], 3);
        assert_eq!(json["ecp"], 10);
        assert_eq!(json["no_auto_fg"], true);
        assert!(json["aids"].is_null());
        assert_eq!(json["st"], serde_json::json!([]));
        assert_eq!(json["php_override"], "");
    }

    #[test]
    fn test_nonce_range() {
        for _ in 0..1000 {
            let nonce = new_session_nonce();
            assert!((1..=MAX_SAFE_INTEGER).contains(&nonce));
        }
    }

    #[test]
    fn test_endpoint_default() {
        let url = endpoint_url(
            &ConnectionOptions::default(),
            &ProtocolConstants::default(),
            7,
            "abc",
        );
        assert_eq!(url, "wss://edge-chat.facebook.com/chat?sid=7&cid=abc");
    }

    #[test]
    fn test_endpoint_region_is_lowercased() {
        let connection = ConnectionOptions {
            region: Some("PRN".to_string()),
            ..ConnectionOptions::default()
        };
        let url = endpoint_url(&connection, &ProtocolConstants::default(), 7, "abc");
        assert_eq!(url, "wss://edge-chat.facebook.com/chat?region=prn&sid=7&cid=abc");
    }

    #[test]
    fn test_endpoint_override_wins_over_region() {
        let connection = ConnectionOptions {
            region: Some("ATN".to_string()),
            endpoint_override: Some("wss://edge.example.com/chat?x=1".to_string()),
            ..ConnectionOptions::default()
        };
        let url = endpoint_url(&connection, &ProtocolConstants::default(), 7, "abc");
        assert_eq!(url, "wss://edge.example.com/chat?x=1&sid=7&cid=abc");
    }
}
