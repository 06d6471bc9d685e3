//! Validated, immutable agent settings and the derived Contact identity

use crate::domain::shared::value_objects::SipUri;
use crate::domain::transport::CandidateServer;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TURN server entry, after alias normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// Options handed to the transport collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Reconnects the transport performs on its own after a dropped link
    pub max_reconnection: u32,
    /// Seconds between those reconnects
    pub reconnection_timeout: u64,
    /// WebSocket sub-protocol
    pub protocol: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            max_reconnection: 3,
            reconnection_timeout: 4,
            protocol: "sip".to_string(),
        }
    }
}

impl TransportOptions {
    pub fn reconnection_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnection_timeout)
    }
}

/// Fully checked configuration. Fields are only readable.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub(crate) uri: SipUri,
    pub(crate) authorization_user: String,
    pub(crate) display_name: Option<String>,
    #[serde(skip_serializing)]
    pub(crate) password: Option<String>,
    pub(crate) registrar_server: SipUri,
    pub(crate) ws_servers: Vec<CandidateServer>,
    pub(crate) stun_servers: Vec<String>,
    pub(crate) turn_servers: Vec<TurnServer>,
    pub(crate) instance_id: String,
    pub(crate) connection_recovery_min_interval: Duration,
    pub(crate) connection_recovery_max_interval: Duration,
    pub(crate) register: bool,
    pub(crate) register_expires: u32,
    pub(crate) no_answer_timeout_ms: u64,
    pub(crate) hack_via_tcp: bool,
    pub(crate) hack_via_ws: bool,
    pub(crate) hack_ip_in_contact: bool,
    pub(crate) use_preloaded_route: bool,
    pub(crate) transport_options: TransportOptions,
    pub(crate) via_host: String,
    pub(crate) session_token: String,
}

impl Settings {
    pub fn uri(&self) -> &SipUri {
        &self.uri
    }

    pub fn authorization_user(&self) -> &str {
        &self.authorization_user
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn registrar_server(&self) -> &SipUri {
        &self.registrar_server
    }

    pub fn ws_servers(&self) -> &[CandidateServer] {
        &self.ws_servers
    }

    pub fn stun_servers(&self) -> &[String] {
        &self.stun_servers
    }

    pub fn turn_servers(&self) -> &[TurnServer] {
        &self.turn_servers
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn connection_recovery_min_interval(&self) -> Duration {
        self.connection_recovery_min_interval
    }

    pub fn connection_recovery_max_interval(&self) -> Duration {
        self.connection_recovery_max_interval
    }

    pub fn register(&self) -> bool {
        self.register
    }

    pub fn register_expires(&self) -> u32 {
        self.register_expires
    }

    pub fn no_answer_timeout(&self) -> Duration {
        Duration::from_millis(self.no_answer_timeout_ms)
    }

    pub fn hack_via_tcp(&self) -> bool {
        self.hack_via_tcp
    }

    pub fn hack_via_ws(&self) -> bool {
        self.hack_via_ws
    }

    pub fn hack_ip_in_contact(&self) -> bool {
        self.hack_ip_in_contact
    }

    pub fn use_preloaded_route(&self) -> bool {
        self.use_preloaded_route
    }

    pub fn transport_options(&self) -> &TransportOptions {
        &self.transport_options
    }

    /// Host placed in Via and Contact
    pub fn via_host(&self) -> &str {
        &self.via_host
    }

    /// Opaque per-construction token
    pub fn session_token(&self) -> &str {
        &self.session_token
    }
}

/// The agent's own addressable identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub pub_gruu: Option<String>,
    pub temp_gruu: Option<String>,
    pub uri: SipUri,
}

const ANONYMOUS_CONTACT: &str = "sip:anonymous@anonymous.invalid;transport=ws";

impl Contact {
    pub fn new(uri: SipUri) -> Self {
        Self {
            pub_gruu: None,
            temp_gruu: None,
            uri,
        }
    }

    /// Contact header value for the given anonymity and outbound flags.
    pub fn render(&self, anonymous: bool, outbound: bool) -> String {
        let (gruu, fallback) = if anonymous {
            (self.temp_gruu.as_deref(), ANONYMOUS_CONTACT.to_string())
        } else {
            (self.pub_gruu.as_deref(), self.uri.to_string())
        };

        let mut contact = String::from("<");
        contact.push_str(gruu.unwrap_or(&fallback));
        if outbound && gruu.is_none() {
            contact.push_str(";ob");
        }
        contact.push('>');
        contact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        Contact::new(SipUri::parse("sip:k3x9q2ab@abc.invalid;transport=ws").unwrap())
    }

    #[test]
    fn test_render_plain() {
        assert_eq!(contact().render(false, false), "<sip:k3x9q2ab@abc.invalid;transport=ws>");
        assert_eq!(contact().render(false, true), "<sip:k3x9q2ab@abc.invalid;transport=ws;ob>");
    }

    #[test]
    fn test_render_anonymous() {
        assert_eq!(
            contact().render(true, true),
            "<sip:anonymous@anonymous.invalid;transport=ws;ob>"
        );
    }

    #[test]
    fn test_render_with_gruus() {
        let mut c = contact();
        c.pub_gruu = Some("sip:alice@example.com;gr=urn:uuid:1".to_string());
        c.temp_gruu = Some("sip:tgruu.7hs@example.com;gr".to_string());

        assert_eq!(c.render(false, true), "<sip:alice@example.com;gr=urn:uuid:1>");
        assert_eq!(c.render(true, true), "<sip:tgruu.7hs@example.com;gr>");
    }

    #[test]
    fn test_transport_options_defaults_fill_missing_fields() {
        let opts: TransportOptions =
            serde_json::from_value(serde_json::json!({ "max_reconnection": 5 })).unwrap();
        assert_eq!(opts.max_reconnection, 5);
        assert_eq!(opts.reconnection_timeout(), Duration::from_secs(4));
        assert_eq!(opts.protocol, "sip");
    }
}
