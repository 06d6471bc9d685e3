//! Grammar checks for configuration values (RFC 3261, RFC 7064, RFC 7065)

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;
use uuid::Uuid;

/// Content of a SIP quoted-string, without the surrounding quotes
static QUOTED_STRING_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:[\t\x20\x21\x23-\x5B\x5D-\x7E]|[^\x00-\x7F]|\\[\x00-\x09\x0B\x0C\x0E-\x7F])*$"#)
        .unwrap()
});

static STUN_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^stuns?:(?:\[[0-9A-Fa-f:.]+\]|[A-Za-z0-9\-._~!$&'()*+,;=%]+)(?::[0-9]{1,5})?$")
        .unwrap()
});

static TURN_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^turns?:(?:\[[0-9A-Fa-f:.]+\]|[A-Za-z0-9\-._~!$&'()*+,;=%]+)(?::[0-9]{1,5})?(?:\?transport=[A-Za-z0-9\-._~]+)?$",
    )
    .unwrap()
});

/// `value` would form a valid quoted-string once wrapped in double quotes.
pub fn is_quoted_string_content(value: &str) -> bool {
    QUOTED_STRING_CONTENT.is_match(value)
}

/// Hyphenated 8-4-4-4-12 form only.
pub fn is_uuid(value: &str) -> bool {
    value.len() == 36 && Uuid::try_parse(value).is_ok()
}

pub fn is_stun_uri(value: &str) -> bool {
    STUN_URI.is_match(value)
}

pub fn is_turn_uri(value: &str) -> bool {
    TURN_URI.is_match(value)
}

/// Parsed `ws://` / `wss://` absolute URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUri {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

pub fn parse_ws_uri(value: &str) -> Option<WsUri> {
    let url = Url::parse(value).ok()?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return None;
    }
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(WsUri {
        scheme: url.scheme().to_string(),
        host: host.to_string(),
        port: url.port(),
    })
}
