//! Shared value objects used across the agent

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SIP URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UriScheme {
    Sip,
    Sips,
}

impl UriScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            UriScheme::Sip => "sip",
            UriScheme::Sips => "sips",
        }
    }
}

/// SIP URI value object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SipUri {
    scheme: UriScheme,
    user: Option<String>,
    host: String,
    port: Option<u16>,
    params: Vec<(String, Option<String>)>,
}

impl SipUri {
    pub fn new(scheme: UriScheme, user: Option<String>, host: String, port: Option<u16>) -> Self {
        Self {
            scheme,
            user,
            host,
            port,
            params: Vec::new(),
        }
    }

    /// Whether `uri` starts with a scheme this type understands.
    pub fn has_scheme(uri: &str) -> bool {
        let lower = uri.trim_start().to_ascii_lowercase();
        lower.starts_with("sip:") || lower.starts_with("sips:")
    }

    pub fn parse(uri: &str) -> Result<Self, String> {
        let uri = uri.trim();
        let (scheme, rest) = uri
            .split_once(':')
            .ok_or_else(|| "URI has no scheme".to_string())?;

        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "sip" => UriScheme::Sip,
            "sips" => UriScheme::Sips,
            other => return Err(format!("Unsupported URI scheme: {}", other)),
        };

        // URI headers are not kept
        let rest = rest.split('?').next().unwrap_or_default();

        let (user, host_part) = match rest.split_once('@') {
            Some((userinfo, host_part)) => {
                let user = userinfo.split(':').next().unwrap_or_default();
                if user.is_empty() {
                    return Err("Empty user part".to_string());
                }
                (Some(user.to_string()), host_part)
            }
            None => (None, rest),
        };

        let mut segments = host_part.split(';');
        let host_port = segments.next().unwrap_or_default();
        let params = segments
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((name, value)) => (name.to_ascii_lowercase(), Some(value.to_string())),
                None => (p.to_ascii_lowercase(), None),
            })
            .collect();

        let (host, port) = if let Some(stripped) = host_port.strip_prefix('[') {
            let end = stripped
                .find(']')
                .ok_or_else(|| "Invalid IPv6 reference".to_string())?;
            let host = format!("[{}]", &stripped[..end]);
            let port = match stripped[end + 1..].strip_prefix(':') {
                Some(port) => Some(Self::parse_port(port)?),
                None => None,
            };
            (host, port)
        } else {
            match host_port.rsplit_once(':') {
                Some((host, port)) => (host.to_string(), Some(Self::parse_port(port)?)),
                None => (host_port.to_string(), None),
            }
        };

        if host.is_empty()
            || !host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '[' | ']' | ':'))
        {
            return Err(format!("Invalid host: {}", host));
        }

        Ok(Self {
            scheme,
            user,
            host,
            port,
            params,
        })
    }

    fn parse_port(port: &str) -> Result<u16, String> {
        port.parse().map_err(|_| format!("Invalid port: {}", port))
    }

    pub fn scheme(&self) -> UriScheme {
        self.scheme
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// `host[:port]`
    pub fn host_port(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    pub fn with_param(mut self, name: &str, value: Option<&str>) -> Self {
        self.params.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.params
            .push((name.to_string(), value.map(|v| v.to_string())));
        self
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme.as_str())?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host_port())?;
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

/// Transaction class (RFC 3261 Section 17)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// INVITE Client Transaction
    InviteClient,
    /// Non-INVITE Client Transaction
    NonInviteClient,
    /// INVITE Server Transaction
    InviteServer,
    /// Non-INVITE Server Transaction
    NonInviteServer,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 4] = [
        TransactionKind::InviteClient,
        TransactionKind::NonInviteClient,
        TransactionKind::InviteServer,
        TransactionKind::NonInviteServer,
    ];

    pub fn is_client(&self) -> bool {
        matches!(self, TransactionKind::InviteClient | TransactionKind::NonInviteClient)
    }

    pub fn is_invite(&self) -> bool {
        matches!(self, TransactionKind::InviteClient | TransactionKind::InviteServer)
    }

    /// Short RFC 3261 name (ICT, NICT, IST, NIST)
    pub fn name(&self) -> &'static str {
        match self {
            TransactionKind::InviteClient => "ICT",
            TransactionKind::NonInviteClient => "NICT",
            TransactionKind::InviteServer => "IST",
            TransactionKind::NonInviteServer => "NIST",
        }
    }
}

/// Dialog identifier (RFC 3261 Section 12)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

impl DialogId {
    pub fn new(call_id: &str, local_tag: &str, remote_tag: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
            local_tag: local_tag.to_string(),
            remote_tag: remote_tag.to_string(),
        }
    }

    /// Same dialog seen from the other peer
    pub fn swapped(&self) -> Self {
        Self {
            call_id: self.call_id.clone(),
            local_tag: self.remote_tag.clone(),
            remote_tag: self.local_tag.clone(),
        }
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.call_id, self.local_tag, self.remote_tag)
    }
}

/// Session key: Call-ID followed by one of the two tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(call_id: &str, tag: &str) -> Self {
        Self(format!("{}{}", call_id, tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Random lowercase alphanumeric token
pub fn random_token<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}
