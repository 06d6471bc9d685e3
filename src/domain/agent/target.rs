//! Resolve user-entered call targets into SIP URIs

use crate::domain::shared::value_objects::SipUri;
use once_cell::sync::Lazy;
use regex::Regex;

/// A user part made only of telephone-number symbols
static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\-\.\(\)]*\+?[0-9\-\.\(\)]+$").unwrap());

static SCHEME_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(sips?|tel):").unwrap());

/// Turn `target` into a SIP URI.
///
/// A bare user is placed at `default_host`. `sip:`, `sips:` and `tel:`
/// prefixes are dropped, and visual separators are stripped from numbers.
pub fn normalize_target(target: &str, default_host: &str) -> Option<SipUri> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }

    let (user, host) = match target.rsplit_once('@') {
        Some((user, host)) => (user, host),
        None => (target, default_host),
    };

    let user = SCHEME_PREFIX.replace(user, "");
    let user = if PHONE_NUMBER.is_match(&user) {
        user.chars()
            .filter(|c| !matches!(c, '-' | '.' | '(' | ')'))
            .collect::<String>()
    } else {
        user.into_owned()
    };

    SipUri::parse(&format!("sip:{}@{}", escape_user(&user), host)).ok()
}

/// Percent-escape a user part, keeping the characters SIP allows unescaped
fn escape_user(user: &str) -> String {
    let mut escaped = String::with_capacity(user.len());
    for byte in user.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')'
            | b'+'
            | b'/' => escaped.push(byte as char),
            _ => escaped.push_str(&format!("%{:02X}", byte)),
        }
    }
    escaped
}
