//! Configuration validation
//!
//! Every known parameter has a checker that returns the normalized value or
//! `None` when the input is invalid. Mandatory parameters must be present;
//! optional ones that are missing or empty keep their default. The result is
//! built fresh on every call.

use super::grammar;
use super::settings::{Contact, Settings, TransportOptions, TurnServer};
use super::RawConfiguration;
use crate::domain::shared::error::ConfigurationError;
use crate::domain::shared::value_objects::{random_token, SipUri, UriScheme};
use crate::domain::transport::CandidateServer;
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const MANDATORY: &[&str] = &["uri", "ws_servers"];

const OPTIONAL: &[&str] = &[
    "authorization_user",
    "connection_recovery_max_interval",
    "connection_recovery_min_interval",
    "display_name",
    "hack_via_tcp",
    "hack_via_ws",
    "hack_ip_in_contact",
    "instance_id",
    "no_answer_timeout",
    "password",
    "register",
    "register_expires",
    "registrar_server",
    "stun_servers",
    "turn_servers",
    "use_preloaded_route",
    "transport_options",
];

const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Output of a successful validation
#[derive(Debug, Clone)]
pub struct Validated {
    pub settings: Settings,
    pub contact: Contact,
}

/// Fold a raw configuration into settings and the contact identity.
pub fn validate<R: Rng + ?Sized>(
    raw: &RawConfiguration,
    rng: &mut R,
) -> Result<Validated, ConfigurationError> {
    // Mandatory parameters
    let uri = mandatory(raw, "uri", check_uri)?;
    let ws_servers = mandatory(raw, "ws_servers", check_ws_servers)?;

    let mut authorization_user = None;
    let mut display_name = None;
    let mut password = None;
    let mut registrar_server = None;
    let mut instance_id = None;
    let mut stun_servers = vec![DEFAULT_STUN_SERVER.to_string()];
    let mut turn_servers = Vec::new();
    let mut min_interval = Duration::from_secs(2);
    let mut max_interval = Duration::from_secs(30);
    let mut register = true;
    let mut register_expires = 600;
    let mut no_answer_timeout_ms = 60_000;
    let mut hack_via_tcp = false;
    let mut hack_via_ws = false;
    let mut hack_ip_in_contact = false;
    let mut use_preloaded_route = false;
    let mut transport_options = TransportOptions::default();

    for key in raw.keys() {
        if !MANDATORY.contains(&key.as_str()) && !OPTIONAL.contains(&key.as_str()) {
            debug!("Ignoring unknown configuration parameter '{}'", key);
        }
    }

    // Optional parameters
    for &parameter in OPTIONAL {
        let value = match raw.get(parameter) {
            Some(value) if !is_empty(value) => value,
            _ => continue,
        };
        let invalid = || ConfigurationError::invalid(parameter, value);

        match parameter {
            "authorization_user" => {
                authorization_user = Some(check_sip_string(value).ok_or_else(invalid)?)
            }
            "connection_recovery_max_interval" => {
                max_interval = check_interval(value).ok_or_else(invalid)?
            }
            "connection_recovery_min_interval" => {
                min_interval = check_interval(value).ok_or_else(invalid)?
            }
            "display_name" => display_name = Some(check_sip_string(value).ok_or_else(invalid)?),
            "hack_via_tcp" => hack_via_tcp = value.as_bool().ok_or_else(invalid)?,
            "hack_via_ws" => hack_via_ws = value.as_bool().ok_or_else(invalid)?,
            "hack_ip_in_contact" => hack_ip_in_contact = value.as_bool().ok_or_else(invalid)?,
            "instance_id" => instance_id = Some(check_instance_id(value).ok_or_else(invalid)?),
            "no_answer_timeout" => {
                no_answer_timeout_ms =
                    (positive_number(value).ok_or_else(invalid)? * 1000.0).round() as u64
            }
            "password" => password = Some(check_password(value).ok_or_else(invalid)?),
            "register" => register = value.as_bool().ok_or_else(invalid)?,
            "register_expires" => {
                register_expires = check_register_expires(value).ok_or_else(invalid)?
            }
            "registrar_server" => {
                registrar_server = Some(check_registrar_server(value).ok_or_else(invalid)?)
            }
            "stun_servers" => stun_servers = check_stun_servers(value).ok_or_else(invalid)?,
            "turn_servers" => turn_servers = check_turn_servers(value).ok_or_else(invalid)?,
            "use_preloaded_route" => use_preloaded_route = value.as_bool().ok_or_else(invalid)?,
            "transport_options" => {
                transport_options =
                    serde_json::from_value(value.clone()).map_err(|_| invalid())?
            }
            _ => unreachable!("parameter list and checker table out of sync"),
        }
    }

    // Sanity checks
    if max_interval < min_interval {
        return Err(ConfigurationError::invalid(
            "connection_recovery_max_interval",
            max_interval.as_secs_f64(),
        ));
    }

    // Derived values
    let user = uri.user().unwrap_or_default().to_string();
    let authorization_user = authorization_user.unwrap_or_else(|| user.clone());
    let registrar_server = registrar_server.unwrap_or_else(|| uri.clone().with_user(None));
    let instance_id = instance_id.unwrap_or_else(|| {
        uuid::Builder::from_random_bytes(rng.gen())
            .into_uuid()
            .to_string()
    });
    let session_token = random_token(rng, 10);

    let via_host = if hack_ip_in_contact {
        format!("192.0.2.{}", rng.gen_range(1..=254))
    } else {
        format!("{}.invalid", random_token(rng, 12))
    };

    let contact = Contact::new(
        SipUri::new(
            UriScheme::Sip,
            Some(random_token(rng, 8)),
            via_host.clone(),
            None,
        )
        .with_param("transport", Some("ws")),
    );

    info!(
        "Configuration validated for {} ({} candidate server(s))",
        uri,
        ws_servers.len()
    );

    let settings = Settings {
        uri,
        authorization_user,
        display_name,
        password,
        registrar_server,
        ws_servers,
        stun_servers,
        turn_servers,
        instance_id,
        connection_recovery_min_interval: min_interval,
        connection_recovery_max_interval: max_interval,
        register,
        register_expires,
        no_answer_timeout_ms,
        hack_via_tcp,
        hack_via_ws,
        hack_ip_in_contact,
        use_preloaded_route,
        transport_options,
        via_host,
        session_token,
    };

    Ok(Validated { settings, contact })
}

fn mandatory<T>(
    raw: &RawConfiguration,
    parameter: &str,
    check: fn(&Value) -> Option<T>,
) -> Result<T, ConfigurationError> {
    let value = match raw.get(parameter) {
        Some(value) if !value.is_null() => value,
        _ => return Err(ConfigurationError::missing(parameter)),
    };
    check(value).ok_or_else(|| ConfigurationError::invalid(parameter, value))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Number, or string holding one, strictly above zero
/// Positive number of seconds that fits a `Duration`
fn check_interval(value: &Value) -> Option<Duration> {
    positive_number(value).and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn positive_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (number.is_finite() && number > 0.0).then_some(number)
}

fn with_sip_scheme(value: &str) -> String {
    if SipUri::has_scheme(value) {
        value.to_string()
    } else {
        format!("sip:{}", value)
    }
}

fn check_uri(value: &Value) -> Option<SipUri> {
    let uri = SipUri::parse(&with_sip_scheme(value.as_str()?)).ok()?;
    uri.user().is_some().then_some(uri)
}

fn check_registrar_server(value: &Value) -> Option<SipUri> {
    let uri = SipUri::parse(&with_sip_scheme(value.as_str()?)).ok()?;
    uri.user().is_none().then_some(uri)
}

fn check_ws_servers(value: &Value) -> Option<Vec<CandidateServer>> {
    let entries = match value {
        Value::String(_) => vec![value],
        Value::Array(items) if !items.is_empty() => items.iter().collect(),
        _ => return None,
    };

    entries
        .into_iter()
        .map(|entry| {
            let (uri, weight) = match entry {
                Value::String(uri) => (uri.as_str(), 0),
                Value::Object(fields) => {
                    let uri = fields
                        .get("uri")
                        .or_else(|| fields.get("ws_uri"))
                        .and_then(Value::as_str)?;
                    let weight = match fields.get("weight") {
                        None | Some(Value::Null) => 0,
                        Some(weight) => u32::try_from(weight.as_u64()?).ok()?,
                    };
                    (uri, weight)
                }
                _ => return None,
            };
            let parsed = grammar::parse_ws_uri(uri)?;
            Some(CandidateServer::new(
                uri,
                &parsed.scheme,
                &parsed.host,
                parsed.port,
                weight,
            ))
        })
        .collect()
}

fn check_sip_string(value: &Value) -> Option<String> {
    let s = value.as_str()?;
    grammar::is_quoted_string_content(s).then(|| s.to_string())
}

fn check_instance_id(value: &Value) -> Option<String> {
    let s = value.as_str()?;
    let id = match s.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("uuid:") => &s[5..],
        _ => s,
    };
    grammar::is_uuid(id).then(|| id.to_string())
}

fn check_password(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn check_register_expires(value: &Value) -> Option<u32> {
    let expires = positive_number(value)?;
    (expires.fract() == 0.0 && expires <= u32::MAX as f64).then_some(expires as u32)
}

fn check_stun_servers(value: &Value) -> Option<Vec<String>> {
    let entries = match value {
        Value::String(_) => vec![value],
        Value::Array(items) => items.iter().collect(),
        _ => return None,
    };

    entries
        .into_iter()
        .map(|entry| {
            let server = entry.as_str()?;
            let server = if server.starts_with("stun:") || server.starts_with("stuns:") {
                server.to_string()
            } else {
                format!("stun:{}", server)
            };
            grammar::is_stun_uri(&server).then_some(server)
        })
        .collect()
}

fn check_turn_servers(value: &Value) -> Option<Vec<TurnServer>> {
    let entries = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    entries
        .into_iter()
        .map(|entry| {
            let fields = entry.as_object()?;
            let urls = fields.get("urls").or_else(|| fields.get("server"))?;
            let username = fields.get("username").and_then(Value::as_str)?;
            let credential = fields
                .get("credential")
                .or_else(|| fields.get("password"))
                .and_then(Value::as_str)?;

            let urls = match urls {
                Value::String(url) => vec![url.as_str()],
                Value::Array(items) => items.iter().map(Value::as_str).collect::<Option<Vec<_>>>()?,
                _ => return None,
            };
            if urls.is_empty() {
                return None;
            }

            let urls = urls
                .into_iter()
                .map(|url| {
                    let url = if url.starts_with("turn:") || url.starts_with("turns:") {
                        url.to_string()
                    } else {
                        format!("turn:{}", url)
                    };
                    grammar::is_turn_uri(&url).then_some(url)
                })
                .collect::<Option<Vec<_>>>()?;

            Some(TurnServer {
                urls,
                username: username.to_string(),
                credential: credential.to_string(),
            })
        })
        .collect()
}
