//! Configuration management
//!
//! The agent is configured from a loosely-typed key/value record
//! ([`RawConfiguration`]) that is folded into an immutable [`Settings`] by
//! [`validate`]. The raw record can be built in code or loaded from a
//! TOML/JSON/YAML file with `SIPUA_*` environment overrides.

pub mod grammar;
pub mod settings;
pub mod validator;

pub use settings::{Contact, Settings, TransportOptions, TurnServer};
pub use validator::{validate, Validated};

use crate::domain::shared::error::UaError;
use serde_json::{Map, Value};
use std::path::Path;

/// Input configuration before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawConfiguration {
    values: Map<String, Value>,
}

impl RawConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON object. Anything else is rejected.
    pub fn from_value(value: Value) -> Result<Self, UaError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(UaError::Source(format!(
                "configuration must be an object, got {}",
                other
            ))),
        }
    }

    /// Load from a configuration file, letting `SIPUA_*` environment
    /// variables override file values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, UaError> {
        let value: Value = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("SIPUA").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Self::from_value(value)
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}
