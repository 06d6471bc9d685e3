//! Agent status and error state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of the user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Constructed, never started
    Init,
    /// Transport connected (or reconnecting after a restart)
    Ready,
    /// Stopped by the user
    UserClosed,
    /// Every candidate server failed; recovery in progress
    NotReady,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentStatus::Init => "init",
            AgentStatus::Ready => "ready",
            AgentStatus::UserClosed => "user_closed",
            AgentStatus::NotReady => "not_ready",
        };
        write!(f, "{}", name)
    }
}

/// Last fatal cause recorded by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentError {
    ConfigurationError,
    NetworkError,
}

/// Session-scoped overrides of the static settings.
///
/// Cleared by `stop()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicConfiguration {
    pub register: Option<bool>,
}

impl DynamicConfiguration {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn wants_register(&self) -> bool {
        self.register.unwrap_or(false)
    }
}
