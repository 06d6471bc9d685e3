//! sipua - The orchestration core of a SIP user agent over WebSocket
//!
//! This is a Domain-Driven Design (DDD) layout: configuration validation,
//! a domain model for servers, events and identities, SIP plumbing in the
//! infrastructure layer, and the `UserAgent` state machine on top.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{UaHandle, UaRuntime, UserAgent, UserAgentBuilder};
pub use config::RawConfiguration;
pub use domain::shared::error::{ConfigurationError, UaError};
pub use domain::shared::result::Result;
