//! Domain layer - Core user agent rules
//!
//! This layer contains:
//! - Value objects: SIP URIs, dialog and session keys, transaction classes
//! - Agent state: status, error, dynamic configuration, credentials
//! - Notifications and the observer hub
//! - Candidate server selection and recovery backoff

pub mod agent;
pub mod shared;
pub mod transport;

// Re-export commonly used types
pub use shared::{ConfigurationError, Result, UaError};
