//! Application layer - The user agent and its async driver
//!
//! This layer ties the domain model to the SIP plumbing:
//! - Transport lifecycle and recovery
//! - Inbound request dispatch
//! - Transaction, dialog and session bookkeeping
//! - Graceful shutdown

pub mod runtime;
pub mod user_agent;

pub use runtime::{UaCommand, UaHandle, UaRuntime};
pub use user_agent::{ApplicantId, UserAgent, UserAgentBuilder, SHUTDOWN_GRACE};
