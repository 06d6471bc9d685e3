//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Protocol implementations (SIP over WebSocket)
//! - Timer scheduling

pub mod protocols;
pub mod scheduler;
