//! Shared kernel - Common types used across the agent

pub mod error;
pub mod events;
pub mod result;
pub mod value_objects;

pub use error::{ConfigurationError, UaError};
pub use result::Result;
pub use value_objects::*;
