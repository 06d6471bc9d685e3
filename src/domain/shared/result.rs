//! Agent result type

use super::error::UaError;

/// Standard result type for agent operations
pub type Result<T> = std::result::Result<T, UaError>;
