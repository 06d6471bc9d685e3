//! Transport-facing domain model: candidate servers and recovery backoff

pub mod candidate;
pub mod recovery;

pub use candidate::{CandidateServer, ServerHealth, ServerPool};
pub use recovery::{plan_retry, RetryPlan};
