//! User agent state shared by the application layer

pub mod credentials;
pub mod event;
pub mod status;
pub mod target;

pub use credentials::{CredentialStore, Credentials};
pub use event::{EventHub, EventKind, Listener, Notification, Originator, UaEvent};
pub use status::{AgentError, AgentStatus, DynamicConfiguration};
pub use target::normalize_target;
