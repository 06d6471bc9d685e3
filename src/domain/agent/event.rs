//! Agent notifications and the observer hub that delivers them

use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::TransactionKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Who caused a session or message to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Originator {
    Local,
    Remote,
    System,
}

/// Notification payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Connecting {
        server: String,
        attempt: u32,
    },
    Connected {
        server: String,
    },
    Disconnected {
        server: Option<String>,
        code: Option<u16>,
        reason: Option<String>,
        error: bool,
    },
    NewTransaction {
        id: String,
        kind: TransactionKind,
    },
    TransactionDestroyed {
        id: String,
        kind: TransactionKind,
    },
    NewMessage {
        originator: Originator,
        call_id: String,
        from: String,
        body: String,
    },
    NewRtcSession {
        originator: Originator,
        session: String,
    },
    Registered {
        expires: Option<u32>,
    },
    Unregistered {
        cause: Option<String>,
    },
    RegistrationFailed {
        cause: String,
        status_code: Option<u16>,
    },
}

/// Listener selector, one per notification variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connecting,
    Connected,
    Disconnected,
    NewTransaction,
    TransactionDestroyed,
    NewMessage,
    NewRtcSession,
    Registered,
    Unregistered,
    RegistrationFailed,
}

impl Notification {
    pub fn kind(&self) -> EventKind {
        match self {
            Notification::Connecting { .. } => EventKind::Connecting,
            Notification::Connected { .. } => EventKind::Connected,
            Notification::Disconnected { .. } => EventKind::Disconnected,
            Notification::NewTransaction { .. } => EventKind::NewTransaction,
            Notification::TransactionDestroyed { .. } => EventKind::TransactionDestroyed,
            Notification::NewMessage { .. } => EventKind::NewMessage,
            Notification::NewRtcSession { .. } => EventKind::NewRtcSession,
            Notification::Registered { .. } => EventKind::Registered,
            Notification::Unregistered { .. } => EventKind::Unregistered,
            Notification::RegistrationFailed { .. } => EventKind::RegistrationFailed,
        }
    }
}

/// A notification with its metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UaEvent {
    pub metadata: EventMetadata,
    #[serde(flatten)]
    pub notification: Notification,
}

impl UaEvent {
    pub fn new(notification: Notification) -> Self {
        Self {
            metadata: EventMetadata::now(),
            notification,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.notification.kind()
    }
}

impl DomainEvent for UaEvent {
    fn event_type(&self) -> &'static str {
        match self.kind() {
            EventKind::Connecting => "ua.connecting",
            EventKind::Connected => "ua.connected",
            EventKind::Disconnected => "ua.disconnected",
            EventKind::NewTransaction => "ua.new_transaction",
            EventKind::TransactionDestroyed => "ua.transaction_destroyed",
            EventKind::NewMessage => "ua.new_message",
            EventKind::NewRtcSession => "ua.new_rtc_session",
            EventKind::Registered => "ua.registered",
            EventKind::Unregistered => "ua.unregistered",
            EventKind::RegistrationFailed => "ua.registration_failed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.metadata.occurred_at
    }
}

pub type Listener = Box<dyn FnMut(&UaEvent) + Send>;

/// Observer registration and synchronous delivery.
///
/// Listeners run inside the emitting handler, after the agent state they
/// describe has been fully updated.
#[derive(Default)]
pub struct EventHub {
    listeners: Vec<(EventKind, Listener)>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: EventKind, listener: Listener) {
        self.listeners.push((kind, listener));
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listeners.iter().any(|(k, _)| *k == kind)
    }

    pub fn emit(&mut self, notification: Notification) {
        let event = UaEvent::new(notification);
        debug!("Emitting {}", event.event_type());
        for (kind, listener) in self.listeners.iter_mut() {
            if *kind == event.kind() {
                listener(&event);
            }
        }
    }
}
