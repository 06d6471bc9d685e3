//! Collaborators the agent hands requests and lifecycle signals to
//!
//! Sessions, dialogs, applicants and the registrator live outside the
//! orchestration core. The agent only routes to them.

use super::message::SipRequest;

/// Call-level session (media negotiation and call state live behind it)
#[cfg_attr(test, mockall::automock)]
pub trait Session: Send {
    fn receive_request(&mut self, request: &SipRequest);

    /// The transport failed and no other server is reachable
    fn on_transport_error(&mut self);

    /// End the session; sends BYE or CANCEL as needed
    fn terminate(&mut self);
}

/// Creates sessions for inbound INVITEs
pub trait SessionFactory: Send {
    /// Whether media can be negotiated in this environment
    fn has_media(&self) -> bool;

    fn create_incoming(&mut self, request: &SipRequest) -> Box<dyn Session>;
}

/// Established dialog
#[cfg_attr(test, mockall::automock)]
pub trait Dialog: Send {
    fn receive_request(&mut self, request: &SipRequest);
}

/// Outgoing instant-message exchange in progress
#[cfg_attr(test, mockall::automock)]
pub trait Applicant: Send {
    fn close(&mut self);
}

/// Registration state machine
#[cfg_attr(test, mockall::automock)]
pub trait Registrator: Send {
    fn register(&mut self);

    fn unregister(&mut self, all: bool);

    /// Final close on agent stop; may still send a de-registration
    fn close(&mut self);

    fn on_transport_closed(&mut self);

    fn is_registered(&self) -> bool;
}

/// Outcome reported by the registrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    Registered {
        expires: Option<u32>,
    },
    Unregistered {
        cause: Option<String>,
    },
    Failed {
        cause: String,
        status_code: Option<u16>,
    },
}

/// Registrator used when registration is handled elsewhere
#[derive(Debug, Default)]
pub struct NoRegistrator;

impl Registrator for NoRegistrator {
    fn register(&mut self) {}

    fn unregister(&mut self, _all: bool) {}

    fn close(&mut self) {}

    fn on_transport_closed(&mut self) {}

    fn is_registered(&self) -> bool {
        false
    }
}

/// Session factory for agents without media support
#[derive(Debug, Default)]
pub struct NoMedia;

impl SessionFactory for NoMedia {
    fn has_media(&self) -> bool {
        false
    }

    fn create_incoming(&mut self, _request: &SipRequest) -> Box<dyn Session> {
        Box::new(NoSession)
    }
}

struct NoSession;

impl Session for NoSession {
    fn receive_request(&mut self, _request: &SipRequest) {}

    fn on_transport_error(&mut self) {}

    fn terminate(&mut self) {}
}
