//! SIP protocol plumbing for the user agent
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────┐
//! │   UserAgent             │
//! │  (application layer)    │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │    Dispatcher           │
//! │  (screen + route)       │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Transaction Registry  │
//! │  (ICT/NICT/IST/NIST)    │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Transport Layer       │
//! │  (WebSocket)            │
//! └─────────────────────────┘
//! ```

pub mod builder;
pub mod dispatcher;
pub mod handler;
pub mod message;
pub mod transaction;
pub mod transport;

pub use builder::ResponseBuilder;
pub use dispatcher::{route, screen, Disposition, Inbound, RoutingTable};
pub use handler::{
    Applicant, Dialog, NoMedia, NoRegistrator, RegistrationEvent, Registrator, Session,
    SessionFactory,
};
pub use message::{SipError, SipMessage, SipMethod, SipRequest, SipResponse};
pub use transaction::{
    check_transaction, InviteClientState, InviteServerState, NonInviteClientState,
    NonInviteServerState, ServerTransactionFactory, SipTransaction, SipTransactionFactory,
    Transaction, TransactionCheck, TransactionCounts, TransactionId, TransactionRegistry,
    TransactionState,
};
pub use transport::{
    SipTransport, TransportEvent, TransportEventKind, TransportEventSender, TransportFactory,
    TransportId, WsTransport, WsTransportFactory,
};
