//! SIP Transaction Layer
//!
//! Transaction handles and the registry that indexes them by class.
//!
//! ## Transaction Types
//! - INVITE Client Transaction (ICT) - Section 17.1.1
//! - INVITE Server Transaction (IST) - Section 17.2.1
//! - Non-INVITE Client Transaction (NICT) - Section 17.1.2
//! - Non-INVITE Server Transaction (NIST) - Section 17.2.2
//!
//! Retransmission timers belong to the transaction implementation; the
//! registry only tracks which transactions are alive and in which state.

use super::message::{SipMethod, SipRequest, SipResponse};
use crate::domain::shared::value_objects::TransactionKind;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Transaction ID - uniquely identifies a transaction
/// Based on branch parameter in Via header
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct TransactionId(pub String);

impl TransactionId {
    /// Create transaction ID from branch parameter
    pub fn from_branch(branch: &str) -> Self {
        Self(branch.to_string())
    }

    /// Generate a new RFC 3261 branch
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let random: u64 = rng.gen();
        Self(format!("z9hG4bK{:x}", random))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// INVITE Client Transaction States (RFC 3261 Section 17.1.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteClientState {
    /// Initial state - request sent
    Calling,
    /// Received provisional response (1xx)
    Proceeding,
    /// Received final response (3xx-6xx)
    Completed,
    /// Received 2xx (RFC 6026)
    Accepted,
    /// Transaction terminated
    Terminated,
}

/// INVITE Server Transaction States (RFC 3261 Section 17.2.1, RFC 6026)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteServerState {
    /// Request received, no final response yet
    Proceeding,
    /// 2xx sent; ACKs go to the dialog
    Accepted,
    /// Non-2xx final response sent
    Completed,
    /// ACK received
    Confirmed,
    /// Transaction terminated
    Terminated,
}

/// Non-INVITE Client Transaction States (RFC 3261 Section 17.1.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonInviteClientState {
    /// Request sent, no response yet
    Trying,
    /// Received provisional response (1xx)
    Proceeding,
    /// Received final response (2xx-6xx)
    Completed,
    /// Transaction terminated
    Terminated,
}

/// Non-INVITE Server Transaction States (RFC 3261 Section 17.2.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonInviteServerState {
    /// Request received
    Trying,
    /// Provisional response sent
    Proceeding,
    /// Final response sent
    Completed,
    /// Transaction terminated
    Terminated,
}

/// Transaction type and state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    InviteClient(InviteClientState),
    InviteServer(InviteServerState),
    NonInviteClient(NonInviteClientState),
    NonInviteServer(NonInviteServerState),
}

impl TransactionState {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionState::InviteClient(_) => TransactionKind::InviteClient,
            TransactionState::InviteServer(_) => TransactionKind::InviteServer,
            TransactionState::NonInviteClient(_) => TransactionKind::NonInviteClient,
            TransactionState::NonInviteServer(_) => TransactionKind::NonInviteServer,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(
            self,
            TransactionState::InviteClient(InviteClientState::Terminated)
                | TransactionState::InviteServer(InviteServerState::Terminated)
                | TransactionState::NonInviteClient(NonInviteClientState::Terminated)
                | TransactionState::NonInviteServer(NonInviteServerState::Terminated)
        )
    }

    /// Get state name for debugging
    pub fn name(&self) -> &'static str {
        match self {
            TransactionState::InviteClient(InviteClientState::Calling) => "ICT-Calling",
            TransactionState::InviteClient(InviteClientState::Proceeding) => "ICT-Proceeding",
            TransactionState::InviteClient(InviteClientState::Completed) => "ICT-Completed",
            TransactionState::InviteClient(InviteClientState::Accepted) => "ICT-Accepted",
            TransactionState::InviteClient(InviteClientState::Terminated) => "ICT-Terminated",
            TransactionState::InviteServer(InviteServerState::Proceeding) => "IST-Proceeding",
            TransactionState::InviteServer(InviteServerState::Accepted) => "IST-Accepted",
            TransactionState::InviteServer(InviteServerState::Completed) => "IST-Completed",
            TransactionState::InviteServer(InviteServerState::Confirmed) => "IST-Confirmed",
            TransactionState::InviteServer(InviteServerState::Terminated) => "IST-Terminated",
            TransactionState::NonInviteClient(NonInviteClientState::Trying) => "NICT-Trying",
            TransactionState::NonInviteClient(NonInviteClientState::Proceeding) => {
                "NICT-Proceeding"
            }
            TransactionState::NonInviteClient(NonInviteClientState::Completed) => "NICT-Completed",
            TransactionState::NonInviteClient(NonInviteClientState::Terminated) => {
                "NICT-Terminated"
            }
            TransactionState::NonInviteServer(NonInviteServerState::Trying) => "NIST-Trying",
            TransactionState::NonInviteServer(NonInviteServerState::Proceeding) => {
                "NIST-Proceeding"
            }
            TransactionState::NonInviteServer(NonInviteServerState::Completed) => "NIST-Completed",
            TransactionState::NonInviteServer(NonInviteServerState::Terminated) => {
                "NIST-Terminated"
            }
        }
    }
}

/// Handle to a live transaction, as stored in the registry
pub trait Transaction: Send {
    fn id(&self) -> &TransactionId;

    fn state(&self) -> TransactionState;

    fn kind(&self) -> TransactionKind {
        self.state().kind()
    }

    /// Wire text of the last response sent (server transactions)
    fn last_response(&self) -> Option<&str>;

    /// Record a response sent through this server transaction
    fn send_response(&mut self, status_code: u16, response: String);

    /// Response received for this client transaction
    fn receive_response(&mut self, response: &SipResponse);

    /// ACK received for this INVITE server transaction
    fn receive_ack(&mut self);

    /// The transport under this transaction failed
    fn on_transport_error(&mut self);
}

/// Creates server transactions for inbound requests
pub trait ServerTransactionFactory: Send {
    fn create(
        &mut self,
        id: TransactionId,
        kind: TransactionKind,
        request: &SipRequest,
    ) -> Box<dyn Transaction>;
}

/// State-tracking transaction used when no richer transaction layer is
/// plugged in
#[derive(Debug, Clone)]
pub struct SipTransaction {
    pub id: TransactionId,
    pub state: TransactionState,
    pub last_response: Option<String>,
}

impl SipTransaction {
    pub fn new_invite_client(id: TransactionId) -> Self {
        Self::with_state(id, TransactionState::InviteClient(InviteClientState::Calling))
    }

    pub fn new_non_invite_client(id: TransactionId) -> Self {
        Self::with_state(
            id,
            TransactionState::NonInviteClient(NonInviteClientState::Trying),
        )
    }

    pub fn new_invite_server(id: TransactionId) -> Self {
        Self::with_state(
            id,
            TransactionState::InviteServer(InviteServerState::Proceeding),
        )
    }

    pub fn new_non_invite_server(id: TransactionId) -> Self {
        Self::with_state(
            id,
            TransactionState::NonInviteServer(NonInviteServerState::Trying),
        )
    }

    pub fn new(id: TransactionId, kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::InviteClient => Self::new_invite_client(id),
            TransactionKind::NonInviteClient => Self::new_non_invite_client(id),
            TransactionKind::InviteServer => Self::new_invite_server(id),
            TransactionKind::NonInviteServer => Self::new_non_invite_server(id),
        }
    }

    fn with_state(id: TransactionId, state: TransactionState) -> Self {
        Self {
            id,
            state,
            last_response: None,
        }
    }

    fn transition(&mut self, state: TransactionState) {
        debug!(
            "Transaction {} {} -> {}",
            self.id,
            self.state.name(),
            state.name()
        );
        self.state = state;
    }
}

impl Transaction for SipTransaction {
    fn id(&self) -> &TransactionId {
        &self.id
    }

    fn state(&self) -> TransactionState {
        self.state
    }

    fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Timers G, H, I and J are zero on a reliable transport, so a final
    /// response ends a NIST at once. A 2xx hands the INVITE over to the
    /// dialog layer and ends the IST as well.
    fn send_response(&mut self, status_code: u16, response: String) {
        self.last_response = Some(response);

        match self.state {
            TransactionState::InviteServer(InviteServerState::Proceeding) => {
                if (200..300).contains(&status_code) {
                    self.transition(TransactionState::InviteServer(InviteServerState::Accepted));
                    self.transition(TransactionState::InviteServer(InviteServerState::Terminated));
                } else if status_code >= 300 {
                    self.transition(TransactionState::InviteServer(InviteServerState::Completed));
                }
            }
            TransactionState::NonInviteServer(
                NonInviteServerState::Trying | NonInviteServerState::Proceeding,
            ) => {
                if (100..200).contains(&status_code) {
                    self.transition(TransactionState::NonInviteServer(
                        NonInviteServerState::Proceeding,
                    ));
                } else if status_code >= 200 {
                    self.transition(TransactionState::NonInviteServer(
                        NonInviteServerState::Completed,
                    ));
                    self.transition(TransactionState::NonInviteServer(
                        NonInviteServerState::Terminated,
                    ));
                }
            }
            _ => debug!(
                "Ignoring {} response in state {}",
                status_code,
                self.state.name()
            ),
        }
    }

    fn receive_response(&mut self, response: &SipResponse) {
        let status = response.status_code();

        match self.state {
            TransactionState::InviteClient(
                InviteClientState::Calling | InviteClientState::Proceeding,
            ) => {
                if (100..200).contains(&status) {
                    self.transition(TransactionState::InviteClient(InviteClientState::Proceeding));
                } else if (200..300).contains(&status) {
                    self.transition(TransactionState::InviteClient(InviteClientState::Accepted));
                } else if status >= 300 {
                    self.transition(TransactionState::InviteClient(InviteClientState::Completed));
                }
            }
            TransactionState::NonInviteClient(
                NonInviteClientState::Trying | NonInviteClientState::Proceeding,
            ) => {
                if (100..200).contains(&status) {
                    self.transition(TransactionState::NonInviteClient(
                        NonInviteClientState::Proceeding,
                    ));
                } else if status >= 200 {
                    self.transition(TransactionState::NonInviteClient(
                        NonInviteClientState::Completed,
                    ));
                }
            }
            // Retransmitted responses are absorbed
            _ => {}
        }
    }

    fn receive_ack(&mut self) {
        if self.state == TransactionState::InviteServer(InviteServerState::Completed) {
            self.transition(TransactionState::InviteServer(InviteServerState::Confirmed));
            self.transition(TransactionState::InviteServer(InviteServerState::Terminated));
        }
    }

    fn on_transport_error(&mut self) {
        let terminated = match self.state.kind() {
            TransactionKind::InviteClient => {
                TransactionState::InviteClient(InviteClientState::Terminated)
            }
            TransactionKind::NonInviteClient => {
                TransactionState::NonInviteClient(NonInviteClientState::Terminated)
            }
            TransactionKind::InviteServer => {
                TransactionState::InviteServer(InviteServerState::Terminated)
            }
            TransactionKind::NonInviteServer => {
                TransactionState::NonInviteServer(NonInviteServerState::Terminated)
            }
        };
        self.transition(terminated);
    }
}

/// Factory producing [`SipTransaction`] server transactions
#[derive(Debug, Default)]
pub struct SipTransactionFactory;

impl ServerTransactionFactory for SipTransactionFactory {
    fn create(
        &mut self,
        id: TransactionId,
        kind: TransactionKind,
        _request: &SipRequest,
    ) -> Box<dyn Transaction> {
        Box::new(SipTransaction::new(id, kind))
    }
}

/// Live transaction counts per class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionCounts {
    pub ict: usize,
    pub nict: usize,
    pub ist: usize,
    pub nist: usize,
}

impl TransactionCounts {
    pub fn total(&self) -> usize {
        self.ict + self.nict + self.ist + self.nist
    }

    /// Client and server non-INVITE transactions
    pub fn non_invite(&self) -> usize {
        self.nict + self.nist
    }
}

/// Four-way index of live transactions
#[derive(Default)]
pub struct TransactionRegistry {
    ict: HashMap<TransactionId, Box<dyn Transaction>>,
    nict: HashMap<TransactionId, Box<dyn Transaction>>,
    ist: HashMap<TransactionId, Box<dyn Transaction>>,
    nist: HashMap<TransactionId, Box<dyn Transaction>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: TransactionKind) -> &HashMap<TransactionId, Box<dyn Transaction>> {
        match kind {
            TransactionKind::InviteClient => &self.ict,
            TransactionKind::NonInviteClient => &self.nict,
            TransactionKind::InviteServer => &self.ist,
            TransactionKind::NonInviteServer => &self.nist,
        }
    }

    fn map_mut(
        &mut self,
        kind: TransactionKind,
    ) -> &mut HashMap<TransactionId, Box<dyn Transaction>> {
        match kind {
            TransactionKind::InviteClient => &mut self.ict,
            TransactionKind::NonInviteClient => &mut self.nict,
            TransactionKind::InviteServer => &mut self.ist,
            TransactionKind::NonInviteServer => &mut self.nist,
        }
    }

    /// Insert under the transaction's class and id. A previous entry with
    /// the same key is replaced and returned.
    pub fn insert(&mut self, transaction: Box<dyn Transaction>) -> Option<Box<dyn Transaction>> {
        let kind = transaction.kind();
        let id = transaction.id().clone();
        self.map_mut(kind).insert(id, transaction)
    }

    pub fn remove(
        &mut self,
        kind: TransactionKind,
        id: &TransactionId,
    ) -> Option<Box<dyn Transaction>> {
        self.map_mut(kind).remove(id)
    }

    pub fn get(&self, kind: TransactionKind, id: &TransactionId) -> Option<&dyn Transaction> {
        self.map(kind).get(id).map(|t| t.as_ref())
    }

    pub fn get_mut(
        &mut self,
        kind: TransactionKind,
        id: &TransactionId,
    ) -> Option<&mut Box<dyn Transaction>> {
        self.map_mut(kind).get_mut(id)
    }

    pub fn contains(&self, kind: TransactionKind, id: &TransactionId) -> bool {
        self.map(kind).contains_key(id)
    }

    pub fn ids(&self, kind: TransactionKind) -> Vec<TransactionId> {
        self.map(kind).keys().cloned().collect()
    }

    pub fn iter_mut(
        &mut self,
        kind: TransactionKind,
    ) -> impl Iterator<Item = &mut Box<dyn Transaction>> {
        self.map_mut(kind).values_mut()
    }

    pub fn count(&self, kind: TransactionKind) -> usize {
        self.map(kind).len()
    }

    pub fn counts(&self) -> TransactionCounts {
        TransactionCounts {
            ict: self.ict.len(),
            nict: self.nict.len(),
            ist: self.ist.len(),
            nist: self.nist.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.counts().total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of matching an inbound request against live server transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionCheck {
    /// Not handled by any transaction; keep dispatching
    New,
    /// Absorbed by an existing transaction
    Absorbed,
    /// Retransmission; resend this response and stop
    Retransmit(String),
    /// Reply statelessly, then keep dispatching only when `proceed`
    Reply { status_code: u16, proceed: bool },
}

/// Retransmission and CANCEL matching (RFC 3261 Section 17.2.3)
pub fn check_transaction(
    registry: &mut TransactionRegistry,
    request: &SipRequest,
) -> TransactionCheck {
    let Some(method) = request.method() else {
        return TransactionCheck::New;
    };
    let Some(branch) = request.branch() else {
        return match method {
            SipMethod::Cancel => TransactionCheck::Reply {
                status_code: 481,
                proceed: false,
            },
            _ => TransactionCheck::New,
        };
    };
    let id = TransactionId::from_branch(&branch);

    match method {
        SipMethod::Invite => match registry.get(TransactionKind::InviteServer, &id) {
            None => TransactionCheck::New,
            Some(tx) => match (tx.state(), tx.last_response()) {
                (
                    TransactionState::InviteServer(InviteServerState::Proceeding),
                    Some(response),
                ) => TransactionCheck::Retransmit(response.to_string()),
                _ => TransactionCheck::Absorbed,
            },
        },
        SipMethod::Ack => match registry.get_mut(TransactionKind::InviteServer, &id) {
            None => TransactionCheck::New,
            Some(tx) => match tx.state() {
                TransactionState::InviteServer(InviteServerState::Accepted) => {
                    TransactionCheck::New
                }
                TransactionState::InviteServer(InviteServerState::Completed) => {
                    tx.receive_ack();
                    TransactionCheck::Absorbed
                }
                _ => TransactionCheck::Absorbed,
            },
        },
        SipMethod::Cancel => match registry.get(TransactionKind::InviteServer, &id) {
            None => TransactionCheck::Reply {
                status_code: 481,
                proceed: false,
            },
            Some(tx) => TransactionCheck::Reply {
                status_code: 200,
                proceed: tx.state()
                    == TransactionState::InviteServer(InviteServerState::Proceeding),
            },
        },
        _ => match registry.get(TransactionKind::NonInviteServer, &id) {
            None => TransactionCheck::New,
            Some(tx) => match (tx.state(), tx.last_response()) {
                (TransactionState::NonInviteServer(NonInviteServerState::Trying), _) => {
                    TransactionCheck::Absorbed
                }
                (_, Some(response)) => TransactionCheck::Retransmit(response.to_string()),
                _ => TransactionCheck::Absorbed,
            },
        },
    }
}
