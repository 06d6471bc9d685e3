//! The user agent
//!
//! `UserAgent` owns the transport lifecycle, the transaction registry, the
//! dialog and session indices, and the request dispatcher. It is a plain
//! state machine: every entry point takes `&mut self`, runs to completion,
//! and leaves deferred work to the scheduler or to transport events.

use crate::config::{validate, Contact, RawConfiguration, Settings, Validated};
use crate::domain::agent::{
    normalize_target, AgentError, AgentStatus, CredentialStore, Credentials,
    DynamicConfiguration, EventHub, EventKind, Notification, Originator, UaEvent,
};
use crate::domain::shared::error::UaError;
use crate::domain::shared::value_objects::{random_token, DialogId, SessionKey, SipUri, TransactionKind};
use crate::domain::transport::{plan_retry, ServerHealth, ServerPool};
use crate::infrastructure::protocols::sip::{
    check_transaction, route, screen, Applicant, Dialog, Disposition, NoMedia, NoRegistrator,
    RegistrationEvent, Registrator, ResponseBuilder, RoutingTable, ServerTransactionFactory,
    Session, SessionFactory, SipMessage, SipMethod, SipRequest, SipResponse,
    SipTransactionFactory, SipTransport, Transaction, TransactionCheck, TransactionCounts,
    TransactionId, TransactionRegistry, TransportEvent, TransportEventKind, TransportFactory,
    TransportId,
};
use crate::infrastructure::scheduler::{Scheduler, TimerFired, TimerHandle, TimerKind};
use metrics::{counter, gauge};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay between `stop()` and the transport disconnect while termination
/// signalling is still in flight
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Handle returned by [`UserAgent::new_applicant`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApplicantId(pub u64);

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "applicant-{}", self.0)
    }
}

/// Assembles a [`UserAgent`] from configuration and collaborators
pub struct UserAgentBuilder {
    raw: RawConfiguration,
    rng: Option<Box<dyn RngCore + Send>>,
    scheduler: Option<Box<dyn Scheduler>>,
    transports: Option<Box<dyn TransportFactory>>,
    server_transactions: Box<dyn ServerTransactionFactory>,
    session_factory: Box<dyn SessionFactory>,
    registrator: Box<dyn Registrator>,
}

impl UserAgentBuilder {
    pub fn new(raw: RawConfiguration) -> Self {
        Self {
            raw,
            rng: None,
            scheduler: None,
            transports: None,
            server_transactions: Box::new(SipTransactionFactory),
            session_factory: Box::new(NoMedia),
            registrator: Box::new(NoRegistrator),
        }
    }

    /// Random source for selection, backoff and generated tokens
    pub fn rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    pub fn transport_factory(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.transports = Some(Box::new(factory));
        self
    }

    pub fn server_transactions(mut self, factory: impl ServerTransactionFactory + 'static) -> Self {
        self.server_transactions = Box::new(factory);
        self
    }

    pub fn sessions(mut self, factory: impl SessionFactory + 'static) -> Self {
        self.session_factory = Box::new(factory);
        self
    }

    pub fn registrator(mut self, registrator: impl Registrator + 'static) -> Self {
        self.registrator = Box::new(registrator);
        self
    }

    /// Validate the configuration and create the agent in `Init` status.
    pub fn build(self) -> Result<UserAgent, UaError> {
        let mut rng: Box<dyn RngCore + Send> = match self.rng {
            Some(rng) => rng,
            None => Box::new(StdRng::from_entropy()),
        };

        let Validated { settings, contact } = validate(&self.raw, rng.as_mut())?;

        let scheduler = self
            .scheduler
            .ok_or_else(|| UaError::InvalidState("no scheduler configured".to_string()))?;
        let transports = self
            .transports
            .ok_or_else(|| UaError::InvalidState("no transport factory configured".to_string()))?;

        info!(
            "User agent created for {} (contact {})",
            settings.uri(),
            contact.uri
        );

        Ok(UserAgent {
            pool: ServerPool::new(settings.ws_servers().to_vec()),
            settings,
            contact,
            status: AgentStatus::Init,
            error: None,
            dynamic: DynamicConfiguration::default(),
            current_server: None,
            transport: None,
            next_transport_id: 0,
            recovery_attempts: 0,
            recovery_timer: None,
            recovery_target: None,
            shutdown_timer: None,
            transactions: TransactionRegistry::new(),
            dialogs: HashMap::new(),
            sessions: HashMap::new(),
            applicants: HashMap::new(),
            next_applicant_id: 0,
            credentials: CredentialStore::new(),
            events: EventHub::new(),
            rng,
            scheduler,
            transports,
            server_transactions: self.server_transactions,
            session_factory: self.session_factory,
            registrator: self.registrator,
        })
    }
}

pub struct UserAgent {
    settings: Settings,
    contact: Contact,
    status: AgentStatus,
    error: Option<AgentError>,
    dynamic: DynamicConfiguration,

    pool: ServerPool,
    current_server: Option<usize>,
    transport: Option<Box<dyn SipTransport>>,
    next_transport_id: u64,

    recovery_attempts: u32,
    recovery_timer: Option<TimerHandle>,
    recovery_target: Option<usize>,
    shutdown_timer: Option<TimerHandle>,

    transactions: TransactionRegistry,
    dialogs: HashMap<DialogId, Box<dyn Dialog>>,
    sessions: HashMap<SessionKey, Box<dyn Session>>,
    applicants: HashMap<ApplicantId, Box<dyn Applicant>>,
    next_applicant_id: u64,
    credentials: CredentialStore,

    events: EventHub,
    rng: Box<dyn RngCore + Send>,
    scheduler: Box<dyn Scheduler>,
    transports: Box<dyn TransportFactory>,
    server_transactions: Box<dyn ServerTransactionFactory>,
    session_factory: Box<dyn SessionFactory>,
    registrator: Box<dyn Registrator>,
}

impl UserAgent {
    pub fn builder(raw: RawConfiguration) -> UserAgentBuilder {
        UserAgentBuilder::new(raw)
    }

    // ========================================
    // Queries
    // ========================================

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn error(&self) -> Option<AgentError> {
        self.error
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn servers(&self) -> &ServerPool {
        &self.pool
    }

    /// Id of the transport the agent currently listens to
    pub fn transport_id(&self) -> Option<TransportId> {
        self.transport.as_ref().map(|t| t.id())
    }

    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    pub fn is_registered(&self) -> bool {
        self.registrator.is_registered()
    }

    pub fn transaction_counts(&self) -> TransactionCounts {
        self.transactions.counts()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn dialog_count(&self) -> usize {
        self.dialogs.len()
    }

    pub fn applicant_count(&self) -> usize {
        self.applicants.len()
    }

    pub fn recovery_attempts(&self) -> u32 {
        self.recovery_attempts
    }

    /// A stopped agent still waiting to disconnect its transport
    pub fn shutdown_pending(&self) -> bool {
        self.shutdown_timer.is_some()
    }

    // ========================================
    // Lifecycle
    // ========================================

    pub fn on(&mut self, kind: EventKind, listener: impl FnMut(&UaEvent) + Send + 'static) {
        self.events.on(kind, Box::new(listener));
    }

    /// Connect, or reconnect after `stop()`.
    pub fn start(&mut self) {
        debug!("start()");
        self.dynamic.register = Some(self.settings.register());

        match self.status {
            AgentStatus::Init => match self.pool.select(self.rng.as_mut()) {
                Some(index) => self.open_transport(index),
                None => warn!("No candidate server available"),
            },
            AgentStatus::UserClosed => {
                info!("Restarting user agent");
                let grace_pending = self.shutdown_timer.is_some();
                self.cancel_timer(TimerKind::ShutdownGrace);
                self.cancel_timer(TimerKind::Recovery);
                self.status = AgentStatus::Ready;

                // Within the grace period the link was never told to close
                if grace_pending && self.transport.as_ref().is_some_and(|t| t.is_connected()) {
                    debug!("Keeping the open transport");
                    return;
                }
                if grace_pending {
                    self.disconnect_transport();
                }

                // The old link may still report its close, so use a new one
                match self
                    .current_server
                    .or_else(|| self.pool.select(self.rng.as_mut()))
                {
                    Some(index) => self.open_transport(index),
                    None => warn!("No candidate server available"),
                }
            }
            AgentStatus::Ready => debug!("User agent is in READY status, not restarted"),
            AgentStatus::NotReady => {
                debug!("Connection is down, transport recovery is trying to reconnect")
            }
        }
    }

    /// Gracefully shut down. Calling it again is a no-op.
    pub fn stop(&mut self) {
        debug!("stop()");

        if self.status == AgentStatus::UserClosed {
            debug!("User agent already closed");
            return;
        }

        self.dynamic.clear();
        self.cancel_timer(TimerKind::Recovery);

        self.registrator.close();

        let mut terminated = 0;
        for (key, session) in self.sessions.iter_mut() {
            debug!("Terminating session {}", key);
            session.terminate();
            terminated += 1;
        }

        for (id, applicant) in self.applicants.iter_mut() {
            debug!("Closing {}", id);
            applicant.close();
        }

        self.status = AgentStatus::UserClosed;

        let pending = self.transactions.counts().non_invite();
        if pending == 0 && terminated == 0 {
            info!("User agent stopped, disconnecting transport");
            self.disconnect_transport();
        } else {
            info!(
                "User agent stopped, disconnecting in {:?} ({} non-INVITE transactions, {} sessions)",
                SHUTDOWN_GRACE, pending, terminated
            );
            self.cancel_timer(TimerKind::ShutdownGrace);
            self.shutdown_timer = Some(
                self.scheduler
                    .schedule(SHUTDOWN_GRACE, TimerKind::ShutdownGrace),
            );
        }
    }

    pub fn register(&mut self) {
        debug!("register()");
        self.dynamic.register = Some(true);
        self.registrator.register();
    }

    pub fn unregister(&mut self, all: bool) {
        debug!("unregister()");
        self.dynamic.register = Some(false);
        self.registrator.unregister(all);
    }

    /// Outcome reported by the registrator
    pub fn on_registration_event(&mut self, event: RegistrationEvent) {
        let notification = match event {
            RegistrationEvent::Registered { expires } => Notification::Registered { expires },
            RegistrationEvent::Unregistered { cause } => Notification::Unregistered { cause },
            RegistrationEvent::Failed { cause, status_code } => {
                Notification::RegistrationFailed { cause, status_code }
            }
        };
        self.events.emit(notification);
    }

    /// Queue a message on the current transport
    pub fn send(&mut self, data: &str) -> bool {
        match self.transport.as_mut() {
            Some(transport) => transport.send(data),
            None => {
                warn!("Unable to send message, no transport");
                false
            }
        }
    }

    // ========================================
    // Timers
    // ========================================

    pub fn on_timer(&mut self, fired: TimerFired) {
        let slot = match fired.kind {
            TimerKind::Recovery => &mut self.recovery_timer,
            TimerKind::ShutdownGrace => &mut self.shutdown_timer,
        };
        if *slot != Some(fired.handle) {
            debug!("Ignoring stale {:?} {}", fired.kind, fired.handle);
            return;
        }
        *slot = None;

        match fired.kind {
            TimerKind::Recovery => {
                self.recovery_attempts += 1;
                match self.recovery_target.take() {
                    Some(index) => {
                        info!("Transport recovery attempt {}", self.recovery_attempts);
                        self.open_transport(index);
                    }
                    None => warn!("Recovery timer fired without a target server"),
                }
            }
            TimerKind::ShutdownGrace => {
                info!("Shutdown grace period elapsed, disconnecting transport");
                self.disconnect_transport();
            }
        }
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        let slot = match kind {
            TimerKind::Recovery => &mut self.recovery_timer,
            TimerKind::ShutdownGrace => &mut self.shutdown_timer,
        };
        if let Some(handle) = slot.take() {
            self.scheduler.cancel(handle);
        }
    }

    // ========================================
    // Transport lifecycle
    // ========================================

    fn open_transport(&mut self, index: usize) {
        let Some(server) = self.pool.get(index).cloned() else {
            warn!("Unknown candidate server {}", index);
            return;
        };

        self.next_transport_id += 1;
        let id = TransportId(self.next_transport_id);
        debug!("Selected {} as {}", server, id);

        self.current_server = Some(index);
        self.transport = Some(
            self.transports
                .create(id, &server, self.settings.transport_options()),
        );
        self.connect_transport();
    }

    fn connect_transport(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let server = transport.server().uri.clone();

        info!("Connecting to {} (attempt {})", server, self.recovery_attempts);
        counter!("sipua_transport_connects_total").increment(1);
        transport.connect();

        self.events.emit(Notification::Connecting {
            server,
            attempt: self.recovery_attempts,
        });
    }

    fn disconnect_transport(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.disconnect();
        }
    }

    fn current_server_uri(&self) -> Option<String> {
        self.current_server
            .and_then(|i| self.pool.get(i))
            .map(|s| s.uri.clone())
    }

    fn set_current_health(&mut self, health: ServerHealth) {
        if let Some(index) = self.current_server {
            self.pool.set_health(index, health);
        }
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        if self.transport_id() != Some(event.transport) {
            debug!("Ignoring event from stale {}", event.transport);
            return;
        }

        match event.kind {
            TransportEventKind::Connected => self.on_transport_connected(),
            TransportEventKind::Closed {
                code,
                reason,
                user_initiated,
            } => self.on_transport_closed(code, reason, user_initiated),
            TransportEventKind::Error { reason } => self.on_transport_error(reason),
            TransportEventKind::Message(text) => self.on_transport_message(&text),
        }
    }

    fn on_transport_connected(&mut self) {
        self.recovery_attempts = 0;
        self.set_current_health(ServerHealth::Ready);

        if self.status == AgentStatus::UserClosed {
            return;
        }

        let server = self.current_server_uri().unwrap_or_default();
        info!("Connected to {}", server);

        self.status = AgentStatus::Ready;
        self.error = None;
        self.events.emit(Notification::Connected { server });

        if self.dynamic.wants_register() {
            self.registrator.register();
        }
    }

    fn on_transport_closed(&mut self, code: Option<u16>, reason: Option<String>, user_initiated: bool) {
        let server = self.current_server_uri();
        if user_initiated {
            info!("Transport to {} closed", server.as_deref().unwrap_or("-"));
        } else {
            warn!(
                "Transport to {} closed unexpectedly (code {:?})",
                server.as_deref().unwrap_or("-"),
                code
            );
        }

        self.set_current_health(ServerHealth::Disconnected);

        for kind in [TransactionKind::NonInviteClient, TransactionKind::InviteClient] {
            for transaction in self.transactions.iter_mut(kind) {
                transaction.on_transport_error();
            }
            self.destroy_terminated(kind);
        }

        self.events.emit(Notification::Disconnected {
            server,
            code,
            reason,
            error: false,
        });
    }

    fn on_transport_error(&mut self, reason: String) {
        let server = self.current_server_uri();
        warn!(
            "Transport to {} failed: {}",
            server.as_deref().unwrap_or("-"),
            reason
        );
        counter!("sipua_transport_failures_total").increment(1);

        self.set_current_health(ServerHealth::Error);
        self.events.emit(Notification::Disconnected {
            server,
            code: None,
            reason: Some(reason),
            error: true,
        });

        if self.status == AgentStatus::UserClosed {
            return;
        }

        match self.pool.select(self.rng.as_mut()) {
            Some(index) => self.open_transport(index),
            None => {
                for (key, session) in self.sessions.iter_mut() {
                    debug!("Notifying session {} of transport failure", key);
                    session.on_transport_error();
                }
                self.registrator.on_transport_closed();

                if self.error != Some(AgentError::NetworkError) {
                    self.status = AgentStatus::NotReady;
                    self.error = Some(AgentError::NetworkError);
                }
                self.recover_transport();
            }
        }
    }

    fn recover_transport(&mut self) {
        self.cancel_timer(TimerKind::Recovery);
        self.pool.reset_health();
        self.recovery_target = self.pool.select(self.rng.as_mut());

        let plan = plan_retry(
            self.rng.as_mut(),
            self.recovery_attempts,
            self.settings.connection_recovery_min_interval(),
            self.settings.connection_recovery_max_interval(),
        );
        self.recovery_attempts = plan.attempts;

        info!(
            "Next connection attempt in {:?} (attempt {})",
            plan.interval,
            plan.attempts + 1
        );
        counter!("sipua_recovery_cycles_total").increment(1);

        self.recovery_timer = Some(self.scheduler.schedule(plan.interval, TimerKind::Recovery));
    }

    // ========================================
    // Inbound messages
    // ========================================

    fn on_transport_message(&mut self, text: &str) {
        match SipMessage::parse(text.as_bytes()) {
            Ok(SipMessage::Request(request)) => self.receive_request(request),
            Ok(SipMessage::Response(response)) => self.receive_response(&response),
            Err(e) => warn!("Dropping unparseable message: {}", e),
        }
    }

    fn receive_response(&mut self, response: &SipResponse) {
        let kind = match response.cseq_method() {
            Some(SipMethod::Invite) => TransactionKind::InviteClient,
            Some(_) => TransactionKind::NonInviteClient,
            None => {
                warn!("Dropping response without CSeq method");
                return;
            }
        };
        let Some(id) = response.branch().map(|b| TransactionId::from_branch(&b)) else {
            warn!("Dropping response without Via branch");
            return;
        };

        match self.transactions.get_mut(kind, &id) {
            Some(transaction) => transaction.receive_response(response),
            None => {
                debug!(
                    "No {} for response {} (branch {})",
                    kind.name(),
                    response.status_code(),
                    id
                );
                return;
            }
        }
        self.destroy_terminated(kind);
    }

    /// Entry point for inbound requests
    pub fn receive_request(&mut self, request: SipRequest) {
        let method = request.method();
        debug!(
            "Received {} for {}",
            method.map(|m| m.as_str()).unwrap_or("unknown request"),
            request.uri()
        );

        let identity_user = self.settings.uri().user().unwrap_or_default().to_string();
        let contact_user = self.contact.uri.user().unwrap_or_default().to_string();
        if let Some(disposition) = screen(&request, &identity_user, &contact_user) {
            self.execute(disposition, &request, None);
            return;
        }

        let check = check_transaction(&mut self.transactions, &request);
        if method == Some(SipMethod::Ack) {
            // An ACK for a final error response ends its INVITE transaction
            self.destroy_terminated(TransactionKind::InviteServer);
        }
        match check {
            TransactionCheck::New => {}
            TransactionCheck::Absorbed => {
                debug!("Request absorbed by its transaction");
                return;
            }
            TransactionCheck::Retransmit(response) => {
                debug!("Retransmission, resending last response");
                self.send(&response);
                return;
            }
            TransactionCheck::Reply {
                status_code,
                proceed,
            } => {
                self.reply(&request, status_code, None, None);
                if !proceed {
                    return;
                }
            }
        }

        let server_transaction = match method {
            Some(SipMethod::Invite) => Some(TransactionKind::InviteServer),
            Some(SipMethod::Ack | SipMethod::Cancel) | None => None,
            Some(_) => Some(TransactionKind::NonInviteServer),
        };
        let server_transaction = server_transaction.map(|kind| {
            let id = match request.branch() {
                Some(branch) => TransactionId::from_branch(&branch),
                None => TransactionId::generate(self.rng.as_mut()),
            };
            let transaction = self
                .server_transactions
                .create(id.clone(), kind, &request);
            self.new_transaction(transaction);
            (kind, id)
        });

        let disposition = route(&request, &*self);
        self.execute(disposition, &request, server_transaction);
    }

    fn execute(
        &mut self,
        disposition: Disposition,
        request: &SipRequest,
        transaction: Option<(TransactionKind, TransactionId)>,
    ) {
        match disposition {
            Disposition::Reply {
                status_code,
                reason,
            } => self.reply(request, status_code, reason, transaction),
            Disposition::Drop { why } => debug!("Dropping request: {}", why),
            Disposition::NewMessage => {
                self.events.emit(Notification::NewMessage {
                    originator: Originator::Remote,
                    call_id: request.call_id().unwrap_or_default(),
                    from: request.from().unwrap_or_default(),
                    body: request.body_text(),
                });
                self.reply(request, 200, None, transaction);
            }
            Disposition::NewSession => {
                let key = SessionKey::new(
                    &request.call_id().unwrap_or_default(),
                    &request.from_tag().unwrap_or_default(),
                );
                let session = self.session_factory.create_incoming(request);
                info!("New incoming session {}", key);
                self.sessions.insert(key.clone(), session);
                self.events.emit(Notification::NewRtcSession {
                    originator: Originator::Remote,
                    session: key.to_string(),
                });
            }
            Disposition::ToSession(key) => match self.sessions.get_mut(&key) {
                Some(session) => session.receive_request(request),
                None => debug!("Session {} vanished", key),
            },
            Disposition::ToDialog(id) => match self.dialogs.get_mut(&id) {
                Some(dialog) => dialog.receive_request(request),
                None => debug!("Dialog {} vanished", id),
            },
        }
    }

    /// Answer `request`, through its server transaction when there is one
    fn reply(
        &mut self,
        request: &SipRequest,
        status_code: u16,
        reason: Option<&str>,
        transaction: Option<(TransactionKind, TransactionId)>,
    ) {
        let mut builder = ResponseBuilder::new(status_code).to_tag(random_token(self.rng.as_mut(), 10));
        if let Some(reason) = reason {
            builder = builder.reason(reason);
        }
        let response = builder.build_for_request(request);

        let recorded = match transaction
            .as_ref()
            .and_then(|(kind, id)| self.transactions.get_mut(*kind, id))
        {
            Some(transaction) => {
                transaction.send_response(status_code, response.clone());
                true
            }
            None => false,
        };

        if !recorded {
            counter!("sipua_stateless_replies_total").increment(1);
        }
        debug!(
            "Replying {} to {} ({})",
            status_code,
            request.method().map(|m| m.as_str()).unwrap_or("request"),
            if recorded { "stateful" } else { "stateless" }
        );
        self.send(&response);

        if let Some((kind, _)) = transaction {
            self.destroy_terminated(kind);
        }
    }

    // ========================================
    // Registries
    // ========================================

    /// Called by the transaction layer when a transaction is created
    pub fn new_transaction(&mut self, transaction: Box<dyn Transaction>) {
        let kind = transaction.kind();
        let id = transaction.id().clone();
        if self.transactions.insert(transaction).is_some() {
            debug!("Replaced {} {}", kind.name(), id);
        }
        gauge!("sipua_live_transactions").set(self.transactions.len() as f64);
        self.events.emit(Notification::NewTransaction {
            id: id.to_string(),
            kind,
        });
    }

    /// Called by the transaction layer when a transaction terminates
    pub fn destroy_transaction(&mut self, kind: TransactionKind, id: &TransactionId) {
        if self.transactions.remove(kind, id).is_none() {
            return;
        }
        gauge!("sipua_live_transactions").set(self.transactions.len() as f64);
        self.events.emit(Notification::TransactionDestroyed {
            id: id.to_string(),
            kind,
        });
    }

    fn destroy_terminated(&mut self, kind: TransactionKind) {
        let terminated: Vec<TransactionId> = self
            .transactions
            .ids(kind)
            .into_iter()
            .filter(|id| {
                self.transactions
                    .get(kind, id)
                    .is_some_and(|t| t.state().is_terminated())
            })
            .collect();
        for id in terminated {
            self.destroy_transaction(kind, &id);
        }
    }

    pub fn new_dialog(&mut self, id: DialogId, dialog: Box<dyn Dialog>) {
        debug!("New dialog {}", id);
        self.dialogs.insert(id, dialog);
    }

    pub fn destroy_dialog(&mut self, id: &DialogId) {
        if self.dialogs.remove(id).is_some() {
            debug!("Dialog {} destroyed", id);
        }
    }

    pub fn new_session(&mut self, key: SessionKey, session: Box<dyn Session>) {
        debug!("New session {}", key);
        self.sessions.insert(key, session);
    }

    pub fn destroy_session(&mut self, key: &SessionKey) {
        if self.sessions.remove(key).is_some() {
            debug!("Session {} destroyed", key);
        }
    }

    pub fn new_applicant(&mut self, applicant: Box<dyn Applicant>) -> ApplicantId {
        self.next_applicant_id += 1;
        let id = ApplicantId(self.next_applicant_id);
        self.applicants.insert(id, applicant);
        id
    }

    pub fn destroy_applicant(&mut self, id: ApplicantId) {
        self.applicants.remove(&id);
    }

    pub fn save_credentials(&mut self, credentials: Credentials) {
        self.credentials.save(credentials);
    }

    pub fn get_credentials(&self, realm: &str, uri: &str, method: &str) -> Option<Credentials> {
        self.credentials.get(realm, uri, method)
    }

    /// Resolve a user-entered target against the identity's host and port
    pub fn normalize_target(&self, target: &str) -> Option<SipUri> {
        normalize_target(target, &self.settings.uri().host_port())
    }

    /// GRUUs assigned by the registrar
    pub fn set_gruus(&mut self, pub_gruu: Option<String>, temp_gruu: Option<String>) {
        self.contact.pub_gruu = pub_gruu;
        self.contact.temp_gruu = temp_gruu;
    }
}

impl RoutingTable for UserAgent {
    fn accepts_messages(&self) -> bool {
        self.events.has_listeners(EventKind::NewMessage)
    }

    fn accepts_sessions(&self) -> bool {
        self.events.has_listeners(EventKind::NewRtcSession)
    }

    fn has_media(&self) -> bool {
        self.session_factory.has_media()
    }

    fn find_dialog(&self, call_id: &str, from_tag: &str, to_tag: &str) -> Option<DialogId> {
        let id = DialogId::new(call_id, from_tag, to_tag);
        let swapped = id.swapped();
        [id, swapped]
            .into_iter()
            .find(|id| self.dialogs.contains_key(id))
    }

    fn find_session(&self, call_id: &str, from_tag: &str, to_tag: &str) -> Option<SessionKey> {
        [SessionKey::new(call_id, from_tag), SessionKey::new(call_id, to_tag)]
            .into_iter()
            .find(|key| self.sessions.contains_key(key))
    }
}

impl fmt::Debug for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAgent")
            .field("uri", &self.settings.uri().to_string())
            .field("status", &self.status)
            .field("error", &self.error)
            .field("transport", &self.transport_id())
            .field("transactions", &self.transactions.counts())
            .field("sessions", &self.sessions.len())
            .field("dialogs", &self.dialogs.len())
            .finish()
    }
}
