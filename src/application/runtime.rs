//! Async driver for the user agent
//!
//! The agent itself is synchronous. `UaRuntime` owns it and feeds it, one
//! input at a time, from three queues: transport events, timer expiries
//! and commands sent through a [`UaHandle`].

use super::user_agent::{ApplicantId, UserAgent, UserAgentBuilder};
use crate::domain::shared::error::UaError;
use crate::domain::shared::value_objects::{DialogId, SessionKey, TransactionKind};
use crate::infrastructure::protocols::sip::{
    Applicant, Dialog, RegistrationEvent, Session, Transaction, TransactionId, TransportEvent,
    WsTransportFactory,
};
use crate::infrastructure::scheduler::{TimerFired, TokioScheduler};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Requests accepted by a running agent
pub enum UaCommand {
    Start,
    Stop,
    Register,
    Unregister { all: bool },
    Registration(RegistrationEvent),
    NewTransaction(Box<dyn Transaction>),
    DestroyTransaction { kind: TransactionKind, id: TransactionId },
    NewDialog { id: DialogId, dialog: Box<dyn Dialog> },
    DestroyDialog(DialogId),
    NewSession { key: SessionKey, session: Box<dyn Session> },
    DestroySession(SessionKey),
    NewApplicant {
        applicant: Box<dyn Applicant>,
        reply: oneshot::Sender<ApplicantId>,
    },
    DestroyApplicant(ApplicantId),
    /// Stop, wait for the shutdown grace period, then end the run loop
    Shutdown,
}

impl fmt::Debug for UaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UaCommand::Start => write!(f, "Start"),
            UaCommand::Stop => write!(f, "Stop"),
            UaCommand::Register => write!(f, "Register"),
            UaCommand::Unregister { all } => write!(f, "Unregister(all={})", all),
            UaCommand::Registration(event) => write!(f, "Registration({:?})", event),
            UaCommand::NewTransaction(transaction) => write!(
                f,
                "NewTransaction({} {})",
                transaction.kind().name(),
                transaction.id()
            ),
            UaCommand::DestroyTransaction { kind, id } => {
                write!(f, "DestroyTransaction({} {})", kind.name(), id)
            }
            UaCommand::NewDialog { id, .. } => write!(f, "NewDialog({})", id),
            UaCommand::DestroyDialog(id) => write!(f, "DestroyDialog({})", id),
            UaCommand::NewSession { key, .. } => write!(f, "NewSession({})", key),
            UaCommand::DestroySession(key) => write!(f, "DestroySession({})", key),
            UaCommand::NewApplicant { .. } => write!(f, "NewApplicant"),
            UaCommand::DestroyApplicant(id) => write!(f, "DestroyApplicant({:?})", id),
            UaCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Cloneable sender side of a [`UaRuntime`].
///
/// Transaction, dialog and session layers use it to report what they
/// create and what terminates once the runtime owns the agent.
#[derive(Debug, Clone)]
pub struct UaHandle {
    commands: mpsc::UnboundedSender<UaCommand>,
}

fn runtime_stopped() -> UaError {
    UaError::InvalidState("user agent runtime has stopped".to_string())
}

impl UaHandle {
    fn send(&self, command: UaCommand) -> Result<(), UaError> {
        self.commands.send(command).map_err(|_| runtime_stopped())
    }

    pub fn start(&self) -> Result<(), UaError> {
        self.send(UaCommand::Start)
    }

    pub fn stop(&self) -> Result<(), UaError> {
        self.send(UaCommand::Stop)
    }

    pub fn register(&self) -> Result<(), UaError> {
        self.send(UaCommand::Register)
    }

    pub fn unregister(&self, all: bool) -> Result<(), UaError> {
        self.send(UaCommand::Unregister { all })
    }

    /// Forward a registrator outcome to the agent
    pub fn registration_event(&self, event: RegistrationEvent) -> Result<(), UaError> {
        self.send(UaCommand::Registration(event))
    }

    pub fn new_transaction(&self, transaction: Box<dyn Transaction>) -> Result<(), UaError> {
        self.send(UaCommand::NewTransaction(transaction))
    }

    pub fn destroy_transaction(&self, kind: TransactionKind, id: TransactionId) -> Result<(), UaError> {
        self.send(UaCommand::DestroyTransaction { kind, id })
    }

    pub fn new_dialog(&self, id: DialogId, dialog: Box<dyn Dialog>) -> Result<(), UaError> {
        self.send(UaCommand::NewDialog { id, dialog })
    }

    pub fn destroy_dialog(&self, id: DialogId) -> Result<(), UaError> {
        self.send(UaCommand::DestroyDialog(id))
    }

    pub fn new_session(&self, key: SessionKey, session: Box<dyn Session>) -> Result<(), UaError> {
        self.send(UaCommand::NewSession { key, session })
    }

    /// The owning layer reports that a session ended
    pub fn destroy_session(&self, key: SessionKey) -> Result<(), UaError> {
        self.send(UaCommand::DestroySession(key))
    }

    /// Register an applicant and wait for the id the agent assigns
    pub async fn new_applicant(&self, applicant: Box<dyn Applicant>) -> Result<ApplicantId, UaError> {
        let (reply, assigned) = oneshot::channel();
        self.send(UaCommand::NewApplicant { applicant, reply })?;
        assigned.await.map_err(|_| runtime_stopped())
    }

    pub fn destroy_applicant(&self, id: ApplicantId) -> Result<(), UaError> {
        self.send(UaCommand::DestroyApplicant(id))
    }

    pub fn shutdown(&self) -> Result<(), UaError> {
        self.send(UaCommand::Shutdown)
    }
}

pub struct UaRuntime {
    agent: UserAgent,
    handle: UaHandle,
    commands: mpsc::UnboundedReceiver<UaCommand>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    timers: mpsc::UnboundedReceiver<TimerFired>,
}

impl UaRuntime {
    /// Build the agent with WebSocket transports and tokio timers.
    pub fn new(builder: UserAgentBuilder) -> Result<Self, UaError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();

        let agent = builder
            .transport_factory(WsTransportFactory::new(events_tx))
            .scheduler(TokioScheduler::new(timers_tx))
            .build()?;

        Ok(Self::from_parts(agent, events_rx, timers_rx))
    }

    /// Drive an agent whose transports and scheduler report into the given
    /// receivers.
    pub fn from_parts(
        agent: UserAgent,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        timers: mpsc::UnboundedReceiver<TimerFired>,
    ) -> Self {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        Self {
            agent,
            handle: UaHandle {
                commands: commands_tx,
            },
            commands,
            transport_events,
            timers,
        }
    }

    pub fn handle(&self) -> UaHandle {
        self.handle.clone()
    }

    pub fn agent(&self) -> &UserAgent {
        &self.agent
    }

    /// Access before `run()`, e.g. to attach listeners
    pub fn agent_mut(&mut self) -> &mut UserAgent {
        &mut self.agent
    }

    /// Process inputs until a `Shutdown` completes. Returns the agent.
    pub async fn run(mut self) -> UserAgent {
        info!("User agent runtime started");
        let mut shutting_down = false;

        loop {
            tokio::select! {
                biased;

                Some(event) = self.transport_events.recv() => {
                    self.agent.on_transport_event(event);
                }
                Some(fired) = self.timers.recv() => {
                    self.agent.on_timer(fired);
                }
                Some(command) = self.commands.recv() => {
                    debug!("Command {:?}", command);
                    match command {
                        UaCommand::Start => self.agent.start(),
                        UaCommand::Stop => self.agent.stop(),
                        UaCommand::Register => self.agent.register(),
                        UaCommand::Unregister { all } => self.agent.unregister(all),
                        UaCommand::Registration(event) => self.agent.on_registration_event(event),
                        UaCommand::NewTransaction(transaction) => self.agent.new_transaction(transaction),
                        UaCommand::DestroyTransaction { kind, id } => {
                            self.agent.destroy_transaction(kind, &id)
                        }
                        UaCommand::NewDialog { id, dialog } => self.agent.new_dialog(id, dialog),
                        UaCommand::DestroyDialog(id) => self.agent.destroy_dialog(&id),
                        UaCommand::NewSession { key, session } => self.agent.new_session(key, session),
                        UaCommand::DestroySession(key) => self.agent.destroy_session(&key),
                        UaCommand::NewApplicant { applicant, reply } => {
                            let id = self.agent.new_applicant(applicant);
                            if reply.send(id).is_err() {
                                debug!("Applicant {:?} registered after its caller left", id);
                            }
                        }
                        UaCommand::DestroyApplicant(id) => self.agent.destroy_applicant(id),
                        UaCommand::Shutdown => {
                            self.agent.stop();
                            shutting_down = true;
                        }
                    }
                }
                else => break,
            }

            if shutting_down && !self.agent.shutdown_pending() {
                break;
            }
        }

        info!("User agent runtime finished");
        self.agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RawConfiguration, TransportOptions};
    use crate::domain::agent::AgentStatus;
    use crate::domain::transport::CandidateServer;
    use crate::infrastructure::protocols::sip::handler::{MockApplicant, MockDialog, MockSession};
    use crate::infrastructure::protocols::sip::{
        SipTransaction, SipTransport, TransportEventKind, TransportEventSender, TransportFactory,
        TransportId,
    };
    use crate::infrastructure::scheduler::ManualScheduler;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Connects instantly and reports through the runtime's event queue
    struct LoopbackTransport {
        id: TransportId,
        server: CandidateServer,
        events: TransportEventSender,
        connected: bool,
        disconnects: Arc<AtomicU32>,
    }

    impl SipTransport for LoopbackTransport {
        fn id(&self) -> TransportId {
            self.id
        }

        fn server(&self) -> &CandidateServer {
            &self.server
        }

        fn connect(&mut self) {
            self.connected = true;
            let _ = self
                .events
                .send(TransportEvent::new(self.id, TransportEventKind::Connected));
        }

        fn disconnect(&mut self) {
            self.connected = false;
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        fn send(&mut self, _data: &str) -> bool {
            self.connected
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    struct LoopbackFactory {
        events: TransportEventSender,
        disconnects: Arc<AtomicU32>,
    }

    impl TransportFactory for LoopbackFactory {
        fn create(
            &mut self,
            id: TransportId,
            server: &CandidateServer,
            _options: &TransportOptions,
        ) -> Box<dyn SipTransport> {
            Box::new(LoopbackTransport {
                id,
                server: server.clone(),
                events: self.events.clone(),
                connected: false,
                disconnects: self.disconnects.clone(),
            })
        }
    }

    fn loopback_agent(events: TransportEventSender, disconnects: Arc<AtomicU32>) -> UserAgent {
        let raw = RawConfiguration::from_value(json!({
            "uri": "sip:alice@example.com",
            "ws_servers": "wss://edge.example.com"
        }))
        .unwrap();
        UserAgent::builder(raw)
            .rng(StdRng::seed_from_u64(1))
            .scheduler(ManualScheduler::new())
            .transport_factory(LoopbackFactory {
                events,
                disconnects,
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_then_shutdown() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (_timers_tx, timers_rx) = mpsc::unbounded_channel();
        let disconnects = Arc::new(AtomicU32::new(0));
        let agent = loopback_agent(events_tx, disconnects.clone());

        let runtime = UaRuntime::from_parts(agent, events_rx, timers_rx);
        let handle = runtime.handle();
        tokio_test::assert_ok!(handle.start());
        tokio_test::assert_ok!(handle.shutdown());

        let agent = runtime.run().await;
        assert_eq!(agent.status(), AgentStatus::UserClosed);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        // The loop is gone, so the handle reports it
        tokio_test::assert_err!(handle.start());
    }

    #[tokio::test]
    async fn test_collaborators_register_and_destroy_through_handle() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (_timers_tx, timers_rx) = mpsc::unbounded_channel();
        let disconnects = Arc::new(AtomicU32::new(0));
        let agent = loopback_agent(events_tx, disconnects.clone());

        let runtime = UaRuntime::from_parts(agent, events_rx, timers_rx);
        let handle = runtime.handle();
        let running = tokio::spawn(runtime.run());

        let key = SessionKey::new("9k2ndl3x", "remote");
        let dialog = DialogId::new("9k2ndl3x", "local", "remote");
        let branch = TransactionId::from_branch("z9hG4bKcollab");

        tokio_test::assert_ok!(handle.start());
        tokio_test::assert_ok!(handle.new_session(key.clone(), Box::new(MockSession::new())));
        tokio_test::assert_ok!(handle.new_dialog(dialog.clone(), Box::new(MockDialog::new())));
        tokio_test::assert_ok!(handle.new_transaction(Box::new(
            SipTransaction::new_non_invite_client(branch.clone())
        )));
        let applicant = tokio_test::assert_ok!(
            handle.new_applicant(Box::new(MockApplicant::new())).await
        );

        // Everything ended before shutdown, so the link closes without a
        // grace period and no session is asked to terminate
        tokio_test::assert_ok!(handle.destroy_session(key));
        tokio_test::assert_ok!(handle.destroy_dialog(dialog));
        tokio_test::assert_ok!(handle.destroy_transaction(TransactionKind::NonInviteClient, branch));
        tokio_test::assert_ok!(handle.destroy_applicant(applicant));
        tokio_test::assert_ok!(handle.shutdown());

        let agent = running.await.unwrap();
        assert_eq!(agent.session_count(), 0);
        assert_eq!(agent.dialog_count(), 0);
        assert_eq!(agent.applicant_count(), 0);
        assert_eq!(agent.transaction_counts().total(), 0);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }
}
