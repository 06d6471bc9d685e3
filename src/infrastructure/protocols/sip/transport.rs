//! SIP transport layer - WebSocket client (RFC 7118)
//!
//! The agent sees a transport through [`SipTransport`]: a non-blocking handle
//! whose lifecycle is reported back as [`TransportEvent`]s on a channel.

use crate::config::TransportOptions;
use crate::domain::transport::CandidateServer;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, warn};

/// Identifies one transport instance. A fresh id is assigned for every
/// transport the agent creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u64);

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Connected,
    Closed {
        code: Option<u16>,
        reason: Option<String>,
        user_initiated: bool,
    },
    /// Connect failed, or the link dropped and could not be re-established
    Error { reason: String },
    /// Text frame carrying a SIP message
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub transport: TransportId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(transport: TransportId, kind: TransportEventKind) -> Self {
        Self { transport, kind }
    }
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Connection to one candidate server
pub trait SipTransport: Send {
    fn id(&self) -> TransportId;

    fn server(&self) -> &CandidateServer;

    /// Start connecting; the outcome arrives as an event
    fn connect(&mut self);

    /// Close on user request
    fn disconnect(&mut self);

    /// Queue a message. `false` when the transport is not connected.
    fn send(&mut self, data: &str) -> bool;

    fn is_connected(&self) -> bool;
}

/// Creates transports against candidate servers
pub trait TransportFactory: Send {
    fn create(
        &mut self,
        id: TransportId,
        server: &CandidateServer,
        options: &TransportOptions,
    ) -> Box<dyn SipTransport>;
}

enum WsCommand {
    Send(String),
    Close,
}

/// WebSocket transport driven by a tokio task
pub struct WsTransport {
    id: TransportId,
    server: CandidateServer,
    options: TransportOptions,
    events: TransportEventSender,
    connected: Arc<AtomicBool>,
    commands: Option<mpsc::UnboundedSender<WsCommand>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(
        id: TransportId,
        server: CandidateServer,
        options: TransportOptions,
        events: TransportEventSender,
    ) -> Self {
        Self {
            id,
            server,
            options,
            events,
            connected: Arc::new(AtomicBool::new(false)),
            commands: None,
            task: None,
        }
    }
}

impl SipTransport for WsTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn server(&self) -> &CandidateServer {
        &self.server
    }

    fn connect(&mut self) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("{} already connecting or connected", self.id);
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.commands = Some(tx);

        let link = WsLink {
            id: self.id,
            uri: self.server.uri.clone(),
            options: self.options.clone(),
            events: self.events.clone(),
            connected: self.connected.clone(),
        };
        self.task = Some(tokio::spawn(link.run(rx)));
    }

    fn disconnect(&mut self) {
        match self.commands.take() {
            Some(commands) => {
                info!("Closing {} to {}", self.id, self.server.uri);
                // The task may already be gone
                let _ = commands.send(WsCommand::Close);
            }
            None => debug!("{} not connected", self.id),
        }
    }

    fn send(&mut self, data: &str) -> bool {
        if !self.is_connected() {
            warn!("Unable to send message, {} is not connected", self.id);
            return false;
        }
        match &self.commands {
            Some(commands) => commands.send(WsCommand::Send(data.to_string())).is_ok(),
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum LinkEnd {
    UserClosed,
    Dropped {
        code: Option<u16>,
        reason: Option<String>,
    },
}

struct WsLink {
    id: TransportId,
    uri: String,
    options: TransportOptions,
    events: TransportEventSender,
    connected: Arc<AtomicBool>,
}

impl WsLink {
    fn emit(&self, kind: TransportEventKind) {
        if self.events.send(TransportEvent::new(self.id, kind)).is_err() {
            debug!("{} event receiver dropped", self.id);
        }
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<WsCommand>) {
        let mut stream = match self.open().await {
            Ok(stream) => stream,
            Err(reason) => {
                warn!("Connection to {} failed: {}", self.uri, reason);
                self.emit(TransportEventKind::Error { reason });
                return;
            }
        };

        loop {
            self.connected.store(true, Ordering::Relaxed);
            info!("{} connected to {}", self.id, self.uri);
            self.emit(TransportEventKind::Connected);

            let end = self.pump(stream, &mut commands).await;
            self.connected.store(false, Ordering::Relaxed);

            match end {
                LinkEnd::UserClosed => {
                    self.emit(TransportEventKind::Closed {
                        code: Some(1000),
                        reason: None,
                        user_initiated: true,
                    });
                    return;
                }
                LinkEnd::Dropped { code, reason } => {
                    warn!("{} to {} dropped", self.id, self.uri);
                    self.emit(TransportEventKind::Closed {
                        code,
                        reason,
                        user_initiated: false,
                    });
                }
            }

            match self.reconnect(&mut commands).await {
                Some(reopened) => stream = reopened,
                None => return,
            }
        }
    }

    async fn open(&self) -> Result<WsStream, String> {
        let mut request = self
            .uri
            .as_str()
            .into_client_request()
            .map_err(|e| e.to_string())?;
        let protocol = HeaderValue::from_str(&self.options.protocol).map_err(|e| e.to_string())?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", protocol);

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(stream)
    }

    /// Bounded reconnection after an unexpected drop
    async fn reconnect(&self, commands: &mut mpsc::UnboundedReceiver<WsCommand>) -> Option<WsStream> {
        let mut last_error = String::from("connection lost");

        for attempt in 1..=self.options.max_reconnection {
            tokio::select! {
                _ = tokio::time::sleep(self.options.reconnection_timeout()) => {}
                command = commands.recv() => match command {
                    Some(WsCommand::Close) | None => return None,
                    Some(WsCommand::Send(_)) => {
                        debug!("{} dropping message while reconnecting", self.id);
                        continue;
                    }
                },
            }

            debug!("{} reconnection attempt {} to {}", self.id, attempt, self.uri);
            match self.open().await {
                Ok(stream) => return Some(stream),
                Err(reason) => last_error = reason,
            }
        }

        self.emit(TransportEventKind::Error { reason: last_error });
        None
    }

    async fn pump(
        &self,
        stream: WsStream,
        commands: &mut mpsc::UnboundedReceiver<WsCommand>,
    ) -> LinkEnd {
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(WsCommand::Send(data)) => {
                        if let Err(e) = sink.send(WsMessage::Text(data)).await {
                            return LinkEnd::Dropped { code: None, reason: Some(e.to_string()) };
                        }
                    }
                    Some(WsCommand::Close) | None => {
                        if let Err(e) = sink.send(WsMessage::Close(None)).await {
                            debug!("Failed to send close frame: {}", e);
                        }
                        return LinkEnd::UserClosed;
                    }
                },
                frame = source.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        self.emit(TransportEventKind::Message(text));
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        self.emit(TransportEventKind::Message(String::from_utf8_lossy(&data).into_owned()));
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), Some(frame.reason.to_string())),
                            None => (None, None),
                        };
                        return LinkEnd::Dropped { code, reason };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return LinkEnd::Dropped { code: None, reason: Some(e.to_string()) };
                    }
                    None => return LinkEnd::Dropped { code: None, reason: None },
                },
            }
        }
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Creates [`WsTransport`]s that report on one shared channel
pub struct WsTransportFactory {
    events: TransportEventSender,
}

impl WsTransportFactory {
    pub fn new(events: TransportEventSender) -> Self {
        Self { events }
    }
}

impl TransportFactory for WsTransportFactory {
    fn create(
        &mut self,
        id: TransportId,
        server: &CandidateServer,
        options: &TransportOptions,
    ) -> Box<dyn SipTransport> {
        debug!("Creating {} for {}", id, server.uri);
        Box::new(WsTransport::new(
            id,
            server.clone(),
            options.clone(),
            self.events.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(uri: &str) -> CandidateServer {
        CandidateServer::new(uri, "ws", "127.0.0.1", Some(1), 0)
    }

    #[tokio::test]
    async fn test_failed_connect_reports_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut factory = WsTransportFactory::new(tx);
        let mut transport = factory.create(
            TransportId(7),
            &server("ws://127.0.0.1:1"),
            &TransportOptions::default(),
        );

        assert!(!transport.send("OPTIONS sip:x SIP/2.0\r\n\r\n"));
        transport.connect();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.transport, TransportId(7));
        assert!(matches!(event.kind, TransportEventKind::Error { .. }));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_transport_id_display() {
        assert_eq!(TransportId(3).to_string(), "transport-3");
    }
}
