use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::timer::TimerSlot;
use crate::types::{CloseKind, ConnectionState};

/// Close codes the media-info service uses for an intentional shutdown
pub const GRACEFUL_CLOSE_CODES: [u16; 3] = [3000, 3001, 3002];
pub const RETRY_DELAY: Duration = Duration::from_millis(3000);
pub const ERROR_THRESHOLD: u32 = 3;
pub const EXHAUSTED_REASON: &str = "server not responding";
pub const REQUESTED_REASON: &str = "closed by client";

pub type SocketId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Something the transport observed on a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub socket: SocketId,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Frame(String),
    Error(TransportError),
    Closed { code: u16, reason: String },
}

/// Opens and closes sockets; reports back through `TransportEvent`s
pub trait Connector {
    fn open(&mut self, socket: SocketId, endpoint: &str);
    fn close(&mut self, socket: SocketId);
}

/// Lifecycle hooks invoked by `ConnectionManager`
pub trait ConnectionHandlers {
    fn on_try_to_connect(&mut self) {}
    fn on_open(&mut self) {}
    fn on_message(&mut self, payload: &str);
    fn on_error(&mut self, _error: &TransportError) {}
    fn on_close(&mut self, close: &CloseKind);
}

/// Tagged form of the handler calls, for consumers running a dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    TryingToConnect,
    Opened,
    Message(String),
    Error(TransportError),
    Closed(CloseKind),
}

impl ConnectionEvent {
    /// The connection state a caller should display after this event
    pub fn state(&self) -> Option<ConnectionState> {
        match self {
            ConnectionEvent::TryingToConnect => Some(ConnectionState::Connecting),
            ConnectionEvent::Opened => Some(ConnectionState::Open),
            ConnectionEvent::Closed(_) => Some(ConnectionState::Closed),
            ConnectionEvent::Message(_) | ConnectionEvent::Error(_) => None,
        }
    }
}

impl ConnectionHandlers for UnboundedSender<ConnectionEvent> {
    fn on_try_to_connect(&mut self) {
        let _ = self.send(ConnectionEvent::TryingToConnect);
    }

    fn on_open(&mut self) {
        let _ = self.send(ConnectionEvent::Opened);
    }

    fn on_message(&mut self, payload: &str) {
        let _ = self.send(ConnectionEvent::Message(payload.to_string()));
    }

    fn on_error(&mut self, error: &TransportError) {
        let _ = self.send(ConnectionEvent::Error(error.clone()));
    }

    fn on_close(&mut self, close: &CloseKind) {
        let _ = self.send(ConnectionEvent::Closed(close.clone()));
    }
}

impl CloseKind {
    pub fn reason(&self) -> &str {
        match self {
            CloseKind::Graceful { reason, .. } => reason,
            CloseKind::Transient { .. } => "",
            CloseKind::Exhausted => EXHAUSTED_REASON,
            CloseKind::Requested => REQUESTED_REASON,
        }
    }
}

/// Classify a close the client did not ask for
pub fn classify_close(code: u16, reason: &str, error_count: u32) -> CloseKind {
    if GRACEFUL_CLOSE_CODES.contains(&code) {
        CloseKind::Graceful {
            code,
            reason: reason.to_string(),
        }
    } else if error_count >= ERROR_THRESHOLD {
        CloseKind::Exhausted
    } else {
        CloseKind::Transient { code }
    }
}

#[derive(Debug, Clone, Copy)]
struct Socket {
    id: SocketId,
    state: SocketState,
    close_requested: bool,
}

/// Keeps one socket to the media-info endpoint alive.
///
/// Sans-IO: the connector does the actual networking and its events are fed
/// back through [`ConnectionManager::handle_event`]. Timers are advanced with
/// [`ConnectionManager::poll`].
pub struct ConnectionManager<C, H> {
    connector: C,
    endpoint: String,
    socket: Option<Socket>,
    next_socket: SocketId,
    error_count: u32,
    handlers: Option<H>,
    deferred: Option<H>,
    retry: TimerSlot<()>,
}

impl<C: Connector, H: ConnectionHandlers> ConnectionManager<C, H> {
    pub fn new(connector: C, endpoint: impl Into<String>) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            socket: None,
            next_socket: 1,
            error_count: 0,
            handlers: None,
            deferred: None,
            retry: TimerSlot::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn socket_state(&self) -> Option<SocketState> {
        self.socket.map(|s| s.state)
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.is_pending()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.retry.deadline()
    }

    /// Start a connection attempt unless one is already live
    pub fn connect(&mut self, handlers: H, reset_error_count: bool) {
        if reset_error_count {
            self.error_count = 0;
        }

        match self.socket_state() {
            Some(SocketState::Open) | Some(SocketState::Connecting) => {
                log::debug!("Connect ignored, socket already live");
            }
            Some(SocketState::Closing) => {
                log::debug!("Socket is closing, connect deferred until close completes");
                self.deferred = Some(handlers);
            }
            Some(SocketState::Closed) | None => self.start(handlers),
        }
    }

    fn start(&mut self, mut handlers: H) {
        self.retry.cancel();
        handlers.on_try_to_connect();

        let id = self.next_socket;
        self.next_socket += 1;
        self.socket = Some(Socket {
            id,
            state: SocketState::Connecting,
            close_requested: false,
        });
        self.handlers = Some(handlers);

        log::info!("Connecting to {} (socket {})", self.endpoint, id);
        self.connector.open(id, &self.endpoint);
    }

    /// Request a graceful close of the live socket and drop any pending retry
    pub fn disconnect(&mut self) {
        if self.retry.cancel() {
            log::debug!("Pending reconnect cancelled");
        }
        self.deferred = None;

        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        if matches!(socket.state, SocketState::Closed | SocketState::Closing) {
            return;
        }

        log::info!("Closing socket {}", socket.id);
        socket.state = SocketState::Closing;
        socket.close_requested = true;
        let id = socket.id;
        self.connector.close(id);
    }

    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        let Some(socket) = self.socket.as_mut().filter(|s| s.id == event.socket) else {
            log::debug!("Ignoring event for stale socket {}", event.socket);
            return;
        };
        if socket.state == SocketState::Closed {
            log::debug!("Ignoring event for closed socket {}", event.socket);
            return;
        }
        // Once a close is requested only the close itself matters
        if socket.close_requested && !matches!(event.kind, TransportEventKind::Closed { .. }) {
            log::debug!("Ignoring event for closing socket {}", event.socket);
            return;
        }

        match event.kind {
            TransportEventKind::Opened => {
                if socket.state != SocketState::Connecting {
                    log::debug!("Socket {} already open", event.socket);
                    return;
                }
                socket.state = SocketState::Open;
                log::info!("Connected to {}", self.endpoint);
                self.error_count = 0;
                if let Some(handlers) = self.handlers.as_mut() {
                    handlers.on_open();
                }
            }
            TransportEventKind::Frame(payload) => {
                if let Some(handlers) = self.handlers.as_mut() {
                    handlers.on_message(&payload);
                }
            }
            TransportEventKind::Error(error) => {
                self.error_count += 1;
                log::warn!("Transport error ({} so far): {}", self.error_count, error);
                if let Some(handlers) = self.handlers.as_mut() {
                    handlers.on_error(&error);
                }
            }
            TransportEventKind::Closed { code, reason } => {
                socket.state = SocketState::Closed;
                let requested = socket.close_requested;
                self.on_closed(code, &reason, requested, now);
            }
        }
    }

    fn on_closed(&mut self, code: u16, reason: &str, requested: bool, now: Instant) {
        if let Some(deferred) = self.deferred.take() {
            log::info!("Previous socket closed, starting deferred connect");
            self.start(deferred);
            return;
        }

        let close = if requested {
            CloseKind::Requested
        } else {
            classify_close(code, reason, self.error_count)
        };

        match &close {
            CloseKind::Transient { code } => {
                log::info!(
                    "Socket closed with code {}, retrying in {}ms",
                    code,
                    RETRY_DELAY.as_millis()
                );
                self.retry.schedule(now, RETRY_DELAY, ());
            }
            CloseKind::Graceful { code, reason } => {
                log::info!("Server closed the connection ({}): {}", code, reason);
                self.notify_closed(&close);
            }
            CloseKind::Exhausted => {
                log::warn!(
                    "Giving up after {} errors: {}",
                    self.error_count,
                    EXHAUSTED_REASON
                );
                self.notify_closed(&close);
            }
            CloseKind::Requested => {
                log::info!("Socket closed on request");
                self.notify_closed(&close);
            }
        }
    }

    fn notify_closed(&mut self, close: &CloseKind) {
        if let Some(handlers) = self.handlers.as_mut() {
            handlers.on_close(close);
        }
    }

    /// Run the retry if it is due
    pub fn poll(&mut self, now: Instant) {
        if self.retry.fire(now).is_none() {
            return;
        }
        if let Some(handlers) = self.handlers.take() {
            self.connect(handlers, false);
        }
    }
}
