use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::connection::{Connector, SocketId, TransportEvent, TransportEventKind};
use crate::error::TransportError;

/// Close code reported when the connection dropped without a close frame
pub const ABNORMAL_CLOSE: u16 = 1006;
/// Close code reported when the server sent a close frame without a status
pub const NO_STATUS_CLOSE: u16 = 1005;
pub const NORMAL_CLOSE: u16 = 1000;

/// How long to wait for the server to acknowledge a close before giving up
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

struct SocketTask {
    close: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// WebSocket connector backed by tokio-tungstenite.
///
/// Each socket runs in its own task and reports what it sees on the shared
/// event channel, tagged with the socket id it was opened with.
pub struct WsConnector {
    events: UnboundedSender<TransportEvent>,
    sockets: HashMap<SocketId, SocketTask>,
}

impl WsConnector {
    pub fn new(events: UnboundedSender<TransportEvent>) -> Self {
        Self {
            events,
            sockets: HashMap::new(),
        }
    }

    /// Number of socket tasks that have not finished yet
    pub fn live_sockets(&self) -> usize {
        self.sockets
            .values()
            .filter(|task| !task.handle.is_finished())
            .count()
    }
}

impl Connector for WsConnector {
    fn open(&mut self, socket: SocketId, endpoint: &str) {
        self.sockets.retain(|_, task| !task.handle.is_finished());

        let (close_tx, close_rx) = oneshot::channel();
        let handle = tokio::spawn(run_socket(
            socket,
            endpoint.to_string(),
            self.events.clone(),
            close_rx,
        ));
        self.sockets.insert(
            socket,
            SocketTask {
                close: Some(close_tx),
                handle,
            },
        );
    }

    fn close(&mut self, socket: SocketId) {
        match self.sockets.get_mut(&socket).and_then(|task| task.close.take()) {
            Some(close) => {
                let _ = close.send(());
            }
            None => log::debug!("No running task for socket {}", socket),
        }
    }
}

impl Drop for WsConnector {
    fn drop(&mut self) {
        let live = self.live_sockets();
        if live > 0 {
            log::debug!("WsConnector dropped with {} live socket(s), closing", live);
        }
        for task in self.sockets.values_mut() {
            if let Some(close) = task.close.take() {
                let _ = close.send(());
            }
        }
    }
}

async fn run_socket(
    socket: SocketId,
    endpoint: String,
    events: UnboundedSender<TransportEvent>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let emit = |kind: TransportEventKind| {
        let _ = events.send(TransportEvent { socket, kind });
    };
    let closed = |code: u16, reason: String| TransportEventKind::Closed { code, reason };

    // Handshake, unless the manager gives up on us first
    let connected = tokio::select! {
        result = connect_async(endpoint.as_str()) => result,
        _ = &mut close_rx => {
            log::debug!("Socket {} closed before the handshake finished", socket);
            emit(closed(NORMAL_CLOSE, String::new()));
            return;
        }
    };

    let mut stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            // Failed handshakes look like an abnormal close to the manager
            emit(TransportEventKind::Error(TransportError::Handshake {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            }));
            emit(closed(ABNORMAL_CLOSE, String::new()));
            return;
        }
    };

    emit(TransportEventKind::Opened);

    // Read frames until either side closes
    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEventKind::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((NO_STATUS_CLOSE, String::new()));
                    emit(closed(code, reason));
                    // Keep polling so tungstenite can flush its close reply
                    let _ = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
                        while stream.next().await.is_some() {}
                    })
                    .await;
                    return;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    log::debug!("Socket {} ignoring {} byte binary frame", socket, bytes.len());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEventKind::Error(TransportError::Read(e.to_string())));
                    emit(closed(ABNORMAL_CLOSE, String::new()));
                    return;
                }
                None => {
                    emit(closed(ABNORMAL_CLOSE, String::new()));
                    return;
                }
            },
            _ = &mut close_rx => {
                // Client-initiated close: send ours, then wait for the reply
                if let Err(e) = stream.close(None).await {
                    log::debug!("Socket {} close frame not sent: {}", socket, e);
                }
                let _ = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
                    while stream.next().await.is_some() {}
                })
                .await;
                emit(closed(NORMAL_CLOSE, String::new()));
                return;
            }
        }
    }
}
