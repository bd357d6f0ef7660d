//! Runs the real WebSocket connector against a local server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use media_overlay::connection::{ConnectionEvent, ConnectionManager, SocketState, TransportEvent};
use media_overlay::error::TransportError;
use media_overlay::transport::WsConnector;
use media_overlay::CloseKind;

const TIMEOUT: Duration = Duration::from_secs(5);

type Manager = ConnectionManager<WsConnector, UnboundedSender<ConnectionEvent>>;

fn manager(endpoint: String) -> (
    Manager,
    UnboundedReceiver<TransportEvent>,
    UnboundedReceiver<ConnectionEvent>,
) {
    let (transport_tx, transport_rx) = unbounded_channel();
    let (handlers, events) = unbounded_channel();
    let mut manager = ConnectionManager::new(WsConnector::new(transport_tx), endpoint);
    manager.connect(handlers, false);
    (manager, transport_rx, events)
}

/// Feed transport events into the manager until `done` holds for the handler events seen so far
async fn pump_until(
    manager: &mut Manager,
    transport: &mut UnboundedReceiver<TransportEvent>,
    events: &mut UnboundedReceiver<ConnectionEvent>,
    seen: &mut Vec<ConnectionEvent>,
    done: impl Fn(&Manager, &[ConnectionEvent]) -> bool,
) {
    while !done(&*manager, seen.as_slice()) {
        let event = timeout(TIMEOUT, transport.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("transport channel closed");
        manager.handle_event(event, Instant::now());
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
    }
}

async fn local_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("ws://{}/media-info", addr))
}

#[tokio::test]
async fn receives_media_then_graceful_close() {
    let (listener, endpoint) = local_listener().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        ws.send(Message::Text(r#"{"title":"Song","artist":"Band"}"#.to_string().into()))
            .await
            .unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::from(3000),
            reason: "media service stopped".to_string().into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let (mut manager, mut transport, mut events) = manager(endpoint);
    let mut seen = Vec::new();
    pump_until(&mut manager, &mut transport, &mut events, &mut seen, |_, seen| {
        matches!(seen.last(), Some(ConnectionEvent::Closed(_)))
    })
    .await;

    assert_eq!(
        seen,
        vec![
            ConnectionEvent::TryingToConnect,
            ConnectionEvent::Opened,
            ConnectionEvent::Message(r#"{"title":"Song","artist":"Band"}"#.to_string()),
            ConnectionEvent::Closed(CloseKind::Graceful {
                code: 3000,
                reason: "media service stopped".to_string()
            }),
        ]
    );
    assert!(!manager.retry_pending());
    timeout(TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn refused_connection_counts_an_error_and_retries() {
    let (listener, endpoint) = local_listener().await;
    drop(listener);

    let (mut manager, mut transport, mut events) = manager(endpoint);
    let mut seen = Vec::new();
    pump_until(&mut manager, &mut transport, &mut events, &mut seen, |m, _| {
        m.retry_pending()
    })
    .await;

    assert_eq!(manager.error_count(), 1);
    assert_eq!(manager.socket_state(), Some(SocketState::Closed));
    assert!(matches!(
        seen.as_slice(),
        [
            ConnectionEvent::TryingToConnect,
            ConnectionEvent::Error(TransportError::Handshake { .. })
        ]
    ));
}

#[tokio::test]
async fn client_disconnect_closes_cleanly() {
    let (listener, endpoint) = local_listener().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let mut close_code = None;
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Close(frame) = message {
                close_code = frame.map(|f| u16::from(f.code));
            }
        }
        close_code
    });

    let (mut manager, mut transport, mut events) = manager(endpoint);
    let mut seen = Vec::new();
    pump_until(&mut manager, &mut transport, &mut events, &mut seen, |m, _| {
        m.socket_state() == Some(SocketState::Open)
    })
    .await;

    manager.disconnect();
    pump_until(&mut manager, &mut transport, &mut events, &mut seen, |_, seen| {
        matches!(seen.last(), Some(ConnectionEvent::Closed(_)))
    })
    .await;

    assert_eq!(
        seen.last(),
        Some(&ConnectionEvent::Closed(CloseKind::Requested))
    );
    assert!(!manager.retry_pending());
    assert_eq!(manager.error_count(), 0);
    let server_saw = timeout(TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(server_saw, None);
}
