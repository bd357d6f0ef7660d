use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use crate::config::Config;
use crate::connection::{
    ConnectionEvent, ConnectionManager, Connector, SocketState, TransportEvent,
};
use crate::display::{DisplayCoordinator, OverlayView};
use crate::marquee::MarqueeController;
use crate::measure::TextMeasure;
use crate::media::MediaSessionTracker;
use crate::timer::earliest;
use crate::transport::WsConnector;

/// How long shutdown waits for the socket to finish closing
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Requests coming from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reconnect,
    /// New title container width in pixels
    Resize(u32),
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim().to_ascii_lowercase();
        let mut words = line.split_whitespace();
        let command = match (words.next()?, words.next()) {
            ("reconnect" | "r", None) => Command::Reconnect,
            ("quit" | "exit" | "q", None) => Command::Quit,
            ("width" | "w", Some(px)) => Command::Resize(px.parse().ok()?),
            _ => return None,
        };
        // Trailing words make the line ambiguous
        if words.next().is_some() {
            return None;
        }
        Some(command)
    }
}

enum Wake {
    Transport(Option<TransportEvent>),
    Command(Option<Command>),
    Timer,
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The overlay: one connection, one media tracker and one title marquee,
/// all driven from a single dispatch loop.
pub struct Overlay<C> {
    connection: ConnectionManager<C, UnboundedSender<ConnectionEvent>>,
    handlers: UnboundedSender<ConnectionEvent>,
    connection_events: UnboundedReceiver<ConnectionEvent>,
    transport_events: UnboundedReceiver<TransportEvent>,
    tracker: MediaSessionTracker,
    marquee: MarqueeController,
    display: DisplayCoordinator,
    measure: Box<dyn TextMeasure>,
    container_width: f32,
    measured_title: Option<String>,
    last_view: Option<OverlayView>,
}

impl Overlay<WsConnector> {
    pub fn with_websocket(config: &Config) -> Result<Self> {
        let measure = config
            .text_measure()
            .context("Failed to set up title measurement")?;
        let (transport_tx, transport_rx) = unbounded_channel();
        Ok(Overlay::new(
            WsConnector::new(transport_tx),
            config.endpoint(),
            transport_rx,
            measure,
            config.container_width,
        ))
    }
}

impl<C: Connector> Overlay<C> {
    pub fn new(
        connector: C,
        endpoint: String,
        transport_events: UnboundedReceiver<TransportEvent>,
        measure: Box<dyn TextMeasure>,
        container_width: f32,
    ) -> Self {
        let (handlers, connection_events) = unbounded_channel();
        Self {
            connection: ConnectionManager::new(connector, endpoint),
            handlers,
            connection_events,
            transport_events,
            tracker: MediaSessionTracker::new(),
            marquee: MarqueeController::new(),
            display: DisplayCoordinator::new(),
            measure,
            container_width,
            measured_title: None,
            last_view: None,
        }
    }

    pub fn connection(&self) -> &ConnectionManager<C, UnboundedSender<ConnectionEvent>> {
        &self.connection
    }

    pub fn tracker(&self) -> &MediaSessionTracker {
        &self.tracker
    }

    pub fn marquee(&self) -> &MarqueeController {
        &self.marquee
    }

    pub fn view(&self) -> OverlayView {
        self.display.view(self.tracker.current(), &self.marquee)
    }

    pub fn start(&mut self, now: Instant) {
        self.connection.connect(self.handlers.clone(), false);
        self.dispatch(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.connection.next_deadline(),
            self.tracker.next_deadline(),
            self.marquee.next_deadline(),
        ])
    }

    pub fn handle_transport(&mut self, event: TransportEvent, now: Instant) {
        self.connection.handle_event(event, now);
        self.dispatch(now);
    }

    pub fn handle_command(&mut self, command: Command, now: Instant) {
        match command {
            Command::Reconnect => {
                self.display
                    .reconnect(&mut self.connection, self.handlers.clone());
                self.dispatch(now);
            }
            Command::Resize(width) => self.resize(width as f32, now),
            Command::Quit => self.teardown(),
        }
    }

    /// Fire whatever timers are due
    pub fn poll(&mut self, now: Instant) {
        self.connection.poll(now);
        self.dispatch(now);
        if self.tracker.poll(now) {
            self.media_changed(now);
        }
        self.marquee.poll(now);
    }

    /// The title's container changed size
    pub fn resize(&mut self, container_width: f32, now: Instant) {
        self.container_width = container_width;
        self.measured_title = None;
        self.remeasure(now);
    }

    fn dispatch(&mut self, now: Instant) {
        while let Ok(event) = self.connection_events.try_recv() {
            self.display.apply(&event);
            if let ConnectionEvent::Message(payload) = &event {
                if self.tracker.on_message(payload, now) {
                    self.media_changed(now);
                }
            }
        }
    }

    fn media_changed(&mut self, now: Instant) {
        self.display.set_media(self.tracker.current());
        self.remeasure(now);
    }

    fn remeasure(&mut self, now: Instant) {
        let title = self.tracker.current().map(|info| info.title.clone());
        if title == self.measured_title {
            return;
        }
        let content_width = title
            .as_deref()
            .map(|t| self.measure.text_width(t))
            .unwrap_or(0.0);
        self.marquee.measure(self.container_width, content_width, now);
        self.measured_title = title;
    }

    /// Render the current view if it changed since the last render
    pub fn render(&mut self) -> bool {
        let view = self.view();
        if self.last_view.as_ref() == Some(&view) {
            return false;
        }
        log::info!("{}", view);
        self.last_view = Some(view);
        true
    }

    /// Stop timers and ask the socket to close
    pub fn teardown(&mut self) {
        self.tracker.teardown();
        self.marquee.teardown();
        self.connection.disconnect();
    }

    fn closing(&self) -> bool {
        self.connection.socket_state() == Some(SocketState::Closing)
    }

    /// Run until the user quits or the command channel closes
    pub async fn run(&mut self, mut commands: UnboundedReceiver<Command>) -> Result<()> {
        self.start(Instant::now());

        loop {
            self.render();

            // Sleep until a socket event, a user command or the earliest timer
            let deadline = self.next_deadline();
            let wake = tokio::select! {
                event = self.transport_events.recv() => Wake::Transport(event),
                command = commands.recv() => Wake::Command(command),
                _ = sleep_until(deadline) => Wake::Timer,
            };

            // All timers are judged against one instant per wake
            let now = Instant::now();
            match wake {
                Wake::Transport(Some(event)) => self.handle_transport(event, now),
                Wake::Transport(None) => anyhow::bail!("Transport event channel closed"),
                Wake::Command(Some(Command::Quit)) | Wake::Command(None) => break,
                Wake::Command(Some(command)) => self.handle_command(command, now),
                Wake::Timer => self.poll(now),
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        log::info!("Shutting down overlay");
        self.teardown();

        // Give the close handshake a bounded window; the socket task is
        // dropped with the runtime if it overruns
        let grace = tokio::time::sleep(SHUTDOWN_GRACE);
        tokio::pin!(grace);
        while self.closing() {
            tokio::select! {
                event = self.transport_events.recv() => match event {
                    Some(event) => self.handle_transport(event, Instant::now()),
                    None => break,
                },
                _ = &mut grace => {
                    log::warn!("Socket did not close within {}ms", SHUTDOWN_GRACE.as_millis());
                    break;
                }
            }
        }

        // Show the final closed state
        self.render();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::FakeConnector;
    use crate::connection::{TransportEventKind, RETRY_DELAY};
    use crate::marquee::IDLE_DELAY;
    use crate::measure::MonospaceMeasure;
    use crate::media::CLEAR_DELAY;
    use crate::types::{ConnectionState, ScrollState};

    fn overlay() -> (Overlay<FakeConnector>, UnboundedSender<TransportEvent>) {
        let (tx, rx) = unbounded_channel();
        let overlay = Overlay::new(
            FakeConnector::default(),
            "ws://test/media-info".to_string(),
            rx,
            Box::new(MonospaceMeasure { advance: 10.0 }),
            100.0,
        );
        (overlay, tx)
    }

    fn event(overlay: &Overlay<FakeConnector>, kind: TransportEventKind) -> TransportEvent {
        TransportEvent {
            socket: *overlay.connection().connector().opened.last().unwrap(),
            kind,
        }
    }

    fn feed(overlay: &mut Overlay<FakeConnector>, kind: TransportEventKind, now: Instant) {
        let event = event(overlay, kind);
        overlay.handle_transport(event, now);
    }

    #[test]
    fn command_parsing() {
        assert_eq!(Command::parse(" Reconnect\n"), Some(Command::Reconnect));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("dance"), None);
        assert_eq!(Command::parse("width 320"), Some(Command::Resize(320)));
        assert_eq!(Command::parse("W  80 "), Some(Command::Resize(80)));
        assert_eq!(Command::parse("width"), None);
        assert_eq!(Command::parse("width -5"), None);
        assert_eq!(Command::parse("width 10 20"), None);
        assert_eq!(Command::parse("quit now"), None);
    }

    #[test]
    fn media_flows_from_socket_to_view() {
        let now = Instant::now();
        let (mut overlay, _tx) = overlay();
        overlay.start(now);
        assert_eq!(overlay.view().status.caption, "trying to connect");

        feed(&mut overlay, TransportEventKind::Opened, now);
        feed(
            &mut overlay,
            TransportEventKind::Frame(r#"{"title":"Short","artist":"Band"}"#.into()),
            now,
        );

        let view = overlay.view();
        assert_eq!(view.status.caption, "open");
        let card = view.media.unwrap();
        assert_eq!(card.title, "Short");
        assert!(!overlay.marquee().is_overflow());
        assert!(overlay.render());
        assert!(!overlay.render());
    }

    #[test]
    fn long_title_scrolls_and_clear_is_debounced() {
        let start = Instant::now();
        let (mut overlay, _tx) = overlay();
        overlay.start(start);
        feed(&mut overlay, TransportEventKind::Opened, start);
        feed(
            &mut overlay,
            TransportEventKind::Frame(r#"{"title":"A title that is far too long"}"#.into()),
            start,
        );
        assert!(overlay.marquee().is_overflow());
        assert_eq!(overlay.next_deadline(), Some(start + IDLE_DELAY));

        let out_at = start + IDLE_DELAY;
        overlay.poll(out_at);
        assert_eq!(overlay.marquee().state(), ScrollState::MovingOut);

        feed(&mut overlay, TransportEventKind::Frame("{}".into()), out_at);
        assert!(overlay.view().media.is_some());

        overlay.poll(out_at + CLEAR_DELAY);
        assert!(overlay.view().media.is_none());
        assert_eq!(overlay.marquee().state(), ScrollState::Static);
        assert!(!overlay.marquee().is_overflow());
    }

    #[test]
    fn resize_remeasures_the_title() {
        let now = Instant::now();
        let (mut overlay, _tx) = overlay();
        overlay.start(now);
        feed(
            &mut overlay,
            TransportEventKind::Frame(r#"{"title":"Fifteen chars!!"}"#.into()),
            now,
        );
        assert!(overlay.marquee().is_overflow());

        overlay.resize(400.0, now);
        assert!(!overlay.marquee().is_overflow());
    }

    #[test]
    fn width_command_resizes_the_container() {
        let now = Instant::now();
        let (mut overlay, _tx) = overlay();
        overlay.start(now);
        feed(
            &mut overlay,
            TransportEventKind::Frame(r#"{"title":"Short"}"#.into()),
            now,
        );
        assert!(!overlay.marquee().is_overflow());

        overlay.handle_command(Command::Resize(20), now);
        assert!(overlay.marquee().is_overflow());
        assert_eq!(overlay.next_deadline(), Some(now + IDLE_DELAY));
    }

    #[test]
    fn artwork_follows_the_tracked_media() {
        let now = Instant::now();
        let (mut overlay, _tx) = overlay();
        overlay.start(now);
        feed(
            &mut overlay,
            TransportEventKind::Frame(r#"{"title":"Song","album_art_base64":"aGVsbG8="}"#.into()),
            now,
        );
        assert_eq!(overlay.view().media.unwrap().artwork_bytes, Some(5));

        feed(
            &mut overlay,
            TransportEventKind::Frame(r#"{"title":"Song"}"#.into()),
            now,
        );
        assert_eq!(overlay.view().media.unwrap().artwork_bytes, None);
    }

    #[test]
    fn exhausted_connection_offers_reconnect() {
        let mut now = Instant::now();
        let (mut overlay, _tx) = overlay();
        overlay.start(now);

        for _ in 0..3 {
            feed(
                &mut overlay,
                TransportEventKind::Error(crate::error::TransportError::Read("refused".into())),
                now,
            );
            feed(
                &mut overlay,
                TransportEventKind::Closed {
                    code: 1006,
                    reason: String::new(),
                },
                now,
            );
            now += RETRY_DELAY;
            overlay.poll(now);
        }

        let view = overlay.view();
        assert_eq!(view.status.caption, "closed");
        assert!(view.status.reconnect_offered);
        assert_eq!(overlay.connection().connector().opened, vec![1, 2, 3]);

        overlay.handle_command(Command::Reconnect, now);
        assert_eq!(overlay.connection().connector().opened, vec![1, 2, 3, 4]);
        assert_eq!(overlay.connection().error_count(), 0);
        assert_eq!(overlay.view().status.caption, "trying to connect");

        overlay.handle_command(Command::Reconnect, now);
        assert_eq!(overlay.connection().connector().opened.len(), 4);
    }

    #[test]
    fn teardown_silences_all_timers() {
        let start = Instant::now();
        let (mut overlay, _tx) = overlay();
        overlay.start(start);
        feed(&mut overlay, TransportEventKind::Opened, start);
        feed(
            &mut overlay,
            TransportEventKind::Frame(r#"{"title":"A title that is far too long"}"#.into()),
            start,
        );
        feed(&mut overlay, TransportEventKind::Frame("{}".into()), start);

        overlay.handle_command(Command::Quit, start);
        assert_eq!(overlay.connection().connector().closed, vec![1]);
        assert_eq!(overlay.next_deadline(), None);

        let before = overlay.view();
        overlay.poll(start + Duration::from_secs(60));
        assert_eq!(overlay.view(), before);
        assert!(overlay.view().media.is_some());

        feed(
            &mut overlay,
            TransportEventKind::Closed {
                code: 1000,
                reason: String::new(),
            },
            start,
        );
        assert_eq!(overlay.display.state(), ConnectionState::Closed);
        assert!(!overlay.connection().retry_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_retries_on_virtual_clock() {
        let (transport_tx, transport_rx) = unbounded_channel();
        let mut overlay = Overlay::new(
            FakeConnector::default(),
            "ws://test/media-info".to_string(),
            transport_rx,
            Box::new(MonospaceMeasure { advance: 10.0 }),
            100.0,
        );
        let (command_tx, command_rx) = unbounded_channel();

        let driver = tokio::spawn(async move {
            transport_tx
                .send(TransportEvent {
                    socket: 1,
                    kind: TransportEventKind::Closed {
                        code: 1006,
                        reason: String::new(),
                    },
                })
                .unwrap();
            tokio::time::sleep(RETRY_DELAY + Duration::from_millis(10)).await;
            transport_tx
                .send(TransportEvent {
                    socket: 2,
                    kind: TransportEventKind::Opened,
                })
                .unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            command_tx.send(Command::Quit).unwrap();
            transport_tx
        });

        overlay.run(command_rx).await.unwrap();
        driver.await.unwrap();

        assert_eq!(overlay.connection().connector().opened, vec![1, 2]);
        assert_eq!(overlay.connection().connector().closed, vec![2]);
        assert_eq!(overlay.display.state(), ConnectionState::Open);
    }
}
