//! Push connection client.
//!
//! One background task owns the socket. It reconnects after a fixed delay
//! until [`PushClient::disconnect`] is called or the client is dropped.

use futures_util::{SinkExt, StreamExt};
use opc_core::PushMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const EVENT_CHANNEL_CAPACITY: usize = 256;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub url: Url,
    pub reconnect: bool,
    pub reconnect_delay: Duration,
}

impl PushConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connected,
    Disconnected,
    Message(PushMessage),
    /// Raw transport error text.
    Error(String),
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    last_message: watch::Sender<Option<PushMessage>>,
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    events: mpsc::Sender<PushEvent>,
    reconnect: AtomicBool,
}

impl Shared {
    /// Never waits on the consumer; a full channel drops the event.
    fn emit(&self, event: PushEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(event = "push_event_dropped", dropped = ?event, "event channel full");
            }
            // A dropped receiver only means nobody is listening.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn set_outbound(&self, sender: Option<mpsc::Sender<Message>>) {
        let mut guard = self
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = sender;
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous == next {
            return;
        }
        let event = match next {
            ConnectionState::Connected => PushEvent::Connected,
            ConnectionState::Disconnected => PushEvent::Disconnected,
        };
        self.emit(event);
    }

    fn handle_text(&self, text: &str) {
        match PushMessage::parse(text) {
            Ok(message) => {
                debug!(event = "push_message", kind = %message.kind());
                self.last_message.send_replace(Some(message.clone()));
                self.emit(PushEvent::Message(message));
            }
            Err(err) => {
                warn!(event = "push_frame_dropped", error = %err, "dropping unparseable push frame");
            }
        }
    }
}

struct ConnectionTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct PushClient {
    config: PushConfig,
    shared: Arc<Shared>,
    task: Option<ConnectionTask>,
}

impl PushClient {
    /// Builds an idle client. Events arrive on the returned receiver once
    /// [`connect`](Self::connect) is called.
    pub fn new(config: PushConfig) -> (Self, mpsc::Receiver<PushEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (last_message, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            state,
            last_message,
            outbound: Mutex::new(None),
            events,
            reconnect: AtomicBool::new(config.reconnect),
        });
        (
            Self {
                config,
                shared,
                task: None,
            },
            rx,
        )
    }

    pub fn url(&self) -> &Url {
        &self.config.url
    }

    /// Starts the connection task. Must be called inside a tokio runtime.
    /// Does nothing while a connection or reconnect loop is already live.
    pub fn connect(&mut self) {
        if let Some(task) = &self.task {
            if !task.handle.is_finished() {
                debug!(event = "push_connect_skipped", url = %self.config.url);
                return;
            }
        }
        self.shared
            .reconnect
            .store(self.config.reconnect, Ordering::SeqCst);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_connection(
            self.config.url.clone(),
            self.config.reconnect_delay,
            Arc::clone(&self.shared),
            shutdown_rx,
        ));
        self.task = Some(ConnectionTask { shutdown, handle });
    }

    /// Stops reconnecting, closes the socket and waits for the task to exit.
    pub async fn disconnect(&mut self) {
        self.shared.reconnect.store(false, Ordering::SeqCst);
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = task.shutdown.send(true);
        if let Err(err) = task.handle.await {
            if !err.is_cancelled() {
                warn!(event = "push_task_failed", error = %err);
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn last_message(&self) -> Option<PushMessage> {
        self.shared.last_message.borrow().clone()
    }

    pub fn watch_last_message(&self) -> watch::Receiver<Option<PushMessage>> {
        self.shared.last_message.subscribe()
    }

    /// Hands `message` to the open socket. Nothing is queued while disconnected.
    pub fn send_message(&self, message: &PushMessage) -> bool {
        if !self.is_connected() {
            warn!(event = "push_send_dropped", kind = %message.kind(), "not connected");
            return false;
        }
        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                warn!(event = "push_send_dropped", kind = %message.kind(), error = %err);
                return false;
            }
        };
        let guard = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(sender) => match sender.try_send(Message::Text(text)) {
                Ok(()) => true,
                Err(err) => {
                    warn!(event = "push_send_dropped", kind = %message.kind(), error = %err);
                    false
                }
            },
            None => false,
        }
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.shutdown.send(true);
        }
    }
}

async fn run_connection(
    url: Url,
    delay: Duration,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let attempt = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = shutdown.changed() => break,
        };
        match attempt {
            Ok((socket, _)) => {
                info!(event = "push_connected", url = %url);
                let stopped = pump(socket, &shared, &mut shutdown).await;
                info!(event = "push_disconnected", url = %url);
                if stopped {
                    break;
                }
            }
            Err(err) => {
                warn!(event = "push_connect_error", url = %url, error = %err);
                shared.emit(PushEvent::Error(err.to_string()));
            }
        }
        if !shared.reconnect.load(Ordering::SeqCst) {
            break;
        }
        debug!(event = "push_reconnect_scheduled", delay_ms = delay.as_millis() as u64);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    shared.set_outbound(None);
    shared.set_state(ConnectionState::Disconnected);
}

/// Runs one open connection. Returns true when it ended because of shutdown.
async fn pump(socket: Socket, shared: &Shared, shutdown: &mut watch::Receiver<bool>) -> bool {
    let (mut sink, mut source) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_CAPACITY);
    shared.set_outbound(Some(out_tx));
    shared.set_state(ConnectionState::Connected);

    let mut stopped = false;
    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.handle_text(&text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(event = "push_read_error", error = %err);
                    shared.emit(PushEvent::Error(err.to_string()));
                    break;
                }
            },
            Some(outbound) = out_rx.recv() => {
                if let Err(err) = sink.send(outbound).await {
                    warn!(event = "push_write_error", error = %err);
                    shared.emit(PushEvent::Error(err.to_string()));
                    break;
                }
            }
            _ = shutdown.changed() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await;
                stopped = true;
                break;
            }
        }
    }

    shared.set_outbound(None);
    shared.set_state(ConnectionState::Disconnected);
    stopped
}
