use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pepper_core::parse_frame;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{TransportError, TransportEvent};

/// Delay between a lost connection and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

const RECEIVED_PREVIEW_CHARS: usize = 80;

type Sink = Arc<dyn Fn(TransportEvent) + Send + Sync>;
type Outbound = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Reconnecting WebSocket client for the cue relay.
///
/// Frames are parsed into [`TransportEvent::Inbound`] and connection changes
/// are reported as [`TransportEvent::Status`]. Once [`RelayClient::disconnect`]
/// is called nothing more is delivered, even from a connect attempt that was
/// already in flight. A later [`RelayClient::connect`] starts a fresh loop.
pub struct RelayClient {
    url: String,
    reconnect_delay: Duration,
    session: Mutex<Option<Session>>,
}

/// One `connect()` worth of state; replaced wholesale on reconnect.
struct Session {
    stop_tx: watch::Sender<bool>,
    outbound: Outbound,
    task: JoinHandle<()>,
}

enum SessionEnd {
    Stopped,
    Closed,
    Failed(String),
}

impl RelayClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: RECONNECT_DELAY,
            session: Mutex::new(None),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| session.outbound.lock().is_some())
    }

    /// Starts the connection loop. Does nothing while a loop is already running.
    pub fn connect<F>(&self, sink: F)
    where
        F: Fn(TransportEvent) + Send + Sync + 'static,
    {
        let mut session = self.session.lock();
        if session
            .as_ref()
            .is_some_and(|current| !current.task.is_finished())
        {
            debug!(url = %self.url, "relay client already running");
            return;
        }

        let (stop_tx, stop) = watch::channel(false);
        let outbound: Outbound = Arc::new(Mutex::new(None));
        let sink: Sink = Arc::new(sink);
        sink(TransportEvent::Status(format!("Connecting to {}...", self.url)));

        let task = tokio::spawn(run(
            self.url.clone(),
            self.reconnect_delay,
            stop,
            Arc::clone(&outbound),
            sink,
        ));
        *session = Some(Session {
            stop_tx,
            outbound,
            task,
        });
    }

    /// Stops reconnecting and closes the socket if one is open.
    ///
    /// The old loop winds down on its own; it can no longer deliver events
    /// or touch a session started by a later `connect()`.
    pub fn disconnect(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        session.stop_tx.send_replace(true);
        session.outbound.lock().take();
        info!(url = %self.url, "relay client disconnected");
    }

    /// Queues a raw text frame on the open connection.
    pub fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        let session = self.session.lock();
        let outbound = session
            .as_ref()
            .ok_or(TransportError::NotConnected)?
            .outbound
            .lock();
        let sender = outbound.as_ref().ok_or(TransportError::NotConnected)?;
        sender
            .send(text.into())
            .map_err(|_| TransportError::ChannelClosed)
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.lock().take() {
            session.stop_tx.send_replace(true);
            session.task.abort();
        }
    }
}

async fn run(
    url: String,
    delay: Duration,
    mut stop: watch::Receiver<bool>,
    outbound: Outbound,
    sink: Sink,
) {
    loop {
        let attempt = tokio::select! {
            biased;
            _ = stop.changed() => break,
            result = connect_async(url.as_str()) => result,
        };

        match attempt {
            Ok((stream, _)) => {
                if stopped(&stop) {
                    debug!(url = %url, "connect completed after disconnect, dropping");
                    break;
                }
                info!(url = %url, "relay connected");
                match pump(&url, stream, &mut stop, &outbound, &sink).await {
                    SessionEnd::Stopped => break,
                    SessionEnd::Closed => {
                        info!(url = %url, "relay connection closed");
                    }
                    SessionEnd::Failed(err) => {
                        warn!(url = %url, error = %err, "relay connection error");
                        emit(&stop, &sink, TransportEvent::Status("Connection error".into()));
                    }
                }
                emit(&stop, &sink, TransportEvent::Status("Disconnected".into()));
            }
            Err(err) => {
                warn!(url = %url, error = %err, "relay connect failed");
                emit(
                    &stop,
                    &sink,
                    TransportEvent::Status(format!("Connection failed: {err}")),
                );
            }
        }

        if stopped(&stop) {
            break;
        }
        emit(
            &stop,
            &sink,
            TransportEvent::Status(format!("Reconnecting in {}s...", delay.as_secs())),
        );
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        if stopped(&stop) {
            break;
        }
        emit(
            &stop,
            &sink,
            TransportEvent::Status(format!("Reconnecting to {url}...")),
        );
    }
    outbound.lock().take();
    debug!(url = %url, "relay loop finished");
}

async fn pump(
    url: &str,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    stop: &mut watch::Receiver<bool>,
    outbound: &Outbound,
    sink: &Sink,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    *outbound.lock() = Some(out_tx);
    emit(stop, sink, TransportEvent::Status(format!("Connected to {url}")));

    let end = loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break SessionEnd::Stopped;
                }
            }
            Some(text) = out_rx.recv() => {
                if let Err(err) = ws_tx.send(Message::Text(text)).await {
                    break SessionEnd::Failed(err.to_string());
                }
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => deliver(stop, sink, &text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => deliver(stop, sink, &text),
                    Err(_) => debug!("ignoring non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => break SessionEnd::Closed,
                Some(Ok(_)) => {}
                Some(Err(err)) => break SessionEnd::Failed(err.to_string()),
            },
        }
    };

    outbound.lock().take();
    end
}

fn deliver(stop: &watch::Receiver<bool>, sink: &Sink, text: &str) {
    match parse_frame(text) {
        Ok(event) => {
            let preview: String = text.chars().take(RECEIVED_PREVIEW_CHARS).collect();
            emit(stop, sink, TransportEvent::Status(format!("Received: {preview}")));
            emit(stop, sink, TransportEvent::Inbound(event));
        }
        Err(err) => {
            warn!(error = %err, frame = %text, "dropping relay frame");
            emit(stop, sink, TransportEvent::Status(format!("Ignored frame: {err}")));
        }
    }
}

fn stopped(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

fn emit(stop: &watch::Receiver<bool>, sink: &Sink, event: TransportEvent) {
    if stopped(stop) {
        return;
    }
    sink(event);
}
