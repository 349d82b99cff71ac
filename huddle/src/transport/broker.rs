//! WebSocket transport to a `huddle-broker`.
//!
//! Implements [`BroadcastTransport`] over one WebSocket connection. The
//! connect step subscribes to the session topic and waits for the broker's
//! acknowledgment before handing the transport to the caller, so a peer
//! never publishes its JOIN before it can hear the replies.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use huddle_proto::broker::{self, BrokerFrame};
use huddle_proto::codec;

use super::{BroadcastTransport, Connector, TransportError, TransportType};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Capacity of the channel between the reader task and [`BrokerTransport::recv`].
const INCOMING_BUFFER: usize = 256;

/// Connection parameters for a [`BrokerTransport`].
#[derive(Debug, Clone)]
pub struct BrokerConnector {
    /// Broker WebSocket URL (ws:// or wss://).
    pub url: String,
    /// Interval between WebSocket pings while connected.
    pub keepalive: Duration,
    /// How long to wait for the broker to confirm the subscription.
    pub subscribe_timeout: Duration,
}

impl BrokerConnector {
    /// Creates a connector with the given URL and timings.
    #[must_use]
    pub fn new(url: impl Into<String>, keepalive: Duration, subscribe_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            keepalive,
            subscribe_timeout,
        }
    }
}

impl Connector for BrokerConnector {
    type Transport = BrokerTransport;

    async fn connect(&self, topic: &str) -> Result<BrokerTransport, TransportError> {
        BrokerTransport::connect(&self.url, topic, self.keepalive, self.subscribe_timeout).await
    }
}

/// WebSocket broker transport implementing [`BroadcastTransport`].
///
/// Created via [`BrokerTransport::connect`], which opens the socket,
/// subscribes to the topic, and spawns a background reader task and a
/// keepalive task.
pub struct BrokerTransport {
    /// The broker URL this transport is connected to.
    url: String,
    /// Write half of the WebSocket connection (shared with the keepalive task).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Payloads received by the background reader task.
    incoming: Mutex<mpsc::Receiver<String>>,
    /// Whether the WebSocket connection is active.
    connected: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
    keepalive_handle: tokio::task::JoinHandle<()>,
}

impl BrokerTransport {
    /// Connect to a broker and subscribe to `topic`.
    ///
    /// The caller is expected to bound the whole call with its own connect
    /// timeout; only the subscription acknowledgment has a timeout here.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Unreachable`] if the broker cannot be reached.
    /// - [`TransportError::Timeout`] if the subscription is not confirmed in time.
    /// - [`TransportError::Rejected`] if the broker answers with an error.
    /// - [`TransportError::ConnectionClosed`] if the socket closes during the handshake.
    pub async fn connect(
        url: &str,
        topic: &str,
        keepalive: Duration,
        subscribe_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let (ws_stream, _response) = connect_async(url).await.map_err(|e| {
            tracing::warn!(url, err = %e, "broker WebSocket connect failed");
            map_ws_connect_error(url, e)
        })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let subscribe = BrokerFrame::Subscribe {
            topic: topic.to_string(),
        };
        let bytes =
            broker::encode(&subscribe).map_err(|e| TransportError::Io(std::io::Error::other(e)))?;
        ws_sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "failed to send Subscribe");
                TransportError::ConnectionClosed
            })?;

        wait_for_subscribed(&mut ws_reader, topic, subscribe_timeout).await?;
        tracing::info!(url, topic, "subscribed on broker");

        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));
        let ws_sender = Arc::new(Mutex::new(ws_sender));

        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, Arc::clone(&connected)));
        let keepalive_handle = tokio::spawn(keepalive_loop(
            Arc::clone(&ws_sender),
            Arc::clone(&connected),
            keepalive,
        ));

        Ok(Self {
            url: url.to_string(),
            ws_sender,
            incoming: Mutex::new(rx),
            connected,
            reader_handle,
            keepalive_handle,
        })
    }

    /// Return the broker URL this transport is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl BroadcastTransport for BrokerTransport {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }

        let frame = BrokerFrame::Publish {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        };
        let bytes =
            broker::encode(&frame).map_err(|e| TransportError::Io(std::io::Error::other(e)))?;

        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "broker publish failed");
                self.connected.store(false, Ordering::Relaxed);
                TransportError::ConnectionClosed
            })
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::Relaxed) {
            return;
        }
        self.keepalive_handle.abort();
        {
            let mut sender = self.ws_sender.lock().await;
            if let Err(e) = sender.send(Message::Close(None)).await {
                tracing::debug!(err = %e, "close frame not sent");
            }
        }
        self.reader_handle.abort();
        tracing::info!(url = %self.url, "disconnected from broker");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Broker
    }
}

impl Drop for BrokerTransport {
    fn drop(&mut self) {
        self.keepalive_handle.abort();
        self.reader_handle.abort();
    }
}

/// Wait for the broker to confirm the subscription, skipping control frames.
async fn wait_for_subscribed(
    ws_reader: &mut WsReader,
    topic: &str,
    subscribe_timeout: Duration,
) -> Result<(), TransportError> {
    let handshake = async {
        while let Some(msg) = ws_reader.next().await {
            match msg {
                Ok(Message::Binary(data)) => match broker::decode(&data) {
                    Ok(BrokerFrame::Subscribed { topic: confirmed }) if confirmed == topic => {
                        return Ok(());
                    }
                    Ok(BrokerFrame::Error { reason }) => {
                        tracing::warn!(reason = %reason, "broker rejected subscription");
                        return Err(TransportError::Rejected(reason));
                    }
                    Ok(other) => {
                        tracing::debug!(?other, "ignoring frame during subscription");
                    }
                    Err(e) => {
                        return Err(TransportError::Rejected(format!(
                            "malformed subscription response: {e}"
                        )));
                    }
                },
                Ok(Message::Close(_)) => return Err(TransportError::ConnectionClosed),
                Ok(_) => {}
                Err(e) => {
                    return Err(TransportError::Io(std::io::Error::other(format!(
                        "WebSocket error during subscription: {e}"
                    ))));
                }
            }
        }
        Err(TransportError::ConnectionClosed)
    };

    tokio::time::timeout(subscribe_timeout, handshake)
        .await
        .map_err(|_| {
            tracing::warn!(topic, "subscription acknowledgment timed out");
            TransportError::Timeout
        })?
}

/// Background task that reads WebSocket frames and forwards deliveries.
///
/// Malformed frames are logged and skipped; the task only exits when the
/// socket closes or errors, or the transport is dropped.
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<String>, connected: Arc<AtomicBool>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match broker::decode(&data) {
                Ok(BrokerFrame::Deliver { payload, .. }) => {
                    if tx.send(codec::payload_text(&payload)).await.is_err() {
                        break;
                    }
                }
                Ok(BrokerFrame::Error { reason }) => {
                    tracing::warn!(reason = %reason, "broker error");
                }
                Ok(other) => {
                    tracing::debug!(?other, "unexpected broker frame");
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed broker frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("broker closed the WebSocket");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "broker WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("broker reader task exiting");
}

/// Background task that pings the broker every `interval`.
async fn keepalive_loop(sender: Arc<Mutex<WsSender>>, connected: Arc<AtomicBool>, interval: Duration) {
    if interval.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if !connected.load(Ordering::Relaxed) {
            break;
        }
        let mut ws = sender.lock().await;
        if let Err(e) = ws.send(Message::Ping(Vec::new().into())).await {
            tracing::warn!(err = %e, "keepalive ping failed");
            connected.store(false, Ordering::Relaxed);
            break;
        }
    }
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(url: &str, err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Unreachable(url.to_string())
            } else {
                TransportError::Io(io_err)
            }
        }
        WsError::Http(response) => TransportError::Rejected(format!(
            "broker HTTP error: status {}",
            response.status()
        )),
        WsError::Url(e) => TransportError::Unreachable(format!("{url} ({e})")),
        other => TransportError::Io(std::io::Error::other(format!(
            "broker connection error: {other}"
        ))),
    }
}
