//! Broker core: shared subscription state, WebSocket handler, and fan-out.
//!
//! Each connection gets a numeric id and an outbound channel drained by a
//! writer task. Subscriptions map a topic to the set of connections that
//! receive its publishes. A publish is delivered at most once to every
//! connection subscribed at that moment, the publisher included. Nothing is
//! queued for peers that are not connected.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use huddle_proto::broker::{self, BrokerFrame};
use tokio::sync::{RwLock, mpsc};

/// Default maximum allowed payload size in bytes (64 KB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Identifier the broker assigns to each accepted WebSocket.
pub type ConnectionId = u64;

type Subscribers = HashMap<ConnectionId, mpsc::UnboundedSender<Message>>;

/// Shared broker state holding topic subscriptions.
pub struct BrokerState {
    /// Maps a topic to the connections subscribed to it.
    topics: RwLock<HashMap<String, Subscribers>>,
    /// Source of connection ids.
    next_connection: AtomicU64,
    /// Maximum allowed payload size in bytes.
    max_payload_size: usize,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerState {
    /// Creates a broker state with no subscriptions and the default payload limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_payload_size(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Creates a broker state with a custom payload size limit.
    #[must_use]
    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
            max_payload_size,
        }
    }

    /// Allocates a fresh connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds `connection` to the subscribers of `topic`.
    ///
    /// Subscribing twice replaces the stored sender; the connection still
    /// receives each publish once.
    pub async fn subscribe(
        &self,
        topic: &str,
        connection: ConnectionId,
        sender: mpsc::UnboundedSender<Message>,
    ) {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_default()
            .insert(connection, sender);
    }

    /// Removes `connection` from `topic`, returning whether it was subscribed.
    pub async fn unsubscribe(&self, topic: &str, connection: ConnectionId) -> bool {
        let mut topics = self.topics.write().await;
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        let removed = subscribers.remove(&connection).is_some();
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Removes `connection` from every topic, returning how many it left.
    pub async fn remove_connection(&self, connection: ConnectionId) -> usize {
        let mut topics = self.topics.write().await;
        let mut left = 0;
        topics.retain(|_, subscribers| {
            if subscribers.remove(&connection).is_some() {
                left += 1;
            }
            !subscribers.is_empty()
        });
        left
    }

    /// Number of connections currently subscribed to `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics.get(topic).map_or(0, HashMap::len)
    }

    /// Delivers `payload` to every subscriber of `topic`.
    ///
    /// Returns the number of connections the frame was handed to.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> usize {
        let frame = BrokerFrame::Deliver {
            topic: topic.to_string(),
            payload,
        };
        let bytes = match broker::encode(&frame) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "failed to encode delivery");
                return 0;
            }
        };
        let message = Message::Binary(bytes.into());

        let topics = self.topics.read().await;
        let Some(subscribers) = topics.get(topic) else {
            return 0;
        };
        subscribers
            .values()
            .filter(|sender| sender.send(message.clone()).is_ok())
            .count()
    }

    /// Queue one WebSocket Close frame per subscribed connection.
    ///
    /// Used on shutdown. Returns how many connections were asked to close.
    pub async fn close_all_connections(&self) -> usize {
        let topics = self.topics.read().await;
        let mut closed = HashSet::new();
        for subscribers in topics.values() {
            for (connection, sender) in subscribers {
                if closed.insert(*connection) && sender.send(Message::Close(None)).is_err() {
                    tracing::debug!(connection, "connection already gone");
                }
            }
        }
        closed.len()
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Allocate a connection id and spawn the writer task.
/// 2. Process `Subscribe`, `Unsubscribe`, and `Publish` frames.
/// 3. On disconnect, drop the connection from every topic.
pub async fn handle_socket(socket: WebSocket, state: Arc<BrokerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let connection = state.next_connection_id();
    tracing::info!(connection, "client connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(connection, &data, &tx, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(connection, "received close frame");
                    break;
                }
                _ => {
                    // Ping/pong are answered by axum; text frames are ignored.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let left = state.remove_connection(connection).await;
    tracing::info!(connection, topics = left, "client disconnected");
}

/// Handles a binary WebSocket message from a connection.
async fn handle_binary_message(
    connection: ConnectionId,
    data: &[u8],
    reply: &mpsc::UnboundedSender<Message>,
    state: &Arc<BrokerState>,
) {
    let frame = match broker::decode(data) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(connection, error = %e, "failed to decode frame");
            return;
        }
    };

    match frame {
        BrokerFrame::Subscribe { topic } => {
            if topic.is_empty() {
                send_frame(
                    reply,
                    &BrokerFrame::Error {
                        reason: "topic must not be empty".to_string(),
                    },
                );
                return;
            }
            state.subscribe(&topic, connection, reply.clone()).await;
            tracing::info!(connection, topic = %topic, "subscribed");
            send_frame(reply, &BrokerFrame::Subscribed { topic });
        }
        BrokerFrame::Unsubscribe { topic } => {
            let removed = state.unsubscribe(&topic, connection).await;
            tracing::info!(connection, topic = %topic, removed, "unsubscribed");
        }
        BrokerFrame::Publish { topic, payload } => {
            if payload.len() > state.max_payload_size {
                tracing::warn!(
                    connection,
                    size = payload.len(),
                    max = state.max_payload_size,
                    "payload exceeds size limit"
                );
                send_frame(
                    reply,
                    &BrokerFrame::Error {
                        reason: format!(
                            "payload too large: {} bytes (max {})",
                            payload.len(),
                            state.max_payload_size
                        ),
                    },
                );
                return;
            }
            let payload_len = payload.len();
            let delivered = state.publish(&topic, payload).await;
            tracing::debug!(
                connection,
                topic = %topic,
                payload_len,
                delivered,
                "fanned out publish"
            );
        }
        other => {
            tracing::warn!(connection, frame = ?other, "unexpected frame from client");
        }
    }
}

/// Encodes and queues a frame on a connection's outbound channel.
fn send_frame(sender: &mpsc::UnboundedSender<Message>, frame: &BrokerFrame) {
    match broker::encode(frame) {
        Ok(bytes) => {
            let _ = sender.send(Message::Binary(bytes.into()));
        }
        Err(e) => tracing::error!(error = %e, "failed to encode frame"),
    }
}

/// Starts the broker on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(BrokerState::new())).await
}

/// Starts the broker with a pre-configured [`BrokerState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<BrokerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "broker server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<BrokerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
