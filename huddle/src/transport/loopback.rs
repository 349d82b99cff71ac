//! Loopback transport for testing.
//!
//! A [`LoopbackBus`] stands in for the broker: every [`LoopbackTransport`]
//! attached to it and subscribed to a topic receives each payload published
//! on that topic, including its own publishes. Delivery uses in-process
//! [`tokio::sync::mpsc`] channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{BroadcastTransport, Connector, TransportError, TransportType};

struct Subscriber {
    id: u64,
    topic: String,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct BusInner {
    subscribers: Vec<Subscriber>,
    next_id: u64,
    refusing: bool,
}

/// In-process broadcast bus shared by loopback transports.
///
/// Cloning the bus yields another handle to the same subscriber set.
#[derive(Clone, Default)]
pub struct LoopbackBus {
    inner: Arc<Mutex<BusInner>>,
}

impl LoopbackBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new transport subscribed to `topic`.
    #[must_use]
    pub fn attach(&self, topic: &str) -> LoopbackTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.subscribers.push(Subscriber {
                id,
                topic: topic.to_string(),
                tx,
            });
            id
        };

        LoopbackTransport {
            id,
            bus: Arc::clone(&self.inner),
            rx: tokio::sync::Mutex::new(rx),
            connected: AtomicBool::new(true),
        }
    }

    /// Make subsequent [`Connector::connect`] calls fail (or succeed again).
    pub fn set_refusing(&self, refusing: bool) {
        self.inner.lock().refusing = refusing;
    }

    /// Number of transports currently attached to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Publish from outside any session, as a foreign or misbehaving peer would.
    pub fn inject(&self, topic: &str, payload: &str) {
        fan_out(&self.inner, topic, payload);
    }
}

impl Connector for LoopbackBus {
    type Transport = LoopbackTransport;

    async fn connect(&self, topic: &str) -> Result<LoopbackTransport, TransportError> {
        if self.inner.lock().refusing {
            return Err(TransportError::Unreachable("loopback bus".to_string()));
        }
        Ok(self.attach(topic))
    }
}

fn fan_out(bus: &Mutex<BusInner>, topic: &str, payload: &str) -> usize {
    let inner = bus.lock();
    inner
        .subscribers
        .iter()
        .filter(|s| s.topic == topic)
        .filter(|s| s.tx.send(payload.to_string()).is_ok())
        .count()
}

/// One peer's endpoint on a [`LoopbackBus`].
pub struct LoopbackTransport {
    id: u64,
    bus: Arc<Mutex<BusInner>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    connected: AtomicBool,
}

impl BroadcastTransport for LoopbackTransport {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }
        let delivered = fan_out(&self.bus, topic, payload);
        tracing::trace!(topic, delivered, "loopback publish");
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        // Dropping our sender closes the receiver once it is drained.
        self.bus.lock().subscribers.retain(|s| s.id != self.id);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Loopback
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.bus.lock().subscribers.retain(|s| s.id != self.id);
    }
}
