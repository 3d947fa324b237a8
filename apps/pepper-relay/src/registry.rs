use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use metrics::{counter, gauge};
use serde::Serialize;
use slab::Slab;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Every connected relay client, each with its own outbound queue.
///
/// Queues are unbounded: a slow client buffers frames instead of missing
/// them, and is only removed once its connection is gone.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    clients: Mutex<Clients>,
    totals: Totals,
}

#[derive(Default)]
struct Clients {
    slab: Slab<ClientEntry>,
    index_map: HashMap<Uuid, usize>,
}

struct ClientEntry {
    id: Uuid,
    sender: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct Totals {
    connections: AtomicU64,
    messages: AtomicU64,
    bytes: AtomicU64,
}

pub struct Registration {
    pub receiver: mpsc::UnboundedReceiver<Message>,
    pub active_clients: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastMetrics {
    pub delivered: usize,
    pub bytes: usize,
    pub closed: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelayStats {
    pub active_clients: usize,
    pub total_connections: u64,
    pub messages_forwarded: u64,
    pub bytes_forwarded: u64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, client_id: Uuid) -> Registration {
        let (sender, receiver) = mpsc::unbounded_channel();
        let active_clients = {
            let mut clients = self.inner.clients.lock().await;
            let key = clients.slab.insert(ClientEntry {
                id: client_id,
                sender,
            });
            clients.index_map.insert(client_id, key);
            clients.slab.len()
        };
        self.inner.totals.connections.fetch_add(1, Ordering::Relaxed);
        counter!("pepper_relay_connections_total", 1);
        gauge!("pepper_relay_connections_active", active_clients as f64);
        Registration {
            receiver,
            active_clients,
        }
    }

    /// Removes the client and returns how many remain.
    pub async fn unregister(&self, client_id: Uuid) -> usize {
        let active = {
            let mut clients = self.inner.clients.lock().await;
            if let Some(key) = clients.index_map.remove(&client_id) {
                clients.slab.remove(key);
            }
            clients.slab.len()
        };
        gauge!("pepper_relay_connections_active", active as f64);
        active
    }

    /// Queues `message` for every client except `source_id`.
    ///
    /// A client whose queue is closed is evicted.
    pub async fn broadcast(&self, source_id: Uuid, message: Message) -> BroadcastMetrics {
        let mut metrics = BroadcastMetrics::default();
        let targets: Vec<(Uuid, mpsc::UnboundedSender<Message>)> = {
            let clients = self.inner.clients.lock().await;
            clients
                .slab
                .iter()
                .filter(|(_, entry)| entry.id != source_id)
                .map(|(_, entry)| (entry.id, entry.sender.clone()))
                .collect()
        };

        let bytes = message_len(&message);
        for (client_id, sender) in targets {
            if sender.send(message.clone()).is_ok() {
                metrics.delivered += 1;
                metrics.bytes += bytes;
            } else {
                metrics.closed += 1;
                self.evict(client_id).await;
            }
        }

        self.record(&metrics);
        metrics
    }

    pub async fn active_clients(&self) -> usize {
        self.inner.clients.lock().await.slab.len()
    }

    pub async fn stats(&self) -> RelayStats {
        let totals = &self.inner.totals;
        RelayStats {
            active_clients: self.active_clients().await,
            total_connections: totals.connections.load(Ordering::Relaxed),
            messages_forwarded: totals.messages.load(Ordering::Relaxed),
            bytes_forwarded: totals.bytes.load(Ordering::Relaxed),
        }
    }

    async fn evict(&self, client_id: Uuid) {
        let active = self.unregister(client_id).await;
        counter!("pepper_relay_evictions_total", 1);
        debug!(client_id = %client_id, active, "evicted closed client");
    }

    fn record(&self, metrics: &BroadcastMetrics) {
        let totals = &self.inner.totals;
        if metrics.delivered > 0 {
            totals
                .messages
                .fetch_add(metrics.delivered as u64, Ordering::Relaxed);
            totals
                .bytes
                .fetch_add(metrics.bytes as u64, Ordering::Relaxed);
            counter!(
                "pepper_relay_messages_forwarded_total",
                metrics.delivered as u64
            );
            counter!("pepper_relay_bytes_forwarded_total", metrics.bytes as u64);
        }
    }
}

fn message_len(message: &Message) -> usize {
    match message {
        Message::Text(text) => text.len(),
        Message::Binary(bytes) => bytes.len(),
        _ => 0,
    }
}
