use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pepper_core::{DeviceEvent, DeviceStatus, RegionPatch, RemoteContainerSpec};
use serde_json::{Value, json};
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{GatewayError, SurfaceGateway};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

const METHOD_CREATE: &str = "createStartUpPageContainer";
const METHOD_REBUILD: &str = "rebuildPageContainer";
const METHOD_UPGRADE: &str = "textContainerUpgrade";
const METHOD_SHUTDOWN: &str = "shutDownPageContainer";
const METHOD_DEVICE_INFO: &str = "getDeviceInfo";

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, GatewayError>>>>>;

/// Gateway speaking JSON-RPC over WebSocket to the vendor bridge host.
///
/// Calls are `{"type":"call_even_app_method","id","method","data"}` and are
/// answered by a frame carrying the same `id`. The bridge also pushes
/// `device_status` and `even_hub_event` frames at any time.
pub struct BridgeGateway {
    url: String,
    call_timeout: Duration,
    next_id: AtomicU64,
    pending: Pending,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    connect_lock: AsyncMutex<()>,
    status_tx: broadcast::Sender<DeviceStatus>,
    events_tx: broadcast::Sender<DeviceEvent>,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeGateway {
    pub fn new(url: impl Into<String>) -> Self {
        let (status_tx, _) = broadcast::channel(16);
        let (events_tx, _) = broadcast::channel(64);
        Self {
            url: url.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            outbound: Arc::new(Mutex::new(None)),
            connect_lock: AsyncMutex::new(()),
            status_tx,
            events_tx,
            io_task: Mutex::new(None),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn is_connected(&self) -> bool {
        self.outbound.lock().is_some()
    }

    async fn open(&self) -> Result<(), GatewayError> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let (stream, _) = tokio::time::timeout(self.call_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| GatewayError::Timeout {
                method: "connect",
                timeout_ms: self.call_timeout.as_millis() as u64,
            })?
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        info!(url = %self.url, "bridge connected");

        let (mut ws_tx, mut ws_rx) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound.lock() = Some(out_tx);

        let pending = Arc::clone(&self.pending);
        let outbound = Arc::clone(&self.outbound);
        let status_tx = self.status_tx.clone();
        let events_tx = self.events_tx.clone();
        let url = self.url.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(message) = out_rx.recv() => {
                        if let Err(err) = ws_tx.send(message).await {
                            warn!(error = %err, "bridge send failed");
                            break;
                        }
                    }
                    frame = ws_rx.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            route_frame(&text, &pending, &status_tx, &events_tx);
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(error = %err, "bridge receive failed");
                            break;
                        }
                    },
                }
            }
            outbound.lock().take();
            for (_, waiter) in pending.lock().drain() {
                let _ = waiter.send(Err(GatewayError::Closed));
            }
            info!(url = %url, "bridge connection closed");
        });
        if let Some(previous) = self.io_task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Sends one call, redialling first if the bridge connection was lost.
    async fn call(&self, method: &'static str, data: Value) -> Result<Value, GatewayError> {
        if !self.is_connected() {
            debug!(url = %self.url, method, "bridge not connected, redialling");
            self.open().await?;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = json!({
            "type": "call_even_app_method",
            "id": id,
            "method": method,
            "data": data,
        });
        let sent = self
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|out| out.send(Message::Text(frame.to_string())).is_ok());
        if !sent {
            self.pending.lock().remove(&id);
            return Err(GatewayError::NotConnected);
        }
        debug!(id, method, "bridge call sent");

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result.map_err(|err| match err {
                GatewayError::Remote { message, .. } => GatewayError::Remote { method, message },
                other => other,
            }),
            Ok(Err(_)) => Err(GatewayError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(GatewayError::Timeout {
                    method,
                    timeout_ms: self.call_timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for BridgeGateway {
    fn drop(&mut self) {
        if let Some(task) = self.io_task.lock().take() {
            task.abort();
        }
    }
}

fn route_frame(
    text: &str,
    pending: &Pending,
    status_tx: &broadcast::Sender<DeviceStatus>,
    events_tx: &broadcast::Sender<DeviceEvent>,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "invalid bridge frame");
            return;
        }
    };
    let data = value.get("data").unwrap_or(&value);

    match value.get("type").and_then(Value::as_str) {
        Some("device_status") => match DeviceStatus::from_json(data) {
            Some(status) => {
                let _ = status_tx.send(status);
            }
            None => debug!("unparseable device status"),
        },
        Some("even_hub_event") => match DeviceEvent::from_json(data) {
            Some(event) => {
                let _ = events_tx.send(event);
            }
            None => debug!(frame = %text, "hub event without list/text/sys payload"),
        },
        _ => {
            let Some(id) = value.get("id").and_then(Value::as_u64) else {
                debug!(frame = %text, "ignoring bridge frame");
                return;
            };
            let Some(waiter) = pending.lock().remove(&id) else {
                debug!(id, "response for unknown call");
                return;
            };
            let result = match value.get("error").filter(|err| !err.is_null()) {
                Some(err) => Err(GatewayError::Remote {
                    method: "call",
                    message: err
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| err.to_string()),
                }),
                None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
            };
            let _ = waiter.send(result);
        }
    }
}

#[async_trait]
impl SurfaceGateway for BridgeGateway {
    async fn ensure_ready(&self) -> Result<(), GatewayError> {
        self.open().await?;
        let info = self.call(METHOD_DEVICE_INFO, Value::Null).await?;
        if let Some(status) = info.get("status").and_then(DeviceStatus::from_json) {
            info!(sn = %status.sn, connect = ?status.connect_type, "glasses found");
            let _ = self.status_tx.send(status);
        }
        Ok(())
    }

    async fn initialize_surface(
        &self,
        spec: &RemoteContainerSpec,
    ) -> Result<Option<i64>, GatewayError> {
        let result = self.call(METHOD_CREATE, spec.to_payload()).await?;
        Ok(result.as_i64())
    }

    async fn rebuild_surface(&self, spec: &RemoteContainerSpec) -> Result<bool, GatewayError> {
        let result = self.call(METHOD_REBUILD, spec.to_payload()).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn patch_region(&self, patch: &RegionPatch) -> Result<bool, GatewayError> {
        let data = serde_json::to_value(patch)
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let result = self.call(METHOD_UPGRADE, data).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn teardown_surface(&self, exit_mode: i32) -> Result<bool, GatewayError> {
        let result = self
            .call(METHOD_SHUTDOWN, json!({ "exitMode": exit_mode }))
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    fn subscribe_device_status(&self) -> broadcast::Receiver<DeviceStatus> {
        self.status_tx.subscribe()
    }

    fn subscribe_device_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events_tx.subscribe()
    }
}
