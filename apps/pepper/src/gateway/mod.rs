use std::sync::Arc;

use async_trait::async_trait;
use pepper_core::{DeviceEvent, DeviceStatus, RegionPatch, RemoteContainerSpec, SurfaceOp};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::status::StatusBoard;

pub mod bridge;
pub mod logging;
pub mod recording;

pub use bridge::BridgeGateway;
pub use logging::LoggingGateway;
pub use recording::RecordingGateway;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("bridge not connected")]
    NotConnected,
    #[error("{method} timed out after {timeout_ms}ms")]
    Timeout {
        method: &'static str,
        timeout_ms: u64,
    },
    #[error("bridge rejected {method}: {message}")]
    Remote {
        method: &'static str,
        message: String,
    },
    #[error("bridge transport error: {0}")]
    Transport(String),
    #[error("bridge connection closed")]
    Closed,
}

/// The glasses display, as seen through the vendor bridge.
///
/// Device pushes are exposed as broadcast receivers; dropping a receiver
/// unsubscribes it.
#[async_trait]
pub trait SurfaceGateway: Send + Sync {
    /// Waits until the bridge can accept calls.
    async fn ensure_ready(&self) -> Result<(), GatewayError>;

    /// Creates the startup page. Returns the bridge's result code, if any.
    async fn initialize_surface(
        &self,
        spec: &RemoteContainerSpec,
    ) -> Result<Option<i64>, GatewayError>;

    async fn rebuild_surface(&self, spec: &RemoteContainerSpec) -> Result<bool, GatewayError>;

    async fn patch_region(&self, patch: &RegionPatch) -> Result<bool, GatewayError>;

    async fn teardown_surface(&self, exit_mode: i32) -> Result<bool, GatewayError>;

    fn subscribe_device_status(&self) -> broadcast::Receiver<DeviceStatus>;

    fn subscribe_device_events(&self) -> broadcast::Receiver<DeviceEvent>;
}

/// Executes one op against the gateway.
pub async fn apply_op(gateway: &dyn SurfaceGateway, op: &SurfaceOp) -> Result<(), GatewayError> {
    let accepted = match op {
        SurfaceOp::Initialize(spec) => {
            let code = gateway.initialize_surface(spec).await?;
            if let Some(code) = code.filter(|code| *code != 0) {
                warn!(code, "startup page created with non-zero result");
            }
            true
        }
        SurfaceOp::Rebuild(spec) => gateway.rebuild_surface(spec).await?,
        SurfaceOp::Patch(patch) => gateway.patch_region(patch).await?,
        SurfaceOp::Teardown { exit_mode } => gateway.teardown_surface(*exit_mode).await?,
    };
    if accepted {
        debug!(op = op.kind(), "surface op applied");
    } else {
        warn!(op = op.kind(), "bridge reported surface op as not applied");
    }
    Ok(())
}

/// Fire-and-forget execution of `op`; failures surface as a status line.
pub fn dispatch(
    gateway: Arc<dyn SurfaceGateway>,
    op: SurfaceOp,
    status: StatusBoard,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = apply_op(gateway.as_ref(), &op).await {
            warn!(op = op.kind(), error = %err, "surface op failed");
            status.publish(format!("Failed to update glasses: {err}"));
        }
    })
}
