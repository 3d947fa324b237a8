use async_trait::async_trait;
use pepper_core::{DeviceEvent, DeviceStatus, RegionPatch, RemoteContainerSpec};
use tokio::sync::broadcast;
use tracing::info;

use super::{GatewayError, SurfaceGateway};

/// Display-only gateway used when no bridge is configured: every op is
/// written to the log instead of the glasses.
pub struct LoggingGateway {
    status_tx: broadcast::Sender<DeviceStatus>,
    events_tx: broadcast::Sender<DeviceEvent>,
}

impl Default for LoggingGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingGateway {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(1);
        let (events_tx, _) = broadcast::channel(1);
        Self {
            status_tx,
            events_tx,
        }
    }
}

fn describe(spec: &RemoteContainerSpec) -> String {
    spec.texts
        .iter()
        .map(|region| format!("{}={:?}", region.name, region.content))
        .chain(
            spec.lists
                .iter()
                .map(|region| format!("{}[{}]", region.name, region.items.item_count)),
        )
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl SurfaceGateway for LoggingGateway {
    async fn ensure_ready(&self) -> Result<(), GatewayError> {
        info!("no bridge configured, logging surface ops");
        Ok(())
    }

    async fn initialize_surface(
        &self,
        spec: &RemoteContainerSpec,
    ) -> Result<Option<i64>, GatewayError> {
        info!(
            regions = spec.container_total_num(),
            "initialize {}",
            describe(spec)
        );
        Ok(Some(0))
    }

    async fn rebuild_surface(&self, spec: &RemoteContainerSpec) -> Result<bool, GatewayError> {
        info!(
            regions = spec.container_total_num(),
            "rebuild {}",
            describe(spec)
        );
        Ok(true)
    }

    async fn patch_region(&self, patch: &RegionPatch) -> Result<bool, GatewayError> {
        info!(region = %patch.name, id = patch.id, "patch {:?}", patch.content);
        Ok(true)
    }

    async fn teardown_surface(&self, exit_mode: i32) -> Result<bool, GatewayError> {
        info!(exit_mode, "teardown");
        Ok(true)
    }

    fn subscribe_device_status(&self) -> broadcast::Receiver<DeviceStatus> {
        self.status_tx.subscribe()
    }

    fn subscribe_device_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events_tx.subscribe()
    }
}
