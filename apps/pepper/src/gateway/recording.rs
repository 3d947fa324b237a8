use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pepper_core::{DeviceEvent, DeviceStatus, RegionPatch, RemoteContainerSpec, SurfaceOp};
use tokio::sync::{broadcast, watch};

use super::{GatewayError, SurfaceGateway};

/// In-memory gateway that records every op it is asked to apply.
///
/// Failures can be scripted for bootstrap and for ops, and device pushes can
/// be injected, which makes it the gateway of choice for runtime tests.
#[derive(Clone)]
pub struct RecordingGateway {
    inner: Arc<RecordingInner>,
}

struct RecordingInner {
    ops: Mutex<Vec<SurfaceOp>>,
    op_count: watch::Sender<usize>,
    op_failure: Mutex<Option<GatewayError>>,
    ready_failure: Mutex<Option<GatewayError>>,
    status_tx: broadcast::Sender<DeviceStatus>,
    events_tx: broadcast::Sender<DeviceEvent>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGateway {
    pub fn new() -> Self {
        let (op_count, _) = watch::channel(0);
        let (status_tx, _) = broadcast::channel(16);
        let (events_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(RecordingInner {
                ops: Mutex::new(Vec::new()),
                op_count,
                op_failure: Mutex::new(None),
                ready_failure: Mutex::new(None),
                status_tx,
                events_tx,
            }),
        }
    }

    /// Makes every subsequent op fail with `err` (ops are still recorded).
    pub fn fail_ops_with(&self, err: GatewayError) {
        *self.inner.op_failure.lock() = Some(err);
    }

    pub fn fail_ready_with(&self, err: GatewayError) {
        *self.inner.ready_failure.lock() = Some(err);
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.inner.ops.lock().clone()
    }

    pub fn op_count(&self) -> usize {
        self.inner.ops.lock().len()
    }

    /// Waits until at least `count` ops were recorded and returns them all.
    pub async fn wait_for_ops(&self, count: usize) -> Vec<SurfaceOp> {
        let mut rx = self.inner.op_count.subscribe();
        let _ = rx.wait_for(|recorded| *recorded >= count).await;
        self.ops()
    }

    pub fn emit_device_event(&self, event: DeviceEvent) -> usize {
        self.inner.events_tx.send(event).unwrap_or(0)
    }

    pub fn emit_device_status(&self, status: DeviceStatus) -> usize {
        self.inner.status_tx.send(status).unwrap_or(0)
    }

    fn record(&self, op: SurfaceOp) -> Result<(), GatewayError> {
        let count = {
            let mut ops = self.inner.ops.lock();
            ops.push(op);
            ops.len()
        };
        self.inner.op_count.send_replace(count);
        match self.inner.op_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SurfaceGateway for RecordingGateway {
    async fn ensure_ready(&self) -> Result<(), GatewayError> {
        match self.inner.ready_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn initialize_surface(
        &self,
        spec: &RemoteContainerSpec,
    ) -> Result<Option<i64>, GatewayError> {
        self.record(SurfaceOp::Initialize(spec.clone()))?;
        Ok(Some(0))
    }

    async fn rebuild_surface(&self, spec: &RemoteContainerSpec) -> Result<bool, GatewayError> {
        self.record(SurfaceOp::Rebuild(spec.clone()))?;
        Ok(true)
    }

    async fn patch_region(&self, patch: &RegionPatch) -> Result<bool, GatewayError> {
        self.record(SurfaceOp::Patch(patch.clone()))?;
        Ok(true)
    }

    async fn teardown_surface(&self, exit_mode: i32) -> Result<bool, GatewayError> {
        self.record(SurfaceOp::Teardown { exit_mode })?;
        Ok(true)
    }

    fn subscribe_device_status(&self) -> broadcast::Receiver<DeviceStatus> {
        self.inner.status_tx.subscribe()
    }

    fn subscribe_device_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::apply_op;

    #[test_timeout::tokio_timeout_test]
    async fn records_ops_and_scripted_failures() {
        let gateway = RecordingGateway::new();
        apply_op(&gateway, &SurfaceOp::Teardown { exit_mode: 0 })
            .await
            .unwrap();

        gateway.fail_ops_with(GatewayError::Closed);
        let patch = SurfaceOp::Patch(RegionPatch::new(3, "timer", "0:01"));
        assert_eq!(apply_op(&gateway, &patch).await, Err(GatewayError::Closed));

        let ops = gateway.wait_for_ops(2).await;
        assert_eq!(ops[1], patch);
    }
}
