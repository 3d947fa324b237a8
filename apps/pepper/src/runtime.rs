//! The serialized display event loop.
//!
//! Every source of change (relay frames, clock ticks, alert expiries, the
//! bootstrap task, device pushes, local controls) posts a [`DisplayEvent`]
//! into one queue. A single task drains it, so state is only ever touched by
//! one handler at a time. Surface ops produced by a handler are dispatched
//! without waiting for them.

use std::sync::Arc;

use pepper_core::{
    Command, DeviceEvent, DeviceStatus, DisplayReconciler, InboundEvent, ReaderController,
    Reconciliation,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::{self, LocalClock};
use crate::gateway::{self, SurfaceGateway};
use crate::status::StatusBoard;
use crate::transport::{RelayClient, TransportEvent};

#[derive(Debug)]
pub enum DisplayEvent {
    Transport(TransportEvent),
    Tick,
    AlertExpired(u64),
    SurfaceReady,
    BootstrapFailed(String),
    Device(DeviceEvent),
    DeviceStatus(DeviceStatus),
    Local(LocalControl),
    Shutdown,
}

/// Operator input from the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalControl {
    ToggleTimer,
    ResetTimer,
    ClearAlert,
    ConnectRelay,
    DisconnectRelay,
    OpenBook(String),
    CloseReader,
}

/// What the loop is driving.
#[derive(Debug)]
pub enum Presenter {
    Prompter(DisplayReconciler),
    Reader {
        controller: ReaderController,
        book_id: String,
    },
}

impl Presenter {
    pub fn prompter() -> Self {
        Presenter::Prompter(DisplayReconciler::default())
    }

    pub fn reader(controller: ReaderController, book_id: impl Into<String>) -> Self {
        Presenter::Reader {
            controller,
            book_id: book_id.into(),
        }
    }

    pub fn as_prompter(&self) -> Option<&DisplayReconciler> {
        match self {
            Presenter::Prompter(reconciler) => Some(reconciler),
            Presenter::Reader { .. } => None,
        }
    }

    pub fn as_reader(&self) -> Option<&ReaderController> {
        match self {
            Presenter::Reader { controller, .. } => Some(controller),
            Presenter::Prompter(_) => None,
        }
    }
}

/// Cloneable way to feed the loop from outside.
#[derive(Clone)]
pub struct RuntimeHandle {
    events: mpsc::UnboundedSender<DisplayEvent>,
    status: StatusBoard,
}

impl RuntimeHandle {
    pub fn send(&self, event: DisplayEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn control(&self, control: LocalControl) -> bool {
        self.send(DisplayEvent::Local(control))
    }

    pub fn inbound(&self, event: InboundEvent) -> bool {
        self.send(DisplayEvent::Transport(TransportEvent::Inbound(event)))
    }

    pub fn shutdown(&self) -> bool {
        self.send(DisplayEvent::Shutdown)
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }
}

pub struct DisplayRuntime {
    presenter: Presenter,
    gateway: Arc<dyn SurfaceGateway>,
    relay: Option<RelayClient>,
    status: StatusBoard,
    events_tx: mpsc::UnboundedSender<DisplayEvent>,
    events_rx: mpsc::UnboundedReceiver<DisplayEvent>,
    started: Instant,
}

impl DisplayRuntime {
    pub fn new(presenter: Presenter, gateway: Arc<dyn SurfaceGateway>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            presenter,
            gateway,
            relay: None,
            status: StatusBoard::new(),
            events_tx,
            events_rx,
            started: Instant::now(),
        }
    }

    /// Relay to connect once the surface bootstrap has resolved.
    pub fn with_relay(mut self, relay: RelayClient) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            events: self.events_tx.clone(),
            status: self.status.clone(),
        }
    }

    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    /// Runs until [`DisplayEvent::Shutdown`] and hands back the final state.
    pub async fn run(mut self) -> Presenter {
        self.started = Instant::now();
        let forwarders = [
            forward(
                self.gateway.subscribe_device_events(),
                self.events_tx.clone(),
                DisplayEvent::Device,
            ),
            forward(
                self.gateway.subscribe_device_status(),
                self.events_tx.clone(),
                DisplayEvent::DeviceStatus,
            ),
        ];
        let bootstrap = self.spawn_bootstrap();
        let _clock = matches!(self.presenter, Presenter::Prompter(_))
            .then(|| LocalClock::start(self.events_tx.clone()));

        while let Some(event) = self.events_rx.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }

        bootstrap.abort();
        for task in forwarders {
            task.abort();
        }
        if let Some(relay) = &self.relay {
            relay.disconnect();
        }
        info!("display runtime stopped");
        self.presenter
    }

    fn spawn_bootstrap(&self) -> JoinHandle<()> {
        let gateway = Arc::clone(&self.gateway);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match gateway.ensure_ready().await {
                Ok(()) => DisplayEvent::SurfaceReady,
                Err(err) => DisplayEvent::BootstrapFailed(err.to_string()),
            };
            let _ = events.send(event);
        })
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    async fn handle_event(&mut self, event: DisplayEvent) -> bool {
        match event {
            DisplayEvent::SurfaceReady => {
                self.status.publish("Glasses ready");
                let outcome = match &mut self.presenter {
                    Presenter::Prompter(reconciler) => reconciler.initialize(),
                    Presenter::Reader {
                        controller,
                        book_id,
                    } => controller.start_book(book_id),
                };
                self.apply(outcome);
                self.connect_relay();
            }
            DisplayEvent::BootstrapFailed(err) => {
                warn!(error = %err, "glasses bootstrap failed, continuing display-only");
                self.status.publish(format!("Glasses init failed: {err}"));
                self.connect_relay();
            }
            DisplayEvent::Transport(TransportEvent::Status(status)) => {
                self.status.publish(status);
            }
            DisplayEvent::Transport(TransportEvent::Inbound(inbound)) => {
                let now_ms = self.now_ms();
                let outcome = match &mut self.presenter {
                    Presenter::Prompter(reconciler) => match inbound {
                        InboundEvent::DisplayUpdate { line1, line2 } => {
                            reconciler.apply_display_update(line1, line2)
                        }
                        InboundEvent::Command(command) => reconciler.apply_command(command, now_ms),
                    },
                    Presenter::Reader { .. } => {
                        debug!(?inbound, "reader ignores relay frames");
                        Reconciliation::default()
                    }
                };
                self.apply(outcome);
            }
            DisplayEvent::Tick => {
                if let Presenter::Prompter(reconciler) = &mut self.presenter {
                    let outcome = reconciler.tick();
                    self.apply(outcome);
                }
            }
            DisplayEvent::AlertExpired(raised_at_ms) => {
                if let Presenter::Prompter(reconciler) = &mut self.presenter {
                    let outcome = reconciler.check_alert_expiry(raised_at_ms);
                    self.apply(outcome);
                }
            }
            DisplayEvent::Device(device_event) => {
                let outcome = match &mut self.presenter {
                    Presenter::Reader { controller, .. } => controller.handle_event(&device_event),
                    Presenter::Prompter(_) => {
                        debug!(?device_event, "prompter ignores device input");
                        Reconciliation::default()
                    }
                };
                self.apply(outcome);
            }
            DisplayEvent::DeviceStatus(status) => {
                info!(
                    sn = %status.sn,
                    connect = ?status.connect_type,
                    battery = ?status.battery_level,
                    wearing = ?status.is_wearing,
                    charging = ?status.is_charging,
                    "device status"
                );
            }
            DisplayEvent::Local(control) => return self.handle_control(control).await,
            DisplayEvent::Shutdown => {
                self.close_reader().await;
                return false;
            }
        }
        true
    }

    async fn handle_control(&mut self, control: LocalControl) -> bool {
        debug!(?control, "local control");
        match control {
            LocalControl::CloseReader => {
                self.close_reader().await;
                return true;
            }
            LocalControl::ConnectRelay => {
                self.connect_relay();
                return true;
            }
            LocalControl::DisconnectRelay => {
                if let Some(relay) = &self.relay {
                    relay.disconnect();
                    self.status.publish("Disconnected");
                }
                return true;
            }
            _ => {}
        }

        let now_ms = self.now_ms();
        let outcome = match (&mut self.presenter, control) {
            (Presenter::Prompter(reconciler), LocalControl::ToggleTimer) => {
                reconciler.toggle_timer()
            }
            (Presenter::Prompter(reconciler), LocalControl::ResetTimer) => {
                reconciler.apply_command(Command::ResetTimer, now_ms)
            }
            (Presenter::Prompter(reconciler), LocalControl::ClearAlert) => {
                reconciler.apply_command(Command::Alert { text: None }, now_ms)
            }
            (Presenter::Reader { controller, book_id }, LocalControl::OpenBook(id)) => {
                let outcome = controller.start_book(&id);
                if controller.current_book().is_some_and(|book| book.id == id) {
                    *book_id = id;
                }
                outcome
            }
            (_, control) => {
                debug!(?control, "control not supported in this mode");
                Reconciliation::default()
            }
        };
        self.apply(outcome);
        true
    }

    /// Tears the reader surface down and waits for the bridge to confirm.
    async fn close_reader(&mut self) {
        let Presenter::Reader { controller, .. } = &mut self.presenter else {
            return;
        };
        let Some(op) = controller.exit().op else {
            return;
        };
        if let Err(err) = gateway::apply_op(self.gateway.as_ref(), &op).await {
            warn!(error = %err, "failed to close reader surface");
            self.status.publish(format!("Failed to update glasses: {err}"));
        }
    }

    fn connect_relay(&self) {
        if !matches!(self.presenter, Presenter::Prompter(_)) {
            return;
        }
        let Some(relay) = &self.relay else {
            return;
        };
        let events = self.events_tx.clone();
        relay.connect(move |event| {
            let _ = events.send(DisplayEvent::Transport(event));
        });
    }

    fn apply(&self, outcome: Reconciliation) {
        let Reconciliation {
            op,
            status,
            schedule,
        } = outcome;
        if let Some(status) = status {
            self.status.publish(status);
        }
        if let Some(op) = op {
            gateway::dispatch(Arc::clone(&self.gateway), op, self.status.clone());
        }
        if let Some(expiry) = schedule {
            clock::schedule_alert_expiry(self.events_tx.clone(), expiry);
        }
    }
}

fn forward<T, F>(
    mut rx: broadcast::Receiver<T>,
    events: mpsc::UnboundedSender<DisplayEvent>,
    wrap: F,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> DisplayEvent + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(item) => {
                    if events.send(wrap(item)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "device pushes lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
