//! Teleprompter display reconciliation.
//!
//! [`DisplayReconciler`] owns the canonical [`DisplayState`] and turns every
//! mutation into at most one [`SurfaceOp`]. It never performs I/O; callers
//! dispatch the returned op, publish the status and arm the alert expiry.

use tracing::debug;

use crate::protocol::Command;
use crate::state::{Alert, DisplayState, ALERT_DURATION_MS};
use crate::surface::{RegionPatch, RemoteContainerSpec, SurfaceOp, TIMER_ID, TIMER_NAME};
use crate::timer::parse_time_arg;

/// Whether the remote surface has been created yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePhase {
    Uninitialized,
    Ready,
}

/// Request to run an alert expiry check `delay_ms` from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertExpiry {
    pub raised_at_ms: u64,
    pub delay_ms: u64,
}

/// Outcome of one reconciler operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub op: Option<SurfaceOp>,
    pub status: Option<String>,
    pub schedule: Option<AlertExpiry>,
}

impl Reconciliation {
    fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn is_noop(&self) -> bool {
        self.op.is_none() && self.status.is_none() && self.schedule.is_none()
    }
}

#[derive(Debug)]
pub struct DisplayReconciler {
    state: DisplayState,
    phase: SurfacePhase,
    last_alert_ms: Option<u64>,
}

impl Default for DisplayReconciler {
    fn default() -> Self {
        Self::new(DisplayState::default())
    }
}

impl DisplayReconciler {
    pub fn new(state: DisplayState) -> Self {
        Self {
            state,
            phase: SurfacePhase::Uninitialized,
            last_alert_ms: None,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn phase(&self) -> SurfacePhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SurfacePhase::Ready
    }

    /// Marks the surface as created and returns the seed op.
    ///
    /// Only the first call produces an op; the phase never goes back.
    pub fn initialize(&mut self) -> Reconciliation {
        if self.is_ready() {
            return Reconciliation::default();
        }
        self.phase = SurfacePhase::Ready;
        debug!("display surface ready");
        Reconciliation {
            op: Some(SurfaceOp::Initialize(RemoteContainerSpec::for_display(
                &self.state,
            ))),
            ..Reconciliation::default()
        }
    }

    pub fn apply_display_update(&mut self, line1: String, line2: String) -> Reconciliation {
        self.state.line1 = line1;
        self.state.line2 = line2;
        self.rebuild()
    }

    pub fn apply_command(&mut self, command: Command, now_ms: u64) -> Reconciliation {
        match command {
            Command::ResetTimer => {
                self.state.timer_elapsed_seconds = 0;
                Reconciliation::default().with_status("Timer reset")
            }
            Command::TimerOn => {
                self.state.timer_visible = true;
                self.rebuild().with_status("Timer visible")
            }
            Command::TimerOff => {
                self.state.timer_visible = false;
                self.rebuild().with_status("Timer hidden")
            }
            Command::TimerPacing { time } => {
                let time = time.unwrap_or_default();
                match parse_time_arg(&time) {
                    Some(target) => {
                        self.state.pacing_target_seconds = Some(target);
                        self.state.timer_visible = true;
                        self.rebuild().with_status(format!("Pacing: {time}"))
                    }
                    None => Reconciliation::default().with_status(format!("Invalid time format: {time}")),
                }
            }
            Command::Alert { text } => match text.filter(|text| !text.is_empty()) {
                None => {
                    self.state.alert = None;
                    self.rebuild().with_status("Alert cleared")
                }
                Some(text) => {
                    let raised_at_ms = self.next_alert_stamp(now_ms);
                    let status = format!("Alert: {text}");
                    self.state.alert = Some(Alert { text, raised_at_ms });
                    let mut outcome = self.rebuild().with_status(status);
                    outcome.schedule = Some(AlertExpiry {
                        raised_at_ms,
                        delay_ms: ALERT_DURATION_MS,
                    });
                    outcome
                }
            },
            Command::Unknown { name } => {
                Reconciliation::default().with_status(format!("Unknown command: {name}"))
            }
        }
    }

    /// Advances the timer by one second and patches only the timer region.
    pub fn tick(&mut self) -> Reconciliation {
        self.state.timer_elapsed_seconds += 1;
        let op = self
            .state
            .visible_timer_text()
            .map(|text| SurfaceOp::Patch(RegionPatch::new(TIMER_ID, TIMER_NAME, text)));
        self.gate(op)
    }

    /// Clears the alert raised at `raised_at_ms` unless it was superseded.
    pub fn check_alert_expiry(&mut self, raised_at_ms: u64) -> Reconciliation {
        match &self.state.alert {
            Some(alert) if alert.raised_at_ms == raised_at_ms => {
                self.state.alert = None;
                self.rebuild().with_status("Alert dismissed")
            }
            _ => Reconciliation::default(),
        }
    }

    /// Local control: flips timer visibility.
    pub fn toggle_timer(&mut self) -> Reconciliation {
        self.state.timer_visible = !self.state.timer_visible;
        let status = if self.state.timer_visible {
            "Timer visible"
        } else {
            "Timer hidden"
        };
        self.rebuild().with_status(status)
    }

    fn rebuild(&self) -> Reconciliation {
        self.gate(Some(SurfaceOp::Rebuild(RemoteContainerSpec::for_display(
            &self.state,
        ))))
    }

    fn gate(&self, op: Option<SurfaceOp>) -> Reconciliation {
        let op = match self.phase {
            SurfacePhase::Ready => op,
            SurfacePhase::Uninitialized => {
                if let Some(op) = &op {
                    debug!(op = op.kind(), "surface not ready, dropping op");
                }
                None
            }
        };
        Reconciliation {
            op,
            ..Reconciliation::default()
        }
    }

    // Two alerts raised within the same millisecond must still carry distinct
    // stamps, otherwise the first expiry would clear the second alert.
    fn next_alert_stamp(&mut self, now_ms: u64) -> u64 {
        let stamp = match self.last_alert_ms {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.last_alert_ms = Some(stamp);
        stamp
    }
}
