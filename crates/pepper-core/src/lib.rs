//! Core primitives shared by the Pepper display client and its tooling.
//!
//! Everything in this crate is synchronous and free of I/O: the wire
//! protocol spoken over the relay, the canonical display state, the text
//! layout helpers and the reconcilers that turn state changes into surface
//! operations. The async runtime, the relay transport and the vendor bridge
//! adapters live in the `pepper` app.

pub mod device;
pub mod layout;
pub mod protocol;
pub mod reader;
pub mod reconciler;
pub mod state;
pub mod surface;
pub mod timer;

pub use device::{ConnectType, DeviceEvent, DeviceStatus, OsEventType};
pub use layout::{paginate, wrap_alert, ALERT_MAX_LINE_LENGTH, READING_FRAGMENT_CHARS};
pub use protocol::{parse_frame, Command, FrameError, InboundEvent};
pub use reader::{Book, Chapter, ReaderController, ReadingSession};
pub use reconciler::{AlertExpiry, DisplayReconciler, Reconciliation, SurfacePhase};
pub use state::{Alert, DisplayState, ALERT_DURATION_MS};
pub use surface::{ListRegion, RegionPatch, RemoteContainerSpec, SurfaceOp, TextRegion};
pub use timer::{format_timer, parse_time_arg};
