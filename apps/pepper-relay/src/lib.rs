//! Fan-out relay for teleprompter cues: every frame a client sends is copied
//! to every other connected client. Also hosts the static controller page.

pub mod config;
pub mod registry;
pub mod server;
pub mod telemetry;

pub use config::{Cli, RelayConfig};
pub use registry::{BroadcastMetrics, ClientRegistry, RelayStats};
pub use server::{relay_router, static_router, RelayState};
