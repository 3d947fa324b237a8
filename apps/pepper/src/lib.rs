//! Display client for smart glasses: mirrors teleprompter cues from a relay,
//! or runs a small e-reader, and pushes the result to the glasses through a
//! [`gateway::SurfaceGateway`].

pub mod books;
pub mod clock;
pub mod config;
pub mod console;
pub mod gateway;
pub mod logging;
pub mod runtime;
pub mod status;
pub mod transport;

pub use runtime::{DisplayEvent, DisplayRuntime, LocalControl, Presenter, RuntimeHandle};
pub use status::StatusBoard;
