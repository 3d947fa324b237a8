use pepper_core::InboundEvent;
use thiserror::Error;

pub mod websocket;

pub use websocket::{RelayClient, RECONNECT_DELAY};

/// What the relay client hands to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Inbound(InboundEvent),
    Status(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("relay not connected")]
    NotConnected,
    #[error("relay connection closed while sending")]
    ChannelClosed,
}
