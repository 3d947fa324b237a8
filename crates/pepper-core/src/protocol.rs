//! Relay wire protocol.
//!
//! Frames are JSON objects. A frame carrying a `command` key is always a
//! command; anything else must be a display update with string `text1` and
//! `text2` fields.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ResetTimer,
    TimerOn,
    TimerOff,
    TimerPacing { time: Option<String> },
    Alert { text: Option<String> },
    Unknown { name: String },
}

impl Command {
    pub fn name(&self) -> &str {
        match self {
            Command::ResetTimer => "resetTimer",
            Command::TimerOn => "timerOn",
            Command::TimerOff => "timerOff",
            Command::TimerPacing { .. } => "timerPacing",
            Command::Alert { .. } => "alert",
            Command::Unknown { name } => name,
        }
    }

    fn from_object(name: &str, frame: &Map<String, Value>) -> Self {
        match name {
            "resetTimer" => Command::ResetTimer,
            "timerOn" => Command::TimerOn,
            "timerOff" => Command::TimerOff,
            "timerPacing" => Command::TimerPacing {
                time: string_field(frame, "time"),
            },
            "alert" => Command::Alert {
                text: string_field(frame, "text"),
            },
            other => Command::Unknown {
                name: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    DisplayUpdate { line1: String, line2: String },
    Command(Command),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame is not a json object")]
    NotAnObject,
    #[error("frame has neither a command nor text1/text2")]
    MissingText,
    #[error("command name must be a string")]
    InvalidCommandName,
}

/// Parses one relay text frame.
pub fn parse_frame(raw: &str) -> Result<InboundEvent, FrameError> {
    let value: Value = serde_json::from_str(raw)?;
    let frame = value.as_object().ok_or(FrameError::NotAnObject)?;

    if let Some(command) = frame.get("command") {
        let name = command.as_str().ok_or(FrameError::InvalidCommandName)?;
        return Ok(InboundEvent::Command(Command::from_object(name, frame)));
    }

    match (frame.get("text1"), frame.get("text2")) {
        (Some(Value::String(line1)), Some(Value::String(line2))) => {
            Ok(InboundEvent::DisplayUpdate {
                line1: line1.clone(),
                line2: line2.clone(),
            })
        }
        _ => Err(FrameError::MissingText),
    }
}

/// Encodes a display update frame, used by the debug sender.
pub fn display_update_frame(line1: &str, line2: &str) -> String {
    serde_json::json!({ "text1": line1, "text2": line2 }).to_string()
}

fn string_field(frame: &Map<String, Value>, key: &str) -> Option<String> {
    frame.get(key).and_then(Value::as_str).map(str::to_string)
}
