//! Line-oriented operator console on stdin.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::runtime::{LocalControl, RuntimeHandle};

pub const HELP: &str = "commands: t toggle timer | r reset timer | c clear alert | \
o connect relay | d disconnect relay | b <id> open book | q quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Control(LocalControl),
    Quit,
    Help,
}

pub fn parse_line(line: &str) -> Option<ConsoleInput> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((line, ""));
    let input = match word {
        "t" | "timer" => ConsoleInput::Control(LocalControl::ToggleTimer),
        "r" | "reset" => ConsoleInput::Control(LocalControl::ResetTimer),
        "c" | "clear" => ConsoleInput::Control(LocalControl::ClearAlert),
        "o" | "connect" => ConsoleInput::Control(LocalControl::ConnectRelay),
        "d" | "disconnect" => ConsoleInput::Control(LocalControl::DisconnectRelay),
        "b" | "book" if !rest.is_empty() => {
            ConsoleInput::Control(LocalControl::OpenBook(rest.to_string()))
        }
        "x" | "close" => ConsoleInput::Control(LocalControl::CloseReader),
        "q" | "quit" | "exit" => ConsoleInput::Quit,
        "h" | "help" | "?" => ConsoleInput::Help,
        _ => return None,
    };
    Some(input)
}

/// Feeds operator commands into the runtime until quit or end of input.
pub async fn run<R>(reader: R, handle: RuntimeHandle)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("console input closed");
                return;
            }
            Err(err) => {
                debug!(error = %err, "console read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(ConsoleInput::Control(control)) => {
                if !handle.control(control) {
                    return;
                }
            }
            Some(ConsoleInput::Quit) => {
                handle.shutdown();
                return;
            }
            Some(ConsoleInput::Help) => handle.status().publish(HELP),
            None => handle.status().publish(format!("Unknown input: {}", line.trim())),
        }
    }
}
