use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pepper_core::protocol::display_update_frame;
use url::Url;

use crate::logging::{LogConfig, LogLevel};

pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:9000";
pub const DEFAULT_BOOK_ID: &str = "book_001";

#[derive(Debug, Parser)]
#[command(
    name = "pepper",
    author,
    version,
    about = "Teleprompter and e-reader display for smart glasses"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Cue relay the prompter listens on and `send` pushes to.
    #[arg(long, global = true, env = "PEPPER_RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    pub relay_url: String,

    /// WebSocket URL of the glasses bridge host. Ops are only logged without it.
    #[arg(long, global = true, env = "PEPPER_BRIDGE_URL")]
    pub bridge_url: Option<String>,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true, env = "PEPPER_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, value_enum, env = "PEPPER_LOG_LEVEL", default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mirror teleprompter cues from the relay onto the glasses (default).
    Prompter,
    /// Browse and read books on the glasses.
    Reader {
        /// JSON array of books; the built-in shelf is used when absent.
        #[arg(long, env = "PEPPER_BOOKS")]
        books: Option<PathBuf>,

        #[arg(long, default_value = DEFAULT_BOOK_ID)]
        book_id: String,
    },
    /// Push one raw frame through the relay and exit.
    Send {
        /// Raw frame body, e.g. '{"command":"timerOn"}'.
        #[arg(conflicts_with_all = ["line1", "line2"])]
        json: Option<String>,

        /// Send a display update with this first line instead of raw JSON.
        #[arg(long, requires = "line2")]
        line1: Option<String>,

        #[arg(long, requires = "line1")]
        line2: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Prompter { relay_url: String },
    Reader { books: Option<PathBuf>, book_id: String },
    Send { relay_url: String, frame: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub mode: Mode,
    pub bridge_url: Option<String>,
    pub log: LogConfig,
}

impl TryFrom<Cli> for ClientConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let relay_url = cli.common.relay_url;
        let mode = match cli.command.unwrap_or(Command::Prompter) {
            Command::Prompter => Mode::Prompter {
                relay_url: normalize_ws_url(&relay_url)
                    .with_context(|| format!("invalid relay url: {relay_url}"))?,
            },
            Command::Reader { books, book_id } => Mode::Reader { books, book_id },
            Command::Send { json, line1, line2 } => {
                let frame = match (json, line1, line2) {
                    (Some(json), _, _) => {
                        serde_json::from_str::<serde_json::Value>(&json)
                            .with_context(|| format!("frame is not valid JSON: {json}"))?;
                        json
                    }
                    (None, Some(line1), Some(line2)) => display_update_frame(&line1, &line2),
                    _ => bail!("send needs a JSON frame or --line1 and --line2"),
                };
                Mode::Send {
                    relay_url: normalize_ws_url(&relay_url)
                        .with_context(|| format!("invalid relay url: {relay_url}"))?,
                    frame,
                }
            }
        };
        let bridge_url = cli
            .common
            .bridge_url
            .map(|raw| {
                normalize_ws_url(&raw).with_context(|| format!("invalid bridge url: {raw}"))
            })
            .transpose()?;
        Ok(ClientConfig {
            mode,
            bridge_url,
            log: LogConfig {
                level: cli.common.log_level,
                file: cli.common.log_file,
            },
        })
    }
}

/// Checks that `raw` is a ws/wss URL and pins `localhost` to IPv4 loopback.
pub fn normalize_ws_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => bail!("unsupported scheme {other}, expected ws or wss"),
    }
    if url.host_str() == Some("localhost") {
        url.set_host(Some("127.0.0.1"))?;
    }
    let mut normalized = url.to_string();
    if url.path() == "/" && !raw.ends_with('/') {
        normalized.pop();
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ClientConfig> {
        let cli = Cli::try_parse_from(std::iter::once("pepper").chain(args.iter().copied()))?;
        ClientConfig::try_from(cli)
    }

    #[test]
    fn defaults_to_prompter_on_loopback() {
        let config = parse(&[]).unwrap();
        assert_eq!(
            config.mode,
            Mode::Prompter {
                relay_url: DEFAULT_RELAY_URL.to_string()
            }
        );
        assert!(config.bridge_url.is_none());
        assert_eq!(config.log.level, LogLevel::Warn);
    }

    #[test]
    fn localhost_is_pinned_to_ipv4() {
        assert_eq!(
            normalize_ws_url("ws://localhost:9000").unwrap(),
            "ws://127.0.0.1:9000"
        );
        assert_eq!(
            normalize_ws_url("wss://relay.example.com/ws").unwrap(),
            "wss://relay.example.com/ws"
        );
    }

    #[test]
    fn rejects_non_websocket_urls() {
        assert!(normalize_ws_url("http://127.0.0.1:9000").is_err());
        assert!(normalize_ws_url("not a url").is_err());
        assert!(parse(&["prompter", "--relay-url", "ftp://x"]).is_err());
    }

    #[test]
    fn relay_url_applies_without_a_subcommand() {
        let config = parse(&["--relay-url", "ws://10.0.0.5:9000"]).unwrap();
        assert_eq!(
            config.mode,
            Mode::Prompter {
                relay_url: "ws://10.0.0.5:9000".to_string()
            }
        );
        let config = parse(&["send", "--relay-url", "ws://localhost:9100", "{}"]).unwrap();
        assert_eq!(
            config.mode,
            Mode::Send {
                relay_url: "ws://127.0.0.1:9100".to_string(),
                frame: "{}".to_string()
            }
        );
    }

    #[test]
    fn reader_takes_book_options() {
        let config = parse(&[
            "reader",
            "--books",
            "shelf.json",
            "--book-id",
            "book_002",
            "--bridge-url",
            "ws://localhost:7000",
        ])
        .unwrap();
        assert_eq!(
            config.mode,
            Mode::Reader {
                books: Some(PathBuf::from("shelf.json")),
                book_id: "book_002".to_string()
            }
        );
        assert_eq!(config.bridge_url.as_deref(), Some("ws://127.0.0.1:7000"));
    }

    #[test]
    fn send_requires_json_frame() {
        assert!(parse(&["send", "{not json"]).is_err());
        let config = parse(&["send", r#"{"command":"timerOn"}"#]).unwrap();
        assert!(matches!(config.mode, Mode::Send { .. }));
        assert!(parse(&["send"]).is_err());
    }

    #[test]
    fn send_builds_display_updates_from_lines() {
        let config = parse(&["send", "--line1", "Intro", "--line2", "Q&A"]).unwrap();
        let Mode::Send { frame, .. } = config.mode else {
            panic!("expected send mode");
        };
        assert_eq!(
            pepper_core::parse_frame(&frame).unwrap(),
            pepper_core::InboundEvent::DisplayUpdate {
                line1: "Intro".into(),
                line2: "Q&A".into()
            }
        );
        assert!(parse(&["send", "--line1", "only"]).is_err());
    }
}
