use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub http_addr: SocketAddr,
    pub relay_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Parser)]
#[command(
    name = "pepper-relay",
    author,
    version,
    about = "Fan-out relay for teleprompter cues plus a static file server"
)]
pub struct Cli {
    /// Address the static file server binds to.
    #[arg(long, env = "PEPPER_HTTP_ADDR", default_value = "0.0.0.0:2000")]
    pub http_addr: String,

    /// Address the websocket relay binds to.
    #[arg(long, env = "PEPPER_RELAY_ADDR", default_value = "0.0.0.0:9000")]
    pub relay_addr: String,

    /// Directory served over HTTP.
    #[arg(long, env = "PEPPER_STATIC_DIR", default_value = "dist")]
    pub static_dir: PathBuf,

    /// Grace period applied during shutdown.
    #[arg(long, env = "PEPPER_SHUTDOWN_GRACE_SECS", default_value_t = 1)]
    pub shutdown_grace_secs: u64,
}

impl TryFrom<Cli> for RelayConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let http_addr: SocketAddr = cli
            .http_addr
            .parse()
            .with_context(|| format!("invalid http address: {}", cli.http_addr))?;
        let relay_addr: SocketAddr = cli
            .relay_addr
            .parse()
            .with_context(|| format!("invalid relay address: {}", cli.relay_addr))?;
        Ok(RelayConfig {
            http_addr,
            relay_addr,
            static_dir: cli.static_dir,
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
        })
    }
}
