use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use pepper_client::books;
use pepper_client::config::{Cli, ClientConfig, Mode};
use pepper_client::console;
use pepper_client::gateway::{BridgeGateway, LoggingGateway, SurfaceGateway};
use pepper_client::logging;
use pepper_client::runtime::{DisplayRuntime, Presenter};
use pepper_client::transport::RelayClient;
use pepper_core::ReaderController;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = ClientConfig::try_from(Cli::parse())?;
    logging::init(&config.log).context("failed to initialise logging")?;

    match config.mode.clone() {
        Mode::Send { relay_url, frame } => send_frame(&relay_url, frame).await,
        Mode::Prompter { relay_url } => {
            let runtime = DisplayRuntime::new(Presenter::prompter(), gateway(&config))
                .with_relay(RelayClient::new(relay_url.as_str()));
            info!(relay = %relay_url, "starting prompter");
            run(runtime).await
        }
        Mode::Reader { books, book_id } => {
            let shelf = books::load_shelf(books.as_deref());
            let presenter = Presenter::reader(ReaderController::new(shelf), book_id);
            info!("starting reader");
            run(DisplayRuntime::new(presenter, gateway(&config))).await
        }
    }
}

fn gateway(config: &ClientConfig) -> Arc<dyn SurfaceGateway> {
    match &config.bridge_url {
        Some(url) => {
            info!(bridge = %url, "using glasses bridge");
            Arc::new(BridgeGateway::new(url.as_str()))
        }
        None => Arc::new(LoggingGateway::new()),
    }
}

async fn run(runtime: DisplayRuntime) -> Result<()> {
    let handle = runtime.handle();
    let mut statuses = runtime.status().feed();
    let printer = tokio::spawn(async move {
        loop {
            match statuses.recv().await {
                Ok(line) => println!("{line}"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "status printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{}", console::HELP);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let console_task = tokio::spawn(console::run(stdin, handle.clone()));
    let ctrl_c = {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("ctrl-c received");
                handle.shutdown();
            }
        })
    };

    runtime.run().await;

    console_task.abort();
    ctrl_c.abort();
    printer.abort();
    Ok(())
}

/// One-shot debug client: pushes `frame` to every other relay client.
async fn send_frame(relay_url: &str, frame: String) -> Result<()> {
    let (stream, _) = match timeout(Duration::from_secs(5), connect_async(relay_url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => return Err(anyhow!("Connection failed: {err}")),
        Err(_) => {
            return Err(anyhow!(
                "Connection timeout - is the relay running at {relay_url}?"
            ));
        }
    };
    let (mut write, mut read) = stream.split();
    write
        .send(Message::Text(frame))
        .await
        .context("failed to send frame")?;
    write.send(Message::Close(None)).await.ok();
    // Drain until the relay acknowledges the close.
    let _ = timeout(Duration::from_secs(2), async {
        while let Some(Ok(message)) = read.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
    println!("sent to {relay_url}");
    Ok(())
}
