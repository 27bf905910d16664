pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod reward;
pub mod timer;
mod utils;
pub mod wallet;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast::error::RecvError, watch},
};

use clock::SystemClock;
use config::FocusConfig;
use models::HostState;
use timer::{
    commands::{execute, Command, HELP},
    SessionController,
};
use wallet::InMemoryWallet;

pub use error::{ErrorKind, SessionError, WalletError};

/// Drive a focus session from the terminal against a simulated wallet.
#[derive(Debug, Parser)]
#[command(name = "forestfy", version)]
struct Cli {
    /// JSON config file; defaults apply when it is missing
    #[arg(long, env = "FORESTFY_CONFIG")]
    config: Option<PathBuf>,

    /// Address that stakes and receives payouts
    #[arg(long, default_value = "0xforest")]
    address: String,

    /// Starting virtual balance of the simulated wallet
    #[arg(long, default_value_t = 10.0)]
    balance: f64,
}

pub fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => FocusConfig::load(path)?,
        None => FocusConfig::default(),
    };

    log::info!("Forestfy starting up...");

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(interactive(cli, config))
}

async fn interactive(cli: Cli, config: FocusConfig) -> anyhow::Result<()> {
    let wallet = Arc::new(InMemoryWallet::with_account(&cli.address, cli.balance));
    let controller =
        SessionController::new(config, wallet, Arc::new(SystemClock), cli.address.clone());

    let (host_tx, host_rx) = watch::channel(HostState::Active);
    controller
        .subscribe_host(host_rx)
        .await
        .context("failed to subscribe to host lifecycle")?;

    let mut events = controller.events();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => log::error!("failed to encode event: {err}"),
                },
                Err(RecvError::Lagged(skipped)) => log::warn!("skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };
        let quit = command == Command::Quit;

        match execute(&controller, &host_tx, command).await {
            Ok(output) => println!("{output}"),
            Err(err) => eprintln!("error: {err}"),
        }
        if quit {
            break;
        }
    }

    controller.shutdown().await;
    printer.abort();
    Ok(())
}
