use anyhow::Result;
use clap::Parser;
use ossenc::cli::Cli;
use ossenc::commands::App;
use ossenc::config::{Config, ConfigWrite};
use ossenc::console::Console;
use ossenc::transport::ObjectStoreClient;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// How long in-flight tasks get once `run` has returned. A cancelled upload
/// can leave its encoder thread parked in a read that never completes (an
/// idle terminal on stdin); the process must not wait for it.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Cannot start the async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    };
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();

    if cli.create_config {
        let (_, outcome) = Config::create_or_update(&config_path)?;
        let verb = match outcome {
            ConfigWrite::Created => "created",
            ConfigWrite::Updated => "updated",
        };
        eprintln!("Config file {}: {}", verb, config_path.display());
        return Ok(());
    }

    let config = Config::load(&config_path)?;
    let storage = ObjectStoreClient::from_config(&config)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupted");
            interrupt.cancel();
        }
    });

    let app = App::new(config, Arc::new(storage), Console::std(), cancel);
    app.run(&cli).await?;
    Ok(())
}
