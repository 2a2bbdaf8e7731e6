//! `grabbit` - personal download orchestrator.
//!
//! Serves the authenticated control surface and, when a chat session is
//! configured, ingests inbound file messages from the chat account.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use grabbit_axum::{bootstrap, start_server};
use grabbit_core::AppConfig;

#[derive(Parser)]
#[command(name = "grabbit", version, about = "Personal download orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server (default).
    Serve {
        /// HTTP port to listen on.
        #[arg(long, env = "WEB_PORT")]
        port: Option<u16>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(Command::Serve { port: Some(port) }) = &cli.command {
        config.port = *port;
    }

    // The chat session capability is attached by deployments that provide
    // one; without it the chat intake stays quiescent and the control
    // surface still serves URL downloads and configuration.
    let ctx = bootstrap(config, None).await?;

    // Ctrl-C cancels every in-flight worker before exit
    let registry = std::sync::Arc::clone(&ctx.registry);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let cancelled = registry.cancel_all();
            tracing::info!(cancelled, "shutdown requested, cancelling workers");
            // Give workers a moment to write their terminal state
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            std::process::exit(0);
        }
    });

    start_server(ctx).await
}
