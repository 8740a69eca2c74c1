//! rotulador - collaborative image annotation
//!
//! `rotulador annotator <project folder>` serves the web interface; the
//! other subcommands prepare projects and inspect their databases.

use anyhow::Result;
use clap::Parser;
use rotulador::cli::Command;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rotulador")]
#[command(about = "Collaborative image annotation over a pipeline of labeling tasks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rotulador=info,rotulador_common=info,tower_http=info".into()),
        )
        // stdout is reserved for command output
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Build identification right after tracing init
    info!(
        "rotulador v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();
    cli.command.run().await
}
