//! pdf-assistant CLI entry point

use clap::Parser;
use pdf_assistant::{commands::cmd_chat, config::Config, error::Result, progress::LogWriterFactory};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-assistant")]
#[command(version, about = "Chat with a PDF using retrieval-augmented generation", long_about = None)]
struct Cli {
    /// Start a new run instead of continuing the latest one
    #[arg(long)]
    new: bool,

    /// User whose runs are listed and continued
    #[arg(long, default_value = "user")]
    user: String,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    // Knowledge and session failures are reported inside and exit cleanly
    cmd_chat(&config, cli.new, &cli.user).await;
    Ok(())
}
