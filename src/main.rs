mod auth;
mod broker;
mod config;
mod consumer;
mod error;
mod message;
mod metrics;
mod producer;
mod runner;
mod scenarios;
mod timing;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rabbitmq-load")]
#[command(about = "Scenario-driven load generator for RabbitMQ", long_about = None)]
struct Cli {
    /// Properties file holding passwords and client secrets
    secrets: PathBuf,

    /// Properties file holding scenario, broker and identity-provider settings
    properties: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match cli.verbose {
        0 => "rabbitmq_load=info",
        1 => "rabbitmq_load=debug",
        _ => "rabbitmq_load=trace,lapin=debug",
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    // Everything is validated before either worker touches the network
    let props = config::Properties::load(&[&cli.secrets, &cli.properties])
        .context("Failed to load properties")?;
    let settings =
        config::Settings::from_properties(&props).context("Invalid configuration")?;

    runner::run(settings).await;

    Ok(())
}
