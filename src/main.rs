use anyhow::Context;
use clap::Parser;
use crm_core::{config::Backend, config::Config, UpdatePolicy};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crm-api", about = "REST API for searching and updating CRM company records")]
struct Cli {
    /// TOML config file. Defaults to ./crm.toml when present.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen port; overrides PORT and the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Storage backend: memory or firestore.
    #[arg(long)]
    backend: Option<Backend>,

    /// Reject update fields that are not part of the company schema.
    #[arg(long)]
    strict_updates: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    if cli.strict_updates {
        config.updates.policy = UpdatePolicy::Strict;
    }
    config.validate()?;

    crm_api::run(config).await
}
