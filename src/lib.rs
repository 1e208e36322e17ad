pub mod cli;
pub mod clients;
pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod models;
pub mod services;
pub mod state;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;
pub use config::Config;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    config.validate()?;

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.general.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_port {
            Some(port) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new()
                    .with_http_listener(([0, 0, 0, 0], port))
                    .install()
                    .context("Failed to install Prometheus exporter")?;
                info!(port, "Prometheus metrics exporter listening");
            }
            None => warn!("Metrics enabled but no metrics_port configured; skipping exporter"),
        }
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    cli::run_command(command, config).await
}
