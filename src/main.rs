//! sotwe-dl: downloads the images and videos of a profile timeline.
//!
//! Pages through the timeline API one cursor at a time, stores each post's
//! media under `<directory>/<user>/` (reposts and replies by other people go
//! to `<directory>/_extra/<author>/`) and stops once it reaches content that
//! a previous run already downloaded.

#![warn(clippy::all)]

mod api;
mod cli;
mod config;
mod download;
mod shutdown;
mod types;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use config::Mode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse_from(cli::normalize_args(std::env::args_os()));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = match config::Config::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", cli::USAGE_HINT);
            eprintln!();
            eprintln!("{}", cli::Cli::command().render_usage());
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "Starting sotwe-dl");

    let transport = api::HttpTransport::new()?;
    let shutdown_token = shutdown::install_signal_handler();
    let run_config = config.run_config();

    match &config.mode {
        Mode::User { name, cursor } => {
            download::download_user(
                &transport,
                name,
                cursor.as_deref(),
                &run_config,
                &shutdown_token,
            )
            .await;
        }
        Mode::UpdateAll => {
            let reports = download::download_all(&transport, &run_config, &shutdown_token).await?;
            tracing::info!("Updated {} user folders", reports.len());
            for report in &reports {
                tracing::info!(
                    "  {}: {} new, {}",
                    report.username,
                    report.stats.written,
                    report.outcome
                );
            }
        }
    }

    Ok(())
}
