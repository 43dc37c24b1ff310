pub mod types;
pub mod config;
pub mod data;
pub mod processing;
pub mod charts;
pub mod controller;
pub mod page;
pub mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the census tables and serve the dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Fetch and join the tables once, then report what was loaded
    Fetch {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Write the map figure JSON here
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            info!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // Every table is loaded before the listener binds; a failed fetch aborts startup.
            let dashboard = data::load_data(&app_config).await?;

            server::start_server(app_config, dashboard).await?;
        }
        Commands::Fetch { config, out } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let dashboard = data::load_data(&app_config).await?;

            for borough in &dashboard.boroughs {
                info!(
                    "{:<14} {:>8} trees  population {:?}",
                    borough.boroname, borough.count_tree_id, borough.population
                );
            }
            info!(
                "{} species, {} health rows, {} steward rows",
                dashboard.species.len(),
                dashboard.health.len(),
                dashboard.steward_health.len()
            );

            if let Some(path) = out {
                let figure = charts::build_map(
                    &dashboard.boroughs,
                    &app_config.map,
                    app_config.credentials.mapbox_token.as_deref(),
                );
                let json = serde_json::to_string_pretty(&figure)?;
                fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
                info!("Wrote map figure to {:?}", path);
            }
        }
    }

    Ok(())
}
