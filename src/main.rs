use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use comfortcast::config::ComfortConfig;
use comfortcast::inference::ComfortService;
use comfortcast::model::{BoosterParams, ComfortModel};
use comfortcast::weather::OpenMeteoClient;
use comfortcast::{VERSION, telemetry, training, web};

#[derive(Parser)]
#[command(
    name = "comfortcast",
    version = VERSION,
    about = "Weather comfort scoring for trip planning"
)]
struct Cli {
    /// Configuration file (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Label the historical dataset with formula comfort scores
    Label {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fit the boosted-tree model on the labeled dataset
    Train {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        artifact: Option<PathBuf>,
        /// Seed for the validation split and tree sampling
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score a city's forecast days and print them as JSON
    Score {
        city: String,
        start_date: String,
        end_date: String,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ComfortConfig::load_from_path(cli.config.clone())?;

    // Exporters must be built before the async runtime starts.
    let _telemetry = telemetry::init(&config.logging, cli.verbose)?;
    info!("comfortcast {}", VERSION);

    match cli.command {
        Command::Label { input, output } => {
            let input = input.unwrap_or(config.training.raw_dataset);
            let output = output.unwrap_or(config.training.scored_dataset);
            let rows = training::labeling::run(&input, &output)
                .with_context(|| format!("Labeling {} failed", input.display()))?;
            println!("Labeled {rows} rows into {}", output.display());
        }
        Command::Train {
            input,
            artifact,
            seed,
        } => {
            let input = input.unwrap_or(config.training.scored_dataset);
            let artifact = artifact.unwrap_or(config.model.path);
            let mut params = BoosterParams::default();
            if let Some(seed) = seed {
                params.seed = seed;
            }

            let report = training::fitting::run(&input, &artifact, &params)
                .with_context(|| format!("Training on {} failed", input.display()))?;
            println!(
                "Trained {} trees ({} rounds) on {} rows: train RMSE {:.3}, validation RMSE {:.3}",
                report.best_tree_count,
                report.rounds_trained,
                report.rows,
                report.train_rmse,
                report.validation_rmse
            );
            println!("Model saved to {}", artifact.display());
        }
        Command::Score {
            city,
            start_date,
            end_date,
        } => {
            let service = build_service(&config)?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            let results = runtime
                .block_on(service.score_city(&city, &start_date, &end_date))
                .with_context(|| format!("Scoring {city} failed"))?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Serve { port } => {
            let mut server = config.server.clone();
            if let Some(port) = port {
                server.port = port;
            }
            let service = build_service(&config)?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(web::run(&server, service))?;
        }
    }

    Ok(())
}

/// Load the model once and wire it to the Open-Meteo adapters
fn build_service(config: &ComfortConfig) -> Result<ComfortService> {
    let model = ComfortModel::load(&config.model.path).with_context(|| {
        format!(
            "Cannot start without a model at {}",
            config.model.path.display()
        )
    })?;

    let client = Arc::new(OpenMeteoClient::new(&config.weather)?);
    Ok(ComfortService::new(client.clone(), client, Arc::new(model)))
}
