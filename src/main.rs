//! Criptify - multi-horizon BTC forecasting CLI
//!
//! Runs predictions against registered models and manages the model registry
//! and stored predictions. Results are printed as JSON on stdout, logs go to
//! stderr.
//!
//! # Usage
//! ```sh
//! criptify register trained_models/xgb.toml
//! criptify predict --model xgb --horizon 6 --save
//! criptify predict-all --model xgb
//! criptify list --all
//! criptify cleanup --keep-hours 48
//! ```
//!
//! # Environment Variables
//! - `DATABASE_URL` - SQLite URL (default: sqlite://data/criptify.db)
//! - `MODEL_DIR` - Base directory for relative artifact locations (default: ./trained_models)
//! - `SYMBOL` - Bar series to forecast (default: BTCUSDT)
//! - `CONFIDENCE_Z_SCORE` - Band half-width in residual RMSE units (default: 1.96)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use criptify::application::ml::{
    EngineSettings, ModelCache, ModelRegistry, PredictionEngine, PredictionRequest,
};
use criptify::config::{Config, retention_cutoff};
use criptify::domain::ml::model_descriptor::ModelDescriptor;
use criptify::domain::ml::prediction::{Persistence, PredictionOutcome, PredictionResult, PriceForecast};
use criptify::domain::repositories::PredictionRepository;
use criptify::infrastructure::FileArtifactLoader;
use criptify::infrastructure::persistence::{
    Database, SqliteBarRepository, SqliteModelRepository, SqlitePredictionRepository,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Multi-horizon BTC price forecasting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast one horizon with a registered model
    Predict {
        #[arg(short, long)]
        model: String,

        #[arg(long)]
        horizon: u32,

        /// Upsert the forecast into the predictions table
        #[arg(long)]
        save: bool,

        /// Anchor cutoff (RFC 3339). Defaults to now.
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },

    /// Forecast every supported horizon of a model
    PredictAll {
        #[arg(short, long)]
        model: String,

        #[arg(long)]
        save: bool,

        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },

    /// Register or replace a model from a JSON or TOML descriptor file
    Register { descriptor: PathBuf },

    /// List registered models
    List {
        /// Include deactivated models
        #[arg(long)]
        all: bool,
    },

    /// Deactivate a model (it stays in the registry)
    Deactivate { name: String },

    /// Show the most recent stored predictions
    Latest {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Delete stored predictions older than the retention window
    Cleanup {
        /// Overrides PREDICTION_RETENTION_HOURS
        #[arg(long)]
        keep_hours: Option<i64>,
    },
}

#[derive(Serialize)]
struct PredictionView<'a> {
    #[serde(flatten)]
    result: &'a PredictionResult,
    implied_price: PriceForecast,
    persistence: &'a Persistence,
}

impl<'a> From<&'a PredictionOutcome> for PredictionView<'a> {
    fn from(outcome: &'a PredictionOutcome) -> Self {
        Self {
            result: &outcome.result,
            implied_price: outcome.result.implied_price(),
            persistence: &outcome.persistence,
        }
    }
}

#[derive(Serialize)]
struct HorizonView<'a> {
    horizon: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<PredictionView<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct Services {
    engine: PredictionEngine,
    predictions: Arc<SqlitePredictionRepository>,
}

async fn build_services(config: &Config) -> Result<Services> {
    let db = Database::new(
        &config.persistence.database_url,
        config.persistence.max_connections,
    )
    .await?;

    let loader = Arc::new(FileArtifactLoader::new(&config.inference.model_dir));
    let models = Arc::new(SqliteModelRepository::new(db.pool.clone()));
    let bars = Arc::new(SqliteBarRepository::new(db.pool.clone()));
    let predictions = Arc::new(SqlitePredictionRepository::new(db.pool.clone()));

    let registry = Arc::new(
        ModelRegistry::restore(loader.clone(), models)
            .await
            .context("Failed to restore model registry")?,
    );
    let cache = Arc::new(ModelCache::new(loader));
    let settings: EngineSettings = config.engine_settings();

    let engine =
        PredictionEngine::new(registry, cache, bars, settings).with_sink(predictions.clone());

    Ok(Services {
        engine,
        predictions,
    })
}

fn read_descriptor(path: &Path) -> Result<ModelDescriptor> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor {:?}", path))?;
    let descriptor = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&raw).context("Invalid TOML descriptor")?,
        _ => serde_json::from_str(&raw).context("Invalid JSON descriptor")?,
    };
    Ok(descriptor)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs on stderr so stdout stays machine-readable
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stderr_layer)
        .init();

    let config = Config::from_env()?;
    info!(
        "Criptify {} (db={}, models={:?}, symbol={})",
        env!("CARGO_PKG_VERSION"),
        config.persistence.database_url,
        config.inference.model_dir,
        config.inference.symbol
    );

    let services = build_services(&config).await?;
    let engine = &services.engine;

    match cli.command {
        Commands::Predict {
            model,
            horizon,
            save,
            as_of,
        } => {
            let request = PredictionRequest {
                model_name: model,
                horizon,
                save_to_db: save,
                as_of,
            };
            let outcome = engine.predict(&request).await?;
            print_json(&PredictionView::from(&outcome))?;
        }
        Commands::PredictAll { model, save, as_of } => {
            let results = engine.predict_all_horizons(&model, save, as_of).await?;
            let views: Vec<HorizonView> = results
                .iter()
                .map(|(horizon, result)| match result {
                    Ok(outcome) => HorizonView {
                        horizon: *horizon,
                        prediction: Some(PredictionView::from(outcome)),
                        error: None,
                    },
                    Err(e) => HorizonView {
                        horizon: *horizon,
                        prediction: None,
                        error: Some(e.to_string()),
                    },
                })
                .collect();
            print_json(&views)?;
        }
        Commands::Register { descriptor } => {
            let descriptor = read_descriptor(&descriptor)?;
            let registered = engine.register_model(descriptor).await?;
            print_json(&registered)?;
        }
        Commands::List { all } => {
            print_json(&engine.list_models(all).await)?;
        }
        Commands::Deactivate { name } => {
            print_json(&engine.deactivate_model(&name).await?)?;
        }
        Commands::Latest { limit } => {
            print_json(&services.predictions.find_latest(limit).await?)?;
        }
        Commands::Cleanup { keep_hours } => {
            let hours = keep_hours.unwrap_or(config.persistence.prediction_retention_hours);
            let cutoff = retention_cutoff(Utc::now(), hours).context("Invalid --keep-hours")?;
            let removed = services.predictions.delete_older_than(cutoff).await?;
            print_json(&serde_json::json!({ "deleted": removed, "cutoff": cutoff }))?;
        }
    }

    Ok(())
}
