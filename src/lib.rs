pub mod db;
pub mod drift;
pub mod features;
pub mod metrics;
pub mod model;
pub mod monitor;
pub mod prediction;
pub mod prediction_log;
pub mod server;
pub mod settings;
pub mod watcher;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use db::Database;
use drift::{DatasetArchive, DriftEvaluator, ReferenceSnapshot};
use metrics::GaugeRegistry;
use model::{ActiveModel, FsModelRegistry};
use monitor::MonitorController;
use prediction::Predictor;
use prediction_log::PredictionLog;
use server::AppState;
use settings::{LogSettings, Settings};
use watcher::ModelReloader;

#[derive(Parser, Debug)]
#[command(
    name = "heartwatch",
    about = "Heart disease risk classifier with drift monitoring and model hot reload"
)]
pub struct Cli {
    /// JSON settings file. Missing file means defaults.
    #[arg(long, env = "HEARTWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address for the prediction API (host:port).
    #[arg(long, env = "HEARTWATCH_BIND")]
    pub bind: Option<String>,

    /// Address for the metrics endpoint (host:port).
    #[arg(long, env = "HEARTWATCH_METRICS_BIND")]
    pub metrics_bind: Option<String>,

    /// Root directory of the model registry.
    #[arg(long, env = "HEARTWATCH_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Bearer secret for POST /api/reload. Unset disables the endpoint.
    #[arg(long, env = "HEARTWATCH_RELOAD_SECRET", hide_env_values = true)]
    pub reload_secret: Option<String>,
}

impl Cli {
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(bind) = &self.bind {
            settings.bind = bind.clone();
        }
        if let Some(metrics_bind) = &self.metrics_bind {
            settings.metrics_bind = metrics_bind.clone();
        }
        if let Some(registry) = &self.registry {
            settings.registry_dir = registry.clone();
        }
        Ok(settings)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("heartwatch starting up...");

    let settings = cli.settings()?;
    let intervals = settings.intervals()?;

    let prediction_log = match &settings.prediction_log {
        LogSettings::Memory => PredictionLog::in_memory(),
        LogSettings::Sqlite { path } => {
            let database = Database::new(path.clone())?;
            info!("prediction log stored in {}", database.path().display());
            PredictionLog::durable(database)
        }
    };

    let gauges = GaugeRegistry::new();
    let active = ActiveModel::new();
    let reloader = Arc::new(ModelReloader::new(
        Arc::new(FsModelRegistry::new(settings.registry_dir.clone())),
        settings.model_name.clone(),
        settings.stage.clone(),
        active.clone(),
        gauges.clone(),
    ));

    // Serving with no model is worse than not starting.
    reloader.check_for_update().await.with_context(|| {
        format!(
            "initial load of {} ({}) failed; refusing to start",
            settings.model_name, settings.stage
        )
    })?;

    let candidates = settings.reference_candidates.clone();
    let reference = tokio::task::spawn_blocking(move || ReferenceSnapshot::load(&candidates))
        .await
        .context("reference loader join failed")?
        .unwrap_or_else(|err| {
            warn!("reference dataset unusable, drift evaluation disabled: {err:?}");
            ReferenceSnapshot::empty()
        });

    let mut evaluator = DriftEvaluator::new(reference, prediction_log.clone(), gauges.clone());
    if let Some(archive_path) = &settings.archive_path {
        evaluator = evaluator.with_archive(DatasetArchive::new(
            archive_path.clone(),
            settings.archive_baseline(),
        ));
    }

    let mut monitor = MonitorController::new();
    monitor.start(Arc::new(evaluator), reloader.clone(), intervals)?;

    let app = server::app_router(AppState {
        predictor: Predictor::new(active, gauges.clone(), prediction_log),
        reloader,
        reload_secret: cli.reload_secret.as_deref().map(Arc::from),
    });
    let metrics = server::metrics_router(gauges);

    let app_listener = TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    let metrics_listener = TcpListener::bind(&settings.metrics_bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.metrics_bind))?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutdown requested");
                    shutdown.cancel();
                }
                Err(err) => error!("failed to listen for shutdown signal: {err}"),
            }
        });
    }

    let served = tokio::try_join!(
        server::serve(app_listener, app, shutdown.clone()),
        server::serve(metrics_listener, metrics, shutdown.clone()),
    );
    // Either server failing takes the other down with it.
    shutdown.cancel();
    monitor.stop().await?;
    served?;

    info!("heartwatch stopped");
    Ok(())
}
