use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::monitor::MonitorIntervals;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backing", rename_all = "snake_case")]
pub enum LogSettings {
    Memory,
    Sqlite { path: PathBuf },
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings::Sqlite {
            path: PathBuf::from("data/prediction_log.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_name: String,
    pub stage: String,
    pub registry_dir: PathBuf,
    /// Tried in order; the first file that exists becomes the drift baseline.
    pub reference_candidates: Vec<PathBuf>,
    /// Combined dataset that drained predictions are appended to. `null` disables it.
    pub archive_path: Option<PathBuf>,
    pub prediction_log: LogSettings,
    pub drift_interval_secs: u64,
    pub watch_interval_secs: u64,
    pub bind: String,
    pub metrics_bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_name: "HeartDiseaseClassifier".into(),
            stage: "Production".into(),
            registry_dir: PathBuf::from("registry"),
            reference_candidates: vec![
                PathBuf::from("data/combined_data.csv"),
                PathBuf::from("data/old_data.csv"),
            ],
            archive_path: Some(PathBuf::from("data/combined_data.csv")),
            prediction_log: LogSettings::default(),
            drift_interval_secs: 180,
            watch_interval_secs: 600,
            bind: "0.0.0.0:7860".into(),
            metrics_bind: "0.0.0.0:8000".into(),
        }
    }
}

impl Settings {
    /// Defaults when `path` is absent or missing on disk; a file that exists
    /// but does not decode is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            log::info!(
                "settings file {} not found; using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    pub fn intervals(&self) -> Result<MonitorIntervals> {
        if self.drift_interval_secs == 0 || self.watch_interval_secs == 0 {
            bail!("monitor intervals must be at least one second");
        }
        Ok(MonitorIntervals {
            drift: Duration::from_secs(self.drift_interval_secs),
            watch: Duration::from_secs(self.watch_interval_secs),
        })
    }

    /// Baseline the archive is seeded from: the last reference candidate
    /// other than the archive itself.
    pub fn archive_baseline(&self) -> Option<PathBuf> {
        self.reference_candidates
            .iter()
            .rev()
            .find(|candidate| Some(*candidate) != self.archive_path.as_ref())
            .cloned()
    }
}
