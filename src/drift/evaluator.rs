use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;

use crate::features::{Feature, FeatureVector};
use crate::metrics::{
    DriftMetricKind, GaugeKey, GaugeRegistry, DRIFT_CYCLE_GAUGE, DRIFT_SAMPLE_GAUGE,
};
use crate::prediction_log::{PredictionLog, PredictionLogEntry};

use super::archive::DatasetArchive;
use super::reference::ReferenceSnapshot;
use super::stats::{EmpiricalEngine, StatisticsEngine};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "heartwatch::drift";

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftPhase {
    Idle,
    Draining,
    Computing,
    Publishing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScore {
    pub feature: Feature,
    pub distance: Option<f64>,
    pub p_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The log was empty; no scores changed.
    NothingToDo,
    /// Entries were drained but there is no baseline to compare them with.
    NoReference { drained: usize },
    Published {
        drained: usize,
        scores: Vec<FeatureScore>,
        warnings: Vec<String>,
    },
}

/// Compares recently served inputs against the reference snapshot and
/// publishes per-feature drift scores.
pub struct DriftEvaluator {
    reference: Arc<ReferenceSnapshot>,
    engine: Arc<dyn StatisticsEngine>,
    log: PredictionLog,
    gauges: GaugeRegistry,
    archive: Option<DatasetArchive>,
    phase: Mutex<DriftPhase>,
}

impl DriftEvaluator {
    pub fn new(reference: ReferenceSnapshot, log: PredictionLog, gauges: GaugeRegistry) -> Self {
        Self {
            reference: Arc::new(reference),
            engine: Arc::new(EmpiricalEngine),
            log,
            gauges,
            archive: None,
            phase: Mutex::new(DriftPhase::Idle),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn StatisticsEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_archive(mut self, archive: DatasetArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn reference(&self) -> &ReferenceSnapshot {
        &self.reference
    }

    pub fn phase(&self) -> DriftPhase {
        match self.phase.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn enter(&self, next: DriftPhase) {
        let mut guard = match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        log_debug!("drift phase {:?} -> {:?}", *guard, next);
        *guard = next;
    }

    /// One Idle → Draining → Computing → Publishing → Idle pass. A drain
    /// failure leaves the log untouched so the next cycle retries it.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let _idle = PhaseReset(self);

        self.enter(DriftPhase::Draining);
        let drained = self
            .log
            .drain_all()
            .await
            .context("failed to drain prediction log")?;
        if drained.is_empty() {
            log_info!("no new predictions since last drift check; nothing to do");
            return Ok(CycleOutcome::NothingToDo);
        }
        let drained_count = drained.len();
        log_info!("drained {} logged predictions for drift evaluation", drained_count);

        let current: Vec<FeatureVector> = drained.iter().map(|entry| entry.features).collect();
        self.archive_batch(drained).await;

        if self.reference.is_empty() {
            log_info!("reference snapshot is empty; skipping drift scores");
            return Ok(CycleOutcome::NoReference {
                drained: drained_count,
            });
        }

        self.enter(DriftPhase::Computing);
        let reference = Arc::clone(&self.reference);
        let engine = Arc::clone(&self.engine);
        let (scores, warnings) = tokio::task::spawn_blocking(move || {
            compute_scores(&reference, engine.as_ref(), &current)
        })
        .await
        .context("drift computation worker join failed")?;

        for warning in &warnings {
            log_warn!("{warning}");
        }

        self.enter(DriftPhase::Publishing);
        for score in &scores {
            if let Some(distance) = score.distance {
                self.gauges
                    .record_drift(score.feature, DriftMetricKind::Distance, distance);
            }
            if let Some(p_value) = score.p_value {
                self.gauges
                    .record_drift(score.feature, DriftMetricKind::Significance, p_value);
            }
        }
        self.gauges
            .set(GaugeKey::new(DRIFT_SAMPLE_GAUGE), drained_count as f64);
        self.gauges.set(
            GaugeKey::new(DRIFT_CYCLE_GAUGE),
            Utc::now().timestamp() as f64,
        );
        log_info!(
            "published drift scores for {} of {} features",
            scores.len(),
            Feature::ALL.len()
        );

        Ok(CycleOutcome::Published {
            drained: drained_count,
            scores,
            warnings,
        })
    }

    async fn archive_batch(&self, drained: Vec<PredictionLogEntry>) {
        let Some(archive) = self.archive.clone() else {
            return;
        };
        let result = tokio::task::spawn_blocking(move || archive.append(&drained)).await;
        match result {
            Ok(Ok(written)) => log_debug!("archived {written} predictions"),
            Ok(Err(err)) => log_warn!("failed to archive drained predictions: {err:?}"),
            Err(err) => log_warn!("archive worker join failed: {err}"),
        }
    }
}

struct PhaseReset<'a>(&'a DriftEvaluator);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        self.0.enter(DriftPhase::Idle);
    }
}

/// Scores every feature independently. A feature without usable values on
/// either side gets no score; one with fewer than two on either side gets a
/// distance but no p-value. Engine errors only affect their own feature.
pub fn compute_scores(
    reference: &ReferenceSnapshot,
    engine: &dyn StatisticsEngine,
    current: &[FeatureVector],
) -> (Vec<FeatureScore>, Vec<String>) {
    let mut scores = Vec::new();
    let mut warnings = Vec::new();

    for feature in Feature::ALL {
        let name = feature.column_name();
        let reference_values: Vec<f64> = reference
            .column(feature)
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .collect();
        let current_values: Vec<f64> = current
            .iter()
            .map(|vector| vector.get(feature))
            .filter(|value| value.is_finite())
            .collect();

        if reference_values.is_empty() || current_values.is_empty() {
            warnings.push(format!(
                "{name}: no usable values (reference {}, current {}); skipped",
                reference_values.len(),
                current_values.len()
            ));
            continue;
        }

        let distance = match isolated(|| engine.distance(&reference_values, &current_values)) {
            Ok(distance) => Some(distance),
            Err(err) => {
                warnings.push(format!("{name}: distance failed: {err}"));
                None
            }
        };

        let p_value = if reference_values.len() < 2 || current_values.len() < 2 {
            warnings.push(format!(
                "{name}: fewer than 2 values (reference {}, current {}); significance skipped",
                reference_values.len(),
                current_values.len()
            ));
            None
        } else {
            match isolated(|| engine.significance(&reference_values, &current_values)) {
                Ok(p_value) => Some(p_value),
                Err(err) => {
                    warnings.push(format!("{name}: significance failed: {err}"));
                    None
                }
            }
        };

        if distance.is_some() || p_value.is_some() {
            scores.push(FeatureScore {
                feature,
                distance,
                p_value,
            });
        }
    }

    (scores, warnings)
}

/// Runs one engine call, turning a panic into an error for that feature only.
fn isolated(call: impl FnOnce() -> Result<f64>) -> Result<f64> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| text.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(anyhow!("engine panicked: {message}"))
    })
}
