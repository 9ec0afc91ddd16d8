use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::features::{FeatureVector, RiskLabel};

use super::artifacts::{Classifier, Preprocessor};

/// A fully loaded model together with the preprocessing artifacts from the
/// same training run. Immutable once built; a newer version is a new handle.
pub struct ModelHandle {
    model: Box<dyn Classifier>,
    scaler: Box<dyn Preprocessor>,
    imputer: Box<dyn Preprocessor>,
    version: String,
    run_id: String,
    loaded_at: DateTime<Utc>,
}

impl ModelHandle {
    pub fn new(
        model: Box<dyn Classifier>,
        scaler: Box<dyn Preprocessor>,
        imputer: Box<dyn Preprocessor>,
        version: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            model,
            scaler,
            imputer,
            version: version.into(),
            run_id: run_id.into(),
            loaded_at: Utc::now(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Imputer, then scaler, then the classifier.
    pub fn classify(&self, features: &FeatureVector) -> Result<RiskLabel> {
        let mut row = features.values();
        self.imputer
            .transform(&mut row)
            .context("imputer transform failed")?;
        self.scaler
            .transform(&mut row)
            .context("scaler transform failed")?;
        let class = self.model.predict(&row).context("model prediction failed")?;
        Ok(RiskLabel::from_class(class))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("version", &self.version)
            .field("run_id", &self.run_id)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

/// Slot holding the handle every prediction reads. Readers take a cheap
/// `Arc` clone and keep using it even if a swap happens mid-request; writers
/// replace the whole handle, never its fields.
#[derive(Clone, Default)]
pub struct ActiveModel {
    slot: Arc<RwLock<Option<Arc<ModelHandle>>>>,
}

impl ActiveModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<ModelHandle>> {
        let guard = match self.slot.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    pub fn version(&self) -> Option<String> {
        self.current().map(|handle| handle.version().to_string())
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// Installs `handle` and returns the one it displaced.
    pub fn replace(&self, handle: ModelHandle) -> Option<Arc<ModelHandle>> {
        let next = Arc::new(handle);
        let mut guard = match self.slot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.replace(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinearClassifier, MedianImputer, StandardScaler};

    fn handle(version: &str, bias: f64) -> ModelHandle {
        ModelHandle::new(
            Box::new(LinearClassifier {
                weights: vec![0.0; 13],
                bias,
                threshold: 0.5,
            }),
            Box::new(StandardScaler::identity()),
            Box::new(MedianImputer::identity()),
            version,
            format!("run-{version}"),
        )
    }

    #[test]
    fn empty_slot_is_not_ready() {
        let active = ActiveModel::new();
        assert!(!active.is_ready());
        assert_eq!(active.version(), None);
    }

    #[test]
    fn readers_keep_their_snapshot_across_a_swap() {
        let active = ActiveModel::new();
        active.replace(handle("1", 5.0));
        let held = active.current().unwrap();

        let previous = active.replace(handle("2", -5.0)).unwrap();
        assert_eq!(previous.version(), "1");
        assert_eq!(held.version(), "1");
        assert_eq!(held.run_id(), "run-1");
        assert_eq!(active.version().as_deref(), Some("2"));
    }

    #[test]
    fn classify_runs_the_full_pipeline() {
        let features = FeatureVector::from_values([1.0; 13]);
        assert_eq!(handle("1", 5.0).classify(&features).unwrap(), RiskLabel::Presence);
        assert_eq!(handle("1", -5.0).classify(&features).unwrap(), RiskLabel::Absence);
    }
}
