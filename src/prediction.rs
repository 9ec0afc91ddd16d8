use serde::Serialize;

use crate::features::{FeatureVector, RiskLabel, UnknownChoice};
use crate::metrics::GaugeRegistry;
use crate::model::ActiveModel;
use crate::prediction_log::{PredictionLog, PredictionLogEntry};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "heartwatch::prediction";

use crate::{log_debug, log_error};

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("model is not ready yet")]
    NotReady,
    #[error(transparent)]
    InvalidInput(#[from] UnknownChoice),
    #[error("prediction failed: {0:#}")]
    Inference(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: RiskLabel,
    pub text: &'static str,
    pub model_version: String,
}

/// The request-facing path: classify with whatever handle is active, then
/// publish the inputs to the gauges and the prediction log.
#[derive(Clone)]
pub struct Predictor {
    model: ActiveModel,
    gauges: GaugeRegistry,
    log: PredictionLog,
}

impl Predictor {
    pub fn new(model: ActiveModel, gauges: GaugeRegistry, log: PredictionLog) -> Self {
        Self { model, gauges, log }
    }

    pub fn model(&self) -> &ActiveModel {
        &self.model
    }

    pub async fn predict(&self, features: FeatureVector) -> Result<Prediction, PredictError> {
        let handle = self.model.current().ok_or(PredictError::NotReady)?;
        let label = handle
            .classify(&features)
            .map_err(PredictError::Inference)?;

        self.gauges.record_features(&features);

        // A lost log row only weakens the next drift check; the caller still
        // gets the answer.
        if let Err(err) = self
            .log
            .append(PredictionLogEntry::new(features, label))
            .await
        {
            log_error!("failed to log prediction: {err:?}");
        }

        log_debug!(
            "predicted {} with model version {}",
            label.as_str(),
            handle.version()
        );

        Ok(Prediction {
            label,
            text: label.display_text(),
            model_version: handle.version().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use crate::metrics::GaugeKey;
    use crate::model::{LinearClassifier, MedianImputer, ModelHandle, StandardScaler};

    fn constant_model(bias: f64) -> ModelHandle {
        ModelHandle::new(
            Box::new(LinearClassifier {
                weights: vec![0.0; 13],
                bias,
                threshold: 0.5,
            }),
            Box::new(StandardScaler::identity()),
            Box::new(MedianImputer::identity()),
            "3",
            "run-3",
        )
    }

    #[tokio::test]
    async fn not_ready_without_model() {
        let log = PredictionLog::in_memory();
        let predictor = Predictor::new(ActiveModel::new(), GaugeRegistry::new(), log.clone());
        let err = predictor
            .predict(FeatureVector::from_values([1.0; 13]))
            .await
            .unwrap_err();
        assert!(matches!(err, PredictError::NotReady));
        assert_eq!(log.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn publishes_gauges_and_logs_entry() {
        let model = ActiveModel::new();
        model.replace(constant_model(-4.0));
        let gauges = GaugeRegistry::new();
        let log = PredictionLog::in_memory();
        let predictor = Predictor::new(model, gauges.clone(), log.clone());

        let mut values = [1.0; 13];
        values[Feature::Cholesterol.index()] = 233.0;
        let prediction = predictor
            .predict(FeatureVector::from_values(values))
            .await
            .unwrap();

        assert_eq!(prediction.label, RiskLabel::Absence);
        assert_eq!(prediction.text, "Berisiko Rendah (Absence)");
        assert_eq!(prediction.model_version, "3");
        assert_eq!(
            gauges.get(&GaugeKey::feature_value(Feature::Cholesterol)),
            Some(233.0)
        );
        let drained = log.drain_all().await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].label, RiskLabel::Absence);
    }
}
