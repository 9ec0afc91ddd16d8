use std::collections::BTreeMap;

use crate::features::Feature;

pub const FEATURE_VALUE_GAUGE: &str = "heartwatch_prediction_feature_value";
pub const DRIFT_DISTANCE_GAUGE: &str = "heartwatch_drift_distance";
pub const DRIFT_P_VALUE_GAUGE: &str = "heartwatch_drift_p_value";
pub const DRIFT_CYCLE_GAUGE: &str = "heartwatch_drift_last_cycle_timestamp_seconds";
pub const DRIFT_SAMPLE_GAUGE: &str = "heartwatch_drift_current_sample_size";
pub const MODEL_INFO_GAUGE: &str = "heartwatch_model_info";

pub(super) fn help_text(name: &str) -> Option<&'static str> {
    match name {
        FEATURE_VALUE_GAUGE => Some("Raw input value of the most recent prediction."),
        DRIFT_DISTANCE_GAUGE => {
            Some("Wasserstein distance between the reference and recent samples.")
        }
        DRIFT_P_VALUE_GAUGE => Some("Kolmogorov-Smirnov p-value for reference vs recent samples."),
        DRIFT_CYCLE_GAUGE => Some("Unix time of the last drift evaluation that published scores."),
        DRIFT_SAMPLE_GAUGE => Some("Number of logged predictions compared in the last drift cycle."),
        MODEL_INFO_GAUGE => Some("Version of the model currently serving predictions."),
        _ => None,
    }
}

/// The two scores the drift evaluator publishes per feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriftMetricKind {
    Distance,
    Significance,
}

impl DriftMetricKind {
    pub fn gauge_name(&self) -> &'static str {
        match self {
            DriftMetricKind::Distance => DRIFT_DISTANCE_GAUGE,
            DriftMetricKind::Significance => DRIFT_P_VALUE_GAUGE,
        }
    }
}

/// Gauge identity: metric name plus label set. Ordering is name first, then
/// labels, which is the order the exposition is rendered in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GaugeKey {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl GaugeKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn feature_value(feature: Feature) -> Self {
        Self::new(FEATURE_VALUE_GAUGE).with_label("feature", feature.metric_name())
    }

    pub fn drift(feature: Feature, kind: DriftMetricKind) -> Self {
        Self::new(kind.gauge_name()).with_label("feature", feature.metric_name())
    }
}
