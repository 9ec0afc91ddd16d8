mod types;

pub use types::{
    DriftMetricKind, GaugeKey, DRIFT_CYCLE_GAUGE, DRIFT_DISTANCE_GAUGE, DRIFT_P_VALUE_GAUGE,
    DRIFT_SAMPLE_GAUGE, FEATURE_VALUE_GAUGE, MODEL_INFO_GAUGE,
};

use std::{fmt::Write as _, sync::Arc};

use dashmap::DashMap;

use crate::features::{Feature, FeatureVector};

/// Last-value gauges shared by the prediction path, the drift loop and the
/// reloader. Each key updates independently; scrapes only read.
#[derive(Clone, Default)]
pub struct GaugeRegistry {
    inner: Arc<DashMap<GaugeKey, f64>>,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: GaugeKey, value: f64) {
        self.inner.insert(key, value);
    }

    pub fn get(&self, key: &GaugeKey) -> Option<f64> {
        self.inner.get(key).map(|entry| *entry.value())
    }

    pub fn record_features(&self, features: &FeatureVector) {
        for (feature, value) in features.iter() {
            self.set(GaugeKey::feature_value(feature), value);
        }
    }

    pub fn record_drift(&self, feature: Feature, kind: DriftMetricKind, value: f64) {
        self.set(GaugeKey::drift(feature, kind), value);
    }

    pub fn drift_score(&self, feature: Feature, kind: DriftMetricKind) -> Option<f64> {
        self.get(&GaugeKey::drift(feature, kind))
    }

    /// Number of drift scores currently published, across features and kinds.
    pub fn drift_score_count(&self) -> usize {
        self.inner
            .iter()
            .filter(|entry| {
                entry.key().name == DRIFT_DISTANCE_GAUGE || entry.key().name == DRIFT_P_VALUE_GAUGE
            })
            .count()
    }

    pub fn record_model_version(&self, version: &str) {
        self.inner.retain(|key, _| {
            key.name != MODEL_INFO_GAUGE
                || key.labels.get("version").map(String::as_str) == Some(version)
        });
        self.set(
            GaugeKey::new(MODEL_INFO_GAUGE).with_label("version", version),
            1.0,
        );
    }

    /// Plain-text exposition of every gauge, sorted so that two scrapes of
    /// unchanged state are byte-identical.
    pub fn render(&self) -> String {
        let mut samples: Vec<(GaugeKey, f64)> = self
            .inner
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        samples.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = String::new();
        let mut current_name: Option<&str> = None;
        for (key, value) in &samples {
            if current_name != Some(key.name.as_str()) {
                if let Some(help) = types::help_text(&key.name) {
                    let _ = writeln!(out, "# HELP {} {}", key.name, help);
                }
                let _ = writeln!(out, "# TYPE {} gauge", key.name);
                current_name = Some(key.name.as_str());
            }
            out.push_str(&key.name);
            if !key.labels.is_empty() {
                let labels: Vec<String> = key
                    .labels
                    .iter()
                    .map(|(name, value)| format!("{name}=\"{}\"", escape_label(value)))
                    .collect();
                let _ = write!(out, "{{{}}}", labels.join(","));
            }
            let _ = writeln!(out, " {}", format_value(*value));
        }
        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_groups_and_sorts_samples() {
        let gauges = GaugeRegistry::new();
        gauges.record_drift(Feature::MaxHr, DriftMetricKind::Distance, 1.25);
        gauges.record_drift(Feature::Age, DriftMetricKind::Distance, 0.5);
        gauges.record_drift(Feature::Age, DriftMetricKind::Significance, 0.03);

        let text = gauges.render();
        let expected = "\
# HELP heartwatch_drift_distance Wasserstein distance between the reference and recent samples.
# TYPE heartwatch_drift_distance gauge
heartwatch_drift_distance{feature=\"age\"} 0.5
heartwatch_drift_distance{feature=\"max_hr\"} 1.25
# HELP heartwatch_drift_p_value Kolmogorov-Smirnov p-value for reference vs recent samples.
# TYPE heartwatch_drift_p_value gauge
heartwatch_drift_p_value{feature=\"age\"} 0.03
";
        assert_eq!(text, expected);
    }

    #[test]
    fn scrapes_without_writes_are_identical() {
        let gauges = GaugeRegistry::new();
        gauges.record_features(&FeatureVector::from_values([3.0; 13]));
        gauges.record_model_version("7");
        assert_eq!(gauges.render(), gauges.render());
    }

    #[test]
    fn later_write_replaces_value() {
        let gauges = GaugeRegistry::new();
        gauges.record_drift(Feature::Bp, DriftMetricKind::Significance, 0.9);
        gauges.record_drift(Feature::Bp, DriftMetricKind::Significance, 0.1);
        assert_eq!(
            gauges.drift_score(Feature::Bp, DriftMetricKind::Significance),
            Some(0.1)
        );
        assert_eq!(gauges.drift_score_count(), 1);
    }

    #[test]
    fn model_info_keeps_only_the_current_version() {
        let gauges = GaugeRegistry::new();
        gauges.record_model_version("1");
        gauges.record_model_version("2");
        let text = gauges.render();
        assert!(text.contains("heartwatch_model_info{version=\"2\"} 1"));
        assert!(!text.contains("version=\"1\""));
    }

    #[test]
    fn non_finite_values_use_exposition_spelling() {
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(2.0), "2");
    }
}
