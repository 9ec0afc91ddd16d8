use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::features::FEATURE_COUNT;

/// In-place transform applied to the raw feature row before classification.
pub trait Preprocessor: Send + Sync {
    fn transform(&self, row: &mut [f64]) -> Result<()>;
}

/// Binary classifier over a preprocessed feature row; returns class 0 or 1.
pub trait Classifier: Send + Sync {
    fn predict(&self, row: &[f64]) -> Result<u8>;
}

fn check_width(kind: &str, expected: usize, row: &[f64]) -> Result<()> {
    if expected != row.len() {
        bail!(
            "{kind} was fitted on {expected} columns but received {}",
            row.len()
        );
    }
    Ok(())
}

/// Replaces missing (non-finite) values with the per-column median seen at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedianImputer {
    pub medians: Vec<f64>,
}

impl Preprocessor for MedianImputer {
    fn transform(&self, row: &mut [f64]) -> Result<()> {
        check_width("imputer", self.medians.len(), row)?;
        for (value, median) in row.iter_mut().zip(&self.medians) {
            if !value.is_finite() {
                *value = *median;
            }
        }
        Ok(())
    }
}

/// Standardizes each column to zero mean and unit variance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Preprocessor for StandardScaler {
    fn transform(&self, row: &mut [f64]) -> Result<()> {
        check_width("scaler", self.mean.len(), row)?;
        check_width("scaler", self.scale.len(), row)?;
        for ((value, mean), scale) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
            // Constant columns are fitted with a zero scale; they only get centered.
            let divisor = if *scale == 0.0 { 1.0 } else { *scale };
            *value = (*value - mean) / divisor;
        }
        Ok(())
    }
}

/// Logistic model: class 1 when `sigmoid(w·x + b) >= threshold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearClassifier {
    pub weights: Vec<f64>,
    pub bias: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

impl LinearClassifier {
    pub fn probability(&self, row: &[f64]) -> Result<f64> {
        check_width("classifier", self.weights.len(), row)?;
        let logit: f64 = row
            .iter()
            .zip(&self.weights)
            .map(|(value, weight)| value * weight)
            .sum::<f64>()
            + self.bias;
        Ok(1.0 / (1.0 + (-logit).exp()))
    }
}

impl Classifier for LinearClassifier {
    fn predict(&self, row: &[f64]) -> Result<u8> {
        let probability = self.probability(row)?;
        if !probability.is_finite() {
            bail!("classifier produced a non-finite probability");
        }
        Ok(u8::from(probability >= self.threshold))
    }
}

impl MedianImputer {
    pub fn identity() -> Self {
        Self {
            medians: vec![0.0; FEATURE_COUNT],
        }
    }
}

impl StandardScaler {
    pub fn identity() -> Self {
        Self {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        }
    }
}
