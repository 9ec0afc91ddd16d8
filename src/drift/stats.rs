use anyhow::{bail, Result};

/// Two-sample comparison used by the drift evaluator. Inputs are finite
/// values only; callers filter missing data first.
pub trait StatisticsEngine: Send + Sync {
    /// Distance between the two empirical distributions. Needs one value per side.
    fn distance(&self, reference: &[f64], current: &[f64]) -> Result<f64>;

    /// Probability that both samples come from the same distribution. Needs
    /// two values per side.
    fn significance(&self, reference: &[f64], current: &[f64]) -> Result<f64>;
}

/// Wasserstein-1 distance and the two-sample Kolmogorov-Smirnov test with
/// the asymptotic p-value.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmpiricalEngine;

impl StatisticsEngine for EmpiricalEngine {
    fn distance(&self, reference: &[f64], current: &[f64]) -> Result<f64> {
        if reference.is_empty() || current.is_empty() {
            bail!("wasserstein distance needs at least one value per sample");
        }
        let reference = sorted(reference);
        let current = sorted(current);
        Ok(wasserstein(&reference, &current))
    }

    fn significance(&self, reference: &[f64], current: &[f64]) -> Result<f64> {
        if reference.len() < 2 || current.len() < 2 {
            bail!("ks test needs at least two values per sample");
        }
        let reference = sorted(reference);
        let current = sorted(current);
        let statistic = ks_statistic(&reference, &current);
        let n = reference.len() as f64;
        let m = current.len() as f64;
        let effective = (n * m / (n + m)).sqrt();
        Ok(kolmogorov_survival((effective + 0.12 + 0.11 / effective) * statistic))
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut values = values.to_vec();
    values.sort_by(f64::total_cmp);
    values
}

/// Integral of |F_ref - F_cur| over the merged support.
fn wasserstein(reference: &[f64], current: &[f64]) -> f64 {
    let mut merged: Vec<f64> = reference.iter().chain(current).copied().collect();
    merged.sort_by(f64::total_cmp);

    let n = reference.len() as f64;
    let m = current.len() as f64;
    let (mut i, mut j) = (0usize, 0usize);
    let mut total = 0.0;
    for window in merged.windows(2) {
        let (x, next) = (window[0], window[1]);
        while i < reference.len() && reference[i] <= x {
            i += 1;
        }
        while j < current.len() && current[j] <= x {
            j += 1;
        }
        total += (i as f64 / n - j as f64 / m).abs() * (next - x);
    }
    total
}

fn ks_statistic(reference: &[f64], current: &[f64]) -> f64 {
    let n = reference.len() as f64;
    let m = current.len() as f64;
    let (mut i, mut j) = (0usize, 0usize);
    let mut max_gap: f64 = 0.0;
    while i < reference.len() && j < current.len() {
        let x = reference[i].min(current[j]);
        while i < reference.len() && reference[i] <= x {
            i += 1;
        }
        while j < current.len() && current[j] <= x {
            j += 1;
        }
        max_gap = max_gap.max((i as f64 / n - j as f64 / m).abs());
    }
    max_gap
}

/// Q_KS(λ) = 2 Σ (-1)^(k-1) exp(-2 k² λ²), clamped to [0, 1].
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=100 {
        let k = k as f64;
        let term = sign * (-2.0 * k * k * lambda * lambda).exp();
        sum += term;
        if term.abs() < 1e-12 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_samples_have_zero_distance_and_high_p_value() {
        let sample = [1.0, 2.0, 3.0, 4.0, 5.0];
        let engine = EmpiricalEngine;
        assert_eq!(engine.distance(&sample, &sample).unwrap(), 0.0);
        assert!(engine.significance(&sample, &sample).unwrap() > 0.99);
    }

    #[test]
    fn shifted_sample_distance_equals_shift() {
        let reference = [1.0, 2.0, 3.0];
        let current = [3.0, 4.0, 5.0];
        let distance = EmpiricalEngine.distance(&reference, &current).unwrap();
        assert!((distance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn single_values_use_their_gap() {
        let distance = EmpiricalEngine.distance(&[10.0], &[13.5]).unwrap();
        assert!((distance - 3.5).abs() < 1e-12);
    }

    #[test]
    fn disjoint_samples_are_significant() {
        let reference: Vec<f64> = (0..50).map(f64::from).collect();
        let current: Vec<f64> = (100..150).map(f64::from).collect();
        let p_value = EmpiricalEngine.significance(&reference, &current).unwrap();
        assert!(p_value < 1e-6, "p = {p_value}");
    }

    #[test]
    fn small_samples_are_rejected_for_significance() {
        assert!(EmpiricalEngine.significance(&[1.0], &[1.0, 2.0]).is_err());
        assert!(EmpiricalEngine.distance(&[], &[1.0]).is_err());
    }

    #[test]
    fn ks_statistic_of_disjoint_samples_is_one() {
        assert_eq!(ks_statistic(&[1.0, 2.0], &[3.0, 4.0]), 1.0);
    }
}
