//! Descriptive statistics over power values

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Arithmetic mean; `None` for an empty slice
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().mean())
}

/// Sample standard deviation (divisor `n - 1`); `None` below two values
pub fn sample_std_dev(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    Some(data.iter().std_dev())
}

/// Summary of a training column, logged when the baseline is seeded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl PowerSummary {
    pub fn of(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self::default();
        }

        Self {
            count: data.len(),
            mean: mean(data).unwrap_or(0.0),
            std_dev: sample_std_dev(data).unwrap_or(0.0),
            min: data.iter().copied().fold(f64::INFINITY, f64::min),
            max: data.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}
