// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! ON/OFF labelers
//!
//! A labeler is trained once on normal-operation power values and then maps
//! each incoming reading to [`PowerState::On`] or [`PowerState::Off`].

mod evaluation;
mod gmm;
mod kmeans;

pub use evaluation::*;
pub use gmm::{CovarianceType, GaussianMixtureLabeler};
pub use kmeans::KMeansLabeler;

use serde::{Deserialize, Serialize};

use crate::core::PowerState;
use crate::error::Result;

/// Maps a raw power reading to a binary state
pub trait Labeler: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn label(&self, power: f64) -> PowerState;
}

/// Labeler variant, chosen at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelerKind {
    KMeans,
    GaussianMixture,
}

impl Default for LabelerKind {
    fn default() -> Self {
        LabelerKind::KMeans
    }
}

/// Iteration limits shared by the fitting routines
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

/// Train the selected labeler on normal-operation power values
pub fn fit_labeler(kind: LabelerKind, training: &[f64], options: FitOptions) -> Result<Box<dyn Labeler>> {
    Ok(match kind {
        LabelerKind::KMeans => Box::new(KMeansLabeler::fit(training, options)?),
        LabelerKind::GaussianMixture => Box::new(GaussianMixtureLabeler::fit(training, options)?),
    })
}

/// Fixed-threshold labeler: ON at or above `threshold` watts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdLabeler {
    pub threshold: f64,
}

impl Labeler for ThresholdLabeler {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn label(&self, power: f64) -> PowerState {
        if power >= self.threshold {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

#[cfg(test)]
pub(crate) fn fridge_trace() -> Vec<f64> {
    // Compressor ON around 90W, idle around 1W, deterministic jitter.
    (0..120)
        .map(|i| {
            let jitter = ((i * 37) % 11) as f64 / 10.0 - 0.5;
            if (i / 20) % 2 == 0 {
                90.0 + 4.0 * jitter
            } else {
                1.0 + 0.4 * jitter
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_each_kind() {
        let training = fridge_trace();
        for kind in [LabelerKind::KMeans, LabelerKind::GaussianMixture] {
            let labeler = fit_labeler(kind, &training, FitOptions::default()).unwrap();
            assert_eq!(labeler.label(92.0), PowerState::On, "{}", labeler.name());
            assert_eq!(labeler.label(0.8), PowerState::Off, "{}", labeler.name());
        }
    }

    #[test]
    fn test_threshold_labeler() {
        let labeler = ThresholdLabeler { threshold: 20.0 };
        assert_eq!(labeler.label(20.0), PowerState::On);
        assert_eq!(labeler.label(19.9), PowerState::Off);
    }
}
