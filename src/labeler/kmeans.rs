//! One-dimensional two-cluster k-means labeler

use tracing::{debug, info};

use super::{FitOptions, Labeler};
use crate::core::PowerState;
use crate::error::{CycleError, Result};

/// Nearest-centroid labeler; the higher-power centroid is ON
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansLabeler {
    off_centroid: f64,
    on_centroid: f64,
    iterations: usize,
}

impl KMeansLabeler {
    /// Lloyd's algorithm with centroids initialised at the extremes,
    /// so the result is deterministic for a given training set.
    pub fn fit(data: &[f64], options: FitOptions) -> Result<Self> {
        if data.len() < 2 {
            return Err(CycleError::InsufficientData {
                required: 2,
                got: data.len(),
            });
        }

        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !min.is_finite() || !max.is_finite() {
            return Err(CycleError::InvalidInput("training data contains non-finite values".into()));
        }
        if (max - min).abs() < f64::EPSILON {
            return Err(CycleError::InvalidInput(
                "training data has a single distinct value; cannot separate ON from OFF".into(),
            ));
        }

        let mut low = min;
        let mut high = max;
        let mut iterations = 0;

        while iterations < options.max_iterations {
            iterations += 1;

            let (mut low_sum, mut low_n, mut high_sum, mut high_n) = (0.0, 0usize, 0.0, 0usize);
            for &x in data {
                if (x - low).abs() <= (x - high).abs() {
                    low_sum += x;
                    low_n += 1;
                } else {
                    high_sum += x;
                    high_n += 1;
                }
            }

            let new_low = if low_n > 0 { low_sum / low_n as f64 } else { low };
            let new_high = if high_n > 0 { high_sum / high_n as f64 } else { high };
            let shift = (new_low - low).abs().max((new_high - high).abs());

            low = new_low;
            high = new_high;

            if shift <= options.tolerance {
                break;
            }
        }

        debug!("k-means converged after {} iterations", iterations);
        info!("k-means labeler: OFF centroid {:.3}W, ON centroid {:.3}W", low, high);

        Ok(Self {
            off_centroid: low,
            on_centroid: high,
            iterations,
        })
    }

    pub fn off_centroid(&self) -> f64 {
        self.off_centroid
    }

    pub fn on_centroid(&self) -> f64 {
        self.on_centroid
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl Labeler for KMeansLabeler {
    fn name(&self) -> &'static str {
        "k-means"
    }

    fn label(&self, power: f64) -> PowerState {
        if (power - self.on_centroid).abs() < (power - self.off_centroid).abs() {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeler::fridge_trace;

    #[test]
    fn test_centroids_separate_states() {
        let labeler = KMeansLabeler::fit(&fridge_trace(), FitOptions::default()).unwrap();
        assert!((labeler.on_centroid() - 90.0).abs() < 2.0);
        assert!((labeler.off_centroid() - 1.0).abs() < 0.5);
        assert!(labeler.iterations() >= 1);
    }

    #[test]
    fn test_labels_by_nearest_centroid() {
        let labeler = KMeansLabeler::fit(&[0.0, 1.0, 2.0, 98.0, 100.0, 102.0], FitOptions::default()).unwrap();
        assert_eq!(labeler.label(80.0), PowerState::On);
        assert_eq!(labeler.label(10.0), PowerState::Off);
        // Exactly between the centroids resolves to OFF.
        assert_eq!(labeler.label(50.5), PowerState::Off);
    }

    #[test]
    fn test_rejects_unusable_training() {
        assert!(matches!(
            KMeansLabeler::fit(&[5.0], FitOptions::default()),
            Err(CycleError::InsufficientData { required: 2, got: 1 })
        ));
        assert!(matches!(
            KMeansLabeler::fit(&[5.0, 5.0, 5.0], FitOptions::default()),
            Err(CycleError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_deterministic() {
        let a = KMeansLabeler::fit(&fridge_trace(), FitOptions::default()).unwrap();
        let b = KMeansLabeler::fit(&fridge_trace(), FitOptions::default()).unwrap();
        assert_eq!(a, b);
    }
}
