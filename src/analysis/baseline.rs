// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Gaussian baseline of normal-operation power

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};
use tracing::debug;

use super::statistics::{mean, sample_std_dev};
use crate::error::{CycleError, Result};

/// Default width of the normality band, in standard deviations
pub const DEFAULT_SIGMA: f64 = 3.0;

/// Outcome of the sigma-band test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalityVerdict {
    Normal,
    Anomalous,
}

/// Mean and sample standard deviation over a population of normal values.
///
/// `mean` and `stdev` are always recomputed from the whole retained
/// population; with a capacity bound only the newest `capacity` values are
/// retained.
#[derive(Debug, Clone)]
pub struct BaselineModel {
    population: VecDeque<f64>,
    mean: f64,
    stdev: f64,
    sigma: f64,
    capacity: Option<usize>,
}

impl BaselineModel {
    /// Empty model; every evaluation is degenerate until it holds varied data.
    pub fn new() -> Self {
        Self {
            population: VecDeque::new(),
            mean: 0.0,
            stdev: 0.0,
            sigma: DEFAULT_SIGMA,
            capacity: None,
        }
    }

    /// Model seeded with an initial population
    pub fn from_population(values: &[f64]) -> Self {
        let mut model = Self::new();
        model.update(values);
        model
    }

    /// Bound the population to the newest `capacity` values (sliding window).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(2));
        self.trim();
        self.recompute();
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        self.stdev
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.population.len()
    }

    pub fn is_empty(&self) -> bool {
        self.population.is_empty()
    }

    pub fn population(&self) -> Vec<f64> {
        self.population.iter().copied().collect()
    }

    /// Sigma-band normality test.
    ///
    /// Fails with [`CycleError::DegenerateModel`] while the standard deviation
    /// is zero; the caller picks the fallback.
    pub fn evaluate(&self, value: f64) -> Result<NormalityVerdict> {
        self.ensure_variance()?;

        let band = self.sigma * self.stdev;
        if value > self.mean + band || value < self.mean - band {
            Ok(NormalityVerdict::Anomalous)
        } else {
            Ok(NormalityVerdict::Normal)
        }
    }

    /// Fold new values into the population and recompute the statistics.
    ///
    /// With fewer than two values in total the standard deviation is zero.
    pub fn update(&mut self, new_values: &[f64]) {
        self.population.extend(new_values.iter().copied());
        self.trim();
        self.recompute();
        debug!(
            "Baseline updated: n={} mean={:.4} stdev={:.4}",
            self.population.len(),
            self.mean,
            self.stdev
        );
    }

    /// Gaussian density at `value` under the current parameters (diagnostic only)
    pub fn pdf(&self, value: f64) -> Result<f64> {
        self.ensure_variance()?;
        let normal = Normal::new(self.mean, self.stdev)
            .map_err(|e| CycleError::InvalidInput(format!("normal distribution: {}", e)))?;
        Ok(normal.pdf(value))
    }

    /// Distance of `value` from the mean in standard deviations
    pub fn z_score(&self, value: f64) -> Result<f64> {
        self.ensure_variance()?;
        Ok((value - self.mean) / self.stdev)
    }

    fn ensure_variance(&self) -> Result<()> {
        if self.stdev > 0.0 && self.stdev.is_finite() {
            Ok(())
        } else {
            Err(CycleError::DegenerateModel {
                population: self.population.len(),
            })
        }
    }

    fn trim(&mut self) {
        if let Some(capacity) = self.capacity {
            while self.population.len() > capacity {
                self.population.pop_front();
            }
        }
    }

    fn recompute(&mut self) {
        let (first, second) = self.population.as_slices();
        if second.is_empty() {
            self.mean = mean(first).unwrap_or(0.0);
            self.stdev = sample_std_dev(first).unwrap_or(0.0);
        } else {
            let values: Vec<f64> = self.population.iter().copied().collect();
            self.mean = mean(&values).unwrap_or(0.0);
            self.stdev = sample_std_dev(&values).unwrap_or(0.0);
        }
    }
}

impl Default for BaselineModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POPULATION: [f64; 5] = [100.0, 102.0, 98.0, 101.0, 99.0];

    fn model() -> BaselineModel {
        BaselineModel::from_population(&POPULATION)
    }

    #[test]
    fn test_seeded_statistics() {
        let model = model();
        assert!((model.mean() - 100.0).abs() < 1e-12);
        assert!((model.stdev() - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(model.len(), 5);
    }

    #[test]
    fn test_mean_is_always_normal() {
        let model = model();
        assert_eq!(model.evaluate(model.mean()).unwrap(), NormalityVerdict::Normal);
    }

    #[test]
    fn test_three_sigma_boundary() {
        let model = model();
        let (m, s) = (model.mean(), model.stdev());

        assert_eq!(model.evaluate(m + 3.01 * s).unwrap(), NormalityVerdict::Anomalous);
        assert_eq!(model.evaluate(m + 2.99 * s).unwrap(), NormalityVerdict::Normal);
        assert_eq!(model.evaluate(m - 3.01 * s).unwrap(), NormalityVerdict::Anomalous);
        assert_eq!(model.evaluate(m - 2.99 * s).unwrap(), NormalityVerdict::Normal);
    }

    #[test]
    fn test_custom_sigma() {
        let model = model().with_sigma(1.0);
        let s = model.stdev();
        assert_eq!(model.evaluate(100.0 + 1.5 * s).unwrap(), NormalityVerdict::Anomalous);
    }

    #[test]
    fn test_update_recomputes_from_full_population() {
        let mut model = model();
        model.update(&[110.0, 95.0]);

        let all = [100.0, 102.0, 98.0, 101.0, 99.0, 110.0, 95.0];
        let expected_mean = all.iter().sum::<f64>() / all.len() as f64;
        let expected_var = all.iter().map(|x| (x - expected_mean).powi(2)).sum::<f64>()
            / (all.len() - 1) as f64;

        assert_eq!(model.len(), 7);
        assert!((model.mean() - expected_mean).abs() < 1e-9);
        assert!((model.stdev() - expected_var.sqrt()).abs() < 1e-9);

        // Same population, same answer regardless of how it was built.
        let rebuilt = BaselineModel::from_population(&all);
        assert!((rebuilt.mean() - model.mean()).abs() < 1e-9);
        assert!((rebuilt.stdev() - model.stdev()).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_model() {
        let model = BaselineModel::from_population(&[50.0, 50.0, 50.0]);
        assert_eq!(model.stdev(), 0.0);
        assert!(matches!(
            model.evaluate(50.0),
            Err(CycleError::DegenerateModel { population: 3 })
        ));
        assert!(model.pdf(50.0).is_err());
    }

    #[test]
    fn test_empty_and_single_value() {
        let mut model = BaselineModel::new();
        assert!(model.evaluate(1.0).is_err());

        model.update(&[42.0]);
        assert_eq!(model.mean(), 42.0);
        assert_eq!(model.stdev(), 0.0);
        assert!(model.stdev() >= 0.0);

        model.update(&[44.0]);
        assert!(model.evaluate(43.0).is_ok());
    }

    #[test]
    fn test_z_score() {
        let model = model();
        let z = model.z_score(100.0 + 2.0 * model.stdev()).unwrap();
        assert!((z - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_pdf_peaks_at_mean() {
        let model = model();
        let peak = model.pdf(100.0).unwrap();
        let expected = 1.0 / (model.stdev() * (2.0 * std::f64::consts::PI).sqrt());
        assert!((peak - expected).abs() < 1e-12);
        assert!(model.pdf(105.0).unwrap() < peak);
    }

    #[test]
    fn test_capacity_slides_window() {
        let mut model = BaselineModel::from_population(&[1.0, 2.0, 3.0]).with_capacity(3);
        model.update(&[4.0, 5.0]);

        assert_eq!(model.population(), vec![3.0, 4.0, 5.0]);
        assert!((model.mean() - 4.0).abs() < 1e-12);
        assert!((model.stdev() - 1.0).abs() < 1e-12);
    }
}
