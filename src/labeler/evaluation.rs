//! Scoring a labeler against ground-truth labels

use serde::{Deserialize, Serialize};

use super::Labeler;
use crate::core::PowerState;
use crate::error::{CycleError, Result};

/// Classification metric, with ON as the positive class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    Precision,
    F1,
}

/// Binary confusion counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_on: usize,
    pub false_on: usize,
    pub true_off: usize,
    pub false_off: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(predicted: &[PowerState], truth: &[PowerState]) -> Result<Self> {
        if predicted.len() != truth.len() {
            return Err(CycleError::InvalidInput(format!(
                "{} predictions for {} ground-truth labels",
                predicted.len(),
                truth.len()
            )));
        }

        let mut matrix = Self::default();
        for (p, t) in predicted.iter().zip(truth) {
            match (p, t) {
                (PowerState::On, PowerState::On) => matrix.true_on += 1,
                (PowerState::On, PowerState::Off) => matrix.false_on += 1,
                (PowerState::Off, PowerState::Off) => matrix.true_off += 1,
                (PowerState::Off, PowerState::On) => matrix.false_off += 1,
            }
        }
        Ok(matrix)
    }

    pub fn total(&self) -> usize {
        self.true_on + self.false_on + self.true_off + self.false_off
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_on + self.true_off, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_on, self.true_on + self.false_on)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_on, self.true_on + self.false_off)
    }

    pub fn f1(&self) -> f64 {
        ratio(2 * self.true_on, 2 * self.true_on + self.false_on + self.false_off)
    }

    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Accuracy => self.accuracy(),
            Metric::Precision => self.precision(),
            Metric::F1 => self.f1(),
        }
    }
}

/// Label `powers` and score the result against `truth`
pub fn evaluate(labeler: &dyn Labeler, powers: &[f64], truth: &[PowerState], metric: Metric) -> Result<f64> {
    let predicted: Vec<PowerState> = powers.iter().map(|&p| labeler.label(p)).collect();
    Ok(ConfusionMatrix::from_labels(&predicted, truth)?.score(metric))
}

// Zero-denominator metrics score 0, as ill-defined precision does in common tooling.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
