//! One-dimensional two-component Gaussian mixture labeler
//!
//! Fitted by expectation-maximisation under each covariance structure; the
//! structure with the lowest BIC wins.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};
use tracing::{debug, info};

use super::{FitOptions, KMeansLabeler, Labeler};
use crate::core::PowerState;
use crate::error::{CycleError, Result};

/// Variance added to every component for numerical stability
const REG_COVAR: f64 = 1e-6;

/// Covariance structure of the mixture.
///
/// In one dimension spherical, diagonal and full coincide, so only the
/// per-component and shared forms are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceType {
    Full,
    Tied,
}

impl CovarianceType {
    fn free_parameters(self) -> f64 {
        match self {
            // 2 means + 2 variances + 1 free weight
            CovarianceType::Full => 5.0,
            // 2 means + 1 shared variance + 1 free weight
            CovarianceType::Tied => 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Component {
    weight: f64,
    mean: f64,
    variance: f64,
}

impl Component {
    fn log_density(&self, x: f64) -> f64 {
        match Normal::new(self.mean, self.variance.sqrt()) {
            Ok(normal) => self.weight.ln() + normal.ln_pdf(x),
            Err(_) => f64::NEG_INFINITY,
        }
    }
}

/// Posterior-based labeler over a fitted two-component mixture
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixtureLabeler {
    off: Component,
    on: Component,
    covariance_type: CovarianceType,
    bic: f64,
}

impl GaussianMixtureLabeler {
    /// Fit both covariance structures and keep the lowest-BIC model
    pub fn fit(data: &[f64], options: FitOptions) -> Result<Self> {
        let mut best: Option<Self> = None;

        for covariance_type in [CovarianceType::Full, CovarianceType::Tied] {
            let candidate = Self::fit_with(data, covariance_type, options)?;
            debug!("GMM {:?}: BIC {:.3}", covariance_type, candidate.bic);
            if best.as_ref().map_or(true, |b| candidate.bic < b.bic) {
                best = Some(candidate);
            }
        }

        let best = best.ok_or_else(|| CycleError::InvalidInput("no mixture candidate".into()))?;
        info!(
            "GMM labeler ({:?}): OFF {:.3}W±{:.3}, ON {:.3}W±{:.3}, BIC {:.3}",
            best.covariance_type,
            best.off.mean,
            best.off.variance.sqrt(),
            best.on.mean,
            best.on.variance.sqrt(),
            best.bic
        );
        Ok(best)
    }

    /// Fit a single covariance structure
    pub fn fit_with(data: &[f64], covariance_type: CovarianceType, options: FitOptions) -> Result<Self> {
        let seed = KMeansLabeler::fit(data, options)?;
        let mut components = initial_components(data, &seed, covariance_type);

        let n = data.len() as f64;
        let mut log_likelihood = f64::NEG_INFINITY;
        let mut responsibilities = vec![[0.0f64; 2]; data.len()];

        for iteration in 0..options.max_iterations.max(1) {
            let current = e_step(data, &components, &mut responsibilities);
            m_step(data, &responsibilities, &mut components, covariance_type);

            let converged = (current - log_likelihood).abs() / n < options.tolerance;
            log_likelihood = current;
            if converged {
                debug!("EM ({:?}) converged after {} iterations", covariance_type, iteration + 1);
                break;
            }
        }

        // Score the final parameters.
        log_likelihood = e_step(data, &components, &mut responsibilities);
        if !log_likelihood.is_finite() {
            return Err(CycleError::InvalidInput("mixture likelihood is not finite".into()));
        }

        let bic = -2.0 * log_likelihood + covariance_type.free_parameters() * n.ln();
        let (off, on) = if components[0].mean <= components[1].mean {
            (components[0], components[1])
        } else {
            (components[1], components[0])
        };

        Ok(Self { off, on, covariance_type, bic })
    }

    pub fn covariance_type(&self) -> CovarianceType {
        self.covariance_type
    }

    pub fn bic(&self) -> f64 {
        self.bic
    }

    pub fn on_mean(&self) -> f64 {
        self.on.mean
    }

    pub fn off_mean(&self) -> f64 {
        self.off.mean
    }

    /// Posterior probability that `power` was drawn from the ON component
    pub fn on_probability(&self, power: f64) -> f64 {
        let on = self.on.log_density(power);
        let off = self.off.log_density(power);
        let norm = log_sum_exp(on, off);
        if norm.is_finite() {
            (on - norm).exp()
        } else if power > (self.on.mean + self.off.mean) / 2.0 {
            1.0
        } else {
            0.0
        }
    }
}

impl Labeler for GaussianMixtureLabeler {
    fn name(&self) -> &'static str {
        "gaussian-mixture"
    }

    fn label(&self, power: f64) -> PowerState {
        if self.on_probability(power) > 0.5 {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

fn initial_components(data: &[f64], seed: &KMeansLabeler, covariance_type: CovarianceType) -> [Component; 2] {
    let mut sums = [(0.0f64, 0.0f64, 0usize); 2];
    for &x in data {
        let k = match seed.label(x) {
            PowerState::Off => 0,
            PowerState::On => 1,
        };
        sums[k].0 += x;
        sums[k].1 += x * x;
        sums[k].2 += 1;
    }

    let n = data.len() as f64;
    let centroids = [seed.off_centroid(), seed.on_centroid()];
    let mut components = [0usize, 1].map(|k| {
        let (sum, sum_sq, count) = sums[k];
        let count_f = count.max(1) as f64;
        let mean = if count > 0 { sum / count_f } else { centroids[k] };
        let variance = (sum_sq / count_f - mean * mean).max(0.0) + REG_COVAR;
        Component {
            weight: (count as f64 / n).max(f64::EPSILON),
            mean,
            variance,
        }
    });

    if covariance_type == CovarianceType::Tied {
        let shared = components.iter().map(|c| c.weight * c.variance).sum::<f64>();
        for component in components.iter_mut() {
            component.variance = shared.max(REG_COVAR);
        }
    }
    components
}

/// Fills responsibilities and returns the total log-likelihood
fn e_step(data: &[f64], components: &[Component; 2], responsibilities: &mut [[f64; 2]]) -> f64 {
    let mut total = 0.0;
    for (x, r) in data.iter().zip(responsibilities.iter_mut()) {
        let a = components[0].log_density(*x);
        let b = components[1].log_density(*x);
        let norm = log_sum_exp(a, b);
        if norm.is_finite() {
            *r = [(a - norm).exp(), (b - norm).exp()];
        } else {
            *r = [0.5, 0.5];
        }
        total += norm;
    }
    total
}

fn m_step(
    data: &[f64],
    responsibilities: &[[f64; 2]],
    components: &mut [Component; 2],
    covariance_type: CovarianceType,
) {
    let n = data.len() as f64;
    let mut weighted_sq = [0.0f64; 2];

    for k in 0..2 {
        let nk: f64 = responsibilities.iter().map(|r| r[k]).sum();
        if nk < 1e-10 {
            continue;
        }
        let mean = data.iter().zip(responsibilities).map(|(x, r)| r[k] * x).sum::<f64>() / nk;
        let sq = data
            .iter()
            .zip(responsibilities)
            .map(|(x, r)| r[k] * (x - mean).powi(2))
            .sum::<f64>();

        components[k].weight = nk / n;
        components[k].mean = mean;
        components[k].variance = sq / nk + REG_COVAR;
        weighted_sq[k] = sq;
    }

    if covariance_type == CovarianceType::Tied {
        let shared = (weighted_sq[0] + weighted_sq[1]) / n + REG_COVAR;
        for component in components.iter_mut() {
            component.variance = shared;
        }
    }
}

fn log_sum_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + ((a - max).exp() + (b - max).exp()).ln()
}
