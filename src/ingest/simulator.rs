// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Appliance simulator for demo/testing
//!
//! Produces refrigerator-like traffic: compressor ON periods around a rated
//! power, idle OFF periods near zero, Gaussian noise, and occasional
//! anomalous ON periods at an elevated draw.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;

use super::SampleSource;
use crate::core::{PowerState, Sample};
use crate::error::{CycleError, Result};

/// Shape of the simulated appliance
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorProfile {
    pub on_power: f64,
    pub off_power: f64,
    pub noise: f64,
    pub on_samples: (usize, usize),
    pub off_samples: (usize, usize),
    pub anomaly_probability: f64,
    /// Multiplier applied to `on_power` during an anomalous ON period
    pub anomaly_factor: f64,
    pub interval_secs: i64,
}

impl Default for SimulatorProfile {
    fn default() -> Self {
        Self {
            on_power: 90.0,
            off_power: 1.0,
            noise: 2.0,
            on_samples: (15, 25),
            off_samples: (30, 50),
            anomaly_probability: 0.05,
            anomaly_factor: 2.5,
            interval_secs: 8,
        }
    }
}

/// Seeded, deterministic power-trace generator
pub struct ApplianceSimulator {
    profile: SimulatorProfile,
    rng: ChaCha8Rng,
    noise: Normal<f64>,
    batch_size: usize,
    next_timestamp: DateTime<Utc>,
    state: PowerState,
    remaining: usize,
    anomalous: bool,
}

impl ApplianceSimulator {
    pub fn new(seed: u64, batch_size: usize, profile: SimulatorProfile) -> Result<Self> {
        let noise = Normal::new(0.0, profile.noise)
            .map_err(|e| CycleError::InvalidInput(format!("simulator noise: {}", e)))?;
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| CycleError::InvalidInput("simulator start time".into()))?;

        let mut simulator = Self {
            profile,
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise,
            batch_size: batch_size.max(1),
            next_timestamp: start,
            state: PowerState::Off,
            remaining: 0,
            anomalous: false,
        };
        simulator.enter(PowerState::Off);
        Ok(simulator)
    }

    /// Generate the next `count` samples
    pub fn generate(&mut self, count: usize) -> Vec<Sample> {
        (0..count).map(|_| self.next_sample()).collect()
    }

    /// Power values of `count` samples with anomalies disabled, for seeding a baseline
    pub fn normal_training(seed: u64, count: usize, profile: SimulatorProfile) -> Result<Vec<f64>> {
        let profile = SimulatorProfile {
            anomaly_probability: 0.0,
            ..profile
        };
        let mut simulator = Self::new(seed, count, profile)?;
        Ok(simulator.generate(count).into_iter().map(|s| s.power).collect())
    }

    fn next_sample(&mut self) -> Sample {
        if self.remaining == 0 {
            let next = match self.state {
                PowerState::On => PowerState::Off,
                PowerState::Off => PowerState::On,
            };
            self.enter(next);
        }
        self.remaining -= 1;

        let level = match self.state {
            PowerState::On if self.anomalous => self.profile.on_power * self.profile.anomaly_factor,
            PowerState::On => self.profile.on_power,
            PowerState::Off => self.profile.off_power,
        };
        let noise_scale = match self.state {
            PowerState::On => 1.0,
            PowerState::Off => 0.1,
        };
        let power = (level + noise_scale * self.noise.sample(&mut self.rng)).max(0.0);

        let sample = Sample::new(self.next_timestamp, power);
        self.next_timestamp += ChronoDuration::seconds(self.profile.interval_secs);
        sample
    }

    fn enter(&mut self, state: PowerState) {
        let (lo, hi) = match state {
            PowerState::On => self.profile.on_samples,
            PowerState::Off => self.profile.off_samples,
        };
        self.state = state;
        self.remaining = self.rng.gen_range(lo.max(1)..=hi.max(lo.max(1)));
        self.anomalous = state == PowerState::On && self.rng.gen::<f64>() < self.profile.anomaly_probability;
    }
}

#[async_trait]
impl SampleSource for ApplianceSimulator {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn poll(&mut self) -> Result<Vec<Sample>> {
        let count = self.batch_size;
        Ok(self.generate(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_output_is_reproducible() {
        let mut a = ApplianceSimulator::new(7, 10, SimulatorProfile::default()).unwrap();
        let mut b = ApplianceSimulator::new(7, 10, SimulatorProfile::default()).unwrap();
        assert_eq!(a.generate(200), b.generate(200));
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut sim = ApplianceSimulator::new(1, 10, SimulatorProfile::default()).unwrap();
        let samples = sim.generate(100);
        assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(samples.iter().all(|s| s.power >= 0.0));
    }

    #[test]
    fn test_normal_training_has_no_anomalies() {
        let profile = SimulatorProfile::default();
        let ceiling = profile.on_power + 10.0 * profile.noise;
        let powers = ApplianceSimulator::normal_training(3, 2_000, profile).unwrap();
        assert_eq!(powers.len(), 2_000);
        assert!(powers.iter().all(|&p| p < ceiling));
        assert!(powers.iter().any(|&p| p > 50.0));
        assert!(powers.iter().any(|&p| p < 5.0));
    }

    #[tokio::test]
    async fn test_poll_returns_batch() {
        let mut sim = ApplianceSimulator::new(1, 25, SimulatorProfile::default()).unwrap();
        assert_eq!(sim.poll().await.unwrap().len(), 25);
    }
}
