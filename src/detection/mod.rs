// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Detection module - judges completed cycles against the baseline

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{BaselineModel, NormalityVerdict};
use crate::core::{AnomalyRecord, Cycle};
use crate::error::{CycleError, Result};

/// What to do with a cycle when the baseline has no variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Fold the cycle into the baseline so the model can acquire variance
    FoldAsNormal,
    /// Report the cycle as anomalous
    FlagAnomalous,
    /// Neither report nor fold
    Skip,
}

impl Default for DegeneratePolicy {
    fn default() -> Self {
        DegeneratePolicy::FoldAsNormal
    }
}

/// What a normal cycle contributes to the baseline population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineFold {
    /// Every power value of the cycle
    Samples,
    /// The cycle's average power only
    CycleAverage,
}

impl Default for BaselineFold {
    fn default() -> Self {
        BaselineFold::Samples
    }
}

/// Verdict for one cycle, before any side effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Judgement {
    pub average_power: f64,
    pub verdict: NormalityVerdict,
    pub density: f64,
}

/// Per-device decision engine.
///
/// Owns the device's baseline; calls must be serialized per device.
#[derive(Debug, Clone)]
pub struct AnomalyEngine {
    device_label: String,
    baseline: BaselineModel,
    fold: BaselineFold,
    degenerate_policy: DegeneratePolicy,
    folded_cycles: u64,
    flagged_cycles: u64,
}

impl AnomalyEngine {
    pub fn new(device_label: &str, baseline: BaselineModel) -> Self {
        Self {
            device_label: device_label.to_string(),
            baseline,
            fold: BaselineFold::default(),
            degenerate_policy: DegeneratePolicy::default(),
            folded_cycles: 0,
            flagged_cycles: 0,
        }
    }

    pub fn with_fold(mut self, fold: BaselineFold) -> Self {
        self.fold = fold;
        self
    }

    pub fn with_degenerate_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate_policy = policy;
        self
    }

    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    pub fn baseline(&self) -> &BaselineModel {
        &self.baseline
    }

    pub fn folded_cycles(&self) -> u64 {
        self.folded_cycles
    }

    pub fn flagged_cycles(&self) -> u64 {
        self.flagged_cycles
    }

    /// Evaluate a cycle without touching the baseline
    pub fn judge(&self, cycle: &Cycle) -> Result<Judgement> {
        let average_power = cycle.average_power();
        let verdict = self.baseline.evaluate(average_power)?;
        let density = self.baseline.pdf(average_power)?;

        debug!(
            "{} cycle {} -> {}: avg={:.3}W pdf={:.6e} verdict={:?}",
            cycle.label(),
            cycle.start(),
            cycle.end(),
            average_power,
            density,
            verdict
        );

        Ok(Judgement { average_power, verdict, density })
    }

    /// Decide one cycle.
    ///
    /// Anomalous cycles yield a record and leave the baseline untouched;
    /// normal cycles are folded into it. A degenerate baseline is returned
    /// as [`CycleError::DegenerateModel`] with no side effect.
    pub fn process(&mut self, cycle: Cycle) -> Result<Option<AnomalyRecord>> {
        let judgement = self.judge(&cycle)?;
        Ok(self.apply(cycle, judgement.verdict))
    }

    /// [`process`](Self::process) with the configured degenerate-model policy applied
    pub fn handle(&mut self, cycle: Cycle) -> Option<AnomalyRecord> {
        match self.judge(&cycle) {
            Ok(judgement) => self.apply(cycle, judgement.verdict),
            Err(CycleError::DegenerateModel { population }) => {
                warn!(
                    "Baseline degenerate over {} values; applying {:?} to cycle starting {}",
                    population,
                    self.degenerate_policy,
                    cycle.start()
                );
                match self.degenerate_policy {
                    DegeneratePolicy::FoldAsNormal => self.apply(cycle, NormalityVerdict::Normal),
                    DegeneratePolicy::FlagAnomalous => {
                        self.apply(cycle, NormalityVerdict::Anomalous)
                    }
                    DegeneratePolicy::Skip => None,
                }
            }
            Err(e) => {
                warn!("Could not judge cycle starting {}: {}", cycle.start(), e);
                None
            }
        }
    }

    fn apply(&mut self, cycle: Cycle, verdict: NormalityVerdict) -> Option<AnomalyRecord> {
        match verdict {
            NormalityVerdict::Anomalous => {
                self.flagged_cycles += 1;
                info!(
                    "ANOMALOUS {} cycle for {} | {} -> {} | average power {:.2}W",
                    cycle.label(),
                    self.device_label,
                    cycle.start(),
                    cycle.end(),
                    cycle.average_power()
                );
                Some(AnomalyRecord::flagged(&self.device_label, &cycle))
            }
            NormalityVerdict::Normal => {
                self.folded_cycles += 1;
                debug!("Normal {} cycle, folding into baseline", cycle.label());
                match self.fold {
                    BaselineFold::Samples => self.baseline.update(cycle.samples()),
                    BaselineFold::CycleAverage => self.baseline.update(&[cycle.average_power()]),
                }
                None
            }
        }
    }
}
