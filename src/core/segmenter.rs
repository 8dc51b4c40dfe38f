// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Streaming ON/OFF cycle segmentation
//!
//! Contiguous same-label samples form a cycle. A label change only closes the
//! running cycle once it holds at least `min_cycle_len` samples; before that
//! the new sample is merged into the run and the run adopts the new label, so
//! classifier chatter around a transition cannot fragment the stream.

use chrono::{DateTime, Utc};
use tracing::trace;

use super::{Cycle, IncompleteCycle, LabeledSample, PowerState};

/// Default minimum number of samples before a label change may close a cycle
pub const DEFAULT_MIN_CYCLE_LEN: usize = 2;

/// Turns a stream of labeled samples into discrete cycles
#[derive(Debug, Clone)]
pub struct CycleSegmenter {
    current_label: Option<PowerState>,
    buffer: Vec<f64>,
    run_start: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    min_cycle_len: usize,
}

impl CycleSegmenter {
    pub fn new() -> Self {
        Self::with_min_cycle_len(DEFAULT_MIN_CYCLE_LEN)
    }

    /// `min_cycle_len` below 1 is treated as 1.
    pub fn with_min_cycle_len(min_cycle_len: usize) -> Self {
        Self {
            current_label: None,
            buffer: Vec::new(),
            run_start: None,
            last_seen: None,
            min_cycle_len: min_cycle_len.max(1),
        }
    }

    /// Feed one sample; returns the cycle it closed, if any.
    pub fn observe(&mut self, sample: LabeledSample) -> Option<Cycle> {
        let timestamp = sample.timestamp();
        let power = sample.power();

        let (current, run_start) = match (self.current_label, self.run_start) {
            (Some(label), Some(start)) => (label, start),
            _ => {
                self.start_run(sample.label, timestamp, power);
                return None;
            }
        };
        self.last_seen = Some(timestamp);

        if sample.label == current {
            self.buffer.push(power);
            return None;
        }

        if self.buffer.len() < self.min_cycle_len {
            // Too short to be a real cycle: merge and follow the latest label.
            trace!(
                "Merging {} sample into short {} run ({} samples)",
                sample.label,
                current,
                self.buffer.len()
            );
            self.buffer.push(power);
            self.current_label = Some(sample.label);
            return None;
        }

        let samples = std::mem::replace(&mut self.buffer, vec![power]);
        self.current_label = Some(sample.label);
        self.run_start = Some(timestamp);

        Some(Cycle::new(current, run_start, timestamp, samples))
    }

    /// Label of the run currently accumulating
    pub fn current_label(&self) -> Option<PowerState> {
        self.current_label
    }

    /// Number of samples in the run currently accumulating
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Remove the in-progress run without closing it.
    ///
    /// Leaves the segmenter in its initial state.
    pub fn take_incomplete(&mut self) -> Option<IncompleteCycle> {
        let label = self.current_label.take()?;
        let start = self.run_start.take()?;
        let last_seen = self.last_seen.take().unwrap_or(start);
        let samples = std::mem::take(&mut self.buffer);

        Some(IncompleteCycle { label, start, last_seen, samples })
    }

    fn start_run(&mut self, label: PowerState, timestamp: DateTime<Utc>, power: f64) {
        self.current_label = Some(label);
        self.buffer.clear();
        self.buffer.push(power);
        self.run_start = Some(timestamp);
        self.last_seen = Some(timestamp);
    }
}

impl Default for CycleSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Sample;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use PowerState::{Off, On};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    fn feed(segmenter: &mut CycleSegmenter, labels: &[PowerState]) -> Vec<Cycle> {
        labels
            .iter()
            .enumerate()
            .filter_map(|(i, &label)| {
                let sample = Sample::new(ts(i as i64 * 10), i as f64).labeled(label);
                segmenter.observe(sample)
            })
            .collect()
    }

    #[test]
    fn test_first_sample_initialises() {
        let mut segmenter = CycleSegmenter::new();
        assert!(segmenter.current_label().is_none());

        let cycles = feed(&mut segmenter, &[On]);
        assert!(cycles.is_empty());
        assert_eq!(segmenter.current_label(), Some(On));
        assert_eq!(segmenter.pending_len(), 1);
    }

    #[test]
    fn test_boundary_closes_cycle() {
        let mut segmenter = CycleSegmenter::new();
        let cycles = feed(&mut segmenter, &[On, On, On, Off, Off]);

        assert_eq!(cycles.len(), 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.label(), On);
        assert_eq!(cycle.samples(), &[0.0, 1.0, 2.0]);
        assert_eq!(cycle.start(), ts(0));
        // The closing boundary is the first sample of the next run.
        assert_eq!(cycle.end(), ts(30));
        assert_eq!(segmenter.current_label(), Some(Off));
        assert_eq!(segmenter.pending_len(), 2);
    }

    #[test]
    fn test_lone_flicker_merges_into_next_run() {
        let mut segmenter = CycleSegmenter::new();
        let mut cycles = feed(&mut segmenter, &[On, On, Off, On, On, On]);

        // ON x2 closes at the OFF; the lone OFF then merges into the ON run.
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].label(), On);
        assert_eq!(cycles[0].len(), 2);
        assert_eq!(segmenter.current_label(), Some(On));
        assert_eq!(segmenter.pending_len(), 4);

        let closing = Sample::new(ts(60), 6.0).labeled(Off);
        cycles.extend(segmenter.observe(closing));

        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[1].label(), On);
        assert_eq!(cycles[1].samples(), &[2.0, 3.0, 4.0, 5.0]);
        assert!(cycles.iter().all(|c| c.label() == On));
    }

    #[test]
    fn test_chatter_never_closes_short_runs() {
        let mut segmenter = CycleSegmenter::new();
        // A single ON followed by alternating labels keeps merging until two accumulate.
        let cycles = feed(&mut segmenter, &[On, Off, On, Off]);

        // [On] -> merge Off (len 2, label Off) -> On closes Off run of 2.
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].label(), Off);
        assert_eq!(cycles[0].samples(), &[0.0, 1.0]);
    }

    #[test]
    fn test_take_incomplete_resets() {
        let mut segmenter = CycleSegmenter::new();
        feed(&mut segmenter, &[Off, Off, Off]);

        let incomplete = segmenter.take_incomplete().unwrap();
        assert_eq!(incomplete.label, Off);
        assert_eq!(incomplete.samples.len(), 3);
        assert_eq!(incomplete.start, ts(0));
        assert_eq!(incomplete.last_seen, ts(20));

        assert!(segmenter.current_label().is_none());
        assert_eq!(segmenter.pending_len(), 0);
        assert!(segmenter.take_incomplete().is_none());
    }

    #[test]
    fn test_custom_min_len() {
        let mut segmenter = CycleSegmenter::with_min_cycle_len(3);
        let cycles = feed(&mut segmenter, &[On, On, Off, Off, Off, On]);

        // The OFF at index 2 merges (run has 2 < 3); the run then continues as OFF.
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].label(), Off);
        assert_eq!(cycles[0].len(), 5);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let labels = [On, On, Off, On, Off, Off, Off, On, On, Off, On, On];
        let first = feed(&mut CycleSegmenter::new(), &labels);
        let second = feed(&mut CycleSegmenter::new(), &labels);
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_every_sample_in_exactly_one_cycle(
            bits in proptest::collection::vec(any::<bool>(), 0..200),
            min_len in 1usize..5,
        ) {
            let labels: Vec<PowerState> = bits.iter().map(|&b| if b { On } else { Off }).collect();
            let mut segmenter = CycleSegmenter::with_min_cycle_len(min_len);
            let cycles = feed(&mut segmenter, &labels);

            let mut seen: Vec<f64> = cycles.iter().flat_map(|c| c.samples().to_vec()).collect();
            if let Some(rest) = segmenter.take_incomplete() {
                seen.extend(rest.samples);
            }

            let expected: Vec<f64> = (0..labels.len()).map(|i| i as f64).collect();
            prop_assert_eq!(seen, expected);
            prop_assert!(cycles.iter().all(|c| !c.is_empty()));
        }
    }
}
