// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Core module - stream data types, cycle segmentation and the poll loop

mod engine;
mod scheduler;
mod segmenter;

pub use engine::{Monitor, MonitorStats, PollReport};
pub use scheduler::{Backoff, Clock, ManualClock, TokioClock};
pub use segmenter::{CycleSegmenter, DEFAULT_MIN_CYCLE_LEN};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operating state of an appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Parse the label spellings found in classified datasets (`ON`/`OFF`, `1`/`0`).
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "ON" | "1" | "TRUE" => Some(PowerState::On),
            "OFF" | "0" | "FALSE" => Some(PowerState::Off),
            _ => None,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "ON"),
            PowerState::Off => write!(f, "OFF"),
        }
    }
}

/// A single power reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub power: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, power: f64) -> Self {
        Self { timestamp, power }
    }

    pub fn labeled(self, label: PowerState) -> LabeledSample {
        LabeledSample { sample: self, label }
    }
}

/// A reading tagged with the labeler's ON/OFF decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub sample: Sample,
    pub label: PowerState,
}

impl LabeledSample {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.sample.timestamp
    }

    pub fn power(&self) -> f64 {
        self.sample.power
    }
}

/// A closed run of same-label samples.
///
/// Always holds at least one sample. Fields are private so a cycle cannot be
/// altered once the segmenter has emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    label: PowerState,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    samples: Vec<f64>,
}

impl Cycle {
    pub(crate) fn new(
        label: PowerState,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        samples: Vec<f64>,
    ) -> Self {
        debug_assert!(!samples.is_empty());
        Self { label, start, end, samples }
    }

    pub fn label(&self) -> PowerState {
        self.label
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Arithmetic mean of the cycle's power values
    pub fn average_power(&self) -> f64 {
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }
}

/// The in-progress run left in the segmenter when the stream stops.
/// It has no closing boundary and is never judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncompleteCycle {
    pub label: PowerState,
    pub start: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub samples: Vec<f64>,
}

/// Anomaly report delivered to notification sinks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub device_label: String,
    pub timestamp_start: DateTime<Utc>,
    pub timestamp_end: DateTime<Utc>,
    pub valid_anomaly: bool,
    pub action_taken: bool,
}

impl AnomalyRecord {
    /// Record for a cycle the baseline test flagged
    pub fn flagged(device_label: &str, cycle: &Cycle) -> Self {
        Self {
            device_label: device_label.to_string(),
            timestamp_start: cycle.start(),
            timestamp_end: cycle.end(),
            valid_anomaly: true,
            action_taken: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_power_state_parse() {
        assert_eq!(PowerState::parse("ON"), Some(PowerState::On));
        assert_eq!(PowerState::parse(" off "), Some(PowerState::Off));
        assert_eq!(PowerState::parse("1"), Some(PowerState::On));
        assert_eq!(PowerState::parse("0"), Some(PowerState::Off));
        assert_eq!(PowerState::parse("standby"), None);
    }

    #[test]
    fn test_cycle_average() {
        let cycle = Cycle::new(PowerState::On, ts(0), ts(30), vec![90.0, 110.0, 100.0]);
        assert!((cycle.average_power() - 100.0).abs() < 1e-12);
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_record_json_shape() {
        let cycle = Cycle::new(PowerState::On, ts(0), ts(60), vec![200.0, 210.0]);
        let record = AnomalyRecord::flagged("device12345", &cycle);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["device_label"], "device12345");
        assert_eq!(json["valid_anomaly"], true);
        assert_eq!(json["action_taken"], false);
        assert_eq!(json["timestamp_start"], "2023-11-14T22:13:20Z");
        assert_eq!(json["timestamp_end"], "2023-11-14T22:14:20Z");
    }
}
