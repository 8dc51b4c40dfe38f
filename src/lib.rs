// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! CycleWatch - Streaming appliance cycle monitor
//!
//! Turns per-appliance power readings into ON/OFF operating cycles and flags
//! cycles whose average power leaves the 3σ band of a continuously updated
//! baseline of normal operation.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                           Monitor                              │
//! ├────────────────────────────────────────────────────────────────┤
//! │  ┌────────┐  ┌─────────┐  ┌───────────┐  ┌───────────────┐     │
//! │  │ Source │→ │ Labeler │→ │ Segmenter │→ │ AnomalyEngine │     │
//! │  └────────┘  └─────────┘  └───────────┘  └───────────────┘     │
//! │                                             ↓          ↓       │
//! │                                      ┌──────────┐ ┌─────────┐  │
//! │                                      │ Baseline │ │  Sinks  │  │
//! │                                      │  Store   │ │         │  │
//! │                                      └──────────┘ └─────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod config;
pub mod core;
pub mod db;
pub mod detection;
pub mod error;
pub mod ingest;
pub mod labeler;
pub mod notify;

// Re-exports for convenience
pub use analysis::{BaselineModel, NormalityVerdict};
pub use config::Config;
pub use core::{AnomalyRecord, Cycle, CycleSegmenter, LabeledSample, Monitor, PowerState, Sample};
pub use db::BaselineStore;
pub use detection::{AnomalyEngine, BaselineFold, DegeneratePolicy};
pub use error::{CycleError, Result};
pub use labeler::{GaussianMixtureLabeler, KMeansLabeler, Labeler, LabelerKind};

/// CycleWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CycleWatch name
pub const NAME: &str = "CycleWatch";
