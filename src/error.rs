// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Error types shared by the segmentation and decision core

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the cycle-watching pipeline.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The baseline has no variance to test against.
    #[error("Degenerate baseline model: zero standard deviation over {population} values")]
    DegenerateModel { population: usize },

    #[error("Insufficient data: required {required}, got {got}")]
    InsufficientData { required: usize, got: usize },

    /// A sample arrived with a timestamp earlier than the last processed one.
    #[error("Out-of-order sample at {timestamp} (last processed {last})")]
    OrderingViolation {
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Notification delivery failed: {0}")]
    SinkDelivery(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CycleError {
    /// Whether the condition affects decision correctness (and must reach the caller)
    /// rather than being an operational failure of a collaborator.
    pub fn is_correctness_error(&self) -> bool {
        matches!(
            self,
            CycleError::DegenerateModel { .. } | CycleError::OrderingViolation { .. }
        )
    }
}

/// Result type for cycle-watching operations.
pub type Result<T> = std::result::Result<T, CycleError>;
