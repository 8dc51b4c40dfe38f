//! Ingestion module - sources of power samples

mod csv;
mod directory;
mod simulator;

pub use self::csv::*;
pub use directory::DirectorySource;
pub use simulator::{ApplianceSimulator, SimulatorProfile};

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::core::Sample;
use crate::error::{CycleError, Result};

/// A pull-based source of new samples.
///
/// `poll` must not return a sample that an earlier poll already delivered;
/// it may return an empty batch.
#[async_trait]
pub trait SampleSource: Send {
    fn name(&self) -> &str;

    async fn poll(&mut self) -> Result<Vec<Sample>>;
}

/// Replays queued batches; an empty queue polls as an empty batch.
#[derive(Debug, Default)]
pub struct MemorySource {
    batches: VecDeque<std::result::Result<Vec<Sample>, String>>,
    polls: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&mut self, batch: Vec<Sample>) -> &mut Self {
        self.batches.push_back(Ok(batch));
        self
    }

    /// Queue a poll that fails with an ingestion error
    pub fn push_failure(&mut self, message: &str) -> &mut Self {
        self.batches.push_back(Err(message.to_string()));
        self
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }

    pub fn polls(&self) -> usize {
        self.polls
    }
}

#[async_trait]
impl SampleSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn poll(&mut self) -> Result<Vec<Sample>> {
        self.polls += 1;
        match self.batches.pop_front() {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(message)) => Err(CycleError::Ingestion(message)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_memory_source_replays_in_order() {
        let sample = Sample::new(Utc.timestamp_opt(0, 0).unwrap(), 5.0);
        let mut source = MemorySource::new();
        source.push_batch(vec![sample]).push_failure("bucket unavailable");

        assert_eq!(source.poll().await.unwrap(), vec![sample]);
        assert!(matches!(source.poll().await, Err(CycleError::Ingestion(m)) if m == "bucket unavailable"));
        assert!(source.poll().await.unwrap().is_empty());
        assert_eq!(source.polls(), 3);
    }
}
