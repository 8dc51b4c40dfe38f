// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Watched-directory source: each new CSV drop is delivered once

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::csv::{parse_csv, CsvLayout};
use super::SampleSource;
use crate::core::Sample;
use crate::error::{CycleError, Result};

/// Polls a directory for `*.csv` files in name order.
///
/// A file that parses is delivered once. A malformed file is rejected once
/// with a warning and skipped; the rest of the poll is still delivered. A
/// file that cannot be read stays pending and is retried on the next poll.
pub struct DirectorySource {
    dir: PathBuf,
    layout: CsvLayout,
    consumed: HashSet<PathBuf>,
    rejected: usize,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, layout: CsvLayout) -> Self {
        Self {
            dir: dir.into(),
            layout,
            consumed: HashSet::new(),
            rejected: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of files delivered (or rejected) so far
    pub fn consumed_count(&self) -> usize {
        self.consumed.len()
    }

    /// Number of malformed files skipped so far
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    async fn pending_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| CycleError::Ingestion(format!("listing {}: {}", self.dir.display(), e)))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CycleError::Ingestion(format!("listing {}: {}", self.dir.display(), e)))?
        {
            let path = entry.path();
            let is_csv = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if is_csv && !self.consumed.contains(&path) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl SampleSource for DirectorySource {
    fn name(&self) -> &str {
        "directory"
    }

    async fn poll(&mut self) -> Result<Vec<Sample>> {
        let files = self.pending_files().await?;
        if files.is_empty() {
            debug!("No new files in {:?}", self.dir);
            return Ok(Vec::new());
        }

        let mut samples = Vec::new();
        for path in files {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Cannot read {:?} ({}); retrying next poll", path, e);
                    continue;
                }
            };

            match parse_csv(&text, &self.layout) {
                Ok(rows) => {
                    info!("Ingested {} samples from {:?}", rows.len(), path.file_name().unwrap_or_default());
                    samples.extend(rows.into_iter().map(|r| r.sample));
                }
                Err(e) => {
                    warn!("Rejected {:?}: {}", path, e);
                    self.rejected += 1;
                }
            }
            self.consumed.insert(path);
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> CsvLayout {
        CsvLayout::new("Time", "Fridge")
    }

    #[tokio::test]
    async fn test_delivers_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("002.csv"),
            "Time,Fridge\n2024-01-01 00:00:20,3\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("001.csv"),
            "Time,Fridge\n2024-01-01 00:00:00,1\n2024-01-01 00:00:10,2\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = DirectorySource::new(dir.path(), layout());
        let first = source.poll().await.unwrap();
        let powers: Vec<f64> = first.iter().map(|s| s.power).collect();
        assert_eq!(powers, vec![1.0, 2.0, 3.0]);

        assert!(source.poll().await.unwrap().is_empty());

        std::fs::write(dir.path().join("003.csv"), "Time,Fridge\n2024-01-01 00:00:30,4\n").unwrap();
        let next = source.poll().await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(source.consumed_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_directory_is_ingestion_failure() {
        let mut source = DirectorySource::new("/nonexistent/cyclewatch/drop", layout());
        assert!(matches!(source.poll().await, Err(CycleError::Ingestion(_))));
    }

    #[tokio::test]
    async fn test_malformed_file_rejected_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.csv"), "Time,Other\n2024-01-01 00:00:00,1\n").unwrap();

        let mut source = DirectorySource::new(dir.path(), layout());
        assert!(source.poll().await.unwrap().is_empty());
        assert!(source.poll().await.unwrap().is_empty());
        assert_eq!(source.rejected_count(), 1);
        assert_eq!(source.consumed_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_file_keeps_good_samples() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("001.csv"),
            "Time,Fridge\n2024-01-01 00:00:00,1\n2024-01-01 00:00:10,2\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("002.csv"), "Time,Other\n2024-01-01 00:00:20,3\n").unwrap();
        std::fs::write(dir.path().join("003.csv"), "Time,Fridge\n2024-01-01 00:00:30,4\n").unwrap();

        let mut source = DirectorySource::new(dir.path(), layout());
        let powers: Vec<f64> = source.poll().await.unwrap().iter().map(|s| s.power).collect();

        assert_eq!(powers, vec![1.0, 2.0, 4.0]);
        assert_eq!(source.rejected_count(), 1);
        assert!(source.poll().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_file_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        // A directory named like a CSV cannot be read as a file
        let blocked = dir.path().join("001.csv");
        std::fs::create_dir(&blocked).unwrap();

        let mut source = DirectorySource::new(dir.path(), layout());
        assert!(source.poll().await.unwrap().is_empty());
        assert_eq!(source.consumed_count(), 0);

        std::fs::remove_dir(&blocked).unwrap();
        std::fs::write(&blocked, "Time,Fridge\n2024-01-01 00:00:00,7\n").unwrap();
        let retried = source.poll().await.unwrap();
        assert_eq!(retried.len(), 1);
        assert_eq!(source.consumed_count(), 1);
    }
}
