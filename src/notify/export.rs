//! JSON-lines export of anomaly records

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::NotificationSink;
use crate::core::AnomalyRecord;
use crate::error::{CycleError, Result};

/// Appends one JSON object per record to a file
pub struct JsonlExporter {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    written: Mutex<usize>,
}

impl JsonlExporter {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            path,
            writer: Mutex::new(None),
            written: Mutex::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        *self.written.lock()
    }

    fn append(&self, record: &AnomalyRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| CycleError::SinkDelivery(format!("encoding record: {}", e)))?;

        let mut guard = self.writer.lock();
        if guard.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            info!("Exporting anomalies to {:?}", self.path);
            *guard = Some(BufWriter::new(file));
        }

        if let Some(writer) = guard.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }

        *self.written.lock() += 1;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for JsonlExporter {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn send(&self, record: &AnomalyRecord) -> Result<()> {
        self.append(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("anomalies.jsonl");
        let exporter = JsonlExporter::new(&path).unwrap();

        let record = AnomalyRecord {
            device_label: "fridge".into(),
            timestamp_start: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            timestamp_end: Utc.with_ymd_and_hms(2024, 5, 1, 8, 3, 0).unwrap(),
            valid_anomaly: true,
            action_taken: false,
        };
        exporter.send(&record).await.unwrap();
        exporter.send(&record).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let decoded: AnomalyRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(exporter.written(), 2);
    }
}
