// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Notification module - delivery of anomaly records

mod export;
mod http;

pub use export::JsonlExporter;
pub use http::HttpSink;

use async_trait::async_trait;
use tracing::warn;

use crate::core::AnomalyRecord;
use crate::error::Result;

/// Receiver of anomaly records.
///
/// Delivery is best-effort: a failure is reported to the caller, which logs
/// it and carries on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, record: &AnomalyRecord) -> Result<()>;
}

/// Writes each record to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, record: &AnomalyRecord) -> Result<()> {
        warn!(
            "Anomaly on {}: {} -> {}",
            record.device_label, record.timestamp_start, record.timestamp_end
        );
        Ok(())
    }
}
