//! HTTP notification sink

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::{debug, info};

use super::NotificationSink;
use crate::core::AnomalyRecord;
use crate::error::{CycleError, Result};

/// POSTs each record as JSON to an anomaly-intake endpoint
pub struct HttpSink {
    endpoint: String,
    http_client: HttpClient,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CycleError::SinkDelivery(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl NotificationSink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, record: &AnomalyRecord) -> Result<()> {
        debug!("POST {} for {}", self.endpoint, record.device_label);

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|e| CycleError::SinkDelivery(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CycleError::SinkDelivery(format!(
                "{} responded {}: {}",
                self.endpoint,
                status.as_u16(),
                body
            )));
        }

        info!("Anomaly notification delivered to {}", self.endpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;

    fn record() -> AnomalyRecord {
        AnomalyRecord {
            device_label: "device12345".into(),
            timestamp_start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            timestamp_end: Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap(),
            valid_anomaly: true,
            action_taken: false,
        }
    }

    #[tokio::test]
    async fn test_posts_json_record() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/anomalies/createAnomaly")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({
                "device_label": "device12345",
                "timestamp_start": "2024-01-01T00:00:00Z",
                "timestamp_end": "2024-01-01T00:05:00Z",
                "valid_anomaly": true,
                "action_taken": false
            })))
            .with_status(200)
            .create_async()
            .await;

        let url = format!("{}/anomalies/createAnomaly", server.url());
        let sink = HttpSink::new(url, Duration::from_secs(5)).unwrap();
        sink.send(&record()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_delivery_failure() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/anomalies/createAnomaly")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let url = format!("{}/anomalies/createAnomaly", server.url());
        let sink = HttpSink::new(url, Duration::from_secs(5)).unwrap();

        let err = sink.send(&record()).await.unwrap_err();
        assert!(matches!(err, CycleError::SinkDelivery(ref m) if m.contains("503") && m.contains("maintenance")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let sink = HttpSink::new("http://127.0.0.1:9/unreachable", Duration::from_millis(500)).unwrap();
        assert!(matches!(sink.send(&record()).await, Err(CycleError::SinkDelivery(_))));
    }
}
