// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::analysis::DEFAULT_SIGMA;
use crate::core::DEFAULT_MIN_CYCLE_LEN;
use crate::detection::{BaselineFold, DegeneratePolicy};
use crate::labeler::{FitOptions, LabelerKind};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated appliance)
    pub demo_mode: bool,

    /// Monitored device
    pub device: DeviceConfig,

    /// ON/OFF labeler training
    pub labeler: LabelerConfig,

    /// Cycle segmentation
    pub segmentation: SegmentationConfig,

    /// Baseline model
    pub baseline: BaselineConfig,

    /// Sample ingestion
    pub ingestion: IngestionConfig,

    /// Anomaly notification
    pub notification: NotificationConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            demo_mode: true,
            device: DeviceConfig::default(),
            labeler: LabelerConfig::default(),
            segmentation: SegmentationConfig::default(),
            baseline: BaselineConfig::default(),
            ingestion: IngestionConfig::default(),
            notification: NotificationConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("cyclewatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Label carried in anomaly records
    pub label: String,

    /// Appliance column holding the power readings
    pub column: String,

    /// Timestamp column
    pub timestamp_column: String,

    /// CSV of normal operation used to train the labeler and seed the baseline
    pub training_file: Option<PathBuf>,

    /// Raw column name -> appliance name
    pub mapping: BTreeMap<String, String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mapping = [
            ("Appliance1", "Fridge"),
            ("Appliance2", "Chest Freezer"),
            ("Appliance3", "Upright Freezer"),
            ("Appliance4", "Tumble Dryer"),
            ("Appliance5", "Washing Machine"),
            ("Appliance6", "Dishwasher"),
            ("Appliance7", "Computer Site"),
            ("Appliance8", "Television Site"),
            ("Appliance9", "Electric Heater"),
        ]
        .into_iter()
        .map(|(raw, name)| (raw.to_string(), name.to_string()))
        .collect();

        Self {
            label: "device12345".to_string(),
            column: "Fridge".to_string(),
            timestamp_column: "Time".to_string(),
            training_file: None,
            mapping,
        }
    }
}

/// Labeler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    pub kind: LabelerKind,

    /// Iteration cap for k-means and EM
    pub max_iterations: usize,

    /// Convergence tolerance
    pub tolerance: f64,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        let options = FitOptions::default();
        Self {
            kind: LabelerKind::default(),
            max_iterations: options.max_iterations,
            tolerance: options.tolerance,
        }
    }
}

impl LabelerConfig {
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }
}

/// Segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Minimum samples a run needs before a label change closes it
    pub min_cycle_len: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_cycle_len: DEFAULT_MIN_CYCLE_LEN,
        }
    }
}

/// Baseline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Width of the normal band in standard deviations
    pub sigma: f64,

    /// Keep only the newest N values
    pub capacity: Option<usize>,

    pub fold: BaselineFold,

    pub degenerate_policy: DegeneratePolicy,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
            capacity: None,
            fold: BaselineFold::default(),
            degenerate_policy: DegeneratePolicy::default(),
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Delay between polls in seconds
    pub poll_interval_secs: u64,

    /// Upper bound of the failure backoff in seconds
    pub max_backoff_secs: u64,

    /// Directory watched for new CSV batches
    pub watch_dir: Option<PathBuf>,

    /// Seed of the demo simulator
    pub simulator_seed: u64,

    /// Samples per simulated poll
    pub simulator_batch: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_backoff_secs: 300,
            watch_dir: None,
            simulator_seed: 42,
            simulator_batch: 60,
        }
    }
}

impl IngestionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Anomaly-intake URL
    pub endpoint: Option<String>,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,

    /// JSON-lines file receiving every record
    pub export_path: Option<PathBuf>,

    /// Also write records to the log
    pub log_anomalies: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
            export_path: None,
            log_anomalies: true,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Enable database storage
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,

    /// Folded cycles between baseline snapshots
    pub snapshot_every: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/cyclewatch.db"),
            snapshot_every: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.device.label = "fridge-kitchen".into();
        config.baseline.capacity = Some(5000);
        config.labeler.kind = LabelerKind::GaussianMixture;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.device.label, "fridge-kitchen");
        assert_eq!(loaded.baseline.capacity, Some(5000));
        assert_eq!(loaded.labeler.kind, LabelerKind::GaussianMixture);
        assert_eq!(loaded.device.mapping.get("Appliance1").map(String::as_str), Some("Fridge"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            app_name = "CycleWatch"
            data_dir = "./data"
            demo_mode = false

            [baseline]
            sigma = 2.5
            fold = "cycle_average"

            [ingestion]
            poll_interval_secs = 30
            "#,
        )
        .unwrap();

        assert!(!config.demo_mode);
        assert_eq!(config.baseline.sigma, 2.5);
        assert_eq!(config.baseline.fold, BaselineFold::CycleAverage);
        assert_eq!(config.baseline.degenerate_policy, DegeneratePolicy::FoldAsNormal);
        assert_eq!(config.ingestion.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.ingestion.max_backoff_secs, 300);
        assert_eq!(config.segmentation.min_cycle_len, 2);
        assert_eq!(config.device.column, "Fridge");
        assert_eq!(config.database.path, PathBuf::from("./data/cyclewatch.db"));
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        let reloaded = Config::load_or_create(&path).unwrap();
        assert_eq!(reloaded.device.label, created.device.label);
        assert_eq!(reloaded.database.snapshot_every, 10);
    }
}
