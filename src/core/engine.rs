//! Per-device monitor - the poll loop tying source, labeler, segmenter,
//! anomaly engine and sinks together

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{AnomalyRecord, Backoff, Clock, CycleSegmenter, Sample, TokioClock};
use crate::analysis::{BaselineModel, PowerSummary};
use crate::config::Config;
use crate::db::BaselineStore;
use crate::detection::AnomalyEngine;
use crate::error::{CycleError, Result};
use crate::ingest::{
    powers, read_csv, ApplianceSimulator, CsvLayout, DirectorySource, SampleSource, SimulatorProfile,
};
use crate::labeler::{fit_labeler, Labeler};
use crate::notify::{HttpSink, JsonlExporter, LogSink, NotificationSink};

/// Simulated samples used to train the demo labeler
const DEMO_TRAINING_SAMPLES: usize = 2000;

/// Outcome of one poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    /// Samples fed through the segmenter
    pub samples: usize,
    pub dropped_out_of_order: usize,
    pub dropped_invalid: usize,
    /// Cycles closed by the segmenter
    pub cycles: usize,
    pub anomalies: Vec<AnomalyRecord>,
}

/// Running totals since the monitor was built
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub polls: u64,
    pub poll_failures: u64,
    pub samples: u64,
    pub dropped_out_of_order: u64,
    pub dropped_invalid: u64,
    pub cycles: u64,
    pub anomalies: u64,
    pub sink_failures: u64,
    pub snapshots: u64,
}

impl MonitorStats {
    fn absorb(&mut self, report: &PollReport) {
        self.polls += 1;
        self.samples += report.samples as u64;
        self.dropped_out_of_order += report.dropped_out_of_order as u64;
        self.dropped_invalid += report.dropped_invalid as u64;
        self.cycles += report.cycles as u64;
        self.anomalies += report.anomalies.len() as u64;
    }
}

/// Single-device monitor.
///
/// Owns its segmenter and baseline; nothing is shared between devices.
pub struct Monitor {
    labeler: Box<dyn Labeler>,
    segmenter: CycleSegmenter,
    engine: AnomalyEngine,
    source: Box<dyn SampleSource>,
    sinks: Vec<Box<dyn NotificationSink>>,
    store: Option<BaselineStore>,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
    last_timestamp: Option<DateTime<Utc>>,
    resume_after: Option<DateTime<Utc>>,
    snapshot_every: u64,
    folds_since_snapshot: u64,
    stats: MonitorStats,
}

impl Monitor {
    pub fn new(
        labeler: Box<dyn Labeler>,
        segmenter: CycleSegmenter,
        engine: AnomalyEngine,
        source: Box<dyn SampleSource>,
    ) -> Self {
        let interval = Duration::from_secs(10);
        Self {
            labeler,
            segmenter,
            engine,
            source,
            sinks: Vec::new(),
            store: None,
            clock: Arc::new(TokioClock),
            backoff: Backoff::new(interval, Duration::from_secs(300)),
            last_timestamp: None,
            resume_after: None,
            snapshot_every: 0,
            folds_since_snapshot: 0,
            stats: MonitorStats::default(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Persist anomalies and snapshot the baseline every `snapshot_every` folded cycles (0 = only at shutdown)
    pub fn with_store(mut self, store: BaselineStore, snapshot_every: u64) -> Self {
        self.store = Some(store);
        self.snapshot_every = snapshot_every;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timing(mut self, poll_interval: Duration, max_backoff: Duration) -> Self {
        self.backoff = Backoff::new(poll_interval, max_backoff);
        self
    }

    /// Skip every sample at or before `last_sample`, which a restored
    /// baseline already accounts for.
    pub fn with_resume_after(mut self, last_sample: DateTime<Utc>) -> Self {
        self.resume_after = Some(last_sample);
        self
    }

    /// Build a monitor from configuration: train the labeler, seed or restore
    /// the baseline, and wire the source and sinks.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let device = &config.device;
        let sigma = config.baseline.sigma;
        ensure!(
            sigma.is_finite() && sigma > 0.0,
            "baseline.sigma must be positive and finite, got {}",
            sigma
        );
        let layout = CsvLayout::new(&device.timestamp_column, &device.column)
            .with_mapping(device.mapping.clone());

        let training = match &device.training_file {
            Some(path) => {
                let rows = read_csv(path, &layout)
                    .with_context(|| format!("loading training data {:?}", path))?;
                powers(&rows)
            }
            None if config.demo_mode => ApplianceSimulator::normal_training(
                config.ingestion.simulator_seed.wrapping_add(1),
                DEMO_TRAINING_SAMPLES,
                SimulatorProfile::default(),
            )?,
            None => bail!("no training file configured and demo mode is off"),
        };

        let summary = PowerSummary::of(&training);
        info!(
            "Training data: {} samples, mean {:.2}W, range {:.2}..{:.2}W",
            summary.count, summary.mean, summary.min, summary.max
        );

        let labeler = fit_labeler(config.labeler.kind, &training, config.labeler.fit_options())
            .context("training labeler")?;
        info!("Trained {} labeler", labeler.name());

        let store = if config.database.enabled {
            Some(BaselineStore::open(&config.database.path)?)
        } else {
            None
        };

        let restored = match &store {
            Some(store) => store.load_snapshot(&device.label)?,
            None => None,
        };
        let mut resume_after = None;
        let mut baseline = match restored {
            Some(snapshot) => {
                info!(
                    "Restored baseline for {} ({} values, last sample {:?})",
                    device.label,
                    snapshot.population.len(),
                    snapshot.last_sample
                );
                resume_after = snapshot.last_sample;
                BaselineModel::from_population(&snapshot.population)
            }
            None => BaselineModel::from_population(&training),
        };
        baseline = baseline.with_sigma(sigma);
        if let Some(capacity) = config.baseline.capacity {
            baseline = baseline.with_capacity(capacity);
        }
        info!(
            "Baseline for {}: mean={:.3}W stdev={:.3}W over {} values",
            device.label,
            baseline.mean(),
            baseline.stdev(),
            baseline.len()
        );

        let engine = AnomalyEngine::new(&device.label, baseline)
            .with_fold(config.baseline.fold)
            .with_degenerate_policy(config.baseline.degenerate_policy);

        let source: Box<dyn SampleSource> = match &config.ingestion.watch_dir {
            Some(dir) => Box::new(DirectorySource::new(dir.clone(), layout)),
            None if config.demo_mode => Box::new(ApplianceSimulator::new(
                config.ingestion.simulator_seed,
                config.ingestion.simulator_batch,
                SimulatorProfile::default(),
            )?),
            None => bail!("no watch directory configured and demo mode is off"),
        };

        let mut monitor = Monitor::new(
            labeler,
            CycleSegmenter::with_min_cycle_len(config.segmentation.min_cycle_len),
            engine,
            source,
        )
        .with_timing(config.ingestion.poll_interval(), config.ingestion.max_backoff());
        if let Some(last_sample) = resume_after {
            monitor = monitor.with_resume_after(last_sample);
        }

        let notification = &config.notification;
        if notification.log_anomalies {
            monitor = monitor.with_sink(Box::new(LogSink));
        }
        if let Some(endpoint) = &notification.endpoint {
            let sink = HttpSink::new(endpoint.clone(), Duration::from_secs(notification.timeout_secs))?;
            monitor = monitor.with_sink(Box::new(sink));
        }
        if let Some(path) = &notification.export_path {
            monitor = monitor.with_sink(Box::new(JsonlExporter::new(path.clone())?));
        }
        if let Some(store) = store {
            monitor = monitor.with_store(store, config.database.snapshot_every);
        }

        Ok(monitor)
    }

    pub fn device_label(&self) -> &str {
        self.engine.device_label()
    }

    pub fn baseline(&self) -> &BaselineModel {
        self.engine.baseline()
    }

    pub fn segmenter(&self) -> &CycleSegmenter {
        &self.segmenter
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn store(&self) -> Option<&BaselineStore> {
        self.store.as_ref()
    }

    /// Reject a sample older than the last one processed, or not newer than
    /// the restored watermark
    fn check_order(&self, timestamp: DateTime<Utc>) -> Result<()> {
        if let Some(mark) = self.resume_after {
            if timestamp <= mark {
                return Err(CycleError::OrderingViolation { timestamp, last: mark });
            }
        }
        match self.last_timestamp {
            Some(last) if timestamp < last => Err(CycleError::OrderingViolation { timestamp, last }),
            _ => Ok(()),
        }
    }

    /// Feed one batch through labeler, segmenter and anomaly engine.
    ///
    /// The batch is sorted by timestamp first; samples older than anything
    /// already processed, and non-finite readings, are dropped.
    pub fn ingest(&mut self, mut batch: Vec<Sample>) -> PollReport {
        let mut report = PollReport::default();
        batch.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        for sample in batch {
            if !sample.power.is_finite() {
                warn!("Dropping non-finite reading {} at {}", sample.power, sample.timestamp);
                report.dropped_invalid += 1;
                continue;
            }
            if let Err(e) = self.check_order(sample.timestamp) {
                warn!("Dropping sample: {}", e);
                report.dropped_out_of_order += 1;
                continue;
            }
            self.last_timestamp = Some(sample.timestamp);
            report.samples += 1;

            let labeled = sample.labeled(self.labeler.label(sample.power));
            let Some(cycle) = self.segmenter.observe(labeled) else {
                continue;
            };
            report.cycles += 1;

            let folded_before = self.engine.folded_cycles();
            if let Some(record) = self.engine.handle(cycle) {
                report.anomalies.push(record);
            }
            self.folds_since_snapshot += self.engine.folded_cycles() - folded_before;
        }

        report
    }

    /// Poll the source once and process what it returned.
    ///
    /// Ingestion failures are returned to the caller; sink and storage
    /// failures are logged and counted.
    pub async fn poll_once(&mut self) -> Result<PollReport> {
        let batch = self.source.poll().await?;
        debug!("{} returned {} samples", self.source.name(), batch.len());

        let report = self.ingest(batch);
        for record in &report.anomalies {
            self.deliver(record).await;
        }
        if self.snapshot_every > 0 && self.folds_since_snapshot >= self.snapshot_every {
            self.snapshot();
        }

        self.stats.absorb(&report);
        Ok(report)
    }

    async fn deliver(&mut self, record: &AnomalyRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.store_anomaly(record) {
                warn!("Failed to store anomaly for {}: {}", record.device_label, e);
            }
        }

        for sink in &self.sinks {
            if let Err(e) = sink.send(record).await {
                warn!("Sink {} failed: {}", sink.name(), e);
                self.stats.sink_failures += 1;
            }
        }
    }

    fn snapshot(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let last_sample = self.last_timestamp.or(self.resume_after);
        match store.save_baseline(self.engine.device_label(), self.engine.baseline(), last_sample) {
            Ok(()) => {
                self.folds_since_snapshot = 0;
                self.stats.snapshots += 1;
            }
            Err(e) => warn!("Baseline snapshot failed: {}", e),
        }
    }

    /// Poll until `shutdown` becomes true, then shut down.
    ///
    /// The flag is checked between iterations; a sleep in progress is cut
    /// short when it changes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> MonitorStats {
        info!(
            "Monitoring {} from {} with {} sink(s)",
            self.engine.device_label(),
            self.source.name(),
            self.sinks.len()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(report) => {
                    self.backoff.record_success();
                    if report.cycles > 0 {
                        debug!(
                            "Poll: {} samples, {} cycles, {} anomalies",
                            report.samples,
                            report.cycles,
                            report.anomalies.len()
                        );
                    }
                }
                Err(e) => {
                    self.stats.poll_failures += 1;
                    self.backoff.record_failure();
                    warn!(
                        "Polling {} failed: {} (retrying in {:?})",
                        self.source.name(),
                        e,
                        self.backoff.delay()
                    );
                }
            }

            let clock = Arc::clone(&self.clock);
            tokio::select! {
                _ = clock.sleep(self.backoff.delay()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.shutdown();
        self.stats.clone()
    }

    /// Take the unfinished run out of the segmenter and snapshot the baseline.
    ///
    /// The unfinished run is persisted when a store is configured and
    /// discarded otherwise; it is never judged.
    pub fn shutdown(&mut self) {
        if let Some(incomplete) = self.segmenter.take_incomplete() {
            match &self.store {
                Some(store) => match store.store_incomplete(self.engine.device_label(), &incomplete) {
                    Ok(()) => info!(
                        "Persisted incomplete {} run of {} samples starting {}",
                        incomplete.label,
                        incomplete.samples.len(),
                        incomplete.start
                    ),
                    Err(e) => warn!("Failed to persist incomplete run: {}", e),
                },
                None => info!(
                    "Discarding incomplete {} run of {} samples starting {}",
                    incomplete.label,
                    incomplete.samples.len(),
                    incomplete.start
                ),
            }
        }

        self.snapshot();
        info!("Monitor for {} stopped: {:?}", self.engine.device_label(), self.stats);
    }
}
