use crate::schedule::due_slot;
use crate::types::{
    Delivery, DossierConfig, DossierError, DossierStore, FeedFetcher, Mailer, NewDelivery, Result,
    Summarizer, Summary, SummaryRequest,
};
use chrono::{DateTime, Utc};
use email_delivery::{compose_digest, DeliveryMode};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Poll period; also the width of the delivery window.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
        }
    }
}

impl SchedulerConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.poll_interval).unwrap_or_else(|_| chrono::Duration::seconds(60))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Scheduled,
    GenerateNow,
    TestSend,
}

impl RunKind {
    fn records(self) -> bool {
        !matches!(self, RunKind::TestSend)
    }

    fn mode(self) -> DeliveryMode {
        match self {
            RunKind::TestSend => DeliveryMode::Test,
            RunKind::Scheduled | RunKind::GenerateNow => DeliveryMode::Regular,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered { articles: usize },
    Failed { stage: &'static str, message: String },
}

/// Result of one configuration's scheduled run.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub config_id: Uuid,
    pub outcome: DispatchOutcome,
    /// The persisted record, absent if writing it failed.
    pub delivery: Option<Delivery>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Delivered { .. })
    }
}

/// Result of a manual trigger.
#[derive(Debug, Clone)]
pub struct ManualOutcome {
    pub success: bool,
    pub message: String,
    pub delivery: Option<Delivery>,
}

impl ManualOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            delivery: None,
        }
    }
}

/// Background runs started by the polling loop, at most one per configuration.
#[derive(Default)]
pub struct InFlightRuns {
    units: JoinSet<DispatchReport>,
    running: HashMap<task::Id, Uuid>,
}

impl InFlightRuns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub fn is_running(&self, config_id: Uuid) -> bool {
        self.running.values().any(|id| *id == config_id)
    }

    /// Collect runs that have finished since the last call.
    pub fn reap(&mut self) -> Vec<DispatchReport> {
        let mut reports = Vec::new();
        while let Some(finished) = self.units.try_join_next_with_id() {
            match finished {
                Ok((task_id, report)) => {
                    self.running.remove(&task_id);
                    debug!(config = %report.config_id, success = report.succeeded(), "Digest run finished");
                    reports.push(report);
                }
                Err(e) => {
                    let config = self.running.remove(&e.id());
                    error!(config = ?config, error = %e, "Digest run task failed");
                }
            }
        }
        reports
    }

    /// Abort every run still in flight and wait for them to unwind.
    pub async fn shutdown(&mut self) {
        if !self.running.is_empty() {
            warn!("Aborting {} in-flight digest runs", self.running.len());
        }
        self.units.shutdown().await;
        self.running.clear();
    }

    fn start<F>(&mut self, config_id: Uuid, run: F)
    where
        F: Future<Output = DispatchReport> + Send + 'static,
    {
        let handle = self.units.spawn(run);
        self.running.insert(handle.id(), config_id);
    }
}

struct RunResult {
    result: Result<Summary>,
    delivery: Option<Delivery>,
}

/// Polls active configurations and runs aggregate, summarize, compose, send
/// for each one that is due.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn DossierStore>,
    fetcher: Arc<dyn FeedFetcher>,
    summarizer: Arc<dyn Summarizer>,
    mailer: Arc<dyn Mailer>,
    config: SchedulerConfig,
    clock: fn() -> DateTime<Utc>,
}

pub struct SchedulerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop polling and abort runs still in flight.
    pub async fn stop(self) -> std::result::Result<(), JoinError> {
        let _ = self.cancel_tx.send(());
        self.join.await
    }
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn DossierStore>,
        fetcher: Arc<dyn FeedFetcher>,
        summarizer: Arc<dyn Summarizer>,
        mailer: Arc<dyn Mailer>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            summarizer,
            mailer,
            config,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock read on each tick and by manual triggers.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Start the polling loop on its own task.
    pub fn spawn(self) -> SchedulerHandle {
        let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut in_flight = InFlightRuns::new();

            info!("Scheduler started (poll every {}s)", self.config.poll_interval.as_secs());
            loop {
                tokio::select! {
                    _ = cancel_rx.recv() => {
                        info!("Scheduler shutdown requested");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.dispatch_due((self.clock)(), &mut in_flight).await;
                    }
                }
            }

            in_flight.shutdown().await;
        });

        SchedulerHandle { cancel_tx, join }
    }

    /// One background tick: reap finished runs, then start a run for every
    /// due configuration that has none in flight. Returns how many started.
    pub async fn dispatch_due(&self, now: DateTime<Utc>, in_flight: &mut InFlightRuns) -> usize {
        in_flight.reap();

        let mut started = 0;
        for config in self.due_configs(now).await {
            if in_flight.is_running(config.id) {
                debug!(config = %config.id, "Previous run still in progress");
                continue;
            }
            let id = config.id;
            let this = self.clone();
            in_flight.start(id, async move { this.run_scheduled(config, now).await });
            started += 1;
        }
        started
    }

    /// Evaluate every active configuration at `now` and run the due ones
    /// concurrently, waiting for all of them.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Vec<DispatchReport> {
        let mut units = JoinSet::new();
        for config in self.due_configs(now).await {
            let this = self.clone();
            units.spawn(async move { this.run_scheduled(config, now).await });
        }

        let mut reports = Vec::with_capacity(units.len());
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Digest run task failed"),
            }
        }
        reports
    }

    async fn due_configs(&self, now: DateTime<Utc>) -> Vec<DossierConfig> {
        let configs = match self.store.active_configs().await {
            Ok(configs) => configs,
            Err(e) => {
                error!(error = %e, "Failed to load active configurations");
                return Vec::new();
            }
        };

        let window = self.config.window();
        let mut due = Vec::new();
        for config in configs {
            let last = match self.store.latest_delivery(config.id).await {
                Ok(last) => last,
                Err(e) => {
                    warn!(config = %config.id, error = %e, "Failed to load last delivery, skipping");
                    continue;
                }
            };

            if let Some(slot) = due_slot(&config, last.as_ref(), now, window) {
                info!(config = %config.id, title = %config.title, slot = %slot, "Dossier is due");
                due.push(config);
            }
        }
        due
    }

    async fn run_scheduled(&self, config: DossierConfig, now: DateTime<Utc>) -> DispatchReport {
        let run = self.run_unit(&config, RunKind::Scheduled, now).await;
        let outcome = match &run.result {
            Ok(summary) => DispatchOutcome::Delivered {
                articles: summary.articles.len(),
            },
            Err(e) => DispatchOutcome::Failed {
                stage: e.stage(),
                message: e.to_string(),
            },
        };

        DispatchReport {
            config_id: config.id,
            outcome,
            delivery: run.delivery,
        }
    }

    /// Run the full sequence and send with a `[TEST]` subject. Nothing is recorded.
    pub async fn test_send(&self, id: Uuid) -> ManualOutcome {
        self.run_manual(id, RunKind::TestSend).await
    }

    /// Run the full sequence now and record the delivery like a scheduled run.
    pub async fn generate_now(&self, id: Uuid) -> ManualOutcome {
        self.run_manual(id, RunKind::GenerateNow).await
    }

    async fn run_manual(&self, id: Uuid, kind: RunKind) -> ManualOutcome {
        let config = match self.store.config(id).await {
            Ok(Some(config)) => config,
            Ok(None) => return ManualOutcome::failed(DossierError::NotFound { id }.to_string()),
            Err(e) => {
                error!(config = %id, error = %e, "Failed to load configuration");
                return ManualOutcome::failed(e.to_string());
            }
        };

        let run = self.run_unit(&config, kind, (self.clock)()).await;
        match run.result {
            Ok(summary) => ManualOutcome {
                success: true,
                message: format!(
                    "Sent '{}' to {} with {} articles",
                    config.title,
                    config.recipient,
                    summary.articles.len()
                ),
                delivery: run.delivery,
            },
            Err(e) => ManualOutcome {
                success: false,
                message: format!("[{}] {}", e.stage(), e),
                delivery: run.delivery,
            },
        }
    }

    async fn run_unit(&self, config: &DossierConfig, kind: RunKind, started_at: DateTime<Utc>) -> RunResult {
        let result = self.produce(config, kind.mode(), started_at).await;

        match &result {
            Ok(summary) => info!(
                config = %config.id,
                model = %summary.model,
                articles = summary.articles.len(),
                "Digest delivered to {}",
                config.recipient
            ),
            Err(e) => error!(config = %config.id, stage = e.stage(), error = %e, "Digest run failed"),
        }

        let delivery = if kind.records() {
            let record = match &result {
                Ok(summary) => NewDelivery::succeeded(config.id, started_at, summary.text.clone(), summary.articles.len()),
                Err(e) => NewDelivery::failed(config.id, started_at, e),
            };
            match self.store.record_delivery(record).await {
                Ok(delivery) => Some(delivery),
                Err(e) => {
                    error!(config = %config.id, error = %e, "Failed to record delivery");
                    None
                }
            }
        } else {
            None
        };

        RunResult { result, delivery }
    }

    async fn produce(&self, config: &DossierConfig, mode: DeliveryMode, started_at: DateTime<Utc>) -> Result<Summary> {
        let articles = self
            .fetcher
            .aggregate(&config.feed_urls, config.target_count as usize)
            .await?;
        if articles.is_empty() {
            return Err(DossierError::AggregationEmpty {
                sources: config.feed_urls.len(),
            });
        }

        let summary = self
            .summarizer
            .summarize(articles, &SummaryRequest::from(config))
            .await?;

        let message = compose_digest(config, &summary, started_at, mode)?;
        self.mailer.send(&message).await?;
        Ok(summary)
    }
}
