// Background sampler worker.
// Collection runs in the worker; persistence runs in a dedicated history writer task (channel).

use crate::error::Result;
use crate::history_repo::HistoryRepo;
use crate::models::{LiveSnapshot, MetricSample, SystemMetrics};
use crate::sampler::Sampler;
use crate::sysinfo_repo::SysinfoRepo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, Instant, interval};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Rate limit for "no receivers" message (avoid logging every tick when no one is on /ws/live)
const NO_RECEIVERS_WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Channel capacity for the sample writer (backpressure if writer falls behind).
pub fn writer_channel_capacity(flush_rate: u64) -> usize {
    (flush_rate as usize * 2).max(32)
}

/// Sampler, host metrics and output channels for the worker.
pub struct WorkerDeps {
    pub sampler: Arc<Sampler>,
    pub sysinfo_repo: Arc<SysinfoRepo>,
    pub tx: broadcast::Sender<LiveSnapshot>,
    /// None when the history database is disabled.
    pub write_tx: Option<mpsc::Sender<Vec<MetricSample>>>,
    pub ws_live_connections: Arc<AtomicUsize>,
    pub samples_saved_total: Arc<AtomicU64>,
}

/// Worker timing and logging config.
pub struct WorkerConfig {
    pub interval_secs: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Writer config: batching for the dedicated history writer task.
pub struct HistoryWriterConfig {
    /// Flush after this many sampler ticks have been buffered.
    pub flush_rate: u64,
    pub flush_interval_secs: u64,
}

/// Samples the fleet and the host once. Host metrics failures degrade to an
/// "unknown" record; only a failed container listing fails the snapshot.
pub async fn live_snapshot(
    sampler: &Sampler,
    sysinfo_repo: &SysinfoRepo,
) -> Result<(LiveSnapshot, Vec<MetricSample>)> {
    let now = chrono::Utc::now();
    let fleet = sampler.sample().await?;
    let samples = fleet.metric_samples(now.timestamp());
    let timestamp = now.to_rfc3339();
    let system = match sysinfo_repo.get_system_metrics().await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, operation = "get_system_metrics", "system metrics failed");
            SystemMetrics::unknown(timestamp.clone())
        }
    };
    Ok((
        LiveSnapshot {
            containers: fleet.containers,
            security: fleet.security,
            system,
            timestamp,
        },
        samples,
    ))
}

impl WorkerDeps {
    /// One sampler tick: snapshot, broadcast to live clients, hand samples to the writer.
    /// Returns the number of samples produced.
    pub async fn run_one_tick(&self) -> Result<usize> {
        let (snapshot, samples) = live_snapshot(&self.sampler, &self.sysinfo_repo).await?;
        let n = samples.len();

        // Err only means no /ws/live client is subscribed.
        let _ = self.tx.send(snapshot);

        if let Some(write_tx) = &self.write_tx
            && !samples.is_empty()
            && write_tx.send(samples).await.is_err()
        {
            tracing::debug!("History writer channel closed");
        }
        Ok(n)
    }
}

/// Spawns the background task that receives sample batches from the worker and flushes to the DB.
/// Flushes when `flush_rate` batches are buffered, or every flush_interval_secs, or when channel closes.
/// When the worker drops its sender, this task flushes remaining and exits.
pub fn spawn_history_writer(
    mut write_rx: mpsc::Receiver<Vec<MetricSample>>,
    history_repo: Arc<HistoryRepo>,
    config: HistoryWriterConfig,
    samples_saved_total: Arc<AtomicU64>,
) -> tokio::task::JoinHandle<()> {
    let flush_interval = Duration::from_secs(config.flush_interval_secs);
    tokio::spawn(async move {
        let mut buffer: Vec<MetricSample> = Vec::new();
        let mut pending_batches: u64 = 0;
        let mut flush_tick = interval(flush_interval);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = write_rx.recv() => {
                    match result {
                        Some(batch) => {
                            buffer.extend(batch);
                            pending_batches += 1;
                            if pending_batches >= config.flush_rate {
                                pending_batches = 0;
                                if let Err(e) = flush_buffer(&history_repo, &mut buffer, &samples_saved_total).await {
                                    tracing::warn!(error = %e, "history writer: insert_samples failed");
                                }
                            }
                        }
                        None => break,
                    }
                }
                _ = flush_tick.tick() => {
                    pending_batches = 0;
                    if let Err(e) = flush_buffer(&history_repo, &mut buffer, &samples_saved_total).await {
                        tracing::warn!(error = %e, "history writer: insert_samples failed");
                    }
                }
            }
        }
        if let Err(e) = flush_buffer(&history_repo, &mut buffer, &samples_saved_total).await {
            tracing::warn!(error = %e, "history writer: final flush failed");
        }
        tracing::debug!("History writer shutting down");
    })
}

async fn flush_buffer(
    history_repo: &HistoryRepo,
    buffer: &mut Vec<MetricSample>,
    samples_saved_total: &AtomicU64,
) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    let n = buffer.len();
    let inserted = history_repo.insert_samples(buffer).await?;
    samples_saved_total.fetch_add(inserted, Ordering::Relaxed);
    buffer.clear();
    tracing::debug!(
        operation = "insert_samples",
        samples_count = n,
        inserted,
        "Samples saved"
    );
    Ok(())
}

/// Spawns the sampler loop. Stops when `cancel` fires; dropping the deps closes the
/// writer channel so the history writer drains and exits.
pub fn spawn(
    deps: WorkerDeps,
    config: WorkerConfig,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let WorkerConfig {
        interval_secs,
        stats_log_interval_secs,
    } = config;

    let worker_span = tracing::span!(tracing::Level::DEBUG, "worker", interval_secs);
    tokio::spawn(
        async move {
            let mut tick = interval(Duration::from_secs(interval_secs));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
            stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            let mut ticks_failed_total: u64 = 0;
            let mut last_no_receivers_log: Option<Instant> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Worker shutting down");
                        break;
                    }
                    _ = tick.tick() => {
                        if deps.tx.receiver_count() == 0
                            && last_no_receivers_log.is_none_or(|t| t.elapsed() >= NO_RECEIVERS_WARN_INTERVAL)
                        {
                            tracing::debug!(
                                operation = "broadcast_snapshot",
                                "No active WebSocket clients; broadcast channel has no receivers"
                            );
                            last_no_receivers_log = Some(Instant::now());
                        }
                        if let Err(e) = deps.run_one_tick().await {
                            ticks_failed_total += 1;
                            tracing::warn!(error = %e, operation = "sample", "sampler tick skipped");
                        }
                    }
                    _ = stats_log_tick.tick() => {
                        tracing::info!(
                            ws_live_clients = deps.ws_live_connections.load(Ordering::Relaxed),
                            samples_saved_total = deps.samples_saved_total.load(Ordering::Relaxed),
                            ticks_failed_total,
                            "app stats"
                        );
                    }
                }
            }
        }
        .instrument(worker_span),
    )
}
