// Background worker: roll raw samples into hourly buckets, hourly into daily, then prune.
// Progress is tracked by per-tier watermarks so a failed bucket is simply retried next tick.
// Raw rows that land below the hourly watermark are folded into their committed bucket;
// raw rows are pruned only once an hourly bucket has consumed them.
// VACUUM runs on a configurable schedule (cron expression or fixed interval).

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::history_repo::aggregation::{
    DAY_SECS, HOUR_SECS, aggregate_aggregates, aggregate_samples, merge_late_samples, truncate,
};
use crate::models::MetricSample;
use crate::history_repo::{HistoryRepo, Source};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Config for the rollup worker.
#[derive(Debug, Clone)]
pub struct RollupWorkerConfig {
    pub interval_secs: u64,
    /// A bucket is rolled up only once `bucket_end + settle_secs <= now`.
    pub settle_secs: i64,
    pub raw_retention_hours: u32,
    pub hourly_retention_days: u32,
    /// Daily rows are kept forever when unset.
    pub daily_retention_days: Option<u32>,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

/// What one rollup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupReport {
    pub hourly_buckets: u32,
    /// Committed hours that took in late samples.
    pub hourly_rerolled: u32,
    pub daily_buckets: u32,
    /// Committed days rebuilt because one of their hours changed.
    pub daily_refreshed: u32,
    pub failed_tiers: u32,
    pub raw_pruned: u64,
    pub hourly_pruned: u64,
    pub daily_pruned: u64,
}

/// Spawns the rollup worker. Stops when `cancel` fires.
pub fn spawn(
    repo: Arc<HistoryRepo>,
    config: RollupWorkerConfig,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(repo, config, cancel).await;
    })
}

#[instrument(skip(repo, cancel), fields(interval_secs = config.interval_secs))]
async fn run(repo: Arc<HistoryRepo>, config: RollupWorkerConfig, cancel: CancellationToken) {
    let mut rollup_interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
    rollup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx, cancel.child_token()));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("rollup worker shutting down");
                break;
            }
            _ = rollup_interval.tick() => {
                let now = chrono::Utc::now().timestamp();
                if let Err(e) = run_one_tick(&repo, &config, now).await {
                    warn!(error = %e, "rollup tick failed");
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = repo.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
        }
    }
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(
    config: RollupWorkerConfig,
    tx: tokio::sync::mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let delay = match schedule.after(&now).next() {
                Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(1)),
                None => Duration::from_secs(3600),
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {
                    if tx.send(()).await.is_err() {
                        break;
                    }
                }
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    if tx.send(()).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Runs one rollup pass at `now` (unix seconds): raw -> hourly, hourly -> daily, prune.
/// A tier that fails stops at the failing bucket; pruning still runs against the
/// committed watermarks, so pending data is never removed.
pub async fn run_one_tick(
    repo: &HistoryRepo,
    config: &RollupWorkerConfig,
    now: i64,
) -> Result<RollupReport> {
    let mut report = RollupReport::default();
    let mut rerolled = Vec::new();

    match roll_hourly(repo, config, now, &mut rerolled).await {
        Ok(n) => report.hourly_buckets = n,
        Err(e) => {
            warn!(error = %e, resolution = "hourly", "rollup stopped; remaining buckets stay pending");
            report.failed_tiers += 1;
        }
    }
    report.hourly_rerolled = rerolled.len() as u32;

    let daily = match refresh_days(repo, config, now, &rerolled).await {
        Ok(n) => {
            report.daily_refreshed = n;
            roll_daily(repo, config, now).await
        }
        Err(e) => Err(e),
    };
    match daily {
        Ok(n) => report.daily_buckets = n,
        Err(e) => {
            warn!(error = %e, resolution = "daily", "rollup stopped; remaining buckets stay pending");
            report.failed_tiers += 1;
        }
    }

    prune(repo, config, now, &mut report).await?;

    if report.hourly_buckets > 0 || report.daily_buckets > 0 || report.hourly_rerolled > 0 {
        info!(
            hourly_buckets = report.hourly_buckets,
            hourly_rerolled = report.hourly_rerolled,
            daily_buckets = report.daily_buckets,
            daily_refreshed = report.daily_refreshed,
            raw_pruned = report.raw_pruned,
            hourly_pruned = report.hourly_pruned,
            daily_pruned = report.daily_pruned,
            "rollup complete"
        );
    }
    Ok(report)
}

/// Commits settled hours after the watermark. Hours at or below it that gained raw rows
/// since their commit are merged first and pushed onto `rerolled`.
async fn roll_hourly(
    repo: &HistoryRepo,
    config: &RollupWorkerConfig,
    now: i64,
    rerolled: &mut Vec<i64>,
) -> Result<u32> {
    let watermark = repo.watermark(Source::Hourly).await?;
    if let Some(w) = watermark {
        let mut late: BTreeMap<i64, Vec<MetricSample>> = BTreeMap::new();
        for s in repo.unrolled_raw_before(w + HOUR_SECS).await? {
            late.entry(truncate(s.timestamp, HOUR_SECS)).or_default().push(s);
        }
        for (bucket, samples) in late {
            let existing = repo
                .aggregates_in_range(Source::Hourly, bucket, bucket + HOUR_SECS)
                .await?;
            let rows = merge_late_samples(&existing, &samples, bucket);
            repo.commit_hourly(bucket, &rows, &samples).await?;
            debug!(bucket, late_samples = samples.len(), "late samples merged into committed hour");
            rerolled.push(bucket);
        }
    }

    let mut next = match watermark {
        Some(w) => w + HOUR_SECS,
        None => match repo.min_raw_timestamp_from(i64::MIN).await? {
            Some(ts) => truncate(ts, HOUR_SECS),
            None => return Ok(0),
        },
    };

    let mut committed = 0;
    while next + HOUR_SECS + config.settle_secs <= now {
        let samples = repo.raw_in_bucket(next, next + HOUR_SECS).await?;
        if samples.is_empty() {
            match repo.min_raw_timestamp_from(next + HOUR_SECS).await? {
                Some(ts) => {
                    next = truncate(ts, HOUR_SECS);
                    continue;
                }
                None => break,
            }
        }
        let rows = aggregate_samples(&samples, next);
        repo.commit_hourly(next, &rows, &samples).await?;
        committed += 1;
        next += HOUR_SECS;
    }
    Ok(committed)
}

/// End of the span the hourly tier has fully accounted for: everything before it is
/// either committed or has no raw rows.
async fn hourly_horizon(repo: &HistoryRepo, config: &RollupWorkerConfig, now: i64) -> Result<Option<i64>> {
    let Some(w) = repo.watermark(Source::Hourly).await? else {
        return Ok(None);
    };
    let covered_end = w + HOUR_SECS;
    Ok(Some(match repo.min_raw_timestamp_from(covered_end).await? {
        Some(ts) => truncate(ts, HOUR_SECS).max(covered_end),
        None => (now - config.settle_secs).max(covered_end),
    }))
}

async fn roll_daily(repo: &HistoryRepo, config: &RollupWorkerConfig, now: i64) -> Result<u32> {
    let Some(horizon) = hourly_horizon(repo, config, now).await? else {
        return Ok(0);
    };
    let mut next = match repo.watermark(Source::Daily).await? {
        Some(w) => w + DAY_SECS,
        None => match next_day_with_data(repo, i64::MIN).await? {
            Some(day) => day,
            None => return Ok(0),
        },
    };

    let mut committed = 0;
    while next + DAY_SECS <= horizon && next + DAY_SECS + config.settle_secs <= now {
        let end = next + DAY_SECS;
        let hourly = repo.aggregates_in_range(Source::Hourly, next, end).await?;
        let rows = if !hourly.is_empty() {
            aggregate_aggregates(&hourly, next)
        } else {
            let samples = repo.raw_in_bucket(next, end).await?;
            if samples.is_empty() {
                match next_day_with_data(repo, end).await? {
                    Some(day) => {
                        next = day;
                        continue;
                    }
                    None => break,
                }
            }
            aggregate_samples(&samples, next)
        };
        repo.commit_bucket(Source::Daily, next, &rows).await?;
        committed += 1;
        next = end;
    }
    Ok(committed)
}

/// Rebuilds committed days whose hours were re-rolled this pass. A day whose hourly
/// rows may already be pruned is left as it is.
async fn refresh_days(
    repo: &HistoryRepo,
    config: &RollupWorkerConfig,
    now: i64,
    hours: &[i64],
) -> Result<u32> {
    let Some(dw) = repo.watermark(Source::Daily).await? else {
        return Ok(0);
    };
    let intact_from = now - i64::from(config.hourly_retention_days) * DAY_SECS;
    let days: BTreeSet<i64> = hours
        .iter()
        .map(|h| truncate(*h, DAY_SECS))
        .filter(|d| *d <= dw)
        .collect();

    let mut refreshed = 0;
    for day in days {
        if day < intact_from {
            warn!(day, "late samples for a day past hourly retention; daily row kept");
            continue;
        }
        let hourly = repo
            .aggregates_in_range(Source::Hourly, day, day + DAY_SECS)
            .await?;
        let rows = aggregate_aggregates(&hourly, day);
        repo.commit_bucket(Source::Daily, day, &rows).await?;
        refreshed += 1;
    }
    Ok(refreshed)
}

/// Start of the first day at or after `from` holding hourly or raw rows.
async fn next_day_with_data(repo: &HistoryRepo, from: i64) -> Result<Option<i64>> {
    let hourly = repo.min_bucket_from(Source::Hourly, from).await?;
    let raw = repo.min_raw_timestamp_from(from).await?;
    Ok(match (hourly, raw) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
    .map(|ts| truncate(ts, DAY_SECS)))
}

async fn prune(
    repo: &HistoryRepo,
    config: &RollupWorkerConfig,
    now: i64,
    report: &mut RollupReport,
) -> Result<()> {
    if let Some(hw) = repo.watermark(Source::Hourly).await? {
        let cutoff = (now - i64::from(config.raw_retention_hours) * HOUR_SECS).min(hw + HOUR_SECS);
        report.raw_pruned = repo.prune_raw_before(cutoff).await?;
    }
    if let Some(dw) = repo.watermark(Source::Daily).await? {
        let cutoff =
            (now - i64::from(config.hourly_retention_days) * DAY_SECS).min(dw + DAY_SECS);
        report.hourly_pruned = repo.prune_aggregates_before(Source::Hourly, cutoff).await?;

        if let Some(days) = config.daily_retention_days {
            let cutoff = now - i64::from(days) * DAY_SECS;
            report.daily_pruned = repo.prune_aggregates_before(Source::Daily, cutoff).await?;
        }
    }
    Ok(())
}
