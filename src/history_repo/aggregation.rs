// Rollup: schema for the aggregate tables + pure bucket aggregation logic.
// DB access (read bucket, commit, prune) stays in history_repo::mod.

use std::collections::BTreeMap;

use crate::models::{BucketAggregate, MetricSample};
use sqlx::SqlitePool;

pub const HOUR_SECS: i64 = 3600;
pub const DAY_SECS: i64 = 86_400;

/// Creates metrics_hourly, metrics_daily and the rollup watermark table if not present.
pub async fn init_aggregated_tables(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics_hourly (
            hour INTEGER NOT NULL,
            container_name TEXT NOT NULL,
            cpu_avg REAL NOT NULL,
            cpu_max REAL NOT NULL,
            mem_avg REAL NOT NULL,
            mem_max REAL NOT NULL,
            samples INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (hour, container_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics_daily (
            day INTEGER NOT NULL,
            container_name TEXT NOT NULL,
            cpu_avg REAL NOT NULL,
            cpu_max REAL NOT NULL,
            mem_avg REAL NOT NULL,
            mem_max REAL NOT NULL,
            samples INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (day, container_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Last committed bucket start per resolution; buckets after it are pending.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS rollup_state (resolution TEXT PRIMARY KEY, last_bucket INTEGER NOT NULL)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Start of the bucket containing `ts` (UTC, unix seconds).
pub fn truncate(ts: i64, bucket_secs: i64) -> i64 {
    ts.div_euclid(bucket_secs) * bucket_secs
}

/// Group raw samples by container and compute avg/max of cpu and memory.
/// Output is ordered by container name. Empty input gives an empty vec.
pub fn aggregate_samples(samples: &[MetricSample], bucket: i64) -> Vec<BucketAggregate> {
    let mut by_name: BTreeMap<&str, Vec<&MetricSample>> = BTreeMap::new();
    for s in samples {
        by_name.entry(&s.container_name).or_default().push(s);
    }
    by_name
        .into_iter()
        .map(|(name, refs)| {
            let cpu: Vec<f64> = refs.iter().map(|s| s.cpu_percent).collect();
            let mem: Vec<f64> = refs.iter().map(|s| s.mem_usage as f64).collect();
            BucketAggregate {
                bucket,
                container_name: name.to_string(),
                cpu_avg: mean_f64(&cpu),
                cpu_max: max_f64(&cpu),
                mem_avg: mean_f64(&mem),
                mem_max: max_f64(&mem),
                samples: refs.len() as i64,
            }
        })
        .collect()
}

/// Roll finer aggregates (hourly) into one coarser bucket (day):
/// mean of the averages, max of the maxima.
pub fn aggregate_aggregates(rows: &[BucketAggregate], bucket: i64) -> Vec<BucketAggregate> {
    let mut by_name: BTreeMap<&str, Vec<&BucketAggregate>> = BTreeMap::new();
    for r in rows {
        by_name.entry(&r.container_name).or_default().push(r);
    }
    by_name
        .into_iter()
        .map(|(name, refs)| BucketAggregate {
            bucket,
            container_name: name.to_string(),
            cpu_avg: mean_f64(&refs.iter().map(|r| r.cpu_avg).collect::<Vec<_>>()),
            cpu_max: max_f64(&refs.iter().map(|r| r.cpu_max).collect::<Vec<_>>()),
            mem_avg: mean_f64(&refs.iter().map(|r| r.mem_avg).collect::<Vec<_>>()),
            mem_max: max_f64(&refs.iter().map(|r| r.mem_max).collect::<Vec<_>>()),
            samples: refs.iter().map(|r| r.samples).sum(),
        })
        .collect()
}

/// Fold samples that arrived after `bucket` was committed into its existing rows.
/// Averages are weighted by sample count, maxima take the larger value.
pub fn merge_late_samples(
    existing: &[BucketAggregate],
    late: &[MetricSample],
    bucket: i64,
) -> Vec<BucketAggregate> {
    let mut by_name: BTreeMap<String, BucketAggregate> = existing
        .iter()
        .map(|r| (r.container_name.clone(), BucketAggregate { bucket, ..r.clone() }))
        .collect();
    for fresh in aggregate_samples(late, bucket) {
        let Some(cur) = by_name.get_mut(&fresh.container_name) else {
            by_name.insert(fresh.container_name.clone(), fresh);
            continue;
        };
        let (a, b) = (cur.samples.max(0) as f64, fresh.samples as f64);
        let weighted = |x: f64, y: f64| (x * a + y * b) / (a + b);
        cur.cpu_avg = weighted(cur.cpu_avg, fresh.cpu_avg);
        cur.mem_avg = weighted(cur.mem_avg, fresh.mem_avg);
        cur.cpu_max = cur.cpu_max.max(fresh.cpu_max);
        cur.mem_max = cur.mem_max.max(fresh.mem_max);
        cur.samples = cur.samples.max(0) + fresh.samples;
    }
    by_name.into_values().collect()
}

fn mean_f64(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}

fn max_f64(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}
