// SQLite history: raw samples, hourly/daily rollups and the rollup watermarks.
// The writer side (sampler + rollup) uses `connect`; the query layer uses `open_read_only`.

pub mod aggregation;
pub mod query;
pub mod range;

pub use range::{RangeParams, Source, TimeRange, range_to_params};

use crate::error::{MetricsError, Result};
use crate::models::{BucketAggregate, MetricSample};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HistoryRepo {
    pool: SqlitePool,
}

impl HistoryRepo {
    /// Read-write pool; creates the file (and parent dir) if missing.
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Read-only pool over an existing store.
    /// `StoreUninitialized` when the file or its schema does not exist yet.
    #[instrument(fields(repo = "history", operation = "open_read_only"))]
    pub async fn open_read_only(path: &str, max_pool_size: u32) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(MetricsError::StoreUninitialized);
        }
        let unavailable = |e: sqlx::Error| MetricsError::SourceUnavailable(format!("{}: {}", path, e));
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))
            .map_err(unavailable)?
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await
            .map_err(unavailable)?;
        let repo = Self { pool };
        if !repo.is_initialized().await.map_err(unavailable)? {
            repo.pool.close().await;
            return Err(MetricsError::StoreUninitialized);
        }
        Ok(repo)
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metrics_raw (
                timestamp INTEGER NOT NULL,
                container_name TEXT NOT NULL,
                cpu_percent REAL NOT NULL,
                mem_usage INTEGER NOT NULL,
                rolled INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (timestamp, container_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_raw_container_timestamp ON metrics_raw(container_name, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_raw_rolled_timestamp ON metrics_raw(rolled, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        aggregation::init_aggregated_tables(&self.pool).await?;

        Ok(())
    }

    /// True once all three metric tables exist.
    pub async fn is_initialized(&self) -> sqlx::Result<bool> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('metrics_raw', 'metrics_hourly', 'metrics_daily')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(n == 3)
    }

    /// Append one batch of raw samples. Rows already present for the same
    /// (timestamp, container) are left untouched.
    #[instrument(skip(self, samples), fields(repo = "history", operation = "insert_samples", samples_count = samples.len()))]
    pub async fn insert_samples(&self, samples: &[MetricSample]) -> Result<u64> {
        if samples.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for s in samples {
            let r = sqlx::query(
                "INSERT OR IGNORE INTO metrics_raw (timestamp, container_name, cpu_percent, mem_usage) VALUES ($1, $2, $3, $4)",
            )
            .bind(s.timestamp)
            .bind(&s.container_name)
            .bind(s.cpu_percent)
            .bind(s.mem_usage)
            .execute(&mut *tx)
            .await?;
            inserted += r.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Raw samples with `timestamp >= start` (and `<= end` when given), optionally
    /// restricted to `containers`. Order: ascending by timestamp, then name.
    #[instrument(skip(self, containers), fields(repo = "history", operation = "query_raw"))]
    pub async fn query_raw(
        &self,
        start: i64,
        end: Option<i64>,
        containers: Option<&[String]>,
    ) -> Result<Vec<MetricSample>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT timestamp, container_name, cpu_percent, mem_usage FROM metrics_raw WHERE timestamp >= ",
        );
        qb.push_bind(start);
        if let Some(end) = end {
            qb.push(" AND timestamp <= ").push_bind(end);
        }
        query::push_name_filter(&mut qb, containers);
        qb.push(" ORDER BY timestamp ASC, container_name ASC");
        Ok(qb
            .build_query_as::<MetricSample>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Raw samples in [from_ts, to_ts) for aggregation.
    pub async fn raw_in_bucket(&self, from_ts: i64, to_ts: i64) -> Result<Vec<MetricSample>> {
        Ok(sqlx::query_as::<_, MetricSample>(
            "SELECT timestamp, container_name, cpu_percent, mem_usage FROM metrics_raw
             WHERE timestamp >= $1 AND timestamp < $2 ORDER BY timestamp ASC",
        )
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Raw samples before `to_ts` that no hourly bucket has consumed yet.
    /// Below the hourly watermark these are late arrivals. Order: timestamp, name.
    pub async fn unrolled_raw_before(&self, to_ts: i64) -> Result<Vec<MetricSample>> {
        Ok(sqlx::query_as::<_, MetricSample>(
            "SELECT timestamp, container_name, cpu_percent, mem_usage FROM metrics_raw
             WHERE rolled = 0 AND timestamp < $1 ORDER BY timestamp ASC, container_name ASC",
        )
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Earliest raw timestamp at or after `ts`.
    pub async fn min_raw_timestamp_from(&self, ts: i64) -> Result<Option<i64>> {
        Ok(sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MIN(timestamp) FROM metrics_raw WHERE timestamp >= $1",
        )
        .bind(ts)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Aggregate rows of `source` with bucket start in [from_ts, to_ts). Order: bucket, name.
    pub async fn aggregates_in_range(
        &self,
        source: Source,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<BucketAggregate>> {
        let col = source.time_column();
        let sql = format!(
            "SELECT {col} AS bucket, container_name, cpu_avg, cpu_max, mem_avg, mem_max, samples
             FROM {table} WHERE {col} >= $1 AND {col} < $2 ORDER BY {col} ASC, container_name ASC",
            table = source.table(),
        );
        Ok(sqlx::query_as::<_, BucketAggregate>(&sql)
            .bind(from_ts)
            .bind(to_ts)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Earliest bucket of `source` at or after `ts`.
    pub async fn min_bucket_from(&self, source: Source, ts: i64) -> Result<Option<i64>> {
        let col = source.time_column();
        let sql = format!(
            "SELECT MIN({col}) FROM {table} WHERE {col} >= $1",
            table = source.table()
        );
        Ok(sqlx::query_scalar::<_, Option<i64>>(&sql)
            .bind(ts)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Last committed bucket start for a rolled-up tier.
    pub async fn watermark(&self, source: Source) -> Result<Option<i64>> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT last_bucket FROM rollup_state WHERE resolution = $1",
        )
        .bind(source.table())
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Replace every row of one bucket and advance the watermark, atomically.
    /// On error nothing is written and the bucket stays pending.
    pub async fn commit_bucket(
        &self,
        source: Source,
        bucket: i64,
        rows: &[BucketAggregate],
    ) -> Result<()> {
        self.commit(source, bucket, rows, &[]).await
    }

    /// Like `commit_bucket` for the hourly tier, also marking the raw samples the rows
    /// were built from as rolled up so they become eligible for pruning.
    pub async fn commit_hourly(
        &self,
        bucket: i64,
        rows: &[BucketAggregate],
        consumed: &[MetricSample],
    ) -> Result<()> {
        self.commit(Source::Hourly, bucket, rows, consumed).await
    }

    #[instrument(skip(self, rows, consumed), fields(repo = "history", operation = "commit_bucket", rows_count = rows.len()))]
    async fn commit(
        &self,
        source: Source,
        bucket: i64,
        rows: &[BucketAggregate],
        consumed: &[MetricSample],
    ) -> Result<()> {
        let aggregation_err = |e: sqlx::Error| MetricsError::Aggregation {
            resolution: source.resolution_label(),
            bucket,
            source: e,
        };
        let col = source.time_column();
        let table = source.table();

        let mut tx = self.pool.begin().await.map_err(aggregation_err)?;
        sqlx::query(&format!("DELETE FROM {table} WHERE {col} = $1"))
            .bind(bucket)
            .execute(&mut *tx)
            .await
            .map_err(aggregation_err)?;
        let insert = format!(
            "INSERT INTO {table} ({col}, container_name, cpu_avg, cpu_max, mem_avg, mem_max, samples) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        );
        for r in rows {
            sqlx::query(&insert)
                .bind(bucket)
                .bind(&r.container_name)
                .bind(r.cpu_avg)
                .bind(r.cpu_max)
                .bind(r.mem_avg)
                .bind(r.mem_max)
                .bind(r.samples)
                .execute(&mut *tx)
                .await
                .map_err(aggregation_err)?;
        }
        // Mark by key: rows written after the read stay unrolled for the next pass.
        for s in consumed {
            sqlx::query(
                "UPDATE metrics_raw SET rolled = 1 WHERE timestamp = $1 AND container_name = $2",
            )
            .bind(s.timestamp)
            .bind(&s.container_name)
            .execute(&mut *tx)
            .await
            .map_err(aggregation_err)?;
        }
        sqlx::query(
            "INSERT INTO rollup_state (resolution, last_bucket) VALUES ($1, $2)
             ON CONFLICT(resolution) DO UPDATE SET last_bucket = MAX(last_bucket, excluded.last_bucket)",
        )
        .bind(table)
        .bind(bucket)
        .execute(&mut *tx)
        .await
        .map_err(aggregation_err)?;
        tx.commit().await.map_err(aggregation_err)?;
        Ok(())
    }

    /// Delete rolled-up raw rows with timestamp < cutoff. Unrolled rows are kept.
    #[instrument(skip(self), fields(repo = "history", operation = "prune_raw_before"))]
    pub async fn prune_raw_before(&self, cutoff: i64) -> Result<u64> {
        let r = sqlx::query("DELETE FROM metrics_raw WHERE timestamp < $1 AND rolled = 1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Delete rows of a rolled-up tier with bucket start < cutoff.
    #[instrument(skip(self), fields(repo = "history", operation = "prune_aggregates_before"))]
    pub async fn prune_aggregates_before(&self, source: Source, cutoff: i64) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {table} WHERE {col} < $1",
            table = source.table(),
            col = source.time_column()
        );
        let r = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await?;
        Ok(r.rows_affected())
    }

    /// Reclaim space after deletes (run periodically after pruning).
    #[instrument(skip(self), fields(repo = "history", operation = "vacuum"))]
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
