// Dashboard queries: history series and top consumers.
// Reads the history store when it exists and falls back to a live sample when it does not.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{instrument, warn};

use crate::error::{MetricsError, Result};
use crate::history_repo::query::HistoryRow;
use crate::history_repo::{HistoryRepo, TimeRange};
use crate::models::{
    ContainerPoint, DataSourceKind, HistoryPoint, HistoryResponse, Metric, TopConsumer,
    TopResponse,
};
use crate::sampler::Sampler;

pub const DEFAULT_TOP_LIMIT: u32 = 5;
pub const MAX_TOP_LIMIT: u32 = 100;

const NO_HISTORY_MESSAGE: &str = "No historical data yet. Metrics are recorded on every sampler tick.";
const LIVE_TOP_MESSAGE: &str = "Using live data. Historical data becomes available once samples are recorded.";
const NO_DATA_MESSAGE: &str = "No data available";

/// Where a query's numbers come from.
#[derive(Clone)]
pub enum MetricsSource {
    Historical(Arc<HistoryRepo>),
    Live(Arc<Sampler>),
}

/// Parses `limit`; missing or malformed gives the default, then clamped to 1..=100.
pub fn parse_limit(s: Option<&str>) -> u32 {
    s.and_then(|s| s.trim().parse::<i64>().ok())
        .map_or(DEFAULT_TOP_LIMIT, |n| n.clamp(1, i64::from(MAX_TOP_LIMIT)) as u32)
}

/// Splits `a,b,,c` into names, dropping empties. `None` when nothing remains.
pub fn parse_containers(s: Option<&str>) -> Option<Vec<String>> {
    let names: Vec<String> = s?
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect();
    (!names.is_empty()).then_some(names)
}

pub struct MetricsQuery {
    /// None when the history database is disabled; every query then runs live.
    db_path: Option<String>,
    max_pool_size: u32,
    timeout: Duration,
    sampler: Arc<Sampler>,
    store: OnceCell<Arc<HistoryRepo>>,
}

impl MetricsQuery {
    pub fn new(
        db_path: Option<String>,
        max_pool_size: u32,
        timeout: Duration,
        sampler: Arc<Sampler>,
    ) -> Self {
        Self {
            db_path,
            max_pool_size,
            timeout,
            sampler,
            store: OnceCell::new(),
        }
    }

    /// Historical once the store exists with its schema, live until then.
    pub async fn source(&self) -> Result<MetricsSource> {
        if let Some(repo) = self.store.get() {
            return Ok(MetricsSource::Historical(repo.clone()));
        }
        let Some(path) = self.db_path.as_deref() else {
            return Ok(MetricsSource::Live(self.sampler.clone()));
        };
        match self.bounded(HistoryRepo::open_read_only(path, self.max_pool_size)).await {
            Ok(repo) => {
                let repo = self.store.get_or_init(|| async { Arc::new(repo) }).await;
                Ok(MetricsSource::Historical(repo.clone()))
            }
            Err(MetricsError::StoreUninitialized) => Ok(MetricsSource::Live(self.sampler.clone())),
            Err(e) => Err(e),
        }
    }

    /// History series for `range` (fallback 24h), optionally filtered by container name.
    #[instrument(skip(self, containers), fields(operation = "history"))]
    pub async fn history(
        &self,
        range: Option<&str>,
        containers: Option<&[String]>,
    ) -> Result<HistoryResponse> {
        let range = TimeRange::parse(range);
        let params = range.params(chrono::Utc::now().timestamp());
        let mut response = HistoryResponse {
            range: range.label().to_string(),
            resolution: params.source.resolution_label().to_string(),
            data: Vec::new(),
            message: None,
        };
        match self.source().await? {
            MetricsSource::Historical(repo) => {
                let rows = self.bounded(repo.history_rows(&params, containers)).await?;
                response.data = group_by_timestamp(rows);
            }
            MetricsSource::Live(_) => {
                response.message = Some(NO_HISTORY_MESSAGE.to_string());
            }
        }
        Ok(response)
    }

    /// Top `limit` containers by `metric` over `range`, highest average first.
    #[instrument(skip(self), fields(operation = "top"))]
    pub async fn top(&self, range: Option<&str>, metric: Metric, limit: u32) -> Result<TopResponse> {
        let range = TimeRange::parse(range);
        let limit = limit.clamp(1, MAX_TOP_LIMIT);
        match self.source().await? {
            MetricsSource::Historical(repo) => {
                let params = range.params(chrono::Utc::now().timestamp());
                let top = self
                    .bounded(repo.top_consumers(&params, metric, limit))
                    .await?;
                Ok(TopResponse {
                    range: range.label().to_string(),
                    metric,
                    top,
                    source: DataSourceKind::Historical,
                    message: None,
                })
            }
            MetricsSource::Live(sampler) => Ok(live_top(&sampler, range, metric, limit).await),
        }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| MetricsError::Timeout(self.timeout))?
    }
}

async fn live_top(sampler: &Sampler, range: TimeRange, metric: Metric, limit: u32) -> TopResponse {
    match sampler.sample().await {
        Ok(fleet) => {
            let mut top: Vec<TopConsumer> = fleet
                .containers
                .iter()
                .map(|c| {
                    let value = match metric {
                        Metric::Cpu => c.cpu,
                        Metric::Memory => c.memory_usage as f64,
                    };
                    TopConsumer {
                        container: c.name.clone(),
                        avg: value,
                        max: value,
                    }
                })
                .collect();
            top.sort_by(|a, b| b.avg.total_cmp(&a.avg));
            top.truncate(limit as usize);
            TopResponse {
                range: "live".to_string(),
                metric,
                top,
                source: DataSourceKind::Live,
                message: Some(LIVE_TOP_MESSAGE.to_string()),
            }
        }
        Err(e) => {
            warn!(error = %e, "live top consumers failed");
            TopResponse {
                range: range.label().to_string(),
                metric,
                top: Vec::new(),
                source: DataSourceKind::Live,
                message: Some(NO_DATA_MESSAGE.to_string()),
            }
        }
    }
}

/// Rows ordered by timestamp become one point per timestamp.
fn group_by_timestamp(rows: Vec<HistoryRow>) -> Vec<HistoryPoint> {
    let mut by_ts: BTreeMap<i64, BTreeMap<String, ContainerPoint>> = BTreeMap::new();
    for row in rows {
        by_ts.entry(row.ts).or_default().insert(
            row.container_name,
            ContainerPoint {
                cpu: row.cpu,
                mem: row.mem,
            },
        );
    }
    by_ts
        .into_iter()
        .map(|(timestamp, containers)| HistoryPoint {
            timestamp,
            containers,
        })
        .collect()
}
