// Persisted samples, rolled-up buckets and the history/top-N response shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One raw row: a container's usage at one poll tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub timestamp: i64,
    pub container_name: String,
    pub cpu_percent: f64,
    pub mem_usage: i64,
}

/// One rolled-up row for a bucket (hour or day) and container.
/// `bucket` is the bucket start in unix seconds; `samples` counts the raw rows behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BucketAggregate {
    pub bucket: i64,
    pub container_name: String,
    pub cpu_avg: f64,
    pub cpu_max: f64,
    pub mem_avg: f64,
    pub mem_max: f64,
    pub samples: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerPoint {
    pub cpu: f64,
    pub mem: f64,
}

/// All containers' values at one timestamp bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: i64,
    pub containers: BTreeMap<String, ContainerPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub range: String,
    pub resolution: String,
    pub data: Vec<HistoryPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Metric used for top-N ranking. Anything unrecognized ranks by memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Memory,
}

impl Metric {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Metric::Cpu,
            _ => Metric::Memory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TopConsumer {
    pub container: String,
    pub avg: f64,
    pub max: f64,
}

/// Where a response's numbers came from, so the UI can flag freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    Live,
    Historical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopResponse {
    pub range: String,
    pub metric: Metric,
    pub top: Vec<TopConsumer>,
    pub source: DataSourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
