// Host system side input and the live snapshot payload

use serde::{Deserialize, Serialize};

use super::{ContainerStats, SecurityAudit};

/// Host metrics shown next to the container fleet. Opaque to the metrics pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub hostname: String,
    pub uptime: String,
    pub load_avg: [f64; 3],
    pub cpu_percent: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_percent: f64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub disk_percent: f64,
    pub timestamp: String,
}

impl SystemMetrics {
    /// Placeholder when host metrics cannot be read.
    pub fn unknown(timestamp: String) -> Self {
        Self {
            hostname: "unknown".into(),
            uptime: "unknown".into(),
            load_avg: [0.0; 3],
            cpu_percent: 0.0,
            memory_total: 0,
            memory_used: 0,
            memory_percent: 0.0,
            disk_total: 0,
            disk_used: 0,
            disk_percent: 0.0,
            timestamp,
        }
    }
}

/// Everything the dashboard needs for the live view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshot {
    pub containers: Vec<ContainerStats>,
    pub security: Vec<SecurityAudit>,
    pub system: SystemMetrics,
    pub timestamp: String,
}
