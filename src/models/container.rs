// Docker container models

use serde::{Deserialize, Serialize};

/// Container status shown on the dashboard; serializes to lowercase JSON (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Stopped,
    Restarting,
    Unhealthy,
    #[serde(other)]
    Unknown,
}

/// State flags as reported by container inspect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateFlags {
    pub running: bool,
    pub restarting: bool,
    pub dead: bool,
    pub unhealthy: bool,
}

impl ContainerStatus {
    /// Precedence: unhealthy > restarting > running > dead/stopped. `None` means the
    /// runtime reported no state at all.
    pub fn from_state(state: Option<&StateFlags>) -> Self {
        let Some(s) = state else {
            return ContainerStatus::Unknown;
        };
        if s.unhealthy {
            ContainerStatus::Unhealthy
        } else if s.restarting {
            ContainerStatus::Restarting
        } else if s.running {
            ContainerStatus::Running
        } else {
            ContainerStatus::Stopped
        }
    }
}

/// Live per-container record served by `/api/metrics/live` and `/ws/live`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub container_id: String,
    pub name: String,
    pub status: ContainerStatus,
    pub cpu: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    #[serde(default)]
    pub network_rx: u64,
    #[serde(default)]
    pub network_tx: u64,
    #[serde(default)]
    pub block_read: u64,
    #[serde(default)]
    pub block_write: u64,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(default)]
    pub restart_count: i64,
}

/// Root/non-root posture of one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAudit {
    pub container_id: String,
    pub container_name: String,
    pub user: String,
    pub uid: u32,
    pub is_root: bool,
    pub last_audit: String,
}
