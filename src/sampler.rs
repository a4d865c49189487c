// Sampler: one pass over the fleet producing live records, security posture and raw samples.
// A container whose inspect call fails is dropped from the batch, never the whole tick.
// A stats failure drops only its live record; the security audit is kept.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{instrument, warn};

use crate::docker_repo::{ContainerRef, ContainerRuntime, format_uptime, is_root_user, resolve_uid};
use crate::error::{MetricsError, Result};
use crate::models::{ContainerStats, ContainerStatus, MetricSample, SecurityAudit};

const SHORT_ID_LEN: usize = 12;

/// Result of sampling every container once.
#[derive(Debug, Clone, Default)]
pub struct FleetSample {
    pub containers: Vec<ContainerStats>,
    pub security: Vec<SecurityAudit>,
}

impl FleetSample {
    /// Raw-store rows for this sample. Only running containers are recorded.
    pub fn metric_samples(&self, timestamp: i64) -> Vec<MetricSample> {
        self.containers
            .iter()
            .filter(|c| {
                matches!(
                    c.status,
                    ContainerStatus::Running | ContainerStatus::Unhealthy
                )
            })
            .map(|c| MetricSample {
                timestamp,
                container_name: c.name.clone(),
                cpu_percent: c.cpu,
                mem_usage: c.memory_usage.min(i64::MAX as u64) as i64,
            })
            .collect()
    }
}

pub struct Sampler {
    runtime: Arc<dyn ContainerRuntime>,
}

impl Sampler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Lists all containers and samples them concurrently.
    /// Fails only when the listing itself fails.
    #[instrument(skip(self), fields(component = "sampler", operation = "sample"))]
    pub async fn sample(&self) -> Result<FleetSample> {
        let containers = self.runtime.list_containers().await?;
        let results = join_all(containers.iter().map(|c| self.sample_one(c))).await;

        let mut out = FleetSample::default();
        for result in results {
            match result {
                Ok((stats, audit)) => {
                    out.security.push(audit);
                    match stats {
                        Ok(stats) => out.containers.push(stats),
                        Err(e) => warn!(error = %e, "excluding container stats from sample"),
                    }
                }
                Err(e) => warn!(error = %e, "excluding container from sample"),
            }
        }
        out.containers.sort_by(|a, b| a.name.cmp(&b.name));
        out.security
            .sort_by(|a, b| a.container_name.cmp(&b.container_name));
        Ok(out)
    }

    /// Inspect failure drops the container entirely. A stats failure only drops its
    /// live record; the audit comes from inspect alone.
    async fn sample_one(
        &self,
        c: &ContainerRef,
    ) -> Result<(Result<ContainerStats>, SecurityAudit)> {
        let partial = |e: MetricsError| MetricsError::PartialSample {
            container: c.name.clone(),
            reason: e.to_string(),
        };

        let inspect = self.runtime.inspect(&c.id).await.map_err(partial)?;
        let status = ContainerStatus::from_state(inspect.state.as_ref());
        let running = inspect.state.as_ref().is_some_and(|s| s.running);

        let now = chrono::Utc::now();
        let short_id: String = inspect.id.chars().take(SHORT_ID_LEN).collect();
        let user = if inspect.user.is_empty() {
            "root".to_string()
        } else {
            inspect.user.clone()
        };
        let uid = resolve_uid(&inspect.user);

        let audit = SecurityAudit {
            container_id: short_id.clone(),
            container_name: inspect.name.clone(),
            user: user.clone(),
            uid: uid.unwrap_or(0),
            is_root: is_root_user(&inspect.user),
            last_audit: now.to_rfc3339(),
        };

        let counters = if running {
            match self.runtime.stats(&c.id).await {
                Ok(counters) => Some(counters),
                Err(e) => return Ok((Err(partial(e)), audit)),
            }
        } else {
            None
        };

        let stats = ContainerStats {
            container_id: short_id,
            name: inspect.name,
            status,
            cpu: counters.as_ref().map_or(0.0, |s| s.cpu_percent()),
            memory_usage: counters.as_ref().map_or(0, |s| s.mem_usage),
            memory_limit: counters.as_ref().map_or(0, |s| s.mem_limit),
            memory_percent: counters.as_ref().map_or(0.0, |s| s.memory_percent()),
            network_rx: counters.as_ref().map_or(0, |s| s.network_rx),
            network_tx: counters.as_ref().map_or(0, |s| s.network_tx),
            block_read: counters.as_ref().map_or(0, |s| s.block_read),
            block_write: counters.as_ref().map_or(0, |s| s.block_write),
            user,
            uid,
            uptime: if running {
                inspect
                    .started_at
                    .as_deref()
                    .and_then(|s| format_uptime(s, now))
            } else {
                None
            },
            restart_count: inspect.restart_count,
        };

        Ok((Ok(stats), audit))
    }
}
