// Docker access via bollard, behind a runtime trait so the sampler can be driven by fakes.

mod stats;

pub use stats::{cpu_percent, format_uptime, is_root_user, memory_percent, resolve_uid};

use crate::error::{MetricsError, Result};
use crate::models::StateFlags;
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptions, LogsOptions, RestartContainerOptions,
    StatsOptions,
};
use futures_util::StreamExt;
use tracing::instrument;

const DOCKER_TIMEOUT_SECS: u64 = 30;

/// A container as returned by the listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    pub name: String,
}

/// The parts of container inspect the dashboard uses.
#[derive(Debug, Clone, Default)]
pub struct InspectInfo {
    pub id: String,
    pub name: String,
    /// None when the runtime reported no state block.
    pub state: Option<StateFlags>,
    /// Configured user, verbatim (may be empty).
    pub user: String,
    pub started_at: Option<String>,
    pub restart_count: i64,
}

/// Cumulative counters from one stats snapshot (current and previous cpu reading).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsCounters {
    pub cpu_total: u64,
    pub precpu_total: u64,
    pub system_total: u64,
    pub presystem_total: u64,
    pub online_cpus: u32,
    pub mem_usage: u64,
    pub mem_limit: u64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
}

impl StatsCounters {
    pub fn cpu_percent(&self) -> f64 {
        cpu_percent(
            [self.precpu_total, self.cpu_total],
            [self.presystem_total, self.system_total],
            self.online_cpus,
        )
    }

    pub fn memory_percent(&self) -> f64 {
        memory_percent(self.mem_usage, self.mem_limit)
    }
}

/// Read side (plus restart) of a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// All containers, running and stopped.
    async fn list_containers(&self) -> Result<Vec<ContainerRef>>;

    async fn inspect(&self, id: &str) -> Result<InspectInfo>;

    /// One-shot (non-streaming) stats snapshot.
    async fn stats(&self, id: &str) -> Result<StatsCounters>;

    async fn restart(&self, id: &str) -> Result<()>;

    /// Last `tail` lines of stdout+stderr.
    async fn logs(&self, id: &str, tail: u32) -> Result<String>;
}

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    /// Connect to `socket` if given, else the platform default (`/var/run/docker.sock`).
    pub fn connect(socket: Option<&str>) -> anyhow::Result<Self> {
        let docker = match socket {
            Some(path) => {
                Docker::connect_with_socket(path, DOCKER_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_unix_defaults()?,
        };
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRepo {
    #[instrument(skip(self), fields(repo = "docker", operation = "list_containers"))]
    async fn list_containers(&self) -> Result<Vec<ContainerRef>> {
        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .map(|c| {
                let id = c.id.unwrap_or_default();
                let name = c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .cloned()
                    .unwrap_or_else(|| id.clone());
                ContainerRef {
                    name: name.trim_start_matches('/').to_string(),
                    id,
                }
            })
            .collect())
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "inspect"))]
    async fn inspect(&self, id: &str) -> Result<InspectInfo> {
        let r = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        Ok(stats::process_inspect(&r, id))
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "stats"))]
    async fn stats(&self, id: &str) -> Result<StatsCounters> {
        let options = StatsOptions {
            stream: false,
            ..Default::default()
        };
        let mut stream = self.docker.stats(id, Some(options));
        let response = match stream.next().await {
            Some(r) => r?,
            None => {
                return Err(MetricsError::SourceUnavailable(format!(
                    "docker: empty stats response for {}",
                    id
                )));
            }
        };
        stats::process_statistics(&response).ok_or_else(|| {
            MetricsError::SourceUnavailable(format!("docker: no cpu stats for {}", id))
        })
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "restart"))]
    async fn restart(&self, id: &str) -> Result<()> {
        self.docker
            .restart_container(id, None::<RestartContainerOptions>)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "logs"))]
    async fn logs(&self, id: &str, tail: u32) -> Result<String> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.logs(id, Some(options));
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            out.push_str(&String::from_utf8_lossy(&chunk?.into_bytes()));
        }
        Ok(out)
    }
}
