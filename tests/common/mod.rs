// Shared test helpers: an in-memory container runtime and a temp history store.
#![allow(dead_code)]

use async_trait::async_trait;
use dockwatch::docker_repo::{ContainerRef, ContainerRuntime, InspectInfo, StatsCounters};
use dockwatch::error::{MetricsError, Result};
use dockwatch::history_repo::HistoryRepo;
use dockwatch::models::{MetricSample, StateFlags};
use std::sync::Mutex;
use tempfile::TempDir;

/// One scripted container. `inspect`/`stats` set to None make that call fail.
#[derive(Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub inspect: Option<InspectInfo>,
    pub stats: Option<StatsCounters>,
}

impl FakeContainer {
    /// Running container at `cpu_tenths / 10` percent (one cpu) using `mem` bytes.
    pub fn running(name: &str, user: &str, cpu_tenths: u64, mem: u64) -> Self {
        let id = format!("{:0<64}", name);
        Self {
            id: id.clone(),
            name: name.into(),
            inspect: Some(InspectInfo {
                id,
                name: name.into(),
                state: Some(StateFlags {
                    running: true,
                    ..Default::default()
                }),
                user: user.into(),
                started_at: Some("2024-01-01T00:00:00Z".into()),
                restart_count: 0,
            }),
            stats: Some(StatsCounters {
                cpu_total: 1000 + cpu_tenths,
                precpu_total: 1000,
                system_total: 2000,
                presystem_total: 1000,
                online_cpus: 1,
                mem_usage: mem,
                mem_limit: 1 << 30,
                ..Default::default()
            }),
        }
    }

    pub fn stopped(name: &str) -> Self {
        let mut c = Self::running(name, "", 0, 0);
        if let Some(i) = c.inspect.as_mut() {
            i.state = Some(StateFlags::default());
            i.started_at = None;
        }
        c.stats = None;
        c
    }

    pub fn unhealthy(name: &str, cpu_tenths: u64, mem: u64) -> Self {
        let mut c = Self::running(name, "", cpu_tenths, mem);
        if let Some(state) = c.inspect.as_mut().and_then(|i| i.state.as_mut()) {
            state.unhealthy = true;
        }
        c
    }

    /// Listed, but every inspect call fails.
    pub fn broken(name: &str) -> Self {
        let mut c = Self::running(name, "", 0, 0);
        c.inspect = None;
        c
    }
}

#[derive(Default)]
pub struct FakeRuntime {
    pub containers: Vec<FakeContainer>,
    pub list_fails: bool,
    pub restarted: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn with(containers: Vec<FakeContainer>) -> Self {
        Self {
            containers,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            list_fails: true,
            ..Default::default()
        }
    }

    fn find(&self, id: &str) -> Result<&FakeContainer> {
        self.containers
            .iter()
            .find(|c| c.id == id || c.name == id)
            .ok_or_else(|| MetricsError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerRef>> {
        if self.list_fails {
            return Err(MetricsError::SourceUnavailable("daemon down".into()));
        }
        Ok(self
            .containers
            .iter()
            .map(|c| ContainerRef {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<InspectInfo> {
        self.find(id)?
            .inspect
            .clone()
            .ok_or_else(|| MetricsError::SourceUnavailable("inspect failed".into()))
    }

    async fn stats(&self, id: &str) -> Result<StatsCounters> {
        self.find(id)?
            .stats
            .clone()
            .ok_or_else(|| MetricsError::SourceUnavailable("stats failed".into()))
    }

    async fn restart(&self, id: &str) -> Result<()> {
        let c = self.find(id)?;
        self.restarted.lock().unwrap().push(c.name.clone());
        Ok(())
    }

    async fn logs(&self, id: &str, tail: u32) -> Result<String> {
        let c = self.find(id)?;
        Ok((0..tail.min(3))
            .map(|i| format!("{} line {}\n", c.name, i))
            .collect())
    }
}

/// Fresh store with schema in a temp dir. Keep the TempDir alive for the test.
pub async fn temp_store() -> (TempDir, String, HistoryRepo) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.db").to_str().unwrap().to_string();
    let repo = HistoryRepo::connect(&path, 3).await.unwrap();
    repo.init().await.unwrap();
    (dir, path, repo)
}

pub fn sample(timestamp: i64, name: &str, cpu: f64, mem: i64) -> MetricSample {
    MetricSample {
        timestamp,
        container_name: name.into(),
        cpu_percent: cpu,
        mem_usage: mem,
    }
}
