// Host metrics via sysinfo (hostname, uptime, load, memory, root disk).

use crate::models::SystemMetrics;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{Disks, System};
use tracing::instrument;

pub struct SysinfoRepo {
    sys: Arc<std::sync::Mutex<System>>,
    disks: Arc<std::sync::Mutex<Disks>>,
    last_cpu_refresh: Arc<std::sync::Mutex<Option<(Instant, f64)>>>,
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoRepo {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self {
            sys: Arc::new(std::sync::Mutex::new(sys)),
            disks: Arc::new(std::sync::Mutex::new(Disks::new_with_refreshed_list())),
            last_cpu_refresh: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_system_metrics"))]
    pub async fn get_system_metrics(&self) -> anyhow::Result<SystemMetrics> {
        let sys = self.sys.clone();
        let disks = self.disks.clone();
        let last_cpu_refresh = self.last_cpu_refresh.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;

            let now = Instant::now();
            let cpu_percent = match last_cpu_refresh.lock() {
                Ok(mut guard) => match guard.as_ref().copied() {
                    // Too soon for a meaningful delta: reuse the last reading
                    Some((prev_ts, prev_usage))
                        if now.duration_since(prev_ts) < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL =>
                    {
                        prev_usage
                    }
                    _ => {
                        sys.refresh_cpu_usage();
                        let usage = sys.global_cpu_usage() as f64;
                        *guard = Some((now, usage));
                        usage
                    }
                },
                Err(_) => 0.0,
            };

            sys.refresh_memory();
            let memory_total = sys.total_memory();
            let memory_used = sys.used_memory();

            let mut disks = disks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo disks lock poisoned: {}", e))?;
            disks.refresh(false);
            let (disk_total, disk_used) = disks
                .list()
                .iter()
                .find(|d| d.mount_point() == Path::new("/"))
                .map_or((0, 0), |d| {
                    let total = d.total_space();
                    (total, total.saturating_sub(d.available_space()))
                });

            let load = System::load_average();
            Ok(SystemMetrics {
                hostname: System::host_name().unwrap_or_else(|| "unknown".into()),
                uptime: format_host_uptime(System::uptime()),
                load_avg: [load.one, load.five, load.fifteen],
                cpu_percent: cpu_percent.clamp(0.0, 100.0),
                memory_total,
                memory_used,
                memory_percent: percent(memory_used, memory_total),
                disk_total,
                disk_used,
                disk_percent: percent(disk_used, disk_total),
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64) * 100.0
    }
}

/// `3d 4h` once past a day, otherwise `4h 12m`.
fn format_host_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_uptime_format() {
        assert_eq!(format_host_uptime(3 * 86_400 + 4 * 3600 + 60), "3d 4h");
        assert_eq!(format_host_uptime(4 * 3600 + 12 * 60), "4h 12m");
        assert_eq!(format_host_uptime(59), "0h 0m");
    }

    #[test]
    fn percent_of_zero_total_is_zero() {
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }
}
