// Normalize raw Docker inspect/stats responses into runtime-neutral records,
// plus the derived figures (cpu %, memory %, uid, uptime).

use super::{InspectInfo, StatsCounters};
use crate::models::StateFlags;
use bollard::models::{ContainerInspectResponse, ContainerStatsResponse, HealthStatusEnum};

/// Pull the cumulative counters out of a one-shot stats response.
/// Returns None when the cpu sections are missing (e.g. container just stopped).
pub(crate) fn process_statistics(s: &ContainerStatsResponse) -> Option<StatsCounters> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let precpu_stats = s.precpu_stats.as_ref()?;
    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;

    let online_cpus = match cpu_stats.online_cpus {
        Some(n) if n > 0 => n as u32,
        _ => cpu_usage
            .percpu_usage
            .as_ref()
            .map(|v| v.len() as u32)
            .filter(|n| *n > 0)
            .unwrap_or(1),
    };

    let (network_rx, network_tx) = s.networks.as_ref().map_or((0u64, 0u64), |n| {
        n.values().fold((0u64, 0u64), |(rx, tx), v| {
            (
                rx.saturating_add(v.rx_bytes.unwrap_or(0)),
                tx.saturating_add(v.tx_bytes.unwrap_or(0)),
            )
        })
    });

    let (block_read, block_write) = s
        .blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map_or((0u64, 0u64), |b| {
            let mut read = 0u64;
            let mut write = 0u64;
            for e in b {
                if e.op
                    .as_ref()
                    .is_some_and(|op| op.eq_ignore_ascii_case("read"))
                {
                    read = read.saturating_add(e.value.unwrap_or(0));
                } else if e
                    .op
                    .as_ref()
                    .is_some_and(|op| op.eq_ignore_ascii_case("write"))
                {
                    write = write.saturating_add(e.value.unwrap_or(0));
                }
            }
            (read, write)
        });

    Some(StatsCounters {
        cpu_total: cpu_usage.total_usage.unwrap_or(0),
        precpu_total: precpu_stats
            .cpu_usage
            .as_ref()
            .and_then(|u| u.total_usage)
            .unwrap_or(0),
        system_total: cpu_stats.system_cpu_usage.unwrap_or(0),
        presystem_total: precpu_stats.system_cpu_usage.unwrap_or(0),
        online_cpus,
        mem_usage: s.memory_stats.as_ref().and_then(|m| m.usage).unwrap_or(0),
        mem_limit: s.memory_stats.as_ref().and_then(|m| m.limit).unwrap_or(0),
        network_rx,
        network_tx,
        block_read,
        block_write,
    })
}

pub(crate) fn process_inspect(r: &ContainerInspectResponse, fallback_id: &str) -> InspectInfo {
    let state = r.state.as_ref().map(|s| StateFlags {
        running: s.running.unwrap_or(false),
        restarting: s.restarting.unwrap_or(false),
        dead: s.dead.unwrap_or(false),
        unhealthy: s
            .health
            .as_ref()
            .and_then(|h| h.status.as_ref())
            .is_some_and(|st| *st == HealthStatusEnum::UNHEALTHY),
    });
    InspectInfo {
        id: r.id.clone().unwrap_or_else(|| fallback_id.to_string()),
        name: r
            .name
            .as_deref()
            .unwrap_or(fallback_id)
            .trim_start_matches('/')
            .to_string(),
        state,
        user: r
            .config
            .as_ref()
            .and_then(|c| c.user.clone())
            .unwrap_or_default(),
        started_at: r.state.as_ref().and_then(|s| s.started_at.clone()),
        restart_count: r.restart_count.unwrap_or(0),
    }
}

/// `(Δcpu / Δsystem) * cpus * 100`, clamped to `[0, 100 * cpus]`.
/// Zero when either delta is non-positive (first sample, counter reset).
pub fn cpu_percent(cpu: [u64; 2], system: [u64; 2], cpu_count: u32) -> f64 {
    let cpu_delta = cpu[1] as i128 - cpu[0] as i128;
    let system_delta = system[1] as i128 - system[0] as i128;
    if cpu_delta <= 0 || system_delta <= 0 {
        return 0.0;
    }
    let cpus = cpu_count.max(1) as f64;
    let pct = (cpu_delta as f64 / system_delta as f64) * cpus * 100.0;
    pct.clamp(0.0, 100.0 * cpus)
}

pub fn memory_percent(usage: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    (usage as f64 / limit as f64) * 100.0
}

/// Resolve a container's configured user to a UID where possible.
/// `uid:gid` uses the uid part; digits parse as a UID; empty or `root` is 0.
/// Named non-root users are unresolved (`None`).
pub fn resolve_uid(user: &str) -> Option<u32> {
    let user = user.trim();
    if let Some((uid, _gid)) = user.split_once(':') {
        return resolve_uid(uid);
    }
    if user.is_empty() || user == "root" {
        return Some(0);
    }
    if user.bytes().all(|b| b.is_ascii_digit()) {
        return user.parse().ok();
    }
    None
}

pub fn is_root_user(user: &str) -> bool {
    resolve_uid(user) == Some(0)
}

/// Human uptime like `3d 4h`, `2h 15m` or `42m`.
pub fn format_uptime(started_at: &str, now: chrono::DateTime<chrono::Utc>) -> Option<String> {
    let started = chrono::DateTime::parse_from_rfc3339(started_at).ok()?;
    let secs = (now - started.with_timezone(&chrono::Utc))
        .num_seconds()
        .max(0);
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    Some(if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{
        ContainerBlkioStatEntry, ContainerBlkioStats, ContainerConfig, ContainerCpuStats,
        ContainerCpuUsage, ContainerMemoryStats, ContainerNetworkStats, ContainerState, Health,
    };
    use std::collections::HashMap;

    fn minimal_cpu_stats(total_usage: u64, system_cpu_usage: u64) -> ContainerCpuStats {
        ContainerCpuStats {
            cpu_usage: Some(ContainerCpuUsage {
                total_usage: Some(total_usage),
                ..Default::default()
            }),
            system_cpu_usage: Some(system_cpu_usage),
            online_cpus: Some(2),
            throttling_data: None,
        }
    }

    #[test]
    fn cpu_percent_scales_by_cpu_count() {
        assert_eq!(cpu_percent([100, 150], [1000, 1100], 4), 200.0);
    }

    #[test]
    fn cpu_percent_is_zero_on_counter_reset() {
        assert_eq!(cpu_percent([150, 100], [1000, 1100], 4), 0.0);
        assert_eq!(cpu_percent([100, 150], [1100, 1000], 4), 0.0);
        assert_eq!(cpu_percent([100, 100], [1000, 1100], 4), 0.0);
    }

    #[test]
    fn cpu_percent_clamps_to_cpu_capacity() {
        assert_eq!(cpu_percent([0, 500], [0, 100], 2), 200.0);
    }

    #[test]
    fn memory_percent_handles_zero_limit() {
        assert_eq!(memory_percent(512, 0), 0.0);
        assert_eq!(memory_percent(256, 1024), 25.0);
    }

    #[test]
    fn resolve_uid_forms() {
        assert_eq!(resolve_uid(""), Some(0));
        assert_eq!(resolve_uid("root"), Some(0));
        assert_eq!(resolve_uid("0"), Some(0));
        assert_eq!(resolve_uid("101"), Some(101));
        assert_eq!(resolve_uid("1000:1000"), Some(1000));
        assert_eq!(resolve_uid("0:0"), Some(0));
        assert_eq!(resolve_uid("root:root"), Some(0));
        assert_eq!(resolve_uid("nginx"), None);
        assert_eq!(resolve_uid("app:app"), None);
    }

    #[test]
    fn root_classification() {
        assert!(is_root_user("0"));
        assert!(is_root_user(""));
        assert!(is_root_user("root"));
        assert!(!is_root_user("101"));
        assert!(!is_root_user("nginx"));
    }

    #[test]
    fn format_uptime_units() {
        let now = chrono::DateTime::parse_from_rfc3339("2024-01-03T05:30:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(
            format_uptime("2024-01-01T01:00:00Z", now).as_deref(),
            Some("2d 4h")
        );
        assert_eq!(
            format_uptime("2024-01-03T03:15:00Z", now).as_deref(),
            Some("2h 15m")
        );
        assert_eq!(
            format_uptime("2024-01-03T05:18:00Z", now).as_deref(),
            Some("12m")
        );
        assert!(format_uptime("not a date", now).is_none());
    }

    #[test]
    fn process_statistics_returns_none_when_cpu_stats_missing() {
        let s = ContainerStatsResponse {
            cpu_stats: None,
            precpu_stats: Some(minimal_cpu_stats(0, 0)),
            ..Default::default()
        };
        assert!(process_statistics(&s).is_none());
    }

    #[test]
    fn process_statistics_collects_counters() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(minimal_cpu_stats(100_000_000, 1_000_000_000)),
            precpu_stats: Some(minimal_cpu_stats(50_000_000, 500_000_000)),
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(256 * 1024 * 1024),
                limit: Some(512 * 1024 * 1024),
                ..Default::default()
            }),
            networks: Some({
                let mut m = HashMap::new();
                m.insert(
                    "eth0".to_string(),
                    ContainerNetworkStats {
                        rx_bytes: Some(1000),
                        tx_bytes: Some(2000),
                        ..Default::default()
                    },
                );
                m.insert(
                    "eth1".to_string(),
                    ContainerNetworkStats {
                        rx_bytes: Some(10),
                        tx_bytes: Some(20),
                        ..Default::default()
                    },
                );
                m
            }),
            blkio_stats: Some(ContainerBlkioStats {
                io_service_bytes_recursive: Some(vec![
                    ContainerBlkioStatEntry {
                        op: Some("Read".to_string()),
                        value: Some(100),
                        ..Default::default()
                    },
                    ContainerBlkioStatEntry {
                        op: Some("write".to_string()),
                        value: Some(200),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = process_statistics(&s).unwrap();
        assert_eq!(out.online_cpus, 2);
        assert!((out.cpu_percent() - 20.0).abs() < 0.01);
        assert_eq!(out.mem_usage, 256 * 1024 * 1024);
        assert_eq!(out.mem_limit, 512 * 1024 * 1024);
        assert_eq!(out.network_rx, 1010);
        assert_eq!(out.network_tx, 2020);
        assert_eq!(out.block_read, 100);
        assert_eq!(out.block_write, 200);
    }

    #[test]
    fn process_statistics_saturates_huge_counters() {
        let net = |rx: u64| ContainerNetworkStats {
            rx_bytes: Some(rx),
            tx_bytes: Some(u64::MAX),
            ..Default::default()
        };
        let read = |value: u64| ContainerBlkioStatEntry {
            op: Some("read".to_string()),
            value: Some(value),
            ..Default::default()
        };
        let s = ContainerStatsResponse {
            cpu_stats: Some(minimal_cpu_stats(100, 1000)),
            precpu_stats: Some(minimal_cpu_stats(50, 500)),
            networks: Some(HashMap::from([
                ("eth0".to_string(), net(u64::MAX - 1)),
                ("eth1".to_string(), net(10)),
            ])),
            blkio_stats: Some(ContainerBlkioStats {
                io_service_bytes_recursive: Some(vec![read(u64::MAX), read(1)]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = process_statistics(&s).unwrap();
        assert_eq!(out.network_rx, u64::MAX);
        assert_eq!(out.network_tx, u64::MAX);
        assert_eq!(out.block_read, u64::MAX);
    }

    #[test]
    fn process_statistics_falls_back_to_percpu_len() {
        let mut cpu = minimal_cpu_stats(100, 1000);
        cpu.online_cpus = None;
        cpu.cpu_usage = Some(ContainerCpuUsage {
            total_usage: Some(100),
            percpu_usage: Some(vec![25, 25, 25, 25]),
            ..Default::default()
        });
        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu),
            precpu_stats: Some(minimal_cpu_stats(50, 500)),
            ..Default::default()
        };
        assert_eq!(process_statistics(&s).unwrap().online_cpus, 4);
    }

    #[test]
    fn process_inspect_maps_state_user_and_name() {
        let r = ContainerInspectResponse {
            id: Some("0123456789abcdef".into()),
            name: Some("/web".into()),
            state: Some(ContainerState {
                running: Some(true),
                health: Some(Health {
                    status: Some(HealthStatusEnum::UNHEALTHY),
                    ..Default::default()
                }),
                started_at: Some("2024-01-01T00:00:00Z".into()),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                user: Some("101".into()),
                ..Default::default()
            }),
            restart_count: Some(2),
            ..Default::default()
        };
        let info = process_inspect(&r, "fallback");
        assert_eq!(info.id, "0123456789abcdef");
        assert_eq!(info.name, "web");
        assert_eq!(info.user, "101");
        assert_eq!(info.restart_count, 2);
        let state = info.state.unwrap();
        assert!(state.running);
        assert!(state.unhealthy);
    }

    #[test]
    fn process_inspect_without_state_has_none() {
        let info = process_inspect(&ContainerInspectResponse::default(), "abc");
        assert_eq!(info.id, "abc");
        assert_eq!(info.name, "abc");
        assert!(info.state.is_none());
        assert!(info.user.is_empty());
    }
}
