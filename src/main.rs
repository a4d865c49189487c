use anyhow::Result;
use dockwatch::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let (tx, _) =
        broadcast::channel::<models::LiveSnapshot>(app_config.publishing.broadcast_capacity);

    let sysinfo_repo = Arc::new(sysinfo_repo::SysinfoRepo::new());
    let docker_repo = Arc::new(docker_repo::DockerRepo::connect(
        app_config.docker.socket.as_deref(),
    )?);
    let sampler = Arc::new(sampler::Sampler::new(docker_repo));

    let cancel = CancellationToken::new();
    let ws_live_connections = Arc::new(AtomicUsize::new(0));
    let samples_saved_total = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    let write_tx = if app_config.database.enabled {
        let history_repo = Arc::new(
            history_repo::HistoryRepo::connect(
                &app_config.database.path,
                app_config.database.max_pool_size,
            )
            .await?,
        );
        history_repo.init().await?;

        let (write_tx, write_rx) =
            mpsc::channel(worker::writer_channel_capacity(app_config.database.flush_rate));
        handles.push(worker::spawn_history_writer(
            write_rx,
            history_repo.clone(),
            worker::HistoryWriterConfig {
                flush_rate: app_config.database.flush_rate,
                flush_interval_secs: app_config.database.flush_interval_secs,
            },
            samples_saved_total.clone(),
        ));

        let rollup = &app_config.rollup;
        handles.push(rollup_worker::spawn(
            history_repo,
            rollup_worker::RollupWorkerConfig {
                interval_secs: rollup.interval_secs,
                settle_secs: i64::try_from(rollup.settle_secs)?,
                raw_retention_hours: rollup.raw_retention_hours,
                hourly_retention_days: rollup.hourly_retention_days,
                daily_retention_days: rollup.daily_retention_days,
                vacuum_schedule: rollup.vacuum_schedule.clone(),
                vacuum_interval_secs: rollup.vacuum_interval_secs,
            },
            cancel.child_token(),
        ));
        Some(write_tx)
    } else {
        tracing::info!("history database disabled; queries answer from live samples");
        None
    };

    handles.push(worker::spawn(
        worker::WorkerDeps {
            sampler: sampler.clone(),
            sysinfo_repo: sysinfo_repo.clone(),
            tx: tx.clone(),
            write_tx,
            ws_live_connections: ws_live_connections.clone(),
            samples_saved_total,
        },
        worker::WorkerConfig {
            interval_secs: app_config.sampler.interval_secs,
            stats_log_interval_secs: app_config.sampler.stats_log_interval_secs,
        },
        cancel.child_token(),
    ));

    let query = Arc::new(query::MetricsQuery::new(
        app_config
            .database
            .enabled
            .then(|| app_config.database.path.clone()),
        app_config.database.max_pool_size,
        Duration::from_millis(app_config.database.query_timeout_ms),
        sampler.clone(),
    ));

    let app = routes::app(tx, sampler, sysinfo_repo, query, ws_live_connections);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Received shutdown signal");
            shutdown.cancel();
        })
        .await?;

    // Workers stop on cancel; the history writer drains once the sampler drops its sender.
    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
