// Dump recent rolled-up rows as JSON.
//
// Usage: cargo run --example dump_history -- [DB_PATH] [hourly|daily] [HOURS]
//   DB_PATH  default: ./data/metrics.db
//   tier     default: hourly
//   HOURS    default: 24 (how far back to look)

use dockwatch::history_repo::{HistoryRepo, Source};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).map(String::as_str).unwrap_or("./data/metrics.db");
    let source = match args.get(2).map(String::as_str) {
        Some("daily") => Source::Daily,
        _ => Source::Hourly,
    };
    let hours: i64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(24);

    let repo = HistoryRepo::open_read_only(path, 1).await?;
    let now = chrono::Utc::now().timestamp();
    let rows = repo
        .aggregates_in_range(source, now - hours * 3600, now + 1)
        .await?;

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
