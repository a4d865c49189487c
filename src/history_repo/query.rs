// Read paths for the dashboard: chart series and top consumers over a resolved range.

use super::{HistoryRepo, RangeParams, Source};
use crate::error::Result;
use crate::models::{Metric, TopConsumer};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::instrument;

/// One (time, container) point of a history series.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct HistoryRow {
    pub ts: i64,
    pub container_name: String,
    pub cpu: f64,
    pub mem: f64,
}

/// Appends `AND container_name IN (...)` when a non-empty filter is given.
pub(super) fn push_name_filter(qb: &mut QueryBuilder<'_, Sqlite>, containers: Option<&[String]>) {
    let Some(names) = containers.filter(|n| !n.is_empty()) else {
        return;
    };
    qb.push(" AND container_name IN (");
    let mut sep = qb.separated(", ");
    for name in names {
        sep.push_bind(name.clone());
    }
    sep.push_unseparated(")");
}

/// (avg expression column, max expression column) for a top-N ranking.
fn top_columns(source: Source, metric: Metric) -> (&'static str, &'static str) {
    match (source, metric) {
        (Source::Raw, Metric::Cpu) => ("cpu_percent", "cpu_percent"),
        (Source::Raw, Metric::Memory) => ("mem_usage", "mem_usage"),
        (_, Metric::Cpu) => ("cpu_avg", "cpu_max"),
        (_, Metric::Memory) => ("mem_avg", "mem_max"),
    }
}

impl HistoryRepo {
    /// Series points from the tier chosen by `params`, ascending by time then name.
    #[instrument(skip(self, containers), fields(repo = "history", operation = "history_rows", table = params.source.table()))]
    pub async fn history_rows(
        &self,
        params: &RangeParams,
        containers: Option<&[String]>,
    ) -> Result<Vec<HistoryRow>> {
        let (cpu_col, mem_col) = params.source.value_columns();
        let col = params.time_column;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(format!(
            "{col} AS ts, container_name, CAST({cpu_col} AS REAL) AS cpu, CAST({mem_col} AS REAL) AS mem FROM {table} WHERE {col} >= ",
            table = params.source.table(),
        ));
        qb.push_bind(params.start_time);
        push_name_filter(&mut qb, containers);
        qb.push(format!(" ORDER BY {col} ASC, container_name ASC"));

        Ok(qb
            .build_query_as::<HistoryRow>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Containers ranked by the average of `metric` since `params.start_time`, descending.
    #[instrument(skip(self), fields(repo = "history", operation = "top_consumers", table = params.source.table()))]
    pub async fn top_consumers(
        &self,
        params: &RangeParams,
        metric: Metric,
        limit: u32,
    ) -> Result<Vec<TopConsumer>> {
        let (avg_col, max_col) = top_columns(params.source, metric);
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT container_name AS container, CAST(AVG({avg_col}) AS REAL) AS avg, CAST(MAX({max_col}) AS REAL) AS max \
             FROM {table} WHERE {col} >= ",
            table = params.source.table(),
            col = params.time_column,
        ));
        qb.push_bind(params.start_time);
        qb.push(" GROUP BY container_name ORDER BY avg DESC, container ASC LIMIT ");
        qb.push_bind(i64::from(limit));

        Ok(qb
            .build_query_as::<TopConsumer>()
            .fetch_all(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_columns_follow_tier() {
        assert_eq!(top_columns(Source::Raw, Metric::Cpu), ("cpu_percent", "cpu_percent"));
        assert_eq!(top_columns(Source::Raw, Metric::Memory), ("mem_usage", "mem_usage"));
        assert_eq!(top_columns(Source::Hourly, Metric::Cpu), ("cpu_avg", "cpu_max"));
        assert_eq!(top_columns(Source::Daily, Metric::Memory), ("mem_avg", "mem_max"));
    }

    #[test]
    fn name_filter_binds_each_name() {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT 1 FROM metrics_raw WHERE 1 = 1");
        let names = vec!["a".to_string(), "b".to_string()];
        push_name_filter(&mut qb, Some(names.as_slice()));
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM metrics_raw WHERE 1 = 1 AND container_name IN (?, ?)"
        );

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT 1");
        push_name_filter(&mut qb, Some(&[][..]));
        assert_eq!(qb.sql(), "SELECT 1");
    }
}
