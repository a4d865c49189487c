// Range resolution: which table, which time column and how far back for a requested range.
// Table and column names only ever come from `Source`, never from request input.

/// A resolution tier of the history store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Raw,
    Hourly,
    Daily,
}

impl Source {
    pub fn table(self) -> &'static str {
        match self {
            Source::Raw => "metrics_raw",
            Source::Hourly => "metrics_hourly",
            Source::Daily => "metrics_daily",
        }
    }

    pub fn time_column(self) -> &'static str {
        match self {
            Source::Raw => "timestamp",
            Source::Hourly => "hour",
            Source::Daily => "day",
        }
    }

    /// Columns read as the per-point cpu/mem value in history charts.
    pub(crate) fn value_columns(self) -> (&'static str, &'static str) {
        match self {
            Source::Raw => ("cpu_percent", "mem_usage"),
            Source::Hourly | Source::Daily => ("cpu_avg", "mem_avg"),
        }
    }

    /// Label reported to clients as the data's nominal resolution.
    pub fn resolution_label(self) -> &'static str {
        match self {
            Source::Raw => "5min",
            Source::Hourly => "hourly",
            Source::Daily => "daily",
        }
    }
}

/// Ranges the dashboard can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    LastHour,
    LastDay,
    LastWeek,
    LastMonth,
}

impl TimeRange {
    /// Unrecognized or missing ranges fall back to the last 24 hours.
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some("1h") => TimeRange::LastHour,
            Some("24h") => TimeRange::LastDay,
            Some("7d") => TimeRange::LastWeek,
            Some("30d") => TimeRange::LastMonth,
            _ => TimeRange::LastDay,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeRange::LastHour => "1h",
            TimeRange::LastDay => "24h",
            TimeRange::LastWeek => "7d",
            TimeRange::LastMonth => "30d",
        }
    }

    pub fn span_secs(self) -> i64 {
        match self {
            TimeRange::LastHour => 3600,
            TimeRange::LastDay => 86_400,
            TimeRange::LastWeek => 604_800,
            TimeRange::LastMonth => 2_592_000,
        }
    }

    pub fn source(self) -> Source {
        match self {
            TimeRange::LastHour | TimeRange::LastDay => Source::Raw,
            TimeRange::LastWeek => Source::Hourly,
            TimeRange::LastMonth => Source::Daily,
        }
    }

    pub fn params(self, now: i64) -> RangeParams {
        let source = self.source();
        RangeParams {
            start_time: now - self.span_secs(),
            source,
            time_column: source.time_column(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeParams {
    pub start_time: i64,
    pub source: Source,
    pub time_column: &'static str,
}

/// Resolve a range string (`1h`, `24h`, `7d`, `30d`) at `now` (unix seconds).
pub fn range_to_params(range: &str, now: i64) -> RangeParams {
    TimeRange::parse(Some(range)).params(now)
}
