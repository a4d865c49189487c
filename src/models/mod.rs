// Domain models: live container records, host side input, history rows and responses.

mod container;
mod history;
mod system;

pub use container::{ContainerStats, ContainerStatus, SecurityAudit, StateFlags};
pub use history::{
    BucketAggregate, ContainerPoint, DataSourceKind, HistoryPoint, HistoryResponse, Metric,
    MetricSample, TopConsumer, TopResponse,
};
pub use system::{LiveSnapshot, SystemMetrics};
