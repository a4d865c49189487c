// Typed errors for the sampling, storage and query paths.
// Wiring code (main, config, workers) stays on anyhow.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Container runtime or history store could not be reached (or is corrupt).
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The runtime has no container with this id or name.
    #[error("no such container: {0}")]
    NotFound(String),

    /// History store has not been created yet. Callers degrade instead of failing.
    #[error("history store is not initialized")]
    StoreUninitialized,

    /// One container's inspect/stats call failed; it is dropped from the batch.
    #[error("sample failed for container {container}: {reason}")]
    PartialSample { container: String, reason: String },

    /// A rollup bucket could not be committed; it stays pending.
    #[error("aggregation of {resolution} bucket {bucket} failed: {source}")]
    Aggregation {
        resolution: &'static str,
        bucket: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error("query exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<bollard::errors::Error> for MetricsError {
    fn from(e: bollard::errors::Error) -> Self {
        match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => MetricsError::NotFound(message),
            e => MetricsError::SourceUnavailable(format!("docker: {}", e)),
        }
    }
}

pub type Result<T, E = MetricsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_404_maps_to_not_found() {
        let err = MetricsError::from(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: nope".into(),
        });
        assert!(matches!(err, MetricsError::NotFound(ref m) if m.contains("nope")));
    }

    #[test]
    fn other_docker_errors_are_unavailable() {
        let err = MetricsError::from(bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".into(),
        });
        assert!(matches!(err, MetricsError::SourceUnavailable(_)));
    }
}
