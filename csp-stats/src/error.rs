use thiserror::Error;

use crate::state::HealthStatus;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to load muted rules from settings")]
    Settings(#[source] anyhow::Error),

    #[error("search against {index} failed")]
    Query {
        index: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{failed} of {total} writes to {index} failed")]
    Index {
        index: String,
        failed: usize,
        total: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("unexpected aggregation shape from {index}")]
    Decode {
        index: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Coarse outcome class of a failed or empty tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoData,
    QueryFailure,
    IndexFailure,
    Unexpected,
}

impl ErrorKind {
    pub fn health(self) -> HealthStatus {
        match self {
            ErrorKind::NoData => HealthStatus::Warning,
            ErrorKind::QueryFailure | ErrorKind::IndexFailure | ErrorKind::Unexpected => {
                HealthStatus::Error
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoData => "no_data",
            ErrorKind::QueryFailure => "query_failure",
            ErrorKind::IndexFailure => "index_failure",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

/// Classify an error raised during a tick by looking for a [`TaskError`]
/// anywhere in its cause chain.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(task_err) = cause.downcast_ref::<TaskError>() {
            return match task_err {
                TaskError::Query { .. } => ErrorKind::QueryFailure,
                TaskError::Index { .. } => ErrorKind::IndexFailure,
                TaskError::Settings(_) | TaskError::Decode { .. } => ErrorKind::Unexpected,
            };
        }
    }
    ErrorKind::Unexpected
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn classify_query_failure() {
        let err = anyhow::Error::new(TaskError::Query {
            index: "findings".into(),
            source: anyhow::anyhow!("HTTP 500"),
        });
        assert_eq!(classify(&err), ErrorKind::QueryFailure);
    }

    #[test]
    fn classify_index_failure_through_context() {
        let err: anyhow::Result<()> = Err(TaskError::Index {
            index: "scores".into(),
            failed: 1,
            total: 3,
            source: anyhow::anyhow!("HTTP 429"),
        }
        .into());
        let err = err.context("writing score documents").unwrap_err();
        assert_eq!(classify(&err), ErrorKind::IndexFailure);
    }

    #[test]
    fn classify_plain_error_is_unexpected() {
        let err = anyhow::anyhow!("something odd");
        assert_eq!(classify(&err), ErrorKind::Unexpected);
    }

    #[test]
    fn classify_settings_is_unexpected() {
        let err = anyhow::Error::new(TaskError::Settings(anyhow::anyhow!("no repo")));
        assert_eq!(classify(&err), ErrorKind::Unexpected);
    }

    #[test]
    fn health_mapping() {
        assert_eq!(ErrorKind::NoData.health(), HealthStatus::Warning);
        assert_eq!(ErrorKind::QueryFailure.health(), HealthStatus::Error);
        assert_eq!(ErrorKind::IndexFailure.health(), HealthStatus::Error);
        assert_eq!(ErrorKind::Unexpected.health(), HealthStatus::Error);
    }

    #[test]
    fn index_error_message() {
        let err = TaskError::Index {
            index: "scores".into(),
            failed: 2,
            total: 5,
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.to_string(), "2 of 5 writes to scores failed");
    }
}
