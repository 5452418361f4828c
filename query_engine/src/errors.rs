use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the engine. Nothing is retried or recovered internally.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Configuration or argument problem, raised before any backend call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate key, unique constraint or version conflict
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Backend execution error: {message}")]
    BackendExecution {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A row or document could not be turned into the entity type
    #[error("Mapping error: {0}")]
    Mapping(String),
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }

    pub fn conflict<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        QueryError::Conflict {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn backend<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        QueryError::BackendExecution {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn backend_message(message: impl Into<String>) -> Self {
        QueryError::BackendExecution {
            message: message.into(),
            source: None,
        }
    }

    pub fn mapping(message: impl Into<String>) -> Self {
        QueryError::Mapping(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, QueryError::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, QueryError::Conflict { .. })
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, QueryError::BackendExecution { .. })
    }
}
