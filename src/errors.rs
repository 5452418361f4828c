//! Error types for the QueryDeck crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryDeckError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Query(#[from] query_engine::QueryError),
}

impl QueryDeckError {
    /// The engine error, if this is one
    pub fn as_query(&self) -> Option<&query_engine::QueryError> {
        match self {
            QueryDeckError::Query(e) => Some(e),
            QueryDeckError::Config(_) => None,
        }
    }
}
