use super::model::{SearchHit, SearchRequest, SearchResponse, WriteResult};
use crate::entity::DocumentTarget;
use crate::errors::QueryError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Transport to one search cluster
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, QueryError>;

    /// Exact number of documents matching the request's query
    async fn count(&self, request: &SearchRequest) -> Result<u64, QueryError>;

    /// `None` when the document does not exist
    async fn get(&self, target: &DocumentTarget, id: &str) -> Result<Option<SearchHit>, QueryError>;

    /// Create a document. Without an id the backend assigns one.
    /// An existing id is a conflict.
    async fn index(
        &self,
        target: &DocumentTarget,
        id: Option<&str>,
        document: &Map<String, Value>,
    ) -> Result<WriteResult, QueryError>;

    /// Partial update; `None` when the document does not exist. A mismatching
    /// `expected_version` is a conflict.
    async fn update(
        &self,
        target: &DocumentTarget,
        id: &str,
        document: &Map<String, Value>,
        expected_version: Option<i64>,
    ) -> Result<Option<WriteResult>, QueryError>;

    /// `false` when the document did not exist
    async fn delete(&self, target: &DocumentTarget, id: &str) -> Result<bool, QueryError>;
}
