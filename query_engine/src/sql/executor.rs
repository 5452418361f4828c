use super::builder::SqlStatement;
use crate::errors::QueryError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Row as returned by an executor, keyed by column name
pub type SqlRow = Map<String, Value>;

/// Result of executing an INSERT
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutedInsert {
    pub rows_affected: u64,
    /// Present only when the statement asked for key retrieval
    pub generated_key: Option<Value>,
}

/// Runs rendered statements against one relational connection.
///
/// Parameters are positional and match the statement's placeholders in order.
/// Executors type each parameter from `statement.param_kinds` when present.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn query_rows(&self, statement: &SqlStatement) -> Result<Vec<SqlRow>, QueryError>;

    /// Single integer from the first column of the first row
    async fn query_count(&self, statement: &SqlStatement) -> Result<i64, QueryError>;

    /// Rows affected
    async fn execute(&self, statement: &SqlStatement) -> Result<u64, QueryError>;

    /// Execute an INSERT honouring `statement.key_retrieval`
    async fn insert(&self, statement: &SqlStatement) -> Result<ExecutedInsert, QueryError>;
}
