//! In-memory backends shared by the integration tests

#![allow(dead_code)]

use querydeck::async_trait::async_trait;
use querydeck::prelude::*;
use querydeck::query_engine::entity::DocumentTarget;
use querydeck::query_engine::search::{SearchHit, SearchHits, SearchRequest, SearchResponse, WriteResult};
use querydeck::query_engine::sql::{ExecutedInsert, KeyRetrieval, SqlRow, SqlStatement};
use querydeck::query_engine::SqlExecutor;
use querydeck::query_engine::SearchClient;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "books", index = "books", doc_type = "book")]
pub struct Book {
    #[primary_key]
    pub id: i64,
    #[column(name = "book_title")]
    pub title: String,
    pub year: i32,
    pub total: Option<i64>,
    #[version]
    pub version: i64,
    #[transient]
    pub cached: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Entity)]
#[entity(index = "articles", doc_type = "article")]
pub struct Article {
    #[primary_key]
    pub id: String,
    pub headline: String,
    pub views: i64,
    #[version]
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlCall {
    Rows(SqlStatement),
    Count(SqlStatement),
    Execute(SqlStatement),
    Insert(SqlStatement),
}

impl SqlCall {
    pub fn statement(&self) -> &SqlStatement {
        match self {
            SqlCall::Rows(statement)
            | SqlCall::Count(statement)
            | SqlCall::Execute(statement)
            | SqlCall::Insert(statement) => statement,
        }
    }

    pub fn sql(&self) -> &str {
        &self.statement().sql
    }

    pub fn params(&self) -> &[Value] {
        &self.statement().params
    }
}

/// Records every statement and answers from canned results
#[derive(Default)]
pub struct RecordingSqlExecutor {
    pub calls: Mutex<Vec<SqlCall>>,
    pub rows: Mutex<Vec<SqlRow>>,
    pub count: Mutex<i64>,
    pub affected: Mutex<u64>,
    pub next_key: Mutex<Option<Value>>,
    pub fail_insert_with_duplicate: Mutex<bool>,
}

impl RecordingSqlExecutor {
    pub fn with_rows(rows: Vec<Value>) -> Self {
        let executor = Self::default();
        *executor.rows.lock().unwrap() = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        executor
    }

    pub fn calls(&self) -> Vec<SqlCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SqlExecutor for RecordingSqlExecutor {
    async fn query_rows(&self, statement: &SqlStatement) -> Result<Vec<SqlRow>, QueryError> {
        self.calls.lock().unwrap().push(SqlCall::Rows(statement.clone()));
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn query_count(&self, statement: &SqlStatement) -> Result<i64, QueryError> {
        self.calls.lock().unwrap().push(SqlCall::Count(statement.clone()));
        Ok(*self.count.lock().unwrap())
    }

    async fn execute(&self, statement: &SqlStatement) -> Result<u64, QueryError> {
        self.calls.lock().unwrap().push(SqlCall::Execute(statement.clone()));
        Ok(*self.affected.lock().unwrap())
    }

    async fn insert(&self, statement: &SqlStatement) -> Result<ExecutedInsert, QueryError> {
        self.calls.lock().unwrap().push(SqlCall::Insert(statement.clone()));
        if *self.fail_insert_with_duplicate.lock().unwrap() {
            return Err(QueryError::conflict(
                "duplicate key value violates unique constraint \"books_pkey\"",
                "23505",
            ));
        }
        let generated_key = match statement.key_retrieval {
            KeyRetrieval::None => None,
            KeyRetrieval::ReturnedRow { .. } | KeyRetrieval::DriverReported { .. } => {
                self.next_key.lock().unwrap().clone()
            }
        };
        Ok(ExecutedInsert {
            rows_affected: 1,
            generated_key,
        })
    }
}

/// Document store with per-document versions.
///
/// Searches ignore the query and return every document of the index, or the
/// canned response when one is set.
#[derive(Default)]
pub struct MemorySearchClient {
    pub documents: Mutex<BTreeMap<String, (Map<String, Value>, i64)>>,
    pub requests: Mutex<Vec<SearchRequest>>,
    pub canned: Mutex<Option<SearchResponse>>,
    pub reported_total: Mutex<Option<u64>>,
    next_id: AtomicU64,
}

impl MemorySearchClient {
    pub fn document(&self, id: &str) -> Option<(Map<String, Value>, i64)> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    pub fn last_request(&self) -> Option<SearchRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SearchClient for MemorySearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, QueryError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(response) = self.canned.lock().unwrap().clone() {
            return Ok(response);
        }
        let documents = self.documents.lock().unwrap();
        let hits: Vec<SearchHit> = documents
            .iter()
            .skip(request.from as usize)
            .take(request.size as usize)
            .map(|(id, (source, version))| SearchHit {
                id: id.clone(),
                version: Some(*version),
                source: Some(source.clone()),
            })
            .collect();
        let total = self.reported_total.lock().unwrap().unwrap_or(documents.len() as u64);
        Ok(SearchResponse {
            hits: SearchHits { total, hits },
            aggregations: None,
        })
    }

    async fn count(&self, request: &SearchRequest) -> Result<u64, QueryError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.documents.lock().unwrap().len() as u64)
    }

    async fn get(&self, _target: &DocumentTarget, id: &str) -> Result<Option<SearchHit>, QueryError> {
        Ok(self.document(id).map(|(source, version)| SearchHit {
            id: id.to_string(),
            version: Some(version),
            source: Some(source),
        }))
    }

    async fn index(
        &self,
        _target: &DocumentTarget,
        id: Option<&str>,
        document: &Map<String, Value>,
    ) -> Result<WriteResult, QueryError> {
        let id = match id {
            Some(id) => id.to_string(),
            None => format!("gen-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        let mut documents = self.documents.lock().unwrap();
        if documents.contains_key(&id) {
            return Err(QueryError::conflict(format!("document {} already exists", id), "409"));
        }
        documents.insert(id.clone(), (document.clone(), 1));
        Ok(WriteResult { id, version: 1 })
    }

    async fn update(
        &self,
        _target: &DocumentTarget,
        id: &str,
        document: &Map<String, Value>,
        expected_version: Option<i64>,
    ) -> Result<Option<WriteResult>, QueryError> {
        let mut documents = self.documents.lock().unwrap();
        let Some((source, version)) = documents.get_mut(id) else {
            return Ok(None);
        };
        if let Some(expected) = expected_version {
            if expected != *version {
                return Err(QueryError::conflict(
                    format!("version conflict: current {}, provided {}", version, expected),
                    "409",
                ));
            }
        }
        for (key, value) in document {
            source.insert(key.clone(), value.clone());
        }
        *version += 1;
        Ok(Some(WriteResult {
            id: id.to_string(),
            version: *version,
        }))
    }

    async fn delete(&self, _target: &DocumentTarget, id: &str) -> Result<bool, QueryError> {
        Ok(self.documents.lock().unwrap().remove(id).is_some())
    }
}
