//! Search request and response shapes

use crate::entity::DocumentTarget;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Rendered search: query DSL plus projection, paging, ordering and the optional aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub target: DocumentTarget,
    pub query: Value,
    /// Aggregation name and definition
    pub aggregation: Option<(String, Value)>,
    /// `_source` includes; empty returns whole documents
    pub source_includes: Vec<String>,
    pub from: u64,
    pub size: u64,
    pub sort: Vec<Value>,
}

impl SearchRequest {
    /// Body for `_search`; always asks for document versions
    pub fn search_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".to_string(), self.query.clone());
        body.insert("from".to_string(), json!(self.from));
        body.insert("size".to_string(), json!(self.size));
        body.insert("version".to_string(), Value::Bool(true));
        if !self.source_includes.is_empty() {
            body.insert("_source".to_string(), json!({ "includes": self.source_includes }));
        }
        if !self.sort.is_empty() {
            body.insert("sort".to_string(), Value::Array(self.sort.clone()));
        }
        if let Some((name, aggregation)) = &self.aggregation {
            let mut aggs = Map::new();
            aggs.insert(name.clone(), aggregation.clone());
            body.insert("aggs".to_string(), Value::Object(aggs));
        }
        Value::Object(body)
    }

    /// Body for `_count`
    pub fn count_body(&self) -> Value {
        json!({ "query": self.query })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

fn deserialize_total<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match TotalHits::deserialize(deserializer)? {
        TotalHits::Count(total) => total,
        TotalHits::Object { value } => value,
    })
}

/// One document as returned by `_search` hits or a GET
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    #[serde(rename = "_source", default)]
    pub source: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchHits {
    /// Plain number (6.x) or `{ "value": n }` (7.x)
    #[serde(default, deserialize_with = "deserialize_total")]
    pub total: u64,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: SearchHits,
    #[serde(default)]
    pub aggregations: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TermsBucket {
    pub key: Value,
    pub doc_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TermsAggregation {
    #[serde(default)]
    buckets: Vec<TermsBucket>,
}

impl SearchResponse {
    /// Buckets of the named terms aggregation; empty when absent
    pub fn terms_buckets(&self, name: &str) -> Vec<TermsBucket> {
        self.aggregations
            .as_ref()
            .and_then(|aggs| aggs.get(name))
            .and_then(|agg| serde_json::from_value::<TermsAggregation>(agg.clone()).ok())
            .map(|agg| agg.buckets)
            .unwrap_or_default()
    }
}

/// Outcome of an index or update call
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WriteResult {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version", default)]
    pub version: i64,
}
