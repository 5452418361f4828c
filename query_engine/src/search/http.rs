//! [`SearchClient`] over the typed-document REST API (`/{index}/{type}/...`)

use super::client::SearchClient;
use super::model::{SearchHit, SearchRequest, SearchResponse, WriteResult};
use super::translator::translate_search_error;
use crate::entity::DocumentTarget;
use crate::errors::QueryError;
use async_trait::async_trait;
use config::SearchSettings;
use rand::Rng;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, enabled, Level};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(flatten)]
    hit: SearchHit,
}

/// HTTP client spreading requests round-robin over the cluster's nodes
#[derive(Debug)]
pub struct HttpSearchClient {
    client: Client,
    nodes: Vec<Url>,
    next: AtomicUsize,
}

impl HttpSearchClient {
    pub fn new(settings: &SearchSettings) -> Result<Self, QueryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| QueryError::backend("failed to create HTTP client", e))?;
        Self::with_client(client, &settings.base_urls())
    }

    /// Client for explicit base URLs such as `http://10.0.0.1:9200`
    pub fn with_client(client: Client, base_urls: &[String]) -> Result<Self, QueryError> {
        let nodes = base_urls
            .iter()
            .map(|url| {
                Url::parse(url).map_err(|e| QueryError::validation(format!("invalid search node '{}': {}", url, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if nodes.is_empty() {
            return Err(QueryError::validation("search client needs at least one node"));
        }
        // Random start so processes do not all hit the first node
        let start = rand::rng().random_range(0..nodes.len());
        Ok(Self {
            client,
            nodes,
            next: AtomicUsize::new(start),
        })
    }

    pub fn nodes(&self) -> &[Url] {
        &self.nodes
    }

    fn next_node(&self) -> &Url {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        &self.nodes[index]
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, QueryError> {
        let mut url = self.next_node().clone();
        let node = url.to_string();
        url.path_segments_mut()
            .map_err(|_| QueryError::validation(format!("search node '{}' cannot carry a path", node)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request; returns status and body, mapping transport failures
    async fn send(&self, request: RequestBuilder, action: &str) -> Result<(StatusCode, String), QueryError> {
        let response = request
            .send()
            .await
            .map_err(|e| QueryError::backend(format!("search {} request failed", action), e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QueryError::backend(format!("failed to read search {} response", action), e))?;
        Ok((status, body))
    }

    fn parse<T: DeserializeOwned>(body: &str, action: &str) -> Result<T, QueryError> {
        serde_json::from_str(body)
            .map_err(|e| QueryError::backend(format!("unexpected search {} response: {}", action, body), e))
    }

    fn ensure_success(status: StatusCode, body: &str) -> Result<(), QueryError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(translate_search_error(status.as_u16(), body))
        }
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, QueryError> {
        let url = self.endpoint(&[request.target.index, request.target.doc_type, "_search"])?;
        let body = request.search_body();
        if enabled!(Level::DEBUG) {
            debug!("search {}: {}", url, body);
        }
        let (status, text) = self.send(self.client.post(url).json(&body), "search").await?;
        Self::ensure_success(status, &text)?;
        Self::parse(&text, "search")
    }

    async fn count(&self, request: &SearchRequest) -> Result<u64, QueryError> {
        let url = self.endpoint(&[request.target.index, request.target.doc_type, "_count"])?;
        let body = request.count_body();
        if enabled!(Level::DEBUG) {
            debug!("count {}: {}", url, body);
        }
        let (status, text) = self.send(self.client.post(url).json(&body), "count").await?;
        Self::ensure_success(status, &text)?;
        Ok(Self::parse::<CountResponse>(&text, "count")?.count)
    }

    async fn get(&self, target: &DocumentTarget, id: &str) -> Result<Option<SearchHit>, QueryError> {
        let url = self.endpoint(&[target.index, target.doc_type, id])?;
        debug!("get {}", url);
        let (status, text) = self.send(self.client.get(url), "get").await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::ensure_success(status, &text)?;
        let response: GetResponse = Self::parse(&text, "get")?;
        Ok(response.found.then_some(response.hit))
    }

    async fn index(
        &self,
        target: &DocumentTarget,
        id: Option<&str>,
        document: &Map<String, Value>,
    ) -> Result<WriteResult, QueryError> {
        let request = match id {
            Some(id) => {
                let mut url = self.endpoint(&[target.index, target.doc_type, id])?;
                url.query_pairs_mut().append_pair("op_type", "create");
                self.client.put(url)
            }
            None => self.client.post(self.endpoint(&[target.index, target.doc_type])?),
        };
        if enabled!(Level::DEBUG) {
            debug!("index {}/{} id={:?}: {}", target.index, target.doc_type, id, serde_json::Value::Object(document.clone()));
        }
        let (status, text) = self.send(request.json(document), "index").await?;
        Self::ensure_success(status, &text)?;
        Self::parse(&text, "index")
    }

    async fn update(
        &self,
        target: &DocumentTarget,
        id: &str,
        document: &Map<String, Value>,
        expected_version: Option<i64>,
    ) -> Result<Option<WriteResult>, QueryError> {
        let mut url = self.endpoint(&[target.index, target.doc_type, id, "_update"])?;
        if let Some(version) = expected_version {
            url.query_pairs_mut().append_pair("version", &version.to_string());
        }
        let body = json!({ "doc": document });
        if enabled!(Level::DEBUG) {
            debug!("update {}: {}", url, body);
        }
        let (status, text) = self.send(self.client.post(url).json(&body), "update").await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::ensure_success(status, &text)?;
        Self::parse(&text, "update").map(Some)
    }

    async fn delete(&self, target: &DocumentTarget, id: &str) -> Result<bool, QueryError> {
        let url = self.endpoint(&[target.index, target.doc_type, id])?;
        debug!("delete {}", url);
        let (status, text) = self.send(self.client.delete(url), "delete").await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::ensure_success(status, &text)?;
        Ok(true)
    }
}
