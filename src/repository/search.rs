//! Repository over a search backend

use super::{check_id, check_ids, check_update, InsertOutcome};
use query_engine::entity::{is_pk_unset, DocumentTarget, KeyType};
use query_engine::search::{SearchRequest, SearchResponse, MAX_UPDATE_SIZE};
use query_engine::{
    ConnectionRouter, Criteria, Entity, EntityMapper, Pageable, Query, QueryError, SearchClient, SearchTranslator,
    Update,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, Level};

/// CRUD and query operations for one entity type against one search cluster.
///
/// Documents are addressed by the entity's primary key rendered as text. The
/// version field is stripped from every write and filled from the backend's
/// document version on every read.
pub struct SearchRepository<T: Entity> {
    router: Arc<ConnectionRouter<dyn SearchClient>>,
    mapper: EntityMapper<T>,
    translator: SearchTranslator,
    target: DocumentTarget,
}

impl<T: Entity> Clone for SearchRepository<T> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
            mapper: self.mapper.clone(),
            translator: self.translator,
            target: self.target,
        }
    }
}

impl<T: Entity> std::fmt::Debug for SearchRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRepository")
            .field("entity", &T::entity_name())
            .field("index", &self.target.index)
            .field("doc_type", &self.target.doc_type)
            .finish()
    }
}

/// Document id for a key value
fn document_id(id: &Value) -> Result<String, QueryError> {
    check_id(id)?;
    match id {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(QueryError::validation(format!(
            "document ids must be integers or strings, got {}",
            other
        ))),
    }
}

fn log_request(operation: &str, request: &SearchRequest) {
    if tracing::enabled!(Level::DEBUG) {
        let body = if operation == "count" {
            request.count_body()
        } else {
            request.search_body()
        };
        debug!(
            "{} /{}/{}: {}",
            operation, request.target.index, request.target.doc_type, body
        );
    }
}

impl<T: Entity> SearchRepository<T> {
    /// Fails when the entity has no index/document type mapping
    pub fn new(router: Arc<ConnectionRouter<dyn SearchClient>>, mapper: EntityMapper<T>) -> Result<Self, QueryError> {
        let target = mapper.descriptor().document()?;
        Ok(Self {
            router,
            mapper,
            translator: SearchTranslator::new(),
            target,
        })
    }

    pub fn mapper(&self) -> &EntityMapper<T> {
        &self.mapper
    }

    pub fn target(&self) -> DocumentTarget {
        self.target
    }

    fn reader(&self) -> &dyn SearchClient {
        self.router.read_route().as_ref()
    }

    fn writer(&self) -> &dyn SearchClient {
        self.router.write_route().as_ref()
    }

    async fn search(&self, query: &Query) -> Result<(SearchRequest, SearchResponse), QueryError> {
        let request = self.translator.search_request(self.mapper.descriptor(), query)?;
        log_request("search", &request);
        let response = self.reader().search(&request).await?;
        Ok((request, response))
    }

    pub async fn exists_by_id(&self, id: impl Into<Value>) -> Result<bool, QueryError> {
        let id = document_id(&id.into())?;
        Ok(self.reader().get(&self.target, &id).await?.is_some())
    }

    pub async fn exists(&self, criteria: &Criteria) -> Result<bool, QueryError> {
        Ok(self.count_by_criteria(criteria).await? > 0)
    }

    pub async fn count_all(&self) -> Result<u64, QueryError> {
        self.count_by_criteria(&Criteria::new()).await
    }

    pub async fn count_by_criteria(&self, criteria: &Criteria) -> Result<u64, QueryError> {
        let request = self.translator.count_request(self.mapper.descriptor(), criteria)?;
        log_request("count", &request);
        self.reader().count(&request).await
    }

    pub async fn find_one_by_id(&self, id: impl Into<Value>) -> Result<Option<T>, QueryError> {
        let id = document_id(&id.into())?;
        if tracing::enabled!(Level::DEBUG) {
            debug!("get /{}/{}/{}", self.target.index, self.target.doc_type, id);
        }
        match self.reader().get(&self.target, &id).await? {
            Some(hit) => self.translator.hit_to_entity(&self.mapper, &hit).map(Some),
            None => Ok(None),
        }
    }

    pub async fn find_one(&self, criteria: &Criteria) -> Result<Option<T>, QueryError> {
        self.find_one_by_query(&Query::with_criteria(criteria.clone())).await
    }

    pub async fn find_one_by_query(&self, query: &Query) -> Result<Option<T>, QueryError> {
        let query = query.clone().offset(0).limit(1);
        Ok(self.find_list_by_query(&query).await?.into_iter().next())
    }

    /// Documents for `ids` in the given order; missing ids are skipped
    pub async fn find_list_by_ids(&self, ids: Vec<Value>) -> Result<Vec<T>, QueryError> {
        check_ids(&ids)?;
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.find_one_by_id(id).await? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    pub async fn find_list(&self, criteria: &Criteria) -> Result<Vec<T>, QueryError> {
        self.find_list_by_query(&Query::with_criteria(criteria.clone())).await
    }

    /// Hits, or one entity per bucket when the query is grouped
    pub async fn find_list_by_query(&self, query: &Query) -> Result<Vec<T>, QueryError> {
        let (_, response) = self.search(query).await?;
        if query.groupings().is_empty() {
            self.translator.hits_to_entities(&self.mapper, &response)
        } else {
            self.translator
                .buckets_to_entities(&self.mapper, &response, query.groupings())
        }
    }

    pub async fn find_list_by_query_paged(&self, query: &Query, pageable: &Pageable) -> Result<Vec<T>, QueryError> {
        self.find_list_by_query(&query.clone().paginate(pageable)).await
    }

    /// Every document; fails loudly when the index holds more than its result window allows
    pub async fn find_all(&self) -> Result<Vec<T>, QueryError> {
        self.find_list_by_query(&Query::new()).await
    }

    /// Index a new document. A set key becomes the document id and must not
    /// exist yet. An unset `String` key lets the backend assign one, returned
    /// as [`InsertOutcome::generated_key`]; backend ids are not numeric, so
    /// an unset integer key is a Validation error.
    pub async fn insert(&self, entity: &T) -> Result<InsertOutcome, QueryError> {
        let pk = self.mapper.pk_field();
        let pk_value = self.mapper.pk_value(entity)?;
        let pk_unset = is_pk_unset(&pk_value);
        if pk_unset && self.mapper.descriptor().key_type() != KeyType::Text {
            return Err(QueryError::validation(format!(
                "{} has an integer primary key '{}'; assign it before indexing",
                T::entity_name(),
                pk.name
            )));
        }
        let mut body = self.translator.document_body(&self.mapper, entity)?;

        let id = if pk_unset {
            body.remove(pk.backend_name);
            None
        } else {
            Some(document_id(&pk_value)?)
        };

        if tracing::enabled!(Level::DEBUG) {
            debug!(
                "index /{}/{}/{}: {}",
                self.target.index,
                self.target.doc_type,
                id.as_deref().unwrap_or("_"),
                serde_json::Value::Object(body.clone())
            );
        }
        let written = self.writer().index(&self.target, id.as_deref(), &body).await?;
        Ok(InsertOutcome {
            rows_affected: 1,
            generated_key: id.is_none().then(|| Value::String(written.id)),
            version: Some(written.version),
        })
    }

    /// Update every non-key field of `entity`. When the entity carries a
    /// version, the write only succeeds against that version and a mismatch
    /// is a conflict.
    pub async fn update(&self, entity: &T) -> Result<u64, QueryError> {
        let id = document_id(&self.mapper.pk_value(entity)?)?;
        let expected_version = self.mapper.version_of(entity)?.filter(|v| *v > 0);
        let update = self.mapper.entity_to_update(entity, &[])?;
        self.update_document(&id, &update, expected_version).await
    }

    pub async fn update_by_id(&self, id: impl Into<Value>, update: &Update) -> Result<u64, QueryError> {
        check_update(update)?;
        let id = document_id(&id.into())?;
        self.update_document(&id, update, None).await
    }

    /// Update every matching document, one call each. Refuses empty criteria
    /// and matches beyond [`MAX_UPDATE_SIZE`] documents.
    pub async fn update_by_criteria(&self, criteria: &Criteria, update: &Update) -> Result<u64, QueryError> {
        if criteria.is_empty() {
            return Err(QueryError::validation(
                "update requires non-empty criteria; refusing to update every document",
            ));
        }
        check_update(update)?;
        // Fail before the first write when the payload is unusable
        self.translator.update_body(self.mapper.descriptor(), update)?;

        let pk = self.mapper.pk_field().name;
        let query = Query::with_criteria(criteria.clone())
            .include_field(pk)
            .offset(0)
            .limit(MAX_UPDATE_SIZE);
        let (_, response) = self.search(&query).await?;
        if response.hits.total > MAX_UPDATE_SIZE {
            return Err(QueryError::validation(format!(
                "criteria match {} documents; update_by_criteria updates at most {}",
                response.hits.total, MAX_UPDATE_SIZE
            )));
        }

        let mut updated = 0;
        for hit in &response.hits.hits {
            updated += self.update_document(&hit.id, update, None).await?;
        }
        Ok(updated)
    }

    pub async fn delete_by_id(&self, id: impl Into<Value>) -> Result<u64, QueryError> {
        let id = document_id(&id.into())?;
        if tracing::enabled!(Level::DEBUG) {
            debug!("delete /{}/{}/{}", self.target.index, self.target.doc_type, id);
        }
        Ok(u64::from(self.writer().delete(&self.target, &id).await?))
    }

    async fn update_document(&self, id: &str, update: &Update, expected_version: Option<i64>) -> Result<u64, QueryError> {
        let doc = self.translator.update_body(self.mapper.descriptor(), update)?;
        if tracing::enabled!(Level::DEBUG) {
            debug!(
                "update /{}/{}/{} (version {:?}): {}",
                self.target.index,
                self.target.doc_type,
                id,
                expected_version,
                serde_json::Value::Object(doc.clone())
            );
        }
        let written = self.writer().update(&self.target, id, &doc, expected_version).await?;
        Ok(u64::from(written.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_ids() {
        assert_eq!(document_id(&json!(42)).unwrap(), "42");
        assert_eq!(document_id(&json!("abc")).unwrap(), "abc");
        assert!(document_id(&json!(1.5)).unwrap_err().is_validation());
        assert!(document_id(&json!("")).unwrap_err().is_validation());
    }
}
