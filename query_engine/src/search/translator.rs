//! Criteria and grouping translation for the search backend, and the reverse
//! mapping of hits and aggregation buckets onto entities.

use super::model::{SearchHit, SearchRequest, SearchResponse};
use crate::criteria::{Criteria, Criterion, GroupBy, LikePattern, Operator, Query, Update};
use crate::entity::{Entity, EntityDescriptor, EntityMapper, FieldMeta, VERSION_FIELD};
use crate::errors::QueryError;
use crate::renderer::QueryRenderer;
use serde_json::{json, Map, Value};

/// Wildcard character of the search query language
pub const SEARCH_WILDCARD: char = '*';

/// Default of the backend's `index.max_result_window` setting
pub const DEFAULT_MAX_RESULT_WINDOW: u64 = 10_000;

/// Most documents `update_by_criteria` touches in one call
pub const MAX_UPDATE_SIZE: u64 = 1000;

/// Page size of an unpaginated search. Exceeding the result window makes the
/// backend fail loudly instead of silently returning a truncated page.
pub const UNBOUNDED_SIZE: u64 = i32::MAX as u64;

/// Re-signal a failed search call.
///
/// Result-window failures name the limit and point at the scroll API; 409
/// responses become conflicts.
pub fn translate_search_error(status: u16, body: &str) -> QueryError {
    if body.contains("max_result_window") {
        return QueryError::backend(
            format!(
                "search result window exceeded: from + size must not exceed index.max_result_window \
                 (default {}); page through the results or use the scroll API for large result sets",
                DEFAULT_MAX_RESULT_WINDOW
            ),
            body.to_string(),
        );
    }
    if status == 409 {
        return QueryError::conflict(format!("search backend reported a conflict ({})", status), body.to_string());
    }
    QueryError::backend(format!("search backend returned status {}", status), body.to_string())
}

/// Renders criteria into a bool query and grouping into a terms aggregation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchTranslator;

impl SearchTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Document property for a field or backend name
    fn property(descriptor: &EntityDescriptor, field: &str) -> Result<&'static FieldMeta, QueryError> {
        descriptor
            .field(field)
            .or_else(|| descriptor.field_by_backend(field))
            .ok_or_else(|| {
                QueryError::validation(format!(
                    "{} has no field named '{}'",
                    descriptor.entity_name(),
                    field
                ))
            })
            .and_then(|meta| {
                if meta.is_version() {
                    Err(QueryError::validation(format!(
                        "version field '{}' is document metadata and cannot be queried",
                        meta.name
                    )))
                } else {
                    Ok(meta)
                }
            })
    }

    /// `match_all` for empty criteria, otherwise a bool query whose positive
    /// clauses go to `must` and negated ones to `must_not`
    pub fn criteria_to_query(&self, descriptor: &EntityDescriptor, criteria: &Criteria) -> Result<Value, QueryError> {
        if criteria.is_empty() {
            return Ok(json!({ "match_all": {} }));
        }

        let mut must = Vec::new();
        let mut must_not = Vec::new();
        for criterion in criteria {
            let (clause, negated) = Self::criterion_to_clause(descriptor, criterion)?;
            if negated {
                must_not.push(clause);
            } else {
                must.push(clause);
            }
        }

        let mut bool_query = Map::new();
        if !must.is_empty() {
            bool_query.insert("must".to_string(), Value::Array(must));
        }
        if !must_not.is_empty() {
            bool_query.insert("must_not".to_string(), Value::Array(must_not));
        }
        Ok(json!({ "bool": bool_query }))
    }

    fn criterion_to_clause(descriptor: &EntityDescriptor, criterion: &Criterion) -> Result<(Value, bool), QueryError> {
        let property = Self::property(descriptor, criterion.field())?.backend_name;
        let value = criterion.value().clone();
        let operator = criterion.operator();

        let scalar = |value: Value| -> Result<Value, QueryError> {
            match value {
                Value::Array(_) | Value::Object(_) | Value::Null => Err(QueryError::validation(format!(
                    "{} on '{}' requires a single non-null value",
                    operator,
                    criterion.field()
                ))),
                other => Ok(other),
            }
        };
        let single = |kind: &str, value: Value| {
            let mut inner = Map::new();
            inner.insert(property.to_string(), value);
            let mut clause = Map::new();
            clause.insert(kind.to_string(), Value::Object(inner));
            Value::Object(clause)
        };

        let clause = match operator {
            // term on null is meaningless; null equality becomes field absence
            Operator::Eq | Operator::Ne if value.is_null() => {
                let exists = json!({ "exists": { "field": property } });
                return Ok((exists, operator == Operator::Eq));
            }
            Operator::Eq | Operator::Ne => single("term", scalar(value)?),
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let bound = operator.name().to_ascii_lowercase();
                let mut range = Map::new();
                range.insert(bound, scalar(value)?);
                single("range", Value::Object(range))
            }
            Operator::In | Operator::Nin => match value {
                Value::Array(values) if !values.is_empty() => single("terms", Value::Array(values)),
                _ => {
                    return Err(QueryError::validation(format!(
                        "{} on '{}' requires a non-empty collection",
                        operator,
                        criterion.field()
                    )))
                }
            },
            Operator::Like => {
                let pattern = value.as_str().ok_or_else(|| {
                    QueryError::validation(format!("LIKE on '{}' requires a string pattern", criterion.field()))
                })?;
                match LikePattern::classify(pattern) {
                    LikePattern::Prefix(prefix) => single("prefix", Value::String(prefix)),
                    wildcard => single("wildcard", Value::String(wildcard.with_wildcard(SEARCH_WILDCARD))),
                }
            }
            Operator::Match => single("match", scalar(value)?),
            Operator::MatchPhrase => single("match_phrase", scalar(value)?),
        };
        Ok((clause, operator.is_negated()))
    }

    /// Terms aggregation named `<property>_group`; more than one grouping is rejected
    pub fn aggregation(
        &self,
        descriptor: &EntityDescriptor,
        group_bys: &[GroupBy],
    ) -> Result<Option<(String, Value)>, QueryError> {
        let Some(group_by) = GroupBy::single(group_bys)? else {
            return Ok(None);
        };
        let property = Self::property(descriptor, &group_by.field)?.backend_name;
        Ok(Some((
            Self::aggregation_name(property),
            json!({ "terms": { "field": property } }),
        )))
    }

    pub fn aggregation_name(property: &str) -> String {
        format!("{}_group", property)
    }

    /// Full search request for a query
    pub fn search_request(&self, descriptor: &EntityDescriptor, query: &Query) -> Result<SearchRequest, QueryError> {
        let target = descriptor.document()?;
        let aggregation = self.aggregation(descriptor, query.groupings())?;
        let query_dsl = self.criteria_to_query(descriptor, query.criteria())?;

        let source_includes = query
            .fields()
            .iter()
            .map(|field| Self::property(descriptor, field).map(|meta| meta.backend_name.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        let sort = query
            .orderings()
            .iter()
            .map(|order| {
                Self::property(descriptor, &order.field)
                    .map(|meta| json!({ meta.backend_name: { "order": order.direction.to_search() } }))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Grouped queries only read buckets
        let (from, size) = if aggregation.is_some() {
            (0, 0)
        } else {
            (
                query.offset_value().unwrap_or(0),
                query.limit_value().filter(|l| *l > 0).unwrap_or(UNBOUNDED_SIZE),
            )
        };

        Ok(SearchRequest {
            target,
            query: query_dsl,
            aggregation,
            source_includes,
            from,
            size,
            sort,
        })
    }

    /// Request whose query counts matching documents
    pub fn count_request(&self, descriptor: &EntityDescriptor, criteria: &Criteria) -> Result<SearchRequest, QueryError> {
        Ok(SearchRequest {
            target: descriptor.document()?,
            query: self.criteria_to_query(descriptor, criteria)?,
            aggregation: None,
            source_includes: Vec::new(),
            from: 0,
            size: 0,
            sort: Vec::new(),
        })
    }

    /// Document body for indexing; the version field never reaches the store
    pub fn document_body<T: Entity>(&self, mapper: &EntityMapper<T>, entity: &T) -> Result<Map<String, Value>, QueryError> {
        Ok(mapper
            .to_persistable_map(entity, &[])?
            .into_iter()
            .map(|(property, value)| (property.to_string(), value))
            .collect())
    }

    /// Partial document for an update call, keyed by property
    pub fn update_body(&self, descriptor: &EntityDescriptor, update: &Update) -> Result<Map<String, Value>, QueryError> {
        let mut doc = Map::new();
        for (field, value) in update.entries() {
            if descriptor.field(field).is_some_and(|meta| meta.is_version()) || field == VERSION_FIELD {
                continue;
            }
            let property = Self::property(descriptor, field)?.backend_name;
            doc.insert(property.to_string(), value.clone());
        }
        if doc.is_empty() {
            return Err(QueryError::validation("update must set at least one field"));
        }
        Ok(doc)
    }

    /// Entity from one hit. The hit version is attached under the reserved
    /// version property and a missing key is taken from the document id.
    pub fn hit_to_entity<T: Entity>(&self, mapper: &EntityMapper<T>, hit: &SearchHit) -> Result<T, QueryError> {
        let mut source = hit.source.clone().unwrap_or_default();
        let descriptor = mapper.descriptor();
        if let (Some(_), Some(version)) = (descriptor.version_field(), hit.version) {
            source.insert(VERSION_FIELD.to_string(), Value::from(version));
        }
        let pk = descriptor.primary_key().backend_name;
        if source.get(pk).map_or(true, crate::entity::is_pk_unset) {
            source.insert(pk.to_string(), Value::String(hit.id.clone()));
        }
        mapper.row_to_entity(&source)
    }

    pub fn hits_to_entities<T: Entity>(
        &self,
        mapper: &EntityMapper<T>,
        response: &SearchResponse,
    ) -> Result<Vec<T>, QueryError> {
        response
            .hits
            .hits
            .iter()
            .map(|hit| self.hit_to_entity(mapper, hit))
            .collect()
    }

    /// One entity per bucket: the group property set to the bucket key and the
    /// optional count alias set to the bucket's document count
    pub fn buckets_to_entities<T: Entity>(
        &self,
        mapper: &EntityMapper<T>,
        response: &SearchResponse,
        group_bys: &[GroupBy],
    ) -> Result<Vec<T>, QueryError> {
        let Some(group_by) = GroupBy::single(group_bys)? else {
            return Ok(Vec::new());
        };
        let property = Self::property(mapper.descriptor(), &group_by.field)?.backend_name;
        response
            .terms_buckets(&Self::aggregation_name(property))
            .into_iter()
            .map(|bucket| {
                let mut attributes = Map::new();
                attributes.insert(property.to_string(), bucket.key);
                if let Some(alias) = group_by.count_alias.as_deref().filter(|a| !a.trim().is_empty()) {
                    attributes.insert(alias.to_string(), Value::from(bucket.doc_count));
                }
                mapper.attributes_to_entity(&attributes)
            })
            .collect()
    }
}

impl QueryRenderer for SearchTranslator {
    type Output = SearchRequest;

    fn render_query(&self, descriptor: &EntityDescriptor, query: &Query) -> Result<SearchRequest, QueryError> {
        self.search_request(descriptor, query)
    }

    fn render_count(&self, descriptor: &EntityDescriptor, criteria: &Criteria) -> Result<SearchRequest, QueryError> {
        self.count_request(descriptor, criteria)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{OrderBy, Pageable};
    use crate::entity::{DocumentTarget, FieldKind, MapperRegistry};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Book {
        id: String,
        title: String,
        year: i32,
        copies: i64,
        version: Option<i64>,
    }

    impl Entity for Book {
        fn entity_name() -> &'static str {
            "Book"
        }
        fn document() -> Option<DocumentTarget> {
            Some(DocumentTarget {
                index: "books",
                doc_type: "book",
            })
        }
        fn fields() -> &'static [FieldMeta] {
            static FIELDS: [FieldMeta; 5] = [
                FieldMeta::primary_key("id", "String"),
                FieldMeta::new("title", "book_title", FieldKind::Normal, "String"),
                FieldMeta::normal("year", "i32"),
                FieldMeta::normal("copies", "i64"),
                FieldMeta::version("version", "Option<i64>"),
            ];
            &FIELDS
        }
    }

    fn mapper() -> EntityMapper<Book> {
        MapperRegistry::new().mapper::<Book>().unwrap()
    }

    fn translate(criteria: Criteria) -> Result<Value, QueryError> {
        SearchTranslator::new().criteria_to_query(mapper().descriptor(), &criteria)
    }

    #[test]
    fn test_empty_criteria_matches_all() {
        assert_eq!(translate(Criteria::new()).unwrap(), json!({ "match_all": {} }));
    }

    #[test]
    fn test_operator_clauses() {
        let query = translate(
            Criteria::where_eq("title", "Dune")
                .gte("year", 1960)
                .lt("year", 1970)
                .ne("copies", 0)
                .in_values("year", vec![1965, 1966])
                .not_in_values("title", vec!["Emma"])
                .matches("title", "desert")
                .match_phrase("title", "spice must flow"),
        )
        .unwrap();

        assert_eq!(
            query,
            json!({ "bool": {
                "must": [
                    { "term": { "book_title": "Dune" } },
                    { "range": { "year": { "gte": 1960 } } },
                    { "range": { "year": { "lt": 1970 } } },
                    { "terms": { "year": [1965, 1966] } },
                    { "match": { "book_title": "desert" } },
                    { "match_phrase": { "book_title": "spice must flow" } }
                ],
                "must_not": [
                    { "term": { "copies": 0 } },
                    { "terms": { "book_title": ["Emma"] } }
                ]
            }})
        );
    }

    #[test]
    fn test_like_translation() {
        let clause = |pattern: &str| {
            translate(Criteria::new().like("title", pattern)).unwrap()["bool"]["must"][0].clone()
        };
        assert_eq!(clause("abc%"), json!({ "prefix": { "book_title": "abc" } }));
        assert_eq!(clause("%abc%"), json!({ "wildcard": { "book_title": "*abc*" } }));
        assert_eq!(clause("%abc"), json!({ "wildcard": { "book_title": "*abc" } }));
    }

    #[test]
    fn test_null_equality_uses_exists() {
        let query = translate(Criteria::where_eq("title", Value::Null).ne("year", Value::Null)).unwrap();
        assert_eq!(
            query,
            json!({ "bool": {
                "must": [{ "exists": { "field": "year" } }],
                "must_not": [{ "exists": { "field": "book_title" } }]
            }})
        );
    }

    #[test]
    fn test_invalid_criteria() {
        assert!(translate(Criteria::where_eq("nope", 1)).unwrap_err().is_validation());
        assert!(translate(Criteria::new().in_values("year", Vec::<i32>::new())).unwrap_err().is_validation());
        assert!(translate(Criteria::where_eq("version", 1)).unwrap_err().is_validation());
        assert!(translate(Criteria::new().gt("year", json!([1]))).unwrap_err().is_validation());
    }

    #[test]
    fn test_search_request_paging_and_sort() {
        let query = Query::with_criteria(Criteria::where_eq("year", 1965))
            .include_fields(["title"])
            .order_by(OrderBy::desc("year"))
            .paginate(&Pageable::new(3, 20).unwrap());
        let request = SearchTranslator::new()
            .search_request(mapper().descriptor(), &query)
            .unwrap();

        assert_eq!(request.target.index, "books");
        assert_eq!(request.from, 40);
        assert_eq!(request.size, 20);
        assert_eq!(request.source_includes, vec!["book_title".to_string()]);
        assert_eq!(request.sort, vec![json!({ "year": { "order": "desc" } })]);
    }

    #[test]
    fn test_unpaginated_search_is_unbounded() {
        let request = SearchTranslator::new()
            .search_request(mapper().descriptor(), &Query::new())
            .unwrap();
        assert_eq!(request.from, 0);
        assert_eq!(request.size, UNBOUNDED_SIZE);
    }

    #[test]
    fn test_group_by_aggregation() {
        let translator = SearchTranslator::new();
        let mapper = mapper();
        let agg = translator
            .aggregation(mapper.descriptor(), &[GroupBy::new("year")])
            .unwrap()
            .unwrap();
        assert_eq!(agg.0, "year_group");
        assert_eq!(agg.1, json!({ "terms": { "field": "year" } }));

        let two = [GroupBy::new("year"), GroupBy::new("title")];
        assert!(translator.aggregation(mapper.descriptor(), &two).unwrap_err().is_validation());
    }

    #[test]
    fn test_buckets_to_entities() {
        let response: SearchResponse = serde_json::from_value(json!({
            "hits": { "total": 4, "hits": [] },
            "aggregations": { "year_group": { "buckets": [
                { "key": 1965, "doc_count": 3 },
                { "key": 1984, "doc_count": 1 }
            ] } }
        }))
        .unwrap();
        let group_bys = [GroupBy::new("year").with_count_alias("copies")];
        let books = SearchTranslator::new()
            .buckets_to_entities(&mapper(), &response, &group_bys)
            .unwrap();

        assert_eq!(books.len(), 2);
        assert_eq!(books[0].year, 1965);
        assert_eq!(books[0].copies, 3);
        assert_eq!(books[1].year, 1984);
    }

    #[test]
    fn test_hits_carry_version_and_id() {
        let response: SearchResponse = serde_json::from_value(json!({
            "hits": { "total": 1, "hits": [{
                "_id": "b-1",
                "_version": 4,
                "_source": { "book_title": "Dune", "year": 1965, "copies": 2 }
            }] }
        }))
        .unwrap();
        let books = SearchTranslator::new().hits_to_entities(&mapper(), &response).unwrap();
        assert_eq!(books[0].id, "b-1");
        assert_eq!(books[0].title, "Dune");
        assert_eq!(books[0].version, Some(4));
    }

    #[test]
    fn test_document_and_update_bodies() {
        let translator = SearchTranslator::new();
        let mapper = mapper();
        let book = Book {
            id: "b-2".to_string(),
            title: "Emma".to_string(),
            year: 1815,
            copies: 1,
            version: Some(7),
        };
        let body = translator.document_body(&mapper, &book).unwrap();
        assert_eq!(body.get("book_title"), Some(&json!("Emma")));
        assert!(!body.contains_key(VERSION_FIELD));
        assert!(!body.contains_key("version"));

        let update = Update::new().set("title", "Persuasion").set("version", 9);
        let doc = translator.update_body(mapper.descriptor(), &update).unwrap();
        assert_eq!(Value::Object(doc), json!({ "book_title": "Persuasion" }));
        assert!(translator
            .update_body(mapper.descriptor(), &Update::new().set("version", 1))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_error_translation() {
        let window = translate_search_error(
            500,
            r#"{"error":{"reason":"Result window is too large ... [index.max_result_window] index level setting."}}"#,
        );
        assert!(window.is_backend());
        let message = window.to_string();
        assert!(message.contains("index.max_result_window"));
        assert!(message.contains("10000"));
        assert!(message.contains("scroll"));

        assert!(translate_search_error(409, "version_conflict_engine_exception").is_conflict());
        assert!(translate_search_error(400, "parsing_exception").is_backend());
    }
}
