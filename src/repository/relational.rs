//! Repository over a relational backend

use super::{check_fields, check_id, check_ids, check_sql, check_update, InsertOutcome};
use query_engine::sql::{format_sql, SqlRow, SqlStatement};
use query_engine::{
    ConnectionRouter, Criteria, Dialect, Entity, EntityMapper, Pageable, Query, QueryError, SqlBuilder,
    SqlExecutor, Update,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, Level};

/// CRUD and query operations for one entity type against one routed SQL
/// connection. Reads use the read route, writes the write route.
pub struct RelationalRepository<T: Entity> {
    router: Arc<ConnectionRouter<dyn SqlExecutor>>,
    mapper: EntityMapper<T>,
    builder: SqlBuilder,
}

impl<T: Entity> Clone for RelationalRepository<T> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
            mapper: self.mapper.clone(),
            builder: self.builder,
        }
    }
}

impl<T: Entity> std::fmt::Debug for RelationalRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalRepository")
            .field("entity", &T::entity_name())
            .field("dialect", &self.builder.dialect())
            .field("split_routes", &self.router.is_split())
            .finish()
    }
}

fn log_statement(statement: &SqlStatement) {
    if tracing::enabled!(Level::DEBUG) {
        debug!("{}", format_sql(&statement.sql, &statement.params));
    }
}

impl<T: Entity> RelationalRepository<T> {
    /// Fails when the entity has no table mapping
    pub fn new(
        router: Arc<ConnectionRouter<dyn SqlExecutor>>,
        mapper: EntityMapper<T>,
        dialect: Dialect,
    ) -> Result<Self, QueryError> {
        mapper.descriptor().table()?;
        Ok(Self {
            router,
            mapper,
            builder: SqlBuilder::new(dialect),
        })
    }

    pub fn mapper(&self) -> &EntityMapper<T> {
        &self.mapper
    }

    pub fn dialect(&self) -> Dialect {
        self.builder.dialect()
    }

    fn reader(&self) -> &dyn SqlExecutor {
        self.router.read_route().as_ref()
    }

    fn writer(&self) -> &dyn SqlExecutor {
        self.router.write_route().as_ref()
    }

    fn pk_name(&self) -> &'static str {
        self.mapper.pk_field().name
    }

    fn by_id(&self, id: Value) -> Result<Criteria, QueryError> {
        check_id(&id)?;
        Ok(Criteria::where_eq(self.pk_name(), id))
    }

    fn by_ids(&self, ids: Vec<Value>) -> Result<Criteria, QueryError> {
        check_ids(&ids)?;
        Ok(Criteria::new().in_values(self.pk_name(), ids))
    }

    fn rows_to_entities(&self, rows: &[SqlRow], grouped: bool) -> Result<Vec<T>, QueryError> {
        rows.iter()
            .map(|row| {
                // Grouped rows may carry a count alias named after a field
                if grouped {
                    self.mapper.attributes_to_entity(row)
                } else {
                    self.mapper.row_to_entity(row)
                }
            })
            .collect()
    }

    async fn count_statement(&self, statement: SqlStatement) -> Result<u64, QueryError> {
        log_statement(&statement);
        let count = self.reader().query_count(&statement).await?;
        u64::try_from(count).map_err(|_| {
            QueryError::mapping(format!("count statement returned a negative value: {}", count))
        })
    }

    pub async fn exists_by_id(&self, id: impl Into<Value>) -> Result<bool, QueryError> {
        let criteria = self.by_id(id.into())?;
        self.exists(&criteria).await
    }

    pub async fn exists(&self, criteria: &Criteria) -> Result<bool, QueryError> {
        Ok(self.find_one_fields(&[self.pk_name()], criteria).await?.is_some())
    }

    pub async fn count_all(&self) -> Result<u64, QueryError> {
        self.count_by_criteria(&Criteria::new()).await
    }

    pub async fn count_by_criteria(&self, criteria: &Criteria) -> Result<u64, QueryError> {
        let statement = self.builder.count(self.mapper.descriptor(), criteria)?;
        self.count_statement(statement).await
    }

    /// Caller-supplied SQL returning one integer; `params` bind in order
    pub async fn count_by_sql(&self, sql: &str, params: &[Value]) -> Result<u64, QueryError> {
        check_sql(sql)?;
        self.count_statement(SqlStatement::new(sql, params.to_vec())).await
    }

    pub async fn find_one_by_id(&self, id: impl Into<Value>) -> Result<Option<T>, QueryError> {
        let criteria = self.by_id(id.into())?;
        self.find_one(&criteria).await
    }

    pub async fn find_one(&self, criteria: &Criteria) -> Result<Option<T>, QueryError> {
        self.find_one_by_query(&Query::with_criteria(criteria.clone())).await
    }

    /// First match with only `fields` populated
    pub async fn find_one_fields(&self, fields: &[&str], criteria: &Criteria) -> Result<Option<T>, QueryError> {
        check_fields(fields)?;
        let query = Query::with_criteria(criteria.clone()).include_fields(fields.iter().copied());
        self.find_one_by_query(&query).await
    }

    pub async fn find_one_by_query(&self, query: &Query) -> Result<Option<T>, QueryError> {
        let query = query.clone().offset(0).limit(1);
        Ok(self.find_list_by_query(&query).await?.into_iter().next())
    }

    pub async fn find_one_by_sql(&self, sql: &str, params: &[Value]) -> Result<Option<T>, QueryError> {
        Ok(self.find_list_by_sql(sql, params).await?.into_iter().next())
    }

    pub async fn find_list_by_ids(&self, ids: Vec<Value>) -> Result<Vec<T>, QueryError> {
        let criteria = self.by_ids(ids)?;
        self.find_list(&criteria).await
    }

    pub async fn find_list(&self, criteria: &Criteria) -> Result<Vec<T>, QueryError> {
        self.find_list_by_query(&Query::with_criteria(criteria.clone())).await
    }

    pub async fn find_list_fields(&self, fields: &[&str], criteria: &Criteria) -> Result<Vec<T>, QueryError> {
        check_fields(fields)?;
        let query = Query::with_criteria(criteria.clone()).include_fields(fields.iter().copied());
        self.find_list_by_query(&query).await
    }

    pub async fn find_list_by_query(&self, query: &Query) -> Result<Vec<T>, QueryError> {
        let statement = self.builder.select(self.mapper.descriptor(), query)?;
        log_statement(&statement);
        let rows = self.reader().query_rows(&statement).await?;
        self.rows_to_entities(&rows, !query.groupings().is_empty())
    }

    /// Replaces any offset/limit already on `query` with the page bounds
    pub async fn find_list_by_query_paged(&self, query: &Query, pageable: &Pageable) -> Result<Vec<T>, QueryError> {
        self.find_list_by_query(&query.clone().paginate(pageable)).await
    }

    /// Caller-supplied SELECT; result columns map by backend name.
    ///
    /// Parameters bind untyped: a NULL binds as text and strings as text, so
    /// cast placeholders (`$1::uuid`) where the column needs another type.
    pub async fn find_list_by_sql(&self, sql: &str, params: &[Value]) -> Result<Vec<T>, QueryError> {
        check_sql(sql)?;
        let statement = SqlStatement::new(sql, params.to_vec());
        log_statement(&statement);
        let rows = self.reader().query_rows(&statement).await?;
        self.rows_to_entities(&rows, false)
    }

    pub async fn find_all(&self) -> Result<Vec<T>, QueryError> {
        self.find_list_by_query(&Query::new()).await
    }

    pub async fn find_all_paged(&self, pageable: &Pageable) -> Result<Vec<T>, QueryError> {
        self.find_list_by_query(&Query::new().paginate(pageable)).await
    }

    /// Insert every persisted field. An unset key is left to the backend and
    /// comes back in [`InsertOutcome::generated_key`].
    pub async fn insert(&self, entity: &T) -> Result<InsertOutcome, QueryError> {
        let values = self.mapper.to_persistable_map(entity, &[])?;
        let statement = self.builder.insert(self.mapper.descriptor(), &values)?;
        log_statement(&statement);
        let executed = self.writer().insert(&statement).await?;
        Ok(InsertOutcome {
            rows_affected: executed.rows_affected,
            generated_key: executed.generated_key,
            version: None,
        })
    }

    /// Update every non-key field of `entity`, matched by its key
    pub async fn update(&self, entity: &T) -> Result<u64, QueryError> {
        self.update_fields(entity, &[]).await
    }

    /// Update only `fields` of `entity`; an empty list means every non-key field
    pub async fn update_fields(&self, entity: &T, fields: &[&str]) -> Result<u64, QueryError> {
        let id = self.mapper.pk_value(entity)?;
        let update = self.mapper.entity_to_update(entity, fields)?;
        self.update_by_id(id, &update).await
    }

    pub async fn update_by_id(&self, id: impl Into<Value>, update: &Update) -> Result<u64, QueryError> {
        let criteria = self.by_id(id.into())?;
        self.update_by_criteria(&criteria, update).await
    }

    pub async fn update_by_ids(&self, ids: Vec<Value>, update: &Update) -> Result<u64, QueryError> {
        let criteria = self.by_ids(ids)?;
        self.update_by_criteria(&criteria, update).await
    }

    /// Empty criteria are refused; this never updates every row
    pub async fn update_by_criteria(&self, criteria: &Criteria, update: &Update) -> Result<u64, QueryError> {
        check_update(update)?;
        let statement = self.builder.update(self.mapper.descriptor(), update, criteria)?;
        log_statement(&statement);
        self.writer().execute(&statement).await
    }

    /// Caller-supplied mutating statement
    pub async fn update_by_sql(&self, sql: &str, params: &[Value]) -> Result<u64, QueryError> {
        check_sql(sql)?;
        let statement = SqlStatement::new(sql, params.to_vec());
        log_statement(&statement);
        self.writer().execute(&statement).await
    }

    pub async fn delete_by_id(&self, id: impl Into<Value>) -> Result<u64, QueryError> {
        let criteria = self.by_id(id.into())?;
        self.delete_by_criteria(&criteria).await
    }

    pub async fn delete_by_ids(&self, ids: Vec<Value>) -> Result<u64, QueryError> {
        let criteria = self.by_ids(ids)?;
        self.delete_by_criteria(&criteria).await
    }

    /// Empty criteria are refused; this never deletes every row
    pub async fn delete_by_criteria(&self, criteria: &Criteria) -> Result<u64, QueryError> {
        let statement = self.builder.delete(self.mapper.descriptor(), criteria)?;
        log_statement(&statement);
        self.writer().execute(&statement).await
    }
}
