//! SQL statement construction
//!
//! Every criterion value is bound as a parameter; only validated identifiers
//! and pagination numbers are written into the statement text.

use super::dialect::{Dialect, DialectRules, GeneratedKeys};
use crate::criteria::{Criteria, Criterion, GroupBy, LikePattern, Operator, Query, Update, COMMON_WILDCARD};
use crate::entity::{is_pk_unset, EntityDescriptor, FieldMeta, PersistableMap, ScalarKind};
use crate::errors::QueryError;
use crate::renderer::QueryRenderer;
use crate::validation::validate_column_name;
use serde_json::Value;

/// How the executor should obtain a generated primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRetrieval {
    /// Key was supplied by the caller or the statement is not an insert
    None,
    /// The statement returns the key as a single-column row
    ReturnedRow { column: &'static str },
    /// The driver reports the last inserted id
    DriverReported { column: &'static str },
}

/// Rendered statement with its ordered parameter values.
///
/// `param_kinds` runs parallel to `params` and records the declared kind of
/// the field each value was bound for; `None` when no field is known, as for
/// caller-supplied SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub param_kinds: Vec<Option<ScalarKind>>,
    pub key_retrieval: KeyRetrieval,
}

impl SqlStatement {
    /// Statement with untyped parameters
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        let param_kinds = vec![None; params.len()];
        Self {
            sql: sql.into(),
            params,
            param_kinds,
            key_retrieval: KeyRetrieval::None,
        }
    }

    fn from_sink(sql: String, sink: ParamSink) -> Self {
        Self {
            sql,
            params: sink.values,
            param_kinds: sink.kinds,
            key_retrieval: KeyRetrieval::None,
        }
    }

    /// Declared kind of the parameter at `index`
    pub fn param_kind(&self, index: usize) -> Option<ScalarKind> {
        self.param_kinds.get(index).copied().flatten()
    }
}

/// Renders `sql` with its bound values for debug logging
pub fn format_sql(sql: &str, params: &[Value]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }
    let rendered = params.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
    format!("{} -- params: [{}]", sql, rendered)
}

/// Collects parameter values and hands out sequential placeholders
struct ParamSink {
    dialect: Dialect,
    values: Vec<Value>,
    kinds: Vec<Option<ScalarKind>>,
}

impl ParamSink {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
            kinds: Vec::new(),
        }
    }

    fn push(&mut self, value: Value, kind: Option<ScalarKind>) -> String {
        self.values.push(value);
        self.kinds.push(kind);
        self.dialect.placeholder(self.values.len())
    }
}

/// Dialect-aware SQL renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlBuilder {
    dialect: Dialect,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// SELECT with projection, filtering, grouping, ordering and pagination
    pub fn select(&self, descriptor: &EntityDescriptor, query: &Query) -> Result<SqlStatement, QueryError> {
        let table = descriptor.table()?;
        let group_by = GroupBy::single(query.groupings())?;
        let mut params = ParamSink::new(self.dialect);

        let mut sql = format!(
            "SELECT {} FROM {}",
            Self::build_projection(descriptor, query.fields(), group_by)?,
            table
        );
        sql.push_str(&Self::build_where_clause(descriptor, query.criteria(), &mut params)?);
        if let Some(group_by) = group_by {
            sql.push_str(&format!(" GROUP BY {}", Self::column(descriptor, &group_by.field)?));
        }
        let order_clause = Self::build_order_clause(descriptor, query)?;
        let ordered = !order_clause.is_empty();
        sql.push_str(&order_clause);

        let sql = self
            .dialect
            .paginate(sql, query.offset_value(), query.limit_value(), ordered);
        Ok(SqlStatement::from_sink(sql, params))
    }

    pub fn count(&self, descriptor: &EntityDescriptor, criteria: &Criteria) -> Result<SqlStatement, QueryError> {
        let mut params = ParamSink::new(self.dialect);
        let mut sql = format!("SELECT COUNT(*) FROM {}", descriptor.table()?);
        sql.push_str(&Self::build_where_clause(descriptor, criteria, &mut params)?);
        Ok(SqlStatement::from_sink(sql, params))
    }

    /// INSERT from a persistable map that includes the primary key column.
    ///
    /// A set key is inserted explicitly. An unset key is omitted and fetched
    /// back with the dialect's generated-key mechanism.
    pub fn insert(&self, descriptor: &EntityDescriptor, values: &PersistableMap) -> Result<SqlStatement, QueryError> {
        let table = descriptor.table()?;
        let pk = descriptor.primary_key().backend_name;
        let pk_unset = values
            .iter()
            .find(|(column, _)| *column == pk)
            .map_or(true, |(_, value)| is_pk_unset(value));

        let mut params = ParamSink::new(self.dialect);
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        for (column, value) in values {
            if pk_unset && *column == pk {
                continue;
            }
            columns.push(*column);
            placeholders.push(params.push(value.clone(), descriptor.scalar_kind_of_backend(column)));
        }
        if columns.is_empty() {
            return Err(QueryError::validation(format!(
                "nothing to insert for {}",
                descriptor.entity_name()
            )));
        }

        let columns = columns.join(", ");
        let placeholders = placeholders.join(", ");
        let (sql, key_retrieval) = match (pk_unset, self.dialect.generated_keys()) {
            (false, _) => (
                format!("INSERT INTO {} ({}) VALUES ({})", table, columns, placeholders),
                KeyRetrieval::None,
            ),
            (true, GeneratedKeys::Returning) => (
                format!(
                    "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                    table, columns, placeholders, pk
                ),
                KeyRetrieval::ReturnedRow { column: pk },
            ),
            (true, GeneratedKeys::OutputInserted) => (
                format!(
                    "INSERT INTO {} ({}) OUTPUT INSERTED.{} VALUES ({})",
                    table, columns, pk, placeholders
                ),
                KeyRetrieval::ReturnedRow { column: pk },
            ),
            (true, GeneratedKeys::DriverReported) => (
                format!("INSERT INTO {} ({}) VALUES ({})", table, columns, placeholders),
                KeyRetrieval::DriverReported { column: pk },
            ),
            (true, GeneratedKeys::Unsupported) => {
                return Err(QueryError::validation(format!(
                    "{} does not support generated keys; assign the primary key of {} before insert",
                    self.dialect,
                    descriptor.entity_name()
                )))
            }
        };

        Ok(SqlStatement {
            key_retrieval,
            ..SqlStatement::from_sink(sql, params)
        })
    }

    /// UPDATE ... SET ... WHERE ...; refuses an empty payload or empty criteria
    pub fn update(
        &self,
        descriptor: &EntityDescriptor,
        update: &Update,
        criteria: &Criteria,
    ) -> Result<SqlStatement, QueryError> {
        if criteria.is_empty() {
            return Err(QueryError::validation(
                "update requires non-empty criteria; refusing to update every row",
            ));
        }

        let mut params = ParamSink::new(self.dialect);
        let mut assignments = Vec::with_capacity(update.len());
        for (field, value) in update.entries() {
            if descriptor.field(field).is_some_and(|meta| meta.is_version()) {
                continue;
            }
            let meta = Self::column_meta(descriptor, field)?;
            let placeholder = params.push(value.clone(), descriptor.scalar_kind_of(meta.name));
            assignments.push(format!("{} = {}", meta.backend_name, placeholder));
        }
        if assignments.is_empty() {
            return Err(QueryError::validation("update must set at least one field"));
        }

        let mut sql = format!("UPDATE {} SET {}", descriptor.table()?, assignments.join(", "));
        sql.push_str(&Self::build_where_clause(descriptor, criteria, &mut params)?);
        Ok(SqlStatement::from_sink(sql, params))
    }

    /// DELETE FROM ... WHERE ...; refuses empty criteria
    pub fn delete(&self, descriptor: &EntityDescriptor, criteria: &Criteria) -> Result<SqlStatement, QueryError> {
        if criteria.is_empty() {
            return Err(QueryError::validation(
                "delete requires non-empty criteria; refusing to delete every row",
            ));
        }
        let mut params = ParamSink::new(self.dialect);
        let mut sql = format!("DELETE FROM {}", descriptor.table()?);
        sql.push_str(&Self::build_where_clause(descriptor, criteria, &mut params)?);
        Ok(SqlStatement::from_sink(sql, params))
    }

    /// Column for a field or backend name; the version field has no column
    fn column(descriptor: &EntityDescriptor, field: &str) -> Result<&'static str, QueryError> {
        Self::column_meta(descriptor, field).map(|meta| meta.backend_name)
    }

    fn column_meta(descriptor: &EntityDescriptor, field: &str) -> Result<&'static FieldMeta, QueryError> {
        let meta = descriptor
            .field(field)
            .or_else(|| descriptor.field_by_backend(field))
            .ok_or_else(|| {
                QueryError::validation(format!(
                    "{} has no field named '{}'",
                    descriptor.entity_name(),
                    field
                ))
            })?;
        if meta.is_version() {
            return Err(QueryError::validation(format!(
                "version field '{}' is not stored in relational tables",
                meta.name
            )));
        }
        Ok(meta)
    }

    fn build_projection(
        descriptor: &EntityDescriptor,
        fields: &[String],
        group_by: Option<&GroupBy>,
    ) -> Result<String, QueryError> {
        let mut columns = fields
            .iter()
            .map(|field| Self::column(descriptor, field))
            .collect::<Result<Vec<_>, _>>()?;

        let Some(group_by) = group_by else {
            return Ok(if columns.is_empty() {
                "*".to_string()
            } else {
                columns.join(", ")
            });
        };

        let group_column = Self::column(descriptor, &group_by.field)?;
        if !columns.contains(&group_column) {
            columns.insert(0, group_column);
        }
        let mut projection = columns.join(", ");
        if let Some(alias) = &group_by.count_alias {
            validate_column_name(alias).map_err(|e| QueryError::validation(e.to_string()))?;
            projection.push_str(&format!(", COUNT(*) AS {}", alias));
        }
        Ok(projection)
    }

    fn build_order_clause(descriptor: &EntityDescriptor, query: &Query) -> Result<String, QueryError> {
        if query.orderings().is_empty() {
            return Ok(String::new());
        }
        let orderings = query
            .orderings()
            .iter()
            .map(|order| {
                Self::column(descriptor, &order.field)
                    .map(|column| format!("{} {}", column, order.direction.to_sql()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!(" ORDER BY {}", orderings.join(", ")))
    }

    fn build_where_clause(
        descriptor: &EntityDescriptor,
        criteria: &Criteria,
        params: &mut ParamSink,
    ) -> Result<String, QueryError> {
        if criteria.is_empty() {
            return Ok(String::new());
        }
        let conditions = criteria
            .criteria()
            .iter()
            .map(|criterion| Self::build_condition_sql(descriptor, criterion, params))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!(" WHERE {}", conditions.join(" AND ")))
    }

    fn build_condition_sql(
        descriptor: &EntityDescriptor,
        criterion: &Criterion,
        params: &mut ParamSink,
    ) -> Result<String, QueryError> {
        let meta = Self::column_meta(descriptor, criterion.field())?;
        let column = meta.backend_name;
        let kind = descriptor.scalar_kind_of(meta.name);
        let value = criterion.value();
        let operator = criterion.operator();

        match operator {
            Operator::Eq if value.is_null() => Ok(format!("{} IS NULL", column)),
            Operator::Ne if value.is_null() => Ok(format!("{} IS NOT NULL", column)),
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                Self::expect_scalar(criterion)?;
                let symbol = match operator {
                    Operator::Eq => "=",
                    Operator::Ne => "<>",
                    Operator::Gt => ">",
                    Operator::Gte => ">=",
                    Operator::Lt => "<",
                    _ => "<=",
                };
                Ok(format!("{} {} {}", column, symbol, params.push(value.clone(), kind)))
            }
            Operator::In | Operator::Nin => {
                let values = match value {
                    Value::Array(values) if !values.is_empty() => values,
                    _ => {
                        return Err(QueryError::validation(format!(
                            "{} on '{}' requires a non-empty collection",
                            operator,
                            criterion.field()
                        )))
                    }
                };
                let placeholders = values
                    .iter()
                    .map(|v| params.push(v.clone(), kind))
                    .collect::<Vec<_>>()
                    .join(", ");
                let keyword = if operator == Operator::In { "IN" } else { "NOT IN" };
                Ok(format!("{} {} ({})", column, keyword, placeholders))
            }
            Operator::Like => {
                let pattern = value.as_str().ok_or_else(|| {
                    QueryError::validation(format!("LIKE on '{}' requires a string pattern", criterion.field()))
                })?;
                // Prefix and general patterns render alike; the bound pattern differs
                let pattern = LikePattern::classify(pattern).with_wildcard(COMMON_WILDCARD);
                Ok(format!(
                    "{} LIKE {}",
                    column,
                    params.push(Value::String(pattern), Some(ScalarKind::Text))
                ))
            }
            Operator::Match | Operator::MatchPhrase => Err(QueryError::validation(format!(
                "{} is only supported by search backends",
                operator
            ))),
        }
    }

    fn expect_scalar(criterion: &Criterion) -> Result<(), QueryError> {
        match criterion.value() {
            Value::Array(_) | Value::Object(_) => Err(QueryError::validation(format!(
                "{} on '{}' requires a single value",
                criterion.operator(),
                criterion.field()
            ))),
            Value::Null => Err(QueryError::validation(format!(
                "{} on '{}' cannot compare against null",
                criterion.operator(),
                criterion.field()
            ))),
            _ => Ok(()),
        }
    }
}

impl QueryRenderer for SqlBuilder {
    type Output = SqlStatement;

    fn render_query(&self, descriptor: &EntityDescriptor, query: &Query) -> Result<SqlStatement, QueryError> {
        self.select(descriptor, query)
    }

    fn render_count(&self, descriptor: &EntityDescriptor, criteria: &Criteria) -> Result<SqlStatement, QueryError> {
        self.count(descriptor, criteria)
    }
}
