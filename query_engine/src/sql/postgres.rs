//! PostgreSQL executor over a lazily connected sqlx pool

use super::builder::{KeyRetrieval, SqlStatement};
use super::executor::{ExecutedInsert, SqlExecutor, SqlRow};
use crate::entity::ScalarKind;
use crate::errors::QueryError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Column, Postgres, Row, TypeInfo};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// A JSON parameter resolved to the Postgres type it binds as
#[derive(Debug, Clone, PartialEq)]
enum PgParam {
    Int(i32),
    BigInt(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Uuid(uuid::Uuid),
    Timestamptz(DateTime<Utc>),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Json(Value),
    /// Typed NULL; Postgres rejects an untyped text NULL in non-text columns
    Null(Option<ScalarKind>),
}

impl PgParam {
    /// Strings bind as uuid or time values only for fields declared with those types
    fn from_value(value: Value, kind: Option<ScalarKind>) -> Result<Self, QueryError> {
        let invalid = |s: &str, expected: &str| {
            QueryError::validation(format!("'{}' is not a valid {} value", s, expected))
        };
        Ok(match value {
            Value::Null => PgParam::Null(kind),
            Value::String(s) => match kind {
                Some(ScalarKind::Uuid) => PgParam::Uuid(uuid::Uuid::parse_str(&s).map_err(|_| invalid(&s, "uuid"))?),
                Some(ScalarKind::Timestamp) => PgParam::Timestamptz(
                    DateTime::parse_from_rfc3339(&s)
                        .map_err(|_| invalid(&s, "RFC 3339 timestamp"))?
                        .with_timezone(&Utc),
                ),
                Some(ScalarKind::NaiveTimestamp) => {
                    PgParam::Timestamp(s.parse::<NaiveDateTime>().map_err(|_| invalid(&s, "timestamp"))?)
                }
                Some(ScalarKind::Date) => PgParam::Date(s.parse::<NaiveDate>().map_err(|_| invalid(&s, "date"))?),
                _ => PgParam::Text(s),
            },
            Value::Number(n) => match (kind, n.as_i64()) {
                (Some(ScalarKind::Float), _) => PgParam::Float(n.as_f64().unwrap_or_default()),
                (_, Some(i)) => match i32::try_from(i) {
                    Ok(small) => PgParam::Int(small),
                    Err(_) => PgParam::BigInt(i),
                },
                (_, None) => match n.as_f64() {
                    Some(f) if !n.is_u64() => PgParam::Float(f),
                    _ => PgParam::Text(n.to_string()),
                },
            },
            Value::Bool(b) => PgParam::Bool(b),
            other => PgParam::Json(other),
        })
    }

    fn bind<'q>(self, query: PgQuery<'q>) -> PgQuery<'q> {
        match self {
            PgParam::Int(v) => query.bind(v),
            PgParam::BigInt(v) => query.bind(v),
            PgParam::Float(v) => query.bind(v),
            PgParam::Bool(v) => query.bind(v),
            PgParam::Text(v) => query.bind(v),
            PgParam::Uuid(v) => query.bind(v),
            PgParam::Timestamptz(v) => query.bind(v),
            PgParam::Timestamp(v) => query.bind(v),
            PgParam::Date(v) => query.bind(v),
            PgParam::Json(v) => query.bind(Json(v)),
            PgParam::Null(kind) => match kind {
                Some(ScalarKind::Integer) => query.bind(Option::<i64>::None),
                Some(ScalarKind::Float) => query.bind(Option::<f64>::None),
                Some(ScalarKind::Bool) => query.bind(Option::<bool>::None),
                Some(ScalarKind::Uuid) => query.bind(Option::<uuid::Uuid>::None),
                Some(ScalarKind::Timestamp) => query.bind(Option::<DateTime<Utc>>::None),
                Some(ScalarKind::NaiveTimestamp) => query.bind(Option::<NaiveDateTime>::None),
                Some(ScalarKind::Date) => query.bind(Option::<NaiveDate>::None),
                Some(ScalarKind::Other) => query.bind(Option::<Json<Value>>::None),
                Some(ScalarKind::Text) | None => query.bind(Option::<String>::None),
            },
        }
    }
}

fn bind_all(statement: &SqlStatement) -> Result<PgQuery<'_>, QueryError> {
    let mut query = sqlx::query(&statement.sql);
    for (index, param) in statement.params.iter().enumerate() {
        query = PgParam::from_value(param.clone(), statement.param_kind(index))?.bind(query);
    }
    Ok(query)
}

/// Translate a driver error, separating unique violations from other failures
fn map_sqlx_error(sql: &str, err: sqlx::Error) -> QueryError {
    let is_conflict = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if is_conflict {
        QueryError::conflict(format!("duplicate key while executing: {}", sql), err)
    } else {
        QueryError::backend(format!("failed to execute: {}", sql), err)
    }
}

fn decode<'r, T>(row: &'r PgRow, index: usize) -> Result<Value, QueryError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres> + Into<Value>,
{
    row.try_get::<Option<T>, _>(index)
        .map(|v| v.map_or(Value::Null, Into::into))
        .map_err(|e| QueryError::mapping(format!("failed to decode column {}: {}", index, e)))
}

/// Decode a row into a JSON map keyed by column name
pub fn pg_row_to_json(row: &PgRow) -> Result<SqlRow, QueryError> {
    let mut map = Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let index = column.ordinal();
        let value = match column.type_info().name() {
            "BOOL" => decode::<bool>(row, index)?,
            "INT2" => decode::<i16>(row, index)?,
            "INT4" => decode::<i32>(row, index)?,
            "INT8" => decode::<i64>(row, index)?,
            "FLOAT4" => decode::<f32>(row, index)?,
            "FLOAT8" => decode::<f64>(row, index)?,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => decode::<String>(row, index)?,
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(index)
                .map(|v| v.map_or(Value::Null, |u| Value::String(u.to_string())))
                .map_err(|e| QueryError::mapping(e.to_string()))?,
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(index)
                .map(|v| v.map_or(Value::Null, |t| Value::String(t.to_rfc3339())))
                .map_err(|e| QueryError::mapping(e.to_string()))?,
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(index)
                .map(|v| {
                    v.map_or(Value::Null, |t| {
                        Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
                    })
                })
                .map_err(|e| QueryError::mapping(e.to_string()))?,
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(index)
                .map(|v| v.map_or(Value::Null, |d| Value::String(d.to_string())))
                .map_err(|e| QueryError::mapping(e.to_string()))?,
            "JSON" | "JSONB" => decode::<Value>(row, index)?,
            other => {
                return Err(QueryError::mapping(format!(
                    "unsupported column type {} for column {}",
                    other,
                    column.name()
                )))
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

/// [`SqlExecutor`] backed by a `PgPool`
#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pool that opens connections on first use
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self, QueryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)
            .map_err(|e| QueryError::backend("failed to configure PostgreSQL pool", e))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn query_rows(&self, statement: &SqlStatement) -> Result<Vec<SqlRow>, QueryError> {
        let rows = bind_all(statement)?
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&statement.sql, e))?;
        rows.iter().map(pg_row_to_json).collect()
    }

    async fn query_count(&self, statement: &SqlStatement) -> Result<i64, QueryError> {
        let row = bind_all(statement)?
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&statement.sql, e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| QueryError::mapping(format!("count did not return an integer: {}", e)))
    }

    async fn execute(&self, statement: &SqlStatement) -> Result<u64, QueryError> {
        let result = bind_all(statement)?
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&statement.sql, e))?;
        Ok(result.rows_affected())
    }

    async fn insert(&self, statement: &SqlStatement) -> Result<ExecutedInsert, QueryError> {
        match statement.key_retrieval {
            KeyRetrieval::ReturnedRow { column } => {
                let row = bind_all(statement)?
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error(&statement.sql, e))?;
                let mut row = pg_row_to_json(&row)?;
                Ok(ExecutedInsert {
                    rows_affected: 1,
                    generated_key: row.remove(column),
                })
            }
            KeyRetrieval::DriverReported { .. } => Err(QueryError::validation(
                "PostgreSQL returns generated keys through RETURNING, not the driver",
            )),
            KeyRetrieval::None => {
                let rows_affected = self.execute(statement).await?;
                Ok(ExecutedInsert {
                    rows_affected,
                    generated_key: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct ConstraintError {
        unique: bool,
    }

    impl fmt::Display for ConstraintError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message())
        }
    }

    impl StdError for ConstraintError {}

    impl DatabaseError for ConstraintError {
        fn message(&self) -> &str {
            if self.unique {
                "duplicate key value violates unique constraint \"books_pkey\""
            } else {
                "insert or update violates foreign key constraint"
            }
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(if self.unique { "23505" } else { "23503" }))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            if self.unique {
                ErrorKind::UniqueViolation
            } else {
                ErrorKind::ForeignKeyViolation
            }
        }
    }

    fn database_error(unique: bool) -> sqlx::Error {
        sqlx::Error::Database(Box::new(ConstraintError { unique }))
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err = map_sqlx_error("INSERT INTO books (id) VALUES ($1)", database_error(true));
        assert!(err.is_conflict());
        assert!(!err.is_backend());
    }

    #[test]
    fn test_other_failures_are_backend_errors() {
        let sql = "INSERT INTO books (id) VALUES ($1)";
        assert!(map_sqlx_error(sql, database_error(false)).is_backend());
        assert!(map_sqlx_error(sql, sqlx::Error::RowNotFound).is_backend());
        assert!(map_sqlx_error(sql, sqlx::Error::PoolTimedOut).is_backend());
    }

    #[test]
    fn test_nulls_carry_the_field_kind() {
        assert_eq!(
            PgParam::from_value(Value::Null, Some(ScalarKind::Integer)).unwrap(),
            PgParam::Null(Some(ScalarKind::Integer))
        );
        assert_eq!(PgParam::from_value(Value::Null, None).unwrap(), PgParam::Null(None));
    }

    #[test]
    fn test_strings_are_typed_by_declaration() {
        let uuid = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(
            PgParam::from_value(json!(uuid), Some(ScalarKind::Text)).unwrap(),
            PgParam::Text(uuid.to_string())
        );
        assert_eq!(PgParam::from_value(json!(uuid), None).unwrap(), PgParam::Text(uuid.to_string()));
        assert_eq!(
            PgParam::from_value(json!(uuid), Some(ScalarKind::Uuid)).unwrap(),
            PgParam::Uuid(uuid::Uuid::parse_str(uuid).unwrap())
        );

        let stamp = "2024-03-01T12:30:00+00:00";
        assert_eq!(
            PgParam::from_value(json!(stamp), None).unwrap(),
            PgParam::Text(stamp.to_string())
        );
        assert!(matches!(
            PgParam::from_value(json!(stamp), Some(ScalarKind::Timestamp)).unwrap(),
            PgParam::Timestamptz(_)
        ));
        assert!(matches!(
            PgParam::from_value(json!("2024-03-01T12:30:00"), Some(ScalarKind::NaiveTimestamp)).unwrap(),
            PgParam::Timestamp(_)
        ));
        assert!(matches!(
            PgParam::from_value(json!("2024-03-01"), Some(ScalarKind::Date)).unwrap(),
            PgParam::Date(_)
        ));
        assert!(PgParam::from_value(json!("not-a-uuid"), Some(ScalarKind::Uuid))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_numbers_and_documents() {
        assert_eq!(PgParam::from_value(json!(7), None).unwrap(), PgParam::Int(7));
        assert_eq!(
            PgParam::from_value(json!(5_000_000_000i64), Some(ScalarKind::Integer)).unwrap(),
            PgParam::BigInt(5_000_000_000)
        );
        assert_eq!(PgParam::from_value(json!(3), Some(ScalarKind::Float)).unwrap(), PgParam::Float(3.0));
        assert_eq!(PgParam::from_value(json!(1.5), None).unwrap(), PgParam::Float(1.5));
        assert_eq!(
            PgParam::from_value(json!({"a": 1}), Some(ScalarKind::Other)).unwrap(),
            PgParam::Json(json!({"a": 1}))
        );
    }
}
