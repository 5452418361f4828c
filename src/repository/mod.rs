//! Typed repositories bound to one entity type and one named configuration
//!
//! Both repositories share the argument checks below; every check runs before
//! any backend call.

pub mod relational;
pub mod search;

pub use relational::RelationalRepository;
pub use search::SearchRepository;

use query_engine::entity::is_pk_unset;
use query_engine::{Entity, EntityMapper, QueryError, Update};
use serde_json::Value;

/// What an insert did. Generated keys are returned, never written onto the
/// caller's entity; see [`InsertOutcome::apply_to`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOutcome {
    pub rows_affected: u64,
    /// Key assigned by the backend when the entity's key was unset
    pub generated_key: Option<Value>,
    /// Document version reported by the search backend
    pub version: Option<i64>,
}

impl InsertOutcome {
    /// Copy the generated key and version onto `entity`.
    ///
    /// Returns whether anything was written.
    pub fn apply_to<T: Entity>(&self, mapper: &EntityMapper<T>, entity: &mut T) -> Result<bool, QueryError> {
        let mut applied = false;
        if let Some(key) = &self.generated_key {
            mapper.assign_primary_key(entity, key.clone())?;
            applied = true;
        }
        if let (Some(version), Some(_)) = (self.version, mapper.descriptor().version_field()) {
            mapper.assign_version(entity, version)?;
            applied = true;
        }
        Ok(applied)
    }
}

pub(crate) fn check_id(id: &Value) -> Result<(), QueryError> {
    if is_pk_unset(id) {
        return Err(QueryError::validation(format!("id must be set, got {}", id)));
    }
    if id.is_array() || id.is_object() {
        return Err(QueryError::validation(format!("id must be a single value, got {}", id)));
    }
    Ok(())
}

pub(crate) fn check_ids(ids: &[Value]) -> Result<(), QueryError> {
    if ids.is_empty() {
        return Err(QueryError::validation("ids must not be empty"));
    }
    ids.iter().try_for_each(check_id)
}

pub(crate) fn check_fields(fields: &[&str]) -> Result<(), QueryError> {
    if fields.is_empty() {
        return Err(QueryError::validation("fields must not be empty"));
    }
    Ok(())
}

pub(crate) fn check_update(update: &Update) -> Result<(), QueryError> {
    if update.is_empty() {
        return Err(QueryError::validation("update must set at least one field"));
    }
    Ok(())
}

pub(crate) fn check_sql(sql: &str) -> Result<(), QueryError> {
    if sql.trim().is_empty() {
        return Err(QueryError::validation("sql must not be blank"));
    }
    Ok(())
}
