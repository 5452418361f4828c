//! Conversion between typed entities and backend rows/documents

use super::registry::{EntityDescriptor, KeyType, ScalarKind};
use super::{Entity, FieldMeta};
use crate::criteria::Update;
use crate::errors::QueryError;
use serde_json::{Map, Number, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// Backend name -> value pairs in field declaration order
pub type PersistableMap = Vec<(&'static str, Value)>;

/// Typed view over a cached [`EntityDescriptor`]
pub struct EntityMapper<T> {
    descriptor: Arc<EntityDescriptor>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for EntityMapper<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            _entity: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for EntityMapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMapper")
            .field("entity", &self.descriptor.entity_name())
            .finish()
    }
}

impl<T: Entity> EntityMapper<T> {
    pub fn new(descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            descriptor,
            _entity: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Backend name for a field. Backend names are accepted as-is.
    pub fn field_to_backend(&self, field: &str) -> Result<&'static str, QueryError> {
        self.descriptor
            .field(field)
            .or_else(|| self.descriptor.field_by_backend(field))
            .map(|meta| meta.backend_name)
            .ok_or_else(|| {
                QueryError::validation(format!(
                    "{} has no field named '{}'",
                    self.descriptor.entity_name(),
                    field
                ))
            })
    }

    pub fn backend_to_field(&self, backend_name: &str) -> Option<&'static str> {
        self.descriptor.field_by_backend(backend_name).map(|meta| meta.name)
    }

    pub fn pk_field(&self) -> &'static FieldMeta {
        self.descriptor.primary_key()
    }

    pub fn is_pk_unset(value: &Value) -> bool {
        is_pk_unset(value)
    }

    /// Serialized form of the entity keyed by field name
    pub fn to_attributes(&self, entity: &T) -> Result<Map<String, Value>, QueryError> {
        match serde_json::to_value(entity) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(QueryError::mapping(format!(
                "{} did not serialize to an object: {}",
                self.descriptor.entity_name(),
                other
            ))),
            Err(e) => Err(QueryError::mapping(format!(
                "{} could not be serialized: {}",
                self.descriptor.entity_name(),
                e
            ))),
        }
    }

    pub fn pk_value(&self, entity: &T) -> Result<Value, QueryError> {
        let mut attributes = self.to_attributes(entity)?;
        Ok(attributes.remove(self.pk_field().name).unwrap_or(Value::Null))
    }

    /// Every persisted field except `excluded` (field or backend names).
    /// Nulls are kept so a field can be cleared; the version field is never included.
    pub fn to_persistable_map(&self, entity: &T, excluded: &[&str]) -> Result<PersistableMap, QueryError> {
        let mut attributes = self.to_attributes(entity)?;
        Ok(self
            .descriptor
            .columns()
            .filter(|meta| !excluded.contains(&meta.name) && !excluded.contains(&meta.backend_name))
            .map(|meta| (meta.backend_name, attributes.remove(meta.name).unwrap_or(Value::Null)))
            .collect())
    }

    /// Partial update carrying the named fields, or every non-key field when `fields` is empty
    pub fn entity_to_update(&self, entity: &T, fields: &[&str]) -> Result<Update, QueryError> {
        let mut attributes = self.to_attributes(entity)?;
        let mut update = Update::new();
        if fields.is_empty() {
            for meta in self.descriptor.columns().filter(|m| !m.is_primary_key()) {
                update = update.set(meta.name, attributes.remove(meta.name).unwrap_or(Value::Null));
            }
            return Ok(update);
        }
        for field in fields {
            let meta = self.field_meta(field)?;
            if meta.is_version() {
                continue;
            }
            update = update.set(meta.name, attributes.remove(meta.name).unwrap_or(Value::Null));
        }
        Ok(update)
    }

    /// Build an entity from a backend row keyed by backend name.
    /// Unknown keys are ignored; fields absent from the row keep their default value.
    pub fn row_to_entity(&self, row: &Map<String, Value>) -> Result<T, QueryError> {
        let mut base = self.to_attributes(&T::default())?;
        for (key, value) in row {
            if let Some(meta) = self.descriptor.field_by_backend(key) {
                base.insert(meta.name.to_string(), self.coerce(meta, value.clone()));
            }
        }
        self.from_attributes(base)
    }

    /// Build an entity from a generic map whose keys are field or backend names
    pub fn attributes_to_entity(&self, attributes: &Map<String, Value>) -> Result<T, QueryError> {
        let mut base = self.to_attributes(&T::default())?;
        for (key, value) in attributes {
            let meta = self
                .descriptor
                .field(key)
                .or_else(|| self.descriptor.field_by_backend(key));
            if let Some(meta) = meta {
                base.insert(meta.name.to_string(), self.coerce(meta, value.clone()));
            }
        }
        self.from_attributes(base)
    }

    /// Write a backend-assigned key onto the entity
    pub fn assign_primary_key(&self, entity: &mut T, key: Value) -> Result<(), QueryError> {
        let key = coerce_key(self.descriptor.key_type(), key);
        self.assign(entity, self.pk_field().name, key)
    }

    /// Write a backend-reported document version onto the entity
    pub fn assign_version(&self, entity: &mut T, version: i64) -> Result<(), QueryError> {
        let field = self.descriptor.version_field().ok_or_else(|| {
            QueryError::validation(format!(
                "{} does not declare a version field",
                self.descriptor.entity_name()
            ))
        })?;
        self.assign(entity, field.name, Value::from(version))
    }

    /// Version carried by the entity; `None` without a version field or when unset
    pub fn version_of(&self, entity: &T) -> Result<Option<i64>, QueryError> {
        let Some(field) = self.descriptor.version_field() else {
            return Ok(None);
        };
        let attributes = self.to_attributes(entity)?;
        Ok(attributes.get(field.name).and_then(Value::as_i64))
    }

    fn field_meta(&self, field: &str) -> Result<&'static FieldMeta, QueryError> {
        self.descriptor
            .field(field)
            .or_else(|| self.descriptor.field_by_backend(field))
            .ok_or_else(|| {
                QueryError::validation(format!(
                    "{} has no field named '{}'",
                    self.descriptor.entity_name(),
                    field
                ))
            })
    }

    fn assign(&self, entity: &mut T, field: &str, value: Value) -> Result<(), QueryError> {
        let mut attributes = self.to_attributes(entity)?;
        attributes.insert(field.to_string(), value);
        *entity = self.from_attributes(attributes)?;
        Ok(())
    }

    fn from_attributes(&self, attributes: Map<String, Value>) -> Result<T, QueryError> {
        serde_json::from_value(Value::Object(attributes)).map_err(|e| {
            QueryError::mapping(format!(
                "failed to map row onto {}: {}",
                self.descriptor.entity_name(),
                e
            ))
        })
    }

    fn coerce(&self, meta: &FieldMeta, value: Value) -> Value {
        match self.descriptor.scalar_kind_of(meta.name) {
            Some(kind) => coerce_value(kind, value),
            None => value,
        }
    }
}

/// A key counts as unset when null, numeric zero or an empty string
pub fn is_pk_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Number(n) => n.as_i64() == Some(0) || n.as_u64() == Some(0) || n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Widen or narrow a backend value into the shape the field deserializes from
fn coerce_value(kind: ScalarKind, value: Value) -> Value {
    match (kind, value) {
        (ScalarKind::Integer, Value::Number(n)) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
            _ => Value::Number(n),
        },
        (ScalarKind::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Value::from(i),
            Err(_) => Value::String(s),
        },
        (ScalarKind::Float, Value::String(s)) => match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
            Some(n) => Value::Number(n),
            None => Value::String(s),
        },
        (ScalarKind::Bool, Value::Number(n)) => match n.as_i64() {
            Some(0) => Value::Bool(false),
            Some(1) => Value::Bool(true),
            _ => Value::Number(n),
        },
        (ScalarKind::Text, Value::Number(n)) => Value::String(n.to_string()),
        (_, value) => value,
    }
}

fn coerce_key(key_type: KeyType, key: Value) -> Value {
    match key_type {
        KeyType::Int32 | KeyType::Int64 => coerce_value(ScalarKind::Integer, key),
        KeyType::Text => coerce_value(ScalarKind::Text, key),
    }
}
