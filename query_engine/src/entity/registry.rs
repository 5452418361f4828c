use super::{DocumentTarget, Entity, FieldKind, FieldMeta, VERSION_FIELD};
use crate::errors::QueryError;
use crate::validation::{validate_column_name, validate_index_name, validate_table_name};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Supported primary key types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Int32,
    Int64,
    Text,
}

/// Coarse value category of a field; drives row coercion and parameter typing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Integer,
    Float,
    Bool,
    Text,
    Uuid,
    /// Zoned timestamp (`DateTime<Tz>`)
    Timestamp,
    /// `NaiveDateTime`
    NaiveTimestamp,
    /// `NaiveDate`
    Date,
    Other,
}

/// Strip whitespace, `Option<..>` wrappers and path prefixes: `Option<std::string::String>` -> `String`
fn base_type(rust_type: &str) -> String {
    let mut ty: String = rust_type.chars().filter(|c| !c.is_whitespace()).collect();
    loop {
        let unwrapped = ty
            .strip_prefix("Option<")
            .or_else(|| ty.strip_prefix("std::option::Option<"))
            .or_else(|| ty.strip_prefix("core::option::Option<"))
            .and_then(|inner| inner.strip_suffix('>'))
            .map(str::to_string);
        match unwrapped {
            Some(inner) => ty = inner,
            None => break,
        }
    }
    match ty.rsplit_once("::") {
        Some((_, last)) if !last.contains('>') => last.to_string(),
        _ => ty,
    }
}

fn scalar_kind(rust_type: &str) -> ScalarKind {
    let ty = base_type(rust_type);
    // `chrono::DateTime<Utc>` -> `DateTime`
    let head = ty.split('<').next().unwrap_or_default();
    let head = head.rsplit("::").next().unwrap_or(head);
    match head {
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" => ScalarKind::Integer,
        "f32" | "f64" => ScalarKind::Float,
        "bool" => ScalarKind::Bool,
        "String" | "str" | "&str" => ScalarKind::Text,
        "Uuid" => ScalarKind::Uuid,
        "DateTime" => ScalarKind::Timestamp,
        "NaiveDateTime" => ScalarKind::NaiveTimestamp,
        "NaiveDate" => ScalarKind::Date,
        _ => ScalarKind::Other,
    }
}

fn key_type(rust_type: &str) -> Option<KeyType> {
    match base_type(rust_type).as_str() {
        "i32" => Some(KeyType::Int32),
        "i64" => Some(KeyType::Int64),
        "String" => Some(KeyType::Text),
        _ => None,
    }
}

/// Validated, immutable metadata for one entity type
#[derive(Debug)]
pub struct EntityDescriptor {
    entity_name: &'static str,
    table: Option<&'static str>,
    document: Option<DocumentTarget>,
    fields: &'static [FieldMeta],
    kinds: Vec<ScalarKind>,
    pk_index: usize,
    key_type: KeyType,
    version_index: Option<usize>,
    by_name: HashMap<&'static str, usize>,
    by_backend_name: HashMap<&'static str, usize>,
}

impl EntityDescriptor {
    /// Validate the entity contract of `T` and build its descriptor
    pub fn build<T: Entity>() -> Result<Self, QueryError> {
        Self::from_parts(T::entity_name(), T::table_name(), T::document(), T::fields())
    }

    pub fn from_parts(
        entity_name: &'static str,
        table: Option<&'static str>,
        document: Option<DocumentTarget>,
        fields: &'static [FieldMeta],
    ) -> Result<Self, QueryError> {
        let invalid = |message: String| QueryError::validation(format!("{}: {}", entity_name, message));

        if fields.is_empty() {
            return Err(invalid("entity declares no persisted fields".to_string()));
        }
        if table.is_none() && document.is_none() {
            return Err(invalid("entity declares neither a table nor a search index".to_string()));
        }
        if let Some(table) = table {
            validate_table_name(table).map_err(|e| invalid(e.to_string()))?;
        }
        if let Some(target) = document {
            validate_index_name(target.index).map_err(|e| invalid(e.to_string()))?;
            validate_index_name(target.doc_type).map_err(|e| invalid(e.to_string()))?;
        }

        let pk_fields: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind == FieldKind::PrimaryKey)
            .map(|(i, _)| i)
            .collect();
        let pk_index = match pk_fields.as_slice() {
            [index] => *index,
            [] => return Err(invalid("no primary key field declared".to_string())),
            _ => {
                return Err(invalid(format!(
                    "{} primary key fields declared, exactly one is required",
                    pk_fields.len()
                )))
            }
        };
        let pk = &fields[pk_index];
        let key_type = key_type(pk.rust_type).ok_or_else(|| {
            invalid(format!(
                "primary key '{}' has unsupported type '{}' (expected i32, i64 or String)",
                pk.name, pk.rust_type
            ))
        })?;

        let mut version_index = None;
        for (index, field) in fields.iter().enumerate().filter(|(_, f)| f.is_version()) {
            if version_index.replace(index).is_some() {
                return Err(invalid("more than one version field declared".to_string()));
            }
            if base_type(field.rust_type) != "i64" {
                return Err(invalid(format!(
                    "version field '{}' must be i64, found '{}'",
                    field.name, field.rust_type
                )));
            }
            if field.backend_name != VERSION_FIELD {
                return Err(invalid(format!(
                    "version field '{}' must map to '{}'",
                    field.name, VERSION_FIELD
                )));
            }
        }

        let mut by_name = HashMap::with_capacity(fields.len());
        let mut by_backend_name = HashMap::with_capacity(fields.len());
        let mut seen = HashSet::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if !field.is_version() {
                validate_column_name(field.backend_name).map_err(|e| invalid(e.to_string()))?;
            }
            if by_name.insert(field.name, index).is_some() {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            if !seen.insert(field.backend_name) {
                return Err(invalid(format!("duplicate backend name '{}'", field.backend_name)));
            }
            by_backend_name.insert(field.backend_name, index);
        }

        Ok(Self {
            entity_name,
            table,
            document,
            fields,
            kinds: fields.iter().map(|f| scalar_kind(f.rust_type)).collect(),
            pk_index,
            key_type,
            version_index,
            by_name,
            by_backend_name,
        })
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    /// Table name; Validation error when the entity is not relational
    pub fn table(&self) -> Result<&'static str, QueryError> {
        self.table.ok_or_else(|| {
            QueryError::validation(format!("{} does not declare a table", self.entity_name))
        })
    }

    /// Index and document type; Validation error when the entity is not searchable
    pub fn document(&self) -> Result<DocumentTarget, QueryError> {
        self.document.ok_or_else(|| {
            QueryError::validation(format!(
                "{} does not declare a search index and document type",
                self.entity_name
            ))
        })
    }

    /// Persisted fields in declaration order
    pub fn fields(&self) -> &'static [FieldMeta] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldMeta> {
        let fields = self.fields;
        self.by_name.get(name).map(|&i| &fields[i])
    }

    pub fn field_by_backend(&self, backend_name: &str) -> Option<&'static FieldMeta> {
        let fields = self.fields;
        self.by_backend_name.get(backend_name).map(|&i| &fields[i])
    }

    pub fn scalar_kind_of(&self, name: &str) -> Option<ScalarKind> {
        self.by_name.get(name).map(|&i| self.kinds[i])
    }

    pub fn scalar_kind_of_backend(&self, backend_name: &str) -> Option<ScalarKind> {
        self.by_backend_name.get(backend_name).map(|&i| self.kinds[i])
    }

    pub fn primary_key(&self) -> &'static FieldMeta {
        &self.fields[self.pk_index]
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn version_field(&self) -> Option<&'static FieldMeta> {
        let fields = self.fields;
        self.version_index.map(|i| &fields[i])
    }

    /// Fields that appear in SQL statements (everything but the version)
    pub fn columns(&self) -> impl Iterator<Item = &'static FieldMeta> {
        self.fields.iter().filter(|f| !f.is_version())
    }
}

/// Process-wide cache of entity descriptors keyed by type.
///
/// Descriptors are added once and never replaced; a concurrent first use of
/// the same type keeps whichever descriptor was published first.
#[derive(Debug, Default)]
pub struct MapperRegistry {
    descriptors: RwLock<HashMap<TypeId, Arc<EntityDescriptor>>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for `T`, validated and cached on first use
    pub fn descriptor<T: Entity>(&self) -> Result<Arc<EntityDescriptor>, QueryError> {
        let type_id = TypeId::of::<T>();
        {
            let descriptors = self.descriptors.read().unwrap_or_else(|e| e.into_inner());
            if let Some(descriptor) = descriptors.get(&type_id) {
                return Ok(Arc::clone(descriptor));
            }
        }

        let built = Arc::new(EntityDescriptor::build::<T>()?);
        let mut descriptors = self.descriptors.write().unwrap_or_else(|e| e.into_inner());
        let descriptor = descriptors.entry(type_id).or_insert_with(|| {
            debug!("Registered entity descriptor for {}", T::entity_name());
            built
        });
        Ok(Arc::clone(descriptor))
    }

    pub fn mapper<T: Entity>(&self) -> Result<super::EntityMapper<T>, QueryError> {
        Ok(super::EntityMapper::new(self.descriptor::<T>()?))
    }

    pub fn is_registered<T: Entity>(&self) -> bool {
        self.descriptors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
