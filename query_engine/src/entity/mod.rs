//! Entity metadata, the per-type descriptor registry and the mapper
//!
//! Mapped types describe their persisted fields through a static [`FieldMeta`]
//! table, normally generated by `#[derive(Entity)]`. The table is validated once
//! by [`MapperRegistry`] and cached as an [`EntityDescriptor`].

pub mod mapper;
pub mod registry;

pub use mapper::{is_pk_unset, EntityMapper, PersistableMap};
pub use registry::{EntityDescriptor, KeyType, MapperRegistry, ScalarKind};

use serde::{de::DeserializeOwned, Serialize};

/// Backend name reserved for the optimistic-concurrency version field
pub const VERSION_FIELD: &str = "__version__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Normal,
    PrimaryKey,
    Version,
}

/// One persisted field of an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    /// Rust field name, also its serde key
    pub name: &'static str,
    /// Column or document property name
    pub backend_name: &'static str,
    pub kind: FieldKind,
    /// Field type as written in source, whitespace removed (`Option<i64>`)
    pub rust_type: &'static str,
}

impl FieldMeta {
    pub const fn new(
        name: &'static str,
        backend_name: &'static str,
        kind: FieldKind,
        rust_type: &'static str,
    ) -> Self {
        Self {
            name,
            backend_name,
            kind,
            rust_type,
        }
    }

    pub const fn normal(name: &'static str, rust_type: &'static str) -> Self {
        Self::new(name, name, FieldKind::Normal, rust_type)
    }

    pub const fn primary_key(name: &'static str, rust_type: &'static str) -> Self {
        Self::new(name, name, FieldKind::PrimaryKey, rust_type)
    }

    pub const fn version(name: &'static str, rust_type: &'static str) -> Self {
        Self::new(name, VERSION_FIELD, FieldKind::Version, rust_type)
    }

    pub fn is_primary_key(&self) -> bool {
        self.kind == FieldKind::PrimaryKey
    }

    pub fn is_version(&self) -> bool {
        self.kind == FieldKind::Version
    }
}

/// Search index and document type an entity is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentTarget {
    pub index: &'static str,
    pub doc_type: &'static str,
}

/// Mapped record type.
///
/// `Default` supplies the zero values for fields missing from a backend row.
/// Field names in [`Entity::fields`] must match the serde keys of the type.
pub trait Entity: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Type name used in messages and logs
    fn entity_name() -> &'static str;

    /// Relational table, when the type is stored in a SQL backend
    fn table_name() -> Option<&'static str> {
        None
    }

    /// Search index and document type, when the type is stored in a search backend
    fn document() -> Option<DocumentTarget> {
        None
    }

    fn fields() -> &'static [FieldMeta];
}
