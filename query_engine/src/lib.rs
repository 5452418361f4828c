//! Query Engine - backend-neutral criteria and their SQL and search renderings
//!
//! This crate holds the criteria model, entity mapping, the dialect-aware SQL
//! builder, the search translator with its HTTP client, and connection routing.

pub mod criteria;
pub mod entity;
pub mod errors;
pub mod renderer;
pub mod router;
pub mod search;
pub mod sql;
pub mod validation;

pub use criteria::{
    Criteria, Criterion, GroupBy, LikePattern, Operator, OrderBy, Pageable, Query, SortOrder, Update, COMMON_WILDCARD,
};
pub use entity::{
    DocumentTarget, Entity, EntityDescriptor, EntityMapper, FieldKind, FieldMeta, KeyType, MapperRegistry,
    PersistableMap, VERSION_FIELD,
};
pub use errors::QueryError;
pub use renderer::QueryRenderer;
pub use router::{ConnectionRouter, RouterRegistry};
pub use search::{HttpSearchClient, SearchClient, SearchTranslator};
pub use sql::{Dialect, PgExecutor, SqlBuilder, SqlExecutor, SqlStatement};
pub use validation::IdentifierError;
