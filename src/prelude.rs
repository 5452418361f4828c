//! Convenience re-exports for common QueryDeck usage
//!
//! ```rust
//! use querydeck::prelude::*;
//! ```

pub use crate::core::QueryDeck;
pub use crate::errors::QueryDeckError;
pub use crate::repository::{InsertOutcome, RelationalRepository, SearchRepository};

pub use config::{AppConfig, Dialect, RelationalSettings, SearchSettings};

// The derive and the trait share a name in different namespaces
pub use entity_derive::Entity;
pub use query_engine::Entity;

pub use query_engine::{
    Criteria, GroupBy, Operator, OrderBy, Pageable, Query, QueryError, SortOrder, Update,
};

pub use async_trait;
pub use serde_json::{json, Value};
