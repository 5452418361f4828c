//! Backend-agnostic criteria, query and update model
//!
//! Pure value objects with consuming builders; no I/O happens here.

pub mod criterion;
pub mod query;
pub mod update;

pub use criterion::{Criteria, Criterion, LikePattern, Operator, COMMON_WILDCARD};
pub use query::{GroupBy, OrderBy, Pageable, Query, SortOrder};
pub use update::Update;
