//! Relational backend: dialect rules, statement builder and executors

pub mod builder;
pub mod dialect;
pub mod executor;
pub mod postgres;

pub use builder::{format_sql, KeyRetrieval, SqlBuilder, SqlStatement};
pub use dialect::{Dialect, DialectRules, GeneratedKeys};
pub use executor::{ExecutedInsert, SqlExecutor, SqlRow};
pub use postgres::PgExecutor;
