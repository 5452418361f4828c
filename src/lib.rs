//! # QueryDeck
//!
//! Typed repositories over relational and search backends, driven by one
//! backend-neutral criteria model.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use querydeck::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Entity)]
//! #[entity(table = "books")]
//! pub struct Book {
//!     #[primary_key]
//!     pub id: i64,
//!     pub title: String,
//!     pub year: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let deck = QueryDeck::new(AppConfig::load()?)?;
//!     let books = deck.relational::<Book>("catalog")?;
//!
//!     let outcome = books.insert(&Book { title: "Dune".into(), year: 1965, ..Default::default() }).await?;
//!     println!("new id: {:?}", outcome.generated_key);
//!
//!     let recent = books
//!         .find_list_by_query(&Query::with_criteria(Criteria::new().gte("year", 1960)).order_by(OrderBy::desc("year")))
//!         .await?;
//!     println!("{} books", recent.len());
//!     Ok(())
//! }
//! ```

extern crate self as querydeck;

pub mod core;
pub mod errors;
pub mod prelude;
pub mod repository;

pub use crate::core::QueryDeck;
pub use errors::QueryDeckError;
pub use repository::{InsertOutcome, RelationalRepository, SearchRepository};

// Re-export centralized config
pub use config::{AppConfig, Dialect, RelationalSettings, SearchSettings};

// Re-export internal crates used by the derive and public API.
// The generated code refers to `::querydeck::query_engine`.
pub use config;
pub use entity_derive::Entity;
pub use query_engine;

pub use async_trait;
pub use serde_json;
