//! Procedural macro for registering entity field metadata
//!
//! `#[derive(Entity)]` produces the static field table the query engine maps
//! rows and documents with.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod codegen;
mod parsing;

use codegen::generate_entity_impl;
use parsing::{parse_entity_attributes, parse_field_attributes};

/// Derive macro for the `Entity` trait
///
/// ```rust,ignore
/// #[derive(Debug, Default, Serialize, Deserialize, Entity)]
/// #[entity(table = "books", index = "books", doc_type = "book")]
/// pub struct Book {
///     #[primary_key]
///     pub id: Option<i64>,
///
///     #[column(name = "book_title")]
///     pub title: String,
///
///     #[version]
///     pub version: i64,
///
///     #[transient]
///     pub cached: bool,
/// }
/// ```
///
/// The struct must also implement `Serialize`, `Deserialize` and `Default`;
/// `#[transient]` fields are never persisted and read back as their default.
#[proc_macro_derive(Entity, attributes(entity, primary_key, column, version, transient))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let entity_info = match parse_entity_attributes(&input) {
        Ok(info) => info,
        Err(e) => return e.to_compile_error().into(),
    };

    let fields = match parse_field_attributes(&input.data) {
        Ok(fields) => fields,
        Err(e) => return e.to_compile_error().into(),
    };

    TokenStream::from(generate_entity_impl(&input, &entity_info, &fields))
}
