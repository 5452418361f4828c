//! Parsing utilities for entity and field attributes
//!
//! This module handles `#[entity(...)]`, `#[primary_key]`, `#[column(...)]`,
//! `#[version]` and `#[transient]`, and checks identifier syntax at compile
//! time. The entity contract itself is checked by the runtime registry.

use quote::quote;
use syn::{Attribute, Data, DeriveInput, Error, Fields, Ident, LitStr, Result};

/// Backend name of the version field; never a column
const VERSION_FIELD: &str = "__version__";

/// Validate table name and return syn::Error for better proc macro error handling
pub fn validate_table_name_syn(name: &str, span: proc_macro2::Span) -> Result<()> {
    let mut parts = name.split('.');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(table), None, None) => validate_identifier(table),
        (Some(schema), Some(table), None) => validate_identifier(schema).and_then(|_| validate_identifier(table)),
        _ => Err(format!("Name '{}' has too many qualifiers", name)),
    };
    valid.map_err(|e| Error::new(span, format!("Invalid table name '{}': {}", name, e)))
}

/// Validate column name and return syn::Error for better proc macro error handling
pub fn validate_column_name_syn(name: &str, span: proc_macro2::Span) -> Result<()> {
    validate_identifier(name).map_err(|e| Error::new(span, format!("Invalid column name '{}': {}", name, e)))
}

/// Validate a search index or document type name
pub fn validate_index_name_syn(name: &str, span: proc_macro2::Span) -> Result<()> {
    let invalid = |reason: &str| Err(Error::new(span, format!("Invalid index name '{}': {}", name, reason)));

    if name.is_empty() {
        return invalid("name cannot be empty");
    }
    if name.starts_with(['-', '+', '_', '.']) {
        return invalid("must not start with '-', '+', '_' or '.'");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'))
    {
        return invalid("only lowercase letters, digits, '_', '-' and '.' are allowed");
    }
    Ok(())
}

/// Mirrors query_engine::validation so compile-time and runtime checks agree
fn validate_identifier(name: &str) -> std::result::Result<(), String> {
    let first_char = name.chars().next().ok_or_else(|| "Name cannot be empty".to_string())?;

    // Longest identifier accepted by every supported dialect
    if name.len() > 63 {
        return Err(format!("Name '{}' is too long: {} characters (max 63)", name, name.len()));
    }

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(format!("Name '{}' must start with a letter or underscore", name));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!(
            "Name '{}' contains invalid characters: only alphanumeric characters and underscores are allowed",
            name
        ));
    }

    if is_reserved_keyword(name) {
        return Err(format!("Name '{}' is a reserved keyword", name));
    }

    Ok(())
}

fn is_reserved_keyword(name: &str) -> bool {
    const RESERVED_KEYWORDS: &[&str] = &[
        "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "ON", "AS", "AND",
        "OR", "NOT", "NULL", "TRUE", "FALSE", "IN", "IS", "LIKE", "BETWEEN", "ORDER", "BY",
        "GROUP", "HAVING", "LIMIT", "OFFSET", "FETCH", "UNION", "DISTINCT", "CREATE", "DROP",
        "ALTER", "TABLE", "SET", "VALUES", "INTO", "RETURNING", "OUTPUT", "ROWNUM",
        "__VERSION__",
    ];

    RESERVED_KEYWORDS.contains(&name.to_ascii_uppercase().as_str())
}

#[derive(Debug, Default)]
pub struct EntityInfo {
    pub table: Option<String>,
    pub index: Option<String>,
    pub doc_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Normal,
    PrimaryKey,
    Version,
}

#[derive(Debug)]
pub struct FieldInfo {
    pub ident: Ident,
    pub backend_name: String,
    pub role: FieldRole,
    /// Type text with whitespace removed, e.g. `Option<i64>`
    pub rust_type: String,
}

pub fn parse_entity_attributes(input: &DeriveInput) -> Result<EntityInfo> {
    let mut info = EntityInfo::default();

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            let value: LitStr = meta.value()?.parse()?;
            if meta.path.is_ident("table") {
                validate_table_name_syn(&value.value(), value.span())?;
                info.table = Some(value.value());
            } else if meta.path.is_ident("index") {
                validate_index_name_syn(&value.value(), value.span())?;
                info.index = Some(value.value());
            } else if meta.path.is_ident("doc_type") {
                validate_index_name_syn(&value.value(), value.span())?;
                info.doc_type = Some(value.value());
            } else {
                return Err(meta.error("unknown entity attribute: expected `table`, `index` or `doc_type`"));
            }
            Ok(())
        })?;
    }

    if info.index.is_some() != info.doc_type.is_some() {
        return Err(Error::new_spanned(
            &input.ident,
            "`index` and `doc_type` must be given together: #[entity(index = \"...\", doc_type = \"...\")]",
        ));
    }
    if info.table.is_none() && info.index.is_none() {
        return Err(Error::new_spanned(
            &input.ident,
            "entity attribute is required: add #[entity(table = \"...\")] or #[entity(index = \"...\", doc_type = \"...\")]",
        ));
    }

    Ok(info)
}

pub fn parse_field_attributes(data: &Data) -> Result<Vec<FieldInfo>> {
    let fields_named = match data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields_named) => fields_named,
            other => return Err(Error::new_spanned(other, "Entity can only be derived for structs with named fields")),
        },
        _ => {
            return Err(Error::new(
                proc_macro2::Span::call_site(),
                "Entity can only be derived for structs with named fields",
            ))
        }
    };

    let mut fields = Vec::new();
    for field in &fields_named.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| Error::new_spanned(field, "Field must have a name"))?;

        if has_attribute(&field.attrs, "transient") {
            continue;
        }

        let is_pk = has_attribute(&field.attrs, "primary_key");
        let is_version = has_attribute(&field.attrs, "version");
        let column = parse_column_name(&field.attrs)?;

        let role = match (is_pk, is_version) {
            (true, true) => {
                return Err(Error::new_spanned(&ident, "a field cannot be both #[primary_key] and #[version]"));
            }
            (true, false) => FieldRole::PrimaryKey,
            (false, true) => FieldRole::Version,
            (false, false) => FieldRole::Normal,
        };

        let backend_name = match (role, column) {
            (FieldRole::Version, Some(column)) => {
                return Err(Error::new(
                    column.span(),
                    format!("the version field is always stored as `{}`", VERSION_FIELD),
                ));
            }
            (FieldRole::Version, None) => VERSION_FIELD.to_string(),
            (_, Some(column)) => {
                validate_column_name_syn(&column.value(), column.span())?;
                column.value()
            }
            (_, None) => {
                let name = ident.to_string();
                validate_column_name_syn(&name, ident.span())?;
                name
            }
        };

        let ty = &field.ty;
        let rust_type = quote!(#ty).to_string().replace(' ', "");

        fields.push(FieldInfo {
            ident,
            backend_name,
            role,
            rust_type,
        });
    }

    Ok(fields)
}

pub fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// `#[column(name = "...")]`
fn parse_column_name(attrs: &[Attribute]) -> Result<Option<LitStr>> {
    let mut column = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("column")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                column = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("unknown column attribute: expected `name`"))
            }
        })?;
    }
    Ok(column)
}

#[cfg(test)]
mod validation_tests {
    use super::*;
    use syn::parse_quote;

    fn span() -> proc_macro2::Span {
        proc_macro2::Span::call_site()
    }

    #[test]
    fn test_valid_table_names() {
        for name in ["users", "user_profiles", "_private", "table123", "sales.orders"] {
            assert!(validate_table_name_syn(name, span()).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_invalid_table_names() {
        for name in ["", "SELECT", "123table", "user-table", "a.b.c", "users; DROP TABLE users; --"] {
            assert!(validate_table_name_syn(name, span()).is_err(), "{}", name);
        }
    }

    #[test]
    fn test_index_names() {
        assert!(validate_index_name_syn("books-2020", span()).is_ok());
        assert!(validate_index_name_syn("Books", span()).is_err());
        assert!(validate_index_name_syn("_books", span()).is_err());
    }

    #[test]
    fn test_parse_entity_and_fields() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "books", index = "books", doc_type = "book")]
            struct Book {
                #[primary_key]
                id: Option<i64>,
                #[column(name = "book_title")]
                title: String,
                #[version]
                version: i64,
                #[transient]
                cached: bool,
            }
        };

        let info = parse_entity_attributes(&input).unwrap();
        assert_eq!(info.table.as_deref(), Some("books"));
        assert_eq!(info.doc_type.as_deref(), Some("book"));

        let fields = parse_field_attributes(&input.data).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].role, FieldRole::PrimaryKey);
        assert_eq!(fields[0].rust_type, "Option<i64>");
        assert_eq!(fields[1].backend_name, "book_title");
        assert_eq!(fields[2].backend_name, VERSION_FIELD);
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Loose { id: i64 }
        };
        assert!(parse_entity_attributes(&input).is_err());

        let half: DeriveInput = parse_quote! {
            #[entity(index = "loose")]
            struct Loose { id: i64 }
        };
        assert!(parse_entity_attributes(&half).is_err());
    }

    #[test]
    fn test_version_column_override_is_rejected() {
        let input: DeriveInput = parse_quote! {
            #[entity(index = "books", doc_type = "book")]
            struct Book {
                #[primary_key]
                id: String,
                #[version]
                #[column(name = "ver")]
                version: i64,
            }
        };
        assert!(parse_field_attributes(&input.data).is_err());
    }
}
