//! Identifier validation
//!
//! Table, column and index names are interpolated into query text, so they are
//! checked once when an entity is registered. Values are never interpolated.

use std::fmt;

/// Validation errors for backend identifiers
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifierError {
    /// Name contains characters outside the allowed set
    InvalidCharacters(String),
    TooLong {
        name: String,
        length: usize,
        max_length: usize,
    },
    Empty,
    /// Name must start with a letter or underscore
    InvalidStartCharacter(String),
    ReservedKeyword(String),
}

impl fmt::Display for IdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierError::InvalidCharacters(name) => {
                write!(f, "Invalid characters in name '{}'", name)
            }
            IdentifierError::TooLong {
                name,
                length,
                max_length,
            } => write!(
                f,
                "Name '{}' is too long: {} characters (max {})",
                name, length, max_length
            ),
            IdentifierError::Empty => write!(f, "Name cannot be empty"),
            IdentifierError::InvalidStartCharacter(name) => {
                write!(f, "Name '{}' must start with a letter or underscore", name)
            }
            IdentifierError::ReservedKeyword(name) => {
                write!(f, "Name '{}' is a reserved keyword", name)
            }
        }
    }
}

impl std::error::Error for IdentifierError {}

/// Longest identifier accepted by every supported dialect
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Search index names may be longer than SQL identifiers
pub const MAX_INDEX_NAME_LENGTH: usize = 255;

/// Validate a column name
pub fn validate_column_name(name: &str) -> Result<(), IdentifierError> {
    validate_identifier(name)?;
    if is_reserved_keyword(name) {
        return Err(IdentifierError::ReservedKeyword(name.to_string()));
    }
    Ok(())
}

/// Validate a table name, optionally schema qualified (`schema.table`)
pub fn validate_table_name(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(IdentifierError::InvalidCharacters(name.to_string()));
    }
    for part in parts {
        validate_column_name(part)?;
    }
    Ok(())
}

/// Validate a search index or document type name
pub fn validate_index_name(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if name.len() > MAX_INDEX_NAME_LENGTH {
        return Err(IdentifierError::TooLong {
            name: name.to_string(),
            length: name.len(),
            max_length: MAX_INDEX_NAME_LENGTH,
        });
    }
    if name.starts_with(['-', '+', '_', '.']) {
        return Err(IdentifierError::InvalidStartCharacter(name.to_string()));
    }
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.');
    if !name.chars().all(allowed) {
        return Err(IdentifierError::InvalidCharacters(name.to_string()));
    }
    Ok(())
}

fn validate_identifier(name: &str) -> Result<(), IdentifierError> {
    let first_char = name.chars().next().ok_or(IdentifierError::Empty)?;

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong {
            name: name.to_string(),
            length: name.len(),
            max_length: MAX_IDENTIFIER_LENGTH,
        });
    }

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(IdentifierError::InvalidStartCharacter(name.to_string()));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(IdentifierError::InvalidCharacters(name.to_string()));
    }

    Ok(())
}

/// Keywords that would change the meaning of generated statements
fn is_reserved_keyword(name: &str) -> bool {
    const RESERVED_KEYWORDS: &[&str] = &[
        "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "ON", "AS", "AND",
        "OR", "NOT", "NULL", "TRUE", "FALSE", "IN", "IS", "LIKE", "BETWEEN", "ORDER", "BY",
        "GROUP", "HAVING", "LIMIT", "OFFSET", "FETCH", "UNION", "DISTINCT", "CREATE", "DROP",
        "ALTER", "TABLE", "SET", "VALUES", "INTO", "RETURNING", "OUTPUT", "ROWNUM",
        // Reserved for the document version marker
        "__VERSION__",
    ];

    RESERVED_KEYWORDS.contains(&name.to_ascii_uppercase().as_str())
}
