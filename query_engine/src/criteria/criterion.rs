//! Filter predicates
//!
//! A [`Criteria`] is an ordered, AND-combined chain of field/operator/value
//! predicates. It is backend agnostic: the relational and search renderers both
//! consume it.

use serde_json::Value;
use std::fmt;

/// Wildcard marker used in LIKE patterns regardless of backend
pub const COMMON_WILDCARD: char = '%';

/// Predicate operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Like,
    Match,
    MatchPhrase,
}

impl Operator {
    /// Negated operators are combined as "none of" by the search renderer
    pub fn is_negated(&self) -> bool {
        matches!(self, Operator::Ne | Operator::Nin)
    }

    /// Operators whose value must be a non-empty collection
    pub fn takes_collection(&self) -> bool {
        matches!(self, Operator::In | Operator::Nin)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::Ne => "NE",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::In => "IN",
            Operator::Nin => "NIN",
            Operator::Like => "LIKE",
            Operator::Match => "MATCH",
            Operator::MatchPhrase => "MATCH_PHRASE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Single predicate; immutable once added to a chain
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    field: String,
    operator: Operator,
    value: Value,
}

impl Criterion {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Ordered chain of predicates, implicitly AND-combined. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    chain: Vec<Criterion>,
}

impl Criteria {
    pub fn new() -> Self {
        Self { chain: Vec::new() }
    }

    /// Start a chain with an equality predicate
    pub fn where_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(field, Operator::Eq, value)
    }

    /// Start a chain with an explicit operator
    pub fn where_op(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::new().and(field, operator, value)
    }

    /// Append a predicate
    pub fn and(mut self, field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.chain.push(Criterion::new(field, operator, value));
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(field, Operator::Eq, value)
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(field, Operator::Ne, value)
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(field, Operator::Gt, value)
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(field, Operator::Gte, value)
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(field, Operator::Lt, value)
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(field, Operator::Lte, value)
    }

    pub fn in_values<V: Into<Value>>(self, field: impl Into<String>, values: Vec<V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.and(field, Operator::In, Value::Array(values))
    }

    pub fn not_in_values<V: Into<Value>>(self, field: impl Into<String>, values: Vec<V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.and(field, Operator::Nin, Value::Array(values))
    }

    /// LIKE predicate; `%` is the wildcard marker
    pub fn like(self, field: impl Into<String>, pattern: &str) -> Self {
        self.and(field, Operator::Like, Value::String(pattern.to_string()))
    }

    pub fn matches(self, field: impl Into<String>, text: &str) -> Self {
        self.and(field, Operator::Match, Value::String(text.to_string()))
    }

    pub fn match_phrase(self, field: impl Into<String>, phrase: &str) -> Self {
        self.and(field, Operator::MatchPhrase, Value::String(phrase.to_string()))
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.chain
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }
}

impl<'a> IntoIterator for &'a Criteria {
    type Item = &'a Criterion;
    type IntoIter = std::slice::Iter<'a, Criterion>;

    fn into_iter(self) -> Self::IntoIter {
        self.chain.iter()
    }
}

/// How a LIKE pattern is matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikePattern {
    /// Single trailing wildcard; holds the prefix without the marker
    Prefix(String),
    /// Any other wildcard placement; holds the pattern with `%` markers intact
    Wildcard(String),
}

impl LikePattern {
    pub fn classify(pattern: &str) -> Self {
        let markers = pattern.matches(COMMON_WILDCARD).count();
        match pattern.strip_suffix(COMMON_WILDCARD) {
            Some(prefix) if markers == 1 && !prefix.is_empty() => {
                LikePattern::Prefix(prefix.to_string())
            }
            _ => LikePattern::Wildcard(pattern.to_string()),
        }
    }

    /// Pattern with the common marker replaced by a backend's own wildcard
    pub fn with_wildcard(&self, wildcard: char) -> String {
        match self {
            LikePattern::Prefix(prefix) => format!("{}{}", prefix, wildcard),
            LikePattern::Wildcard(pattern) => pattern.replace(COMMON_WILDCARD, &wildcard.to_string()),
        }
    }
}
