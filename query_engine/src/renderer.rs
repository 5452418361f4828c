use crate::criteria::{Criteria, Query};
use crate::entity::EntityDescriptor;
use crate::errors::QueryError;

/// Renders the shared query model into a backend-native request.
///
/// Implemented by the relational [`crate::sql::SqlBuilder`] and the
/// [`crate::search::SearchTranslator`]. Both reject invalid input with
/// [`QueryError::Validation`] before anything reaches a backend.
pub trait QueryRenderer {
    type Output;

    fn render_query(&self, descriptor: &EntityDescriptor, query: &Query) -> Result<Self::Output, QueryError>;

    fn render_count(&self, descriptor: &EntityDescriptor, criteria: &Criteria) -> Result<Self::Output, QueryError>;
}
