//! Query description: criteria plus projection, ordering, grouping and paging

use super::criterion::Criteria;
use crate::errors::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn to_search(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortOrder,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortOrder::Desc,
        }
    }
}

/// Grouping key with an optional alias under which the group count is reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBy {
    pub field: String,
    pub count_alias: Option<String>,
}

impl GroupBy {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            count_alias: None,
        }
    }

    pub fn with_count_alias(mut self, alias: impl Into<String>) -> Self {
        self.count_alias = Some(alias.into());
        self
    }

    /// Only one grouping key is supported; a second is a configuration error
    pub fn single(group_bys: &[GroupBy]) -> Result<Option<&GroupBy>, QueryError> {
        match group_bys {
            [] => Ok(None),
            [group_by] => Ok(Some(group_by)),
            _ => Err(QueryError::validation(format!(
                "at most one group by is supported, got {}",
                group_bys.len()
            ))),
        }
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pageable {
    page_number: u64,
    page_size: u64,
}

impl Pageable {
    pub fn new(page_number: u64, page_size: u64) -> Result<Self, QueryError> {
        if page_number < 1 {
            return Err(QueryError::validation("page number must be >= 1"));
        }
        if page_size < 1 {
            return Err(QueryError::validation("page size must be >= 1"));
        }
        // offset and offset + limit must both fit in u64
        (page_number - 1)
            .checked_mul(page_size)
            .and_then(|offset| offset.checked_add(page_size))
            .ok_or_else(|| {
                QueryError::validation(format!(
                    "page {} of size {} is beyond the addressable range",
                    page_number, page_size
                ))
            })?;
        Ok(Self {
            page_number,
            page_size,
        })
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        (self.page_number - 1) * self.page_size
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }
}

/// Criteria plus projection, ordering, grouping and pagination
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    criteria: Criteria,
    include_fields: Vec<String>,
    order_bys: Vec<OrderBy>,
    group_bys: Vec<GroupBy>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_criteria(criteria: Criteria) -> Self {
        Self {
            criteria,
            ..Self::default()
        }
    }

    /// Restrict the projection; an empty projection selects every field
    pub fn include_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.include_fields.contains(&field) {
            self.include_fields.push(field);
        }
        self
    }

    pub fn include_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            self = self.include_field(field);
        }
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_bys.push(order_by);
        self
    }

    pub fn order_bys(mut self, order_bys: impl IntoIterator<Item = OrderBy>) -> Self {
        self.order_bys.extend(order_bys);
        self
    }

    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.group_bys.push(group_by);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn paginate(self, pageable: &Pageable) -> Self {
        self.offset(pageable.offset()).limit(pageable.limit())
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn fields(&self) -> &[String] {
        &self.include_fields
    }

    pub fn orderings(&self) -> &[OrderBy] {
        &self.order_bys
    }

    pub fn groupings(&self) -> &[GroupBy] {
        &self.group_bys
    }

    /// Offset, `None` when never set
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Limit, `None` when never set
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// 0/0 counts as unpaginated
    pub fn is_paginated(&self) -> bool {
        self.offset.unwrap_or(0) > 0 || self.limit.unwrap_or(0) > 0
    }
}
