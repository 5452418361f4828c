//! Per-dialect placeholder, pagination and generated-key conventions

pub use config::Dialect;

/// How a dialect hands back a key generated on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKeys {
    /// `INSERT ... RETURNING pk`
    Returning,
    /// `INSERT ... OUTPUT INSERTED.pk VALUES ...`
    OutputInserted,
    /// Reported by the driver after execution
    DriverReported,
    /// Keys must be assigned by the caller
    Unsupported,
}

/// MySQL has no offset-only form; this is its documented "no limit" value
const MYSQL_UNBOUNDED_LIMIT: u64 = u64::MAX;

pub trait DialectRules {
    /// Placeholder for the 1-based parameter `index`
    fn placeholder(&self, index: usize) -> String;

    fn generated_keys(&self) -> GeneratedKeys;

    /// Append or wrap pagination around a complete SELECT.
    /// Nothing is added unless offset or limit is non-zero.
    fn paginate(&self, sql: String, offset: Option<u64>, limit: Option<u64>, ordered: bool) -> String;
}

impl DialectRules for Dialect {
    fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql => "?".to_string(),
            Dialect::Oracle => format!(":{}", index),
            Dialect::SqlServer => format!("@p{}", index),
        }
    }

    fn generated_keys(&self) -> GeneratedKeys {
        match self {
            Dialect::Postgres => GeneratedKeys::Returning,
            Dialect::SqlServer => GeneratedKeys::OutputInserted,
            Dialect::MySql => GeneratedKeys::DriverReported,
            Dialect::Oracle => GeneratedKeys::Unsupported,
        }
    }

    fn paginate(&self, mut sql: String, offset: Option<u64>, limit: Option<u64>, ordered: bool) -> String {
        let offset = offset.unwrap_or(0);
        let limit = limit.filter(|l| *l > 0);
        if offset == 0 && limit.is_none() {
            return sql;
        }

        match self {
            Dialect::Postgres => {
                if let Some(limit) = limit {
                    sql.push_str(&format!(" LIMIT {}", limit));
                }
                if offset > 0 {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
                sql
            }
            Dialect::MySql => {
                let limit = limit.unwrap_or(MYSQL_UNBOUNDED_LIMIT);
                if offset > 0 {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
                } else {
                    sql.push_str(&format!(" LIMIT {}", limit));
                }
                sql
            }
            Dialect::SqlServer => {
                if !ordered {
                    sql.push_str(" ORDER BY (SELECT NULL)");
                }
                sql.push_str(&format!(" OFFSET {} ROWS", offset));
                if let Some(limit) = limit {
                    sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
                }
                sql
            }
            Dialect::Oracle => {
                let upper = match limit {
                    Some(limit) => format!(" WHERE ROWNUM <= {}", offset.saturating_add(limit)),
                    None => String::new(),
                };
                format!(
                    "SELECT * FROM (SELECT page_.*, ROWNUM rownum_ FROM ({}) page_{}) WHERE rownum_ > {}",
                    sql, upper, offset
                )
            }
        }
    }
}
