//! Column-predicate queries over one mapped table.
//!
//! # Invariants
//! - Only mapped columns (plus `id`) can be filtered or ordered on.
//! - Without an explicit order, rows come back in `id` order.

use crate::context::error::{ContextError, ContextResult};
use crate::model::builder::{quote, TableSchema, ID_COLUMN};
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    IsNull,
    IsNotNull,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "= ?",
            Self::Ne => "<> ?",
            Self::Lt => "< ?",
            Self::Le => "<= ?",
            Self::Gt => "> ?",
            Self::Ge => ">= ?",
            Self::Like => "LIKE ?",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    fn binds_value(self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    column: String,
    op: CompareOp,
    value: Value,
}

/// Filter, order and paging options for reading entities.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityQuery {
    conditions: Vec<Condition>,
    order: Vec<(String, SortOrder)>,
    pub limit: Option<u32>,
    pub offset: u32,
    /// Attach loaded entities to the change tracker.
    pub tracking: bool,
}

impl Default for EntityQuery {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
            tracking: true,
        }
    }
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an `AND`-combined predicate. `value` is ignored for null checks.
    pub fn filter(mut self, column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn no_tracking(mut self) -> Self {
        self.tracking = false;
        self
    }

    /// Renders SQL and bind values against `schema`.
    pub(crate) fn to_sql(&self, schema: &TableSchema) -> ContextResult<(String, Vec<Value>)> {
        let mut sql = format!("{} WHERE 1 = 1", schema.select_sql());
        let mut bind_values = Vec::new();

        for condition in &self.conditions {
            ensure_column(schema, &condition.column)?;
            sql.push_str(&format!(" AND {} {}", quote(&condition.column), condition.op.sql()));
            if condition.op.binds_value() {
                bind_values.push(condition.value.clone());
            }
        }

        if self.order.is_empty() {
            sql.push_str(&format!(" ORDER BY {} ASC", quote(ID_COLUMN)));
        } else {
            let mut terms = Vec::with_capacity(self.order.len());
            for (column, order) in &self.order {
                ensure_column(schema, column)?;
                let direction = match order {
                    SortOrder::Asc => "ASC",
                    SortOrder::Desc => "DESC",
                };
                terms.push(format!("{} {direction}", quote(column)));
            }
            sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if self.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(self.offset)));
            }
        } else if self.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(self.offset)));
        }

        Ok((sql, bind_values))
    }
}

fn ensure_column(schema: &TableSchema, column: &str) -> ContextResult<()> {
    if schema.has_column(column) {
        Ok(())
    } else {
        Err(ContextError::UnknownColumn {
            table: schema.table,
            column: column.to_string(),
        })
    }
}
