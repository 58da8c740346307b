//! Entity contract and column mapping.
//!
//! # Responsibility
//! - Define the trait every persisted type implements.
//! - Describe how an entity maps onto one SQLite table.
//!
//! # Invariants
//! - Every table has an implicit `id INTEGER PRIMARY KEY` column.
//! - `to_values()` yields one value per entry of `COLUMNS`, in order.
//! - `EntityId` `0` marks a transient entity that was never persisted.

use rusqlite::types::Value;
use rusqlite::Row;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identifier of a persisted entity row.
pub type EntityId = i64;

/// Id value carried by entities that have not been inserted yet.
pub const TRANSIENT_ID: EntityId = 0;

/// Storage class of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
}

impl ColumnType {
    pub(crate) fn sql_name(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

/// Mapping of one entity field onto a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    /// Declares a `NOT NULL` column without constraints.
    pub const fn new(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            unique: false,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, ColumnType::Real)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub const fn blob(name: &'static str) -> Self {
        Self::new(name, ColumnType::Blob)
    }

    /// Allows `NULL` values in this column.
    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    /// Adds a `UNIQUE` constraint to this column.
    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }
}

/// A type that can be stored and tracked by an `ObjectContext`.
///
/// Implementations are plain data: the context owns identity and state, the
/// entity only knows how to turn itself into column values and back.
pub trait Entity: Clone + Send + 'static {
    /// Table name; must be a plain SQL identifier.
    const TABLE: &'static str;
    /// Mapped columns, excluding the implicit `id` column.
    const COLUMNS: &'static [Column];

    fn id(&self) -> EntityId;

    fn set_id(&mut self, id: EntityId);

    /// Column values in `COLUMNS` order.
    fn to_values(&self) -> Vec<Value>;

    /// Builds an entity from a row that contains `id` and every mapped column.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Returns whether this entity has never been persisted.
    fn is_transient(&self) -> bool {
        self.id() == TRANSIENT_ID
    }

    /// Business validation run by repositories before any write.
    fn validate(&self) -> Result<(), EntityValidationError> {
        Ok(())
    }
}

/// Validation failure reported by `Entity::validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityValidationError {
    pub entity: &'static str,
    pub message: String,
}

impl EntityValidationError {
    pub fn new(entity: &'static str, message: impl Into<String>) -> Self {
        Self {
            entity,
            message: message.into(),
        }
    }
}

impl Display for EntityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} entity: {}", self.entity, self.message)
    }
}

impl Error for EntityValidationError {}
