//! Context and save failure types.

use crate::context::change_tracker::{EntityState, EntryKey};
use crate::db::DbError;
use crate::model::builder::ModelError;
use crate::model::entity::EntityId;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ContextResult<T> = Result<T, ContextError>;

/// Error raised by `DbContext`, `DbSet` and `ChangeTracker` operations.
#[derive(Debug)]
pub enum ContextError {
    Db(DbError),
    Model(ModelError),
    UnmappedEntity(&'static str),
    UnknownColumn {
        table: &'static str,
        column: String,
    },
    DuplicateKey {
        table: &'static str,
        id: EntityId,
    },
    MissingKey(&'static str),
    InvalidStateTransition {
        table: &'static str,
        from: EntityState,
        to: EntityState,
    },
    UnknownEntry(EntryKey),
    Save(SaveError),
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Model(err) => write!(f, "{err}"),
            Self::UnmappedEntity(table) => {
                write!(f, "entity `{table}` is not part of the context model")
            }
            Self::UnknownColumn { table, column } => {
                write!(f, "`{table}` has no mapped column `{column}`")
            }
            Self::DuplicateKey { table, id } => write!(
                f,
                "another `{table}` instance with id {id} is already being tracked"
            ),
            Self::MissingKey(table) => {
                write!(f, "`{table}` entity has no id; it was never persisted")
            }
            Self::InvalidStateTransition { table, from, to } => {
                write!(f, "cannot move `{table}` entry from {from} to {to}")
            }
            Self::UnknownEntry(key) => write!(f, "no tracked entry for key {key}"),
            Self::Save(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Model(err) => Some(err),
            Self::Save(err) => Some(err),
            Self::UnmappedEntity(_)
            | Self::UnknownColumn { .. }
            | Self::DuplicateKey { .. }
            | Self::MissingKey(_)
            | Self::InvalidStateTransition { .. }
            | Self::UnknownEntry(_) => None,
        }
    }
}

impl From<DbError> for ContextError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ModelError> for ContextError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

impl From<rusqlite::Error> for ContextError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SaveError> for ContextError {
    fn from(value: SaveError) -> Self {
        Self::Save(value)
    }
}

/// Tracked entry whose write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveTarget {
    pub table: &'static str,
    pub id: Option<EntityId>,
    pub state: EntityState,
}

#[derive(Debug)]
pub enum SaveErrorKind {
    Sqlite(rusqlite::Error),
    /// `UPDATE`/`DELETE` matched no row: the row was removed or never existed.
    Concurrency { affected: usize },
    ColumnCount { expected: usize, actual: usize },
}

/// Failure while writing pending changes; the transaction was rolled back.
#[derive(Debug)]
pub struct SaveError {
    /// `None` when the transaction itself failed to begin or commit.
    pub target: Option<SaveTarget>,
    pub kind: SaveErrorKind,
}

impl SaveError {
    pub(crate) fn transaction(err: rusqlite::Error) -> Self {
        Self {
            target: None,
            kind: SaveErrorKind::Sqlite(err),
        }
    }

    pub fn is_concurrency_failure(&self) -> bool {
        matches!(self.kind, SaveErrorKind::Concurrency { .. })
    }
}

impl Display for SaveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(target) => {
                write!(f, "failed to save {} `{}` entry", target.state, target.table)?;
                match target.id {
                    Some(id) => write!(f, " (id {id})")?,
                    None => write!(f, " (new)")?,
                }
            }
            None => write!(f, "save transaction failed")?,
        }

        match &self.kind {
            SaveErrorKind::Sqlite(_) => Ok(()),
            SaveErrorKind::Concurrency { affected } => {
                write!(f, ": expected 1 affected row, got {affected}")
            }
            SaveErrorKind::ColumnCount { expected, actual } => write!(
                f,
                ": mapping declares {expected} columns but entity produced {actual} values"
            ),
        }
    }
}

impl Error for SaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            SaveErrorKind::Sqlite(err) => Some(err),
            SaveErrorKind::Concurrency { .. } | SaveErrorKind::ColumnCount { .. } => None,
        }
    }
}
