//! Unit-of-work context over a SQLite store.
//!
//! # Responsibility
//! - Expose typed entity sets that stage changes in a change tracker.
//! - Flush staged changes atomically on `save_changes`.
//!
//! # Invariants
//! - Reads and staging never write; `save_changes` is the only flush point.
//! - A context is used from one thread at a time; share it behind a mutex.

mod change_tracker;
mod database;
mod db_set;
mod error;
mod object_context;
mod query;

pub use change_tracker::{ChangeTracker, EntityEntry, EntityState, EntryKey};
pub use database::DatabaseFacade;
pub use db_set::DbSet;
pub use error::{ContextError, ContextResult, SaveError, SaveErrorKind, SaveTarget};
pub use object_context::ObjectContext;
pub use query::{CompareOp, EntityQuery, SortOrder};

use crate::model::entity::Entity;

/// Session contract repositories are written against.
pub trait DbContext {
    /// Returns the set for `E`, failing when `E` is not mapped.
    fn set<E: Entity>(&self) -> ContextResult<DbSet<'_, E>>;

    /// Writes every pending change. Returns the number of entries written.
    fn save_changes(&self) -> ContextResult<usize>;

    /// Stops tracking `entity`; untracked entities are ignored.
    fn detach<E: Entity>(&self, entity: &E) -> ContextResult<()>;

    fn change_tracker(&self) -> &ChangeTracker;

    fn database(&self) -> DatabaseFacade<'_>;
}
