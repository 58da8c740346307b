//! Generic repository and unit-of-work context over SQLite.
//!
//! Entities describe their table mapping through [`Entity`]; an
//! [`ObjectContext`] tracks loaded and staged entities and flushes them on
//! `save_changes`; [`EntityRepository`] and [`AsyncEntityRepository`] wrap the
//! context with save-immediately CRUD operations.

pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use context::{
    ChangeTracker, CompareOp, ContextError, ContextResult, DatabaseFacade, DbContext, DbSet,
    EntityEntry, EntityQuery, EntityState, EntryKey, ObjectContext, SaveError, SaveErrorKind,
    SaveTarget, SortOrder,
};
pub use db::{DataSource, DbContextOptions, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::builder::{Model, ModelBuilder, ModelError, TableSchema};
pub use model::entity::{Column, ColumnType, Entity, EntityId, EntityValidationError, TRANSIENT_ID};
pub use repo::async_repo::{save_changes_async, shared, AsyncEntityRepository, AsyncRepository, SharedContext};
pub use repo::repository::{full_error_text, EntityRepository, RepoError, RepoResult, Repository};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
