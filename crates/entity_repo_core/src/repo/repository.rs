//! Generic entity repository over a `DbContext`.
//!
//! # Responsibility
//! - Provide get/insert/update/delete, bulk and detach-after-write variants.
//! - Turn save failures into one detailed error after rolling back tracked
//!   changes.
//!
//! # Invariants
//! - Write paths call `Entity::validate()` before staging anything.
//! - Every write saves immediately; nothing is left pending on success.
//! - "and detach" variants clear the whole change tracker after a successful
//!   write.

use crate::context::{
    ContextError, DbContext, EntityQuery, EntityState, EntryKey, ObjectContext, SaveError,
};
use crate::logging::sanitize_message;
use crate::model::entity::{Entity, EntityId, EntityValidationError};
use log::{debug, error};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;

const MAX_LOGGED_ERROR_CHARS: usize = 2_000;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for entity persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(EntityValidationError),
    Context(ContextError),
    /// Save failed; `message` is the full error text after rollback.
    Save {
        message: String,
        source: SaveError,
    },
    /// The background task running an async operation failed.
    Background(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Context(err) => write!(f, "{err}"),
            Self::Save { message, .. } => write!(f, "{message}"),
            Self::Background(message) => write!(f, "repository task failed: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Context(err) => Some(err),
            Self::Save { source, .. } => Some(source),
            Self::Background(_) => None,
        }
    }
}

impl From<EntityValidationError> for RepoError {
    fn from(value: EntityValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ContextError> for RepoError {
    fn from(value: ContextError) -> Self {
        Self::Context(value)
    }
}

/// Repository interface for one entity type.
pub trait Repository<E: Entity> {
    /// Gets an entity by id; tracked instances take precedence.
    fn get_by_id(&self, id: EntityId) -> RepoResult<Option<E>>;

    /// Inserts `entity` and writes the assigned id back into it.
    fn insert(&self, entity: &mut E) -> RepoResult<()>;

    fn insert_many(&self, entities: &mut [E]) -> RepoResult<()>;

    /// Inserts `entity`, then clears the change tracker.
    fn insert_and_detach(&self, entity: &mut E) -> RepoResult<()>;

    fn insert_many_and_detach(&self, entities: &mut [E]) -> RepoResult<()>;

    fn update(&self, entity: &E) -> RepoResult<()>;

    fn update_many(&self, entities: &[E]) -> RepoResult<()>;

    fn update_and_detach(&self, entity: &E) -> RepoResult<()>;

    fn update_many_and_detach(&self, entities: &[E]) -> RepoResult<()>;

    fn delete(&self, entity: &E) -> RepoResult<()>;

    fn delete_many(&self, entities: &[E]) -> RepoResult<()>;

    fn delete_and_detach(&self, entity: &E) -> RepoResult<()>;

    fn delete_many_and_detach(&self, entities: &[E]) -> RepoResult<()>;

    /// Loads every entity, tracking the results.
    fn table(&self) -> RepoResult<Vec<E>>;

    /// Loads every entity for read-only use, without tracking.
    fn table_no_tracking(&self) -> RepoResult<Vec<E>>;

    fn query(&self, query: &EntityQuery) -> RepoResult<Vec<E>>;
}

/// `Repository` implementation that delegates to a `DbContext`.
pub struct EntityRepository<'ctx, E: Entity, C: DbContext = ObjectContext> {
    context: &'ctx C,
    _entity: PhantomData<fn() -> E>,
}

impl<'ctx, E: Entity, C: DbContext> EntityRepository<'ctx, E, C> {
    pub fn new(context: &'ctx C) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    pub fn context(&self) -> &'ctx C {
        self.context
    }

    /// Saves pending changes, converting a save failure into `RepoError::Save`.
    fn save(&self, operation: &'static str) -> RepoResult<usize> {
        match self.context.save_changes() {
            Ok(written) => Ok(written),
            Err(ContextError::Save(err)) => {
                let message = self.full_error_text_and_rollback(&err);
                error!(
                    "event=repo_save module=repo status=error entity={} op={} error={}",
                    E::TABLE,
                    operation,
                    sanitize_message(&message, MAX_LOGGED_ERROR_CHARS)
                );
                Err(RepoError::Save {
                    message,
                    source: err,
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Rolls back pending additions and modifications, then retries the save.
    ///
    /// Returns the full text of `err` when the retry succeeds, otherwise the
    /// full text of the retry failure.
    fn full_error_text_and_rollback(&self, err: &SaveError) -> String {
        let tracker = self.context.change_tracker();
        for entry in tracker.entries_in(&[EntityState::Added, EntityState::Modified]) {
            let target = match entry.state {
                EntityState::Added => EntityState::Detached,
                _ => EntityState::Unchanged,
            };
            // Entries that refuse the transition stay as they are.
            let _ = tracker.set_state(entry.key, target);
        }

        match self.context.save_changes() {
            Ok(_) => full_error_text(err),
            Err(retry) => full_error_text(&retry),
        }
    }

    /// Detaches every tracked entity from the context.
    fn detach_all_entities(&self) {
        let detached = self.context.change_tracker().clear();
        debug!(
            "event=detach_all module=repo status=ok entity={} detached={}",
            E::TABLE,
            detached
        );
    }

    fn assign_ids(&self, keys: &[EntryKey], entities: &mut [E]) -> RepoResult<()> {
        let set = self.context.set::<E>()?;
        for (key, entity) in keys.iter().zip(entities.iter_mut()) {
            if let Some(id) = set.entity_id(*key) {
                entity.set_id(id);
            }
        }
        Ok(())
    }
}

impl<E: Entity, C: DbContext> Repository<E> for EntityRepository<'_, E, C> {
    fn get_by_id(&self, id: EntityId) -> RepoResult<Option<E>> {
        Ok(self.context.set::<E>()?.find(id)?)
    }

    fn insert(&self, entity: &mut E) -> RepoResult<()> {
        self.insert_many(std::slice::from_mut(entity))
    }

    fn insert_many(&self, entities: &mut [E]) -> RepoResult<()> {
        validate_all(entities)?;
        let keys = self.context.set::<E>()?.add_range(entities)?;
        self.save("insert")?;
        self.assign_ids(&keys, entities)
    }

    fn insert_and_detach(&self, entity: &mut E) -> RepoResult<()> {
        self.insert(entity)?;
        self.detach_all_entities();
        Ok(())
    }

    fn insert_many_and_detach(&self, entities: &mut [E]) -> RepoResult<()> {
        self.insert_many(entities)?;
        self.detach_all_entities();
        Ok(())
    }

    fn update(&self, entity: &E) -> RepoResult<()> {
        self.update_many(std::slice::from_ref(entity))
    }

    fn update_many(&self, entities: &[E]) -> RepoResult<()> {
        validate_all(entities)?;
        if entities.iter().any(|entity| entity.is_transient()) {
            return Err(ContextError::MissingKey(E::TABLE).into());
        }
        self.context.set::<E>()?.update_range(entities)?;
        self.save("update")?;
        Ok(())
    }

    fn update_and_detach(&self, entity: &E) -> RepoResult<()> {
        self.update(entity)?;
        self.detach_all_entities();
        Ok(())
    }

    fn update_many_and_detach(&self, entities: &[E]) -> RepoResult<()> {
        self.update_many(entities)?;
        self.detach_all_entities();
        Ok(())
    }

    fn delete(&self, entity: &E) -> RepoResult<()> {
        self.delete_many(std::slice::from_ref(entity))
    }

    fn delete_many(&self, entities: &[E]) -> RepoResult<()> {
        self.context.set::<E>()?.remove_range(entities)?;
        self.save("delete")?;
        Ok(())
    }

    fn delete_and_detach(&self, entity: &E) -> RepoResult<()> {
        self.delete(entity)?;
        self.detach_all_entities();
        Ok(())
    }

    fn delete_many_and_detach(&self, entities: &[E]) -> RepoResult<()> {
        self.delete_many(entities)?;
        self.detach_all_entities();
        Ok(())
    }

    fn table(&self) -> RepoResult<Vec<E>> {
        Ok(self.context.set::<E>()?.to_list()?)
    }

    fn table_no_tracking(&self) -> RepoResult<Vec<E>> {
        Ok(self.context.set::<E>()?.to_list_no_tracking()?)
    }

    fn query(&self, query: &EntityQuery) -> RepoResult<Vec<E>> {
        Ok(self.context.set::<E>()?.query(query)?)
    }
}

fn validate_all<E: Entity>(entities: &[E]) -> RepoResult<()> {
    for entity in entities {
        entity.validate()?;
    }
    Ok(())
}

/// Renders an error and its whole `source()` chain on one line.
///
/// Consecutive identical messages are collapsed.
pub fn full_error_text(err: &(dyn Error + 'static)) -> String {
    let mut parts: Vec<String> = vec![err.to_string()];
    let mut current = err.source();
    while let Some(cause) = current {
        let text = cause.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        current = cause.source();
    }
    parts.join(": ")
}
