//! Typed view over one mapped table plus its tracked entries.
//!
//! # Responsibility
//! - Stage inserts, updates and deletes in the change tracker.
//! - Read entities, resolving identity against tracked instances.
//!
//! # Invariants
//! - Nothing here writes to the store; only `save_changes` does.
//! - A tracking read never yields two instances for the same id.

use crate::context::change_tracker::{ChangeTracker, EntityEntry, EntityState, EntryKey};
use crate::context::error::{ContextError, ContextResult};
use crate::context::query::EntityQuery;
use crate::model::builder::{quote, TableSchema, ID_COLUMN};
use crate::model::entity::{Entity, EntityId};
use rusqlite::{params_from_iter, Connection};
use std::marker::PhantomData;

/// Set of `E` entities in one context.
pub struct DbSet<'ctx, E: Entity> {
    conn: &'ctx Connection,
    tracker: &'ctx ChangeTracker,
    schema: &'ctx TableSchema,
    _entity: PhantomData<fn() -> E>,
}

impl<'ctx, E: Entity> DbSet<'ctx, E> {
    pub(crate) fn new(
        conn: &'ctx Connection,
        tracker: &'ctx ChangeTracker,
        schema: &'ctx TableSchema,
    ) -> Self {
        Self {
            conn,
            tracker,
            schema,
            _entity: PhantomData,
        }
    }

    /// Finds an entity by id, preferring the tracked instance.
    ///
    /// Loaded rows are tracked as `Unchanged`. Entities tracked as `Deleted`
    /// are reported as absent.
    pub fn find(&self, id: EntityId) -> ContextResult<Option<E>> {
        if let Some((key, state)) = self.tracker.lookup(E::TABLE, id) {
            if state == EntityState::Deleted {
                return Ok(None);
            }
            return Ok(self.tracker.current::<E>(key));
        }

        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE {} = ?1;",
            self.schema.select_sql(),
            quote(ID_COLUMN)
        ))?;
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let entity = E::from_row(row)?;
        self.tracker.track(&entity, EntityState::Unchanged)?;
        Ok(Some(entity))
    }

    /// Begins tracking `entity` as `Added`.
    pub fn add(&self, entity: &E) -> ContextResult<EntryKey> {
        self.tracker.track(entity, EntityState::Added)
    }

    /// Adds every entity, or none of them when one is rejected.
    pub fn add_range(&self, entities: &[E]) -> ContextResult<Vec<EntryKey>> {
        self.stage_all(entities, |set, entity| set.add(entity))
    }

    /// Marks `entity` for update.
    ///
    /// Transient entities are tracked as `Added`; tracked `Added` entries keep
    /// their state and take the new values.
    pub fn update(&self, entity: &E) -> ContextResult<EntryKey> {
        if entity.is_transient() {
            return self.add(entity);
        }

        match self.tracker.lookup(E::TABLE, entity.id()) {
            Some((key, EntityState::Added)) => {
                self.tracker.replace(key, entity, EntityState::Added)?;
                Ok(key)
            }
            Some((key, _)) => {
                self.tracker.replace(key, entity, EntityState::Modified)?;
                Ok(key)
            }
            None => self.tracker.track(entity, EntityState::Modified),
        }
    }

    pub fn update_range(&self, entities: &[E]) -> ContextResult<Vec<EntryKey>> {
        self.stage_all(entities, |set, entity| set.update(entity))
    }

    /// Marks `entity` for deletion.
    ///
    /// A tracked `Added` entity is simply detached since it has no row yet.
    pub fn remove(&self, entity: &E) -> ContextResult<()> {
        if entity.is_transient() {
            return Err(ContextError::MissingKey(E::TABLE));
        }

        match self.tracker.lookup(E::TABLE, entity.id()) {
            Some((key, EntityState::Added)) => {
                self.tracker.detach(key);
                Ok(())
            }
            Some((key, _)) => self.tracker.set_state(key, EntityState::Deleted),
            None => self.tracker.track(entity, EntityState::Deleted).map(|_| ()),
        }
    }

    pub fn remove_range(&self, entities: &[E]) -> ContextResult<()> {
        if entities.iter().any(|entity| entity.is_transient()) {
            return Err(ContextError::MissingKey(E::TABLE));
        }
        for entity in entities {
            self.remove(entity)?;
        }
        Ok(())
    }

    /// Runs `query` against the store.
    pub fn query(&self, query: &EntityQuery) -> ContextResult<Vec<E>> {
        let (sql, bind_values) = query.to_sql(self.schema)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entities = Vec::new();

        while let Some(row) = rows.next()? {
            if !query.tracking {
                entities.push(E::from_row(row)?);
                continue;
            }

            let id: EntityId = row.get(ID_COLUMN)?;
            let tracked = self
                .tracker
                .lookup(E::TABLE, id)
                .and_then(|(key, _)| self.tracker.current::<E>(key));
            match tracked {
                Some(entity) => entities.push(entity),
                None => {
                    let entity = E::from_row(row)?;
                    self.tracker.track(&entity, EntityState::Unchanged)?;
                    entities.push(entity);
                }
            }
        }

        Ok(entities)
    }

    /// Loads every row, tracking the results.
    pub fn to_list(&self) -> ContextResult<Vec<E>> {
        self.query(&EntityQuery::new())
    }

    /// Loads every row without touching the change tracker.
    pub fn to_list_no_tracking(&self) -> ContextResult<Vec<E>> {
        self.query(&EntityQuery::new().no_tracking())
    }

    /// Id of a tracked entry, available for inserts once saved.
    pub fn entity_id(&self, key: EntryKey) -> Option<EntityId> {
        self.tracker.entry(key).and_then(|entry| entry.id)
    }

    fn stage_all(
        &self,
        entities: &[E],
        mut stage: impl FnMut(&Self, &E) -> ContextResult<EntryKey>,
    ) -> ContextResult<Vec<EntryKey>> {
        let mut staged = Vec::with_capacity(entities.len());
        let before = self.tracker.entries();
        for entity in entities {
            match stage(self, entity) {
                Ok(key) => staged.push(key),
                Err(err) => {
                    self.undo_staged(&before);
                    return Err(err);
                }
            }
        }
        Ok(staged)
    }

    /// Detaches entries created since `before` was captured.
    fn undo_staged(&self, before: &[EntityEntry]) {
        for entry in self.tracker.entries() {
            if !before.iter().any(|known| known.key == entry.key) {
                self.tracker.detach(entry.key);
            }
        }
    }
}
