//! Identity and state tracking for entities attached to a context.
//!
//! # Responsibility
//! - Record which entities are pending insert, update or delete.
//! - Resolve `(table, id)` to the single tracked instance.
//! - Keep the last loaded/saved snapshot so modifications can be rejected.
//!
//! # Invariants
//! - At most one entry exists per `(table, id)`.
//! - Entries without an id are always in `Added` state.
//! - Detaching an entry removes it; `Detached` is never stored.

use crate::context::error::{ContextError, ContextResult};
use crate::model::entity::{Column, Entity, EntityId};
use log::debug;
use rusqlite::types::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

/// Lifecycle state of an entity with respect to a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    Detached,
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl EntityState {
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

impl Display for EntityState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Detached => "detached",
            Self::Unchanged => "unchanged",
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// Stable handle of one tracked entry, unique within its tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey(u64);

impl Display for EntryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only view of a tracked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityEntry {
    pub key: EntryKey,
    pub table: &'static str,
    pub id: Option<EntityId>,
    pub state: EntityState,
}

/// Write the context must perform for one pending entry.
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub key: EntryKey,
    pub table: &'static str,
    pub columns: &'static [Column],
    pub id: Option<EntityId>,
    pub state: EntityState,
    pub values: Vec<Value>,
}

struct Snapshot {
    values: Vec<Value>,
    entity: Box<dyn Any + Send>,
}

/// Type-erased operations on the boxed entity of an entry.
#[derive(Clone, Copy)]
struct EntityOps {
    clone_box: fn(&(dyn Any + Send)) -> Box<dyn Any + Send>,
    assign_id: fn(&mut (dyn Any + Send), EntityId),
}

impl EntityOps {
    fn of<E: Entity>() -> Self {
        Self {
            clone_box: clone_box::<E>,
            assign_id: assign_id::<E>,
        }
    }
}

fn clone_box<E: Entity>(entity: &(dyn Any + Send)) -> Box<dyn Any + Send> {
    match entity.downcast_ref::<E>() {
        Some(entity) => Box::new(entity.clone()),
        None => unreachable!("entry holds a different entity type"),
    }
}

fn assign_id<E: Entity>(entity: &mut (dyn Any + Send), id: EntityId) {
    if let Some(entity) = entity.downcast_mut::<E>() {
        entity.set_id(id);
    }
}

struct TrackedEntry {
    table: &'static str,
    columns: &'static [Column],
    id: Option<EntityId>,
    state: EntityState,
    current: Snapshot,
    original: Option<Snapshot>,
    ops: EntityOps,
}

impl TrackedEntry {
    fn clone_snapshot(&self, snapshot: &Snapshot) -> Snapshot {
        Snapshot {
            values: snapshot.values.clone(),
            entity: (self.ops.clone_box)(snapshot.entity.as_ref()),
        }
    }

    fn accept_current(&mut self) {
        self.original = Some(self.clone_snapshot(&self.current));
    }

    fn restore_original(&mut self) {
        if let Some(original) = &self.original {
            self.current = self.clone_snapshot(original);
        }
    }

    fn view(&self, key: EntryKey) -> EntityEntry {
        EntityEntry {
            key,
            table: self.table,
            id: self.id,
            state: self.state,
        }
    }
}

#[derive(Default)]
struct TrackerState {
    next_key: u64,
    entries: BTreeMap<EntryKey, TrackedEntry>,
    identity: HashMap<(&'static str, EntityId), EntryKey>,
}

impl TrackerState {
    fn remove(&mut self, key: EntryKey) -> Option<TrackedEntry> {
        let entry = self.entries.remove(&key)?;
        if let Some(id) = entry.id {
            self.identity.remove(&(entry.table, id));
        }
        Some(entry)
    }
}

/// Unit-of-work bookkeeping shared by every `DbSet` of one context.
#[derive(Default)]
pub struct ChangeTracker {
    state: RefCell<TrackerState>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all tracked entries in tracking order.
    pub fn entries(&self) -> Vec<EntityEntry> {
        let state = self.state.borrow();
        state
            .entries
            .iter()
            .map(|(key, entry)| entry.view(*key))
            .collect()
    }

    /// Returns tracked entries whose state is one of `states`.
    pub fn entries_in(&self, states: &[EntityState]) -> Vec<EntityEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| states.contains(&entry.state))
            .collect()
    }

    pub fn entry(&self, key: EntryKey) -> Option<EntityEntry> {
        let state = self.state.borrow();
        state.entries.get(&key).map(|entry| entry.view(key))
    }

    /// State of `entity` in this tracker, `Detached` when untracked.
    ///
    /// Transient entities are only tracked by key, so they report `Detached`.
    pub fn state_of<E: Entity>(&self, entity: &E) -> EntityState {
        if entity.is_transient() {
            return EntityState::Detached;
        }
        self.lookup(E::TABLE, entity.id())
            .map_or(EntityState::Detached, |(_, state)| state)
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().entries.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        let state = self.state.borrow();
        state.entries.values().any(|entry| entry.state.is_pending())
    }

    /// Detaches every tracked entry. Returns how many were detached.
    pub fn clear(&self) -> usize {
        let mut state = self.state.borrow_mut();
        let detached = state.entries.len();
        state.entries.clear();
        state.identity.clear();
        detached
    }

    /// Moves an entry to `target`.
    ///
    /// - `Detached` removes the entry.
    /// - `Unchanged` from `Modified`/`Deleted` reverts to the last snapshot;
    ///   a `Modified` entry attached without one is detached instead.
    /// - `Deleted` from `Added` detaches the entry.
    /// - Keyless entries can only stay `Added` or be detached.
    pub fn set_state(&self, key: EntryKey, target: EntityState) -> ContextResult<()> {
        let mut state = self.state.borrow_mut();
        if target == EntityState::Detached {
            return match state.remove(key) {
                Some(entry) => {
                    debug!(
                        "event=entry_state module=tracker status=ok table={} from={} to=detached",
                        entry.table, entry.state
                    );
                    Ok(())
                }
                None => Err(ContextError::UnknownEntry(key)),
            };
        }

        let entry = state
            .entries
            .get_mut(&key)
            .ok_or(ContextError::UnknownEntry(key))?;
        let from = entry.state;
        if from == target {
            return Ok(());
        }

        // No row to delete, or no stored values to return to.
        let drop_entry = match (from, target) {
            (EntityState::Added, EntityState::Deleted) => true,
            (EntityState::Modified, EntityState::Unchanged) => entry.original.is_none(),
            _ => false,
        };
        if drop_entry {
            let table = entry.table;
            state.remove(key);
            debug!(
                "event=entry_state module=tracker status=ok table={table} from={from} to={target} detached=true"
            );
            return Ok(());
        }

        if entry.id.is_none() && target != EntityState::Added {
            return Err(ContextError::InvalidStateTransition {
                table: entry.table,
                from,
                to: target,
            });
        }

        match (from, target) {
            (EntityState::Modified | EntityState::Deleted, EntityState::Unchanged) => {
                entry.restore_original();
            }
            (EntityState::Added, EntityState::Unchanged) => entry.accept_current(),
            _ => {}
        }
        entry.state = target;
        debug!(
            "event=entry_state module=tracker status=ok table={} from={from} to={target}",
            entry.table
        );
        Ok(())
    }

    pub(crate) fn lookup(&self, table: &'static str, id: EntityId) -> Option<(EntryKey, EntityState)> {
        let state = self.state.borrow();
        let key = *state.identity.get(&(table, id))?;
        state.entries.get(&key).map(|entry| (key, entry.state))
    }

    /// Starts tracking `entity` in `entity_state`.
    pub(crate) fn track<E: Entity>(
        &self,
        entity: &E,
        entity_state: EntityState,
    ) -> ContextResult<EntryKey> {
        let id = (!entity.is_transient()).then(|| entity.id());
        if id.is_none() && entity_state != EntityState::Added {
            return Err(ContextError::MissingKey(E::TABLE));
        }

        let mut state = self.state.borrow_mut();
        if let Some(id) = id {
            if state.identity.contains_key(&(E::TABLE, id)) {
                return Err(ContextError::DuplicateKey { table: E::TABLE, id });
            }
        }

        let key = EntryKey(state.next_key);
        state.next_key += 1;

        let mut entry = TrackedEntry {
            table: E::TABLE,
            columns: E::COLUMNS,
            id,
            state: entity_state,
            current: Snapshot {
                values: entity.to_values(),
                entity: Box::new(entity.clone()),
            },
            original: None,
            ops: EntityOps::of::<E>(),
        };
        if matches!(entity_state, EntityState::Unchanged | EntityState::Deleted) {
            entry.accept_current();
        }

        if let Some(id) = id {
            state.identity.insert((E::TABLE, id), key);
        }
        state.entries.insert(key, entry);
        Ok(key)
    }

    /// Replaces the current values of a tracked entry and moves it to `entity_state`.
    pub(crate) fn replace<E: Entity>(
        &self,
        key: EntryKey,
        entity: &E,
        entity_state: EntityState,
    ) -> ContextResult<()> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .entries
            .get_mut(&key)
            .ok_or(ContextError::UnknownEntry(key))?;
        entry.current = Snapshot {
            values: entity.to_values(),
            entity: Box::new(entity.clone()),
        };
        entry.state = entity_state;
        Ok(())
    }

    /// Current tracked instance of an entry.
    pub(crate) fn current<E: Entity>(&self, key: EntryKey) -> Option<E> {
        let state = self.state.borrow();
        state
            .entries
            .get(&key)
            .and_then(|entry| entry.current.entity.downcast_ref::<E>())
            .cloned()
    }

    pub(crate) fn detach(&self, key: EntryKey) -> bool {
        self.state.borrow_mut().remove(key).is_some()
    }

    /// Snapshot of every pending write in tracking order.
    pub(crate) fn pending(&self) -> Vec<PendingWrite> {
        let state = self.state.borrow();
        state
            .entries
            .iter()
            .filter(|(_, entry)| entry.state.is_pending())
            .map(|(key, entry)| PendingWrite {
                key: *key,
                table: entry.table,
                columns: entry.columns,
                id: entry.id,
                state: entry.state,
                values: entry.current.values.clone(),
            })
            .collect()
    }

    /// Applies the outcome of a committed save.
    ///
    /// Each item is the written entry and, for inserts, its store-assigned id.
    pub(crate) fn accept_saved(&self, written: &[(EntryKey, Option<EntityId>)]) {
        let mut state = self.state.borrow_mut();
        for (key, assigned_id) in written {
            let Some(entry_state) = state.entries.get(key).map(|entry| entry.state) else {
                continue;
            };

            if entry_state == EntityState::Deleted {
                state.remove(*key);
                continue;
            }

            let mut indexed = None;
            if let Some(entry) = state.entries.get_mut(key) {
                if entry_state == EntityState::Added {
                    if let Some(id) = *assigned_id {
                        (entry.ops.assign_id)(entry.current.entity.as_mut(), id);
                        if entry.id.is_none() {
                            indexed = Some((entry.table, id));
                        }
                        entry.id = Some(id);
                    }
                }
                entry.state = EntityState::Unchanged;
                entry.accept_current();
            }
            if let Some(identity) = indexed {
                state.identity.insert(identity, *key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeTracker, EntityState};
    use crate::context::error::ContextError;
    use crate::model::entity::{Column, Entity, EntityId};
    use rusqlite::types::Value;
    use rusqlite::Row;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: EntityId,
        body: String,
    }

    impl Entity for Note {
        const TABLE: &'static str = "notes";
        const COLUMNS: &'static [Column] = &[Column::text("body")];

        fn id(&self) -> EntityId {
            self.id
        }

        fn set_id(&mut self, id: EntityId) {
            self.id = id;
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Text(self.body.clone())]
        }

        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                id: row.get("id")?,
                body: row.get("body")?,
            })
        }
    }

    fn note(id: EntityId, body: &str) -> Note {
        Note {
            id,
            body: body.to_string(),
        }
    }

    #[test]
    fn tracking_same_id_twice_is_rejected() {
        let tracker = ChangeTracker::new();
        tracker.track(&note(1, "a"), EntityState::Unchanged).unwrap();
        let err = tracker
            .track(&note(1, "b"), EntityState::Modified)
            .unwrap_err();
        assert!(matches!(err, ContextError::DuplicateKey { table: "notes", id: 1 }));
    }

    #[test]
    fn keyless_entries_cannot_become_unchanged() {
        let tracker = ChangeTracker::new();
        let key = tracker.track(&note(0, "new"), EntityState::Added).unwrap();
        let err = tracker.set_state(key, EntityState::Unchanged).unwrap_err();
        assert!(matches!(err, ContextError::InvalidStateTransition { .. }));
        assert_eq!(tracker.entry(key).unwrap().state, EntityState::Added);

        tracker.set_state(key, EntityState::Detached).unwrap();
        assert!(tracker.is_empty());
    }

    #[test]
    fn rejecting_modification_restores_snapshot() {
        let tracker = ChangeTracker::new();
        let key = tracker.track(&note(7, "loaded"), EntityState::Unchanged).unwrap();
        tracker
            .replace(key, &note(7, "edited"), EntityState::Modified)
            .unwrap();
        assert!(tracker.has_changes());

        tracker.set_state(key, EntityState::Unchanged).unwrap();
        assert_eq!(tracker.current::<Note>(key).unwrap().body, "loaded");
        assert!(!tracker.has_changes());
    }

    #[test]
    fn accept_saved_assigns_ids_and_drops_deleted() {
        let tracker = ChangeTracker::new();
        let added = tracker.track(&note(0, "fresh"), EntityState::Added).unwrap();
        let deleted = tracker.track(&note(3, "gone"), EntityState::Deleted).unwrap();

        tracker.accept_saved(&[(added, Some(42)), (deleted, None)]);

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.current::<Note>(added).unwrap().id, 42);
        assert_eq!(tracker.lookup("notes", 42), Some((added, EntityState::Unchanged)));
        assert_eq!(tracker.state_of(&note(3, "gone")), EntityState::Detached);
    }

    #[test]
    fn rejecting_modification_without_snapshot_detaches() {
        let tracker = ChangeTracker::new();
        let key = tracker.track(&note(9, "unsaved"), EntityState::Modified).unwrap();

        tracker.set_state(key, EntityState::Unchanged).unwrap();
        assert!(tracker.entry(key).is_none());
        assert_eq!(tracker.state_of(&note(9, "unsaved")), EntityState::Detached);
    }

    #[test]
    fn deleting_an_added_entry_detaches_it() {
        let tracker = ChangeTracker::new();
        let keyed = tracker.track(&note(5, "staged"), EntityState::Added).unwrap();
        let keyless = tracker.track(&note(0, "new"), EntityState::Added).unwrap();

        tracker.set_state(keyed, EntityState::Deleted).unwrap();
        tracker.set_state(keyless, EntityState::Deleted).unwrap();
        assert!(tracker.is_empty());
        assert!(tracker.pending().is_empty());
    }
}
