//! SQLite-backed `DbContext` implementation.
//!
//! # Responsibility
//! - Own the connection, the mapped model and the change tracker.
//! - Flush tracked changes in one transaction on `save_changes`.
//!
//! # Invariants
//! - A failed save leaves both the store and the tracker unchanged.
//! - Every log event carries the context id.

use crate::context::change_tracker::{ChangeTracker, EntityState, EntryKey, PendingWrite};
use crate::context::database::DatabaseFacade;
use crate::context::db_set::DbSet;
use crate::context::error::{ContextError, ContextResult, SaveError, SaveErrorKind, SaveTarget};
use crate::context::DbContext;
use crate::db::{open_connection, DbContextOptions};
use crate::model::builder::{quote, Model, ID_COLUMN};
use crate::model::entity::{Entity, EntityId};
use log::{debug, info, warn};
use rusqlite::{params_from_iter, Connection};
use std::time::Instant;
use uuid::Uuid;

/// Unit of work over one SQLite connection.
pub struct ObjectContext {
    id: Uuid,
    conn: Connection,
    model: Model,
    tracker: ChangeTracker,
}

impl ObjectContext {
    /// Opens the configured store and, unless disabled, creates mapped tables.
    pub fn new(options: &DbContextOptions, model: Model) -> ContextResult<Self> {
        let conn = open_connection(options)?;
        let context = Self {
            id: Uuid::new_v4(),
            conn,
            model,
            tracker: ChangeTracker::new(),
        };
        if options.ensure_created {
            context.database().ensure_created()?;
        }
        info!(
            "event=context_open module=context status=ok context_id={} mode={} tables={}",
            context.id,
            options.mode(),
            context.model.tables().len()
        );
        Ok(context)
    }

    pub fn in_memory(model: Model) -> ContextResult<Self> {
        Self::new(&DbContextOptions::in_memory(), model)
    }

    pub fn context_id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    fn write_all(
        &self,
        pending: &[PendingWrite],
    ) -> Result<Vec<(EntryKey, Option<EntityId>)>, SaveError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(SaveError::transaction)?;
        let mut written = Vec::with_capacity(pending.len());
        for write in pending {
            let assigned = write_entry(&tx, write)?;
            written.push((write.key, assigned));
        }
        tx.commit().map_err(SaveError::transaction)?;
        Ok(written)
    }
}

impl DbContext for ObjectContext {
    fn set<E: Entity>(&self) -> ContextResult<DbSet<'_, E>> {
        let schema = self
            .model
            .schema_of::<E>()
            .ok_or(ContextError::UnmappedEntity(E::TABLE))?;
        Ok(DbSet::new(&self.conn, &self.tracker, schema))
    }

    fn save_changes(&self) -> ContextResult<usize> {
        let pending = self.tracker.pending();
        if pending.is_empty() {
            return Ok(0);
        }

        let started_at = Instant::now();
        debug!(
            "event=save_changes module=context status=start context_id={} pending={}",
            self.id,
            pending.len()
        );

        match self.write_all(&pending) {
            Ok(written) => {
                self.tracker.accept_saved(&written);
                debug!(
                    "event=save_changes module=context status=ok context_id={} written={} duration_ms={}",
                    self.id,
                    written.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(written.len())
            }
            Err(err) => {
                warn!(
                    "event=save_changes module=context status=error context_id={} duration_ms={} error={}",
                    self.id,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(ContextError::Save(err))
            }
        }
    }

    fn detach<E: Entity>(&self, entity: &E) -> ContextResult<()> {
        if entity.is_transient() {
            return Err(ContextError::MissingKey(E::TABLE));
        }
        if let Some((key, _)) = self.tracker.lookup(E::TABLE, entity.id()) {
            self.tracker.detach(key);
        }
        Ok(())
    }

    fn change_tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    fn database(&self) -> DatabaseFacade<'_> {
        DatabaseFacade::new(&self.conn, &self.model, &self.tracker, self.id)
    }
}

/// Performs one pending write. Returns the row id for inserts.
fn write_entry(conn: &Connection, write: &PendingWrite) -> Result<Option<EntityId>, SaveError> {
    let fail = |kind: SaveErrorKind| SaveError {
        target: Some(SaveTarget {
            table: write.table,
            id: write.id,
            state: write.state,
        }),
        kind,
    };

    if write.state != EntityState::Deleted && write.values.len() != write.columns.len() {
        return Err(fail(SaveErrorKind::ColumnCount {
            expected: write.columns.len(),
            actual: write.values.len(),
        }));
    }

    let table = quote(write.table);
    let id_column = quote(ID_COLUMN);
    let column_names: Vec<String> = write.columns.iter().map(|column| quote(column.name)).collect();

    match write.state {
        EntityState::Added => {
            let mut names = column_names;
            let mut values = write.values.clone();
            if let Some(id) = write.id {
                names.insert(0, id_column);
                values.insert(0, id.into());
            }
            let placeholders = vec!["?"; names.len()].join(", ");
            let sql = format!("INSERT INTO {table} ({}) VALUES ({placeholders});", names.join(", "));
            conn.execute(&sql, params_from_iter(values))
                .map_err(|err| fail(SaveErrorKind::Sqlite(err)))?;
            Ok(Some(write.id.unwrap_or_else(|| conn.last_insert_rowid())))
        }
        EntityState::Modified => {
            let assignments: Vec<String> = column_names
                .iter()
                .map(|name| format!("{name} = ?"))
                .collect();
            let sql = format!(
                "UPDATE {table} SET {} WHERE {id_column} = ?;",
                assignments.join(", ")
            );
            let mut values = write.values.clone();
            values.push(write.id.unwrap_or_default().into());
            let affected = conn
                .execute(&sql, params_from_iter(values))
                .map_err(|err| fail(SaveErrorKind::Sqlite(err)))?;
            expect_one_row(affected).map_err(fail)?;
            Ok(None)
        }
        EntityState::Deleted => {
            let sql = format!("DELETE FROM {table} WHERE {id_column} = ?1;");
            let affected = conn
                .execute(&sql, [write.id.unwrap_or_default()])
                .map_err(|err| fail(SaveErrorKind::Sqlite(err)))?;
            expect_one_row(affected).map_err(fail)?;
            Ok(None)
        }
        EntityState::Unchanged | EntityState::Detached => Ok(None),
    }
}

fn expect_one_row(affected: usize) -> Result<(), SaveErrorKind> {
    if affected == 1 {
        Ok(())
    } else {
        Err(SaveErrorKind::Concurrency { affected })
    }
}
