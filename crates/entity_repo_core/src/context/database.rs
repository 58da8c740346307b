//! Database-level operations of a context.

use crate::context::change_tracker::ChangeTracker;
use crate::context::error::ContextResult;
use crate::model::builder::Model;
use log::{info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use uuid::Uuid;

/// Schema and raw-SQL access for the store behind one context.
pub struct DatabaseFacade<'ctx> {
    conn: &'ctx Connection,
    model: &'ctx Model,
    tracker: &'ctx ChangeTracker,
    context_id: Uuid,
}

impl<'ctx> DatabaseFacade<'ctx> {
    pub(crate) fn new(
        conn: &'ctx Connection,
        model: &'ctx Model,
        tracker: &'ctx ChangeTracker,
        context_id: Uuid,
    ) -> Self {
        Self {
            conn,
            model,
            tracker,
            context_id,
        }
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Creates every mapped table that does not exist yet, atomically.
    pub fn ensure_created(&self) -> ContextResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for schema in self.model.tables() {
            tx.execute_batch(&schema.create_sql())?;
        }
        tx.commit()?;
        info!(
            "event=ensure_created module=database status=ok context_id={} tables={}",
            self.context_id,
            self.model.tables().len()
        );
        Ok(())
    }

    /// Drops every mapped table and detaches all tracked entities.
    pub fn ensure_deleted(&self) -> ContextResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for schema in self.model.tables().iter().rev() {
            tx.execute_batch(&schema.drop_sql())?;
        }
        tx.commit()?;
        let detached = self.tracker.clear();
        warn!(
            "event=ensure_deleted module=database status=ok context_id={} tables={} detached={}",
            self.context_id,
            self.model.tables().len(),
            detached
        );
        Ok(())
    }

    /// Executes a raw statement, bypassing the change tracker.
    ///
    /// Tracked entities are not refreshed; detach them first if the statement
    /// touches their rows.
    pub fn execute_sql(&self, sql: &str, params: &[Value]) -> ContextResult<usize> {
        let changed = self.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(changed)
    }

    /// Returns whether the store answers a trivial query.
    pub fn can_connect(&self) -> bool {
        self.conn
            .query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}
