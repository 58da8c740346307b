//! Connection bootstrap for context databases.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections from `DbContextOptions`.
//! - Apply connection pragmas before a context sees the connection.
//!
//! # Invariants
//! - Returned connections honor `foreign_keys` and `busy_timeout_ms`.
//! - File paths must be non-empty.

use super::options::{DataSource, DbContextOptions};
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::time::Instant;

/// Opens and configures the connection described by `options`.
///
/// # Side effects
/// - Creates the database file when it does not exist yet.
/// - Emits `db_open` logging events with duration and status.
pub fn open_connection(options: &DbContextOptions) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = options.mode();
    info!("event=db_open module=db status=start mode={mode}");

    let opened = match &options.data_source {
        DataSource::Memory => Connection::open_in_memory().map_err(DbError::from),
        DataSource::File { path } if path.as_os_str().is_empty() => Err(DbError::InvalidOptions(
            "file data source requires a non-empty path".to_string(),
        )),
        DataSource::File { path } => Connection::open(path).map_err(DbError::from),
    };

    let conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err);
        }
    };

    match configure_connection(&conn, options) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_configure_failed error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}

fn configure_connection(conn: &Connection, options: &DbContextOptions) -> DbResult<()> {
    let foreign_keys = if options.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(options.busy_timeout())?;
    Ok(())
}
