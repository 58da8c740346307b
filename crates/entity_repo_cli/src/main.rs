//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise the repository layer end to end against a real SQLite store.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `entity_repo_cli [DB_PATH]`. Without a path the store is in memory.
//! Setting `ENTITY_REPO_LOG_DIR` to an absolute directory enables file logging.

use entity_repo_core::{
    core_version, init_logging, Column, DbContext, DbContextOptions, Entity, EntityId,
    EntityRepository, LoggingConfig, ModelBuilder, ObjectContext, Repository,
};
use log::info;
use rusqlite::types::Value;
use rusqlite::Row;
use std::error::Error;

#[derive(Debug, Clone)]
struct Task {
    id: EntityId,
    title: String,
    done: bool,
}

impl Task {
    fn new(title: &str) -> Self {
        Self {
            id: 0,
            title: title.to_string(),
            done: false,
        }
    }
}

impl Entity for Task {
    const TABLE: &'static str = "tasks";
    const COLUMNS: &'static [Column] = &[Column::text("title"), Column::integer("done")];

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.title.clone()), Value::Integer(i64::from(self.done))]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            done: row.get::<_, i64>("done")? != 0,
        })
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    if let Some(log_dir) = std::env::var_os("ENTITY_REPO_LOG_DIR") {
        init_logging(&LoggingConfig::new(log_dir))?;
    }

    let options = match std::env::args_os().nth(1) {
        Some(path) => DbContextOptions::file(path),
        None => DbContextOptions::in_memory(),
    };
    let model = ModelBuilder::new().entity::<Task>().build()?;
    let ctx = ObjectContext::new(&options, model)?;
    let repo = EntityRepository::<Task>::new(&ctx);

    let mut tasks = vec![Task::new("write tests"), Task::new("ship it")];
    repo.insert_many_and_detach(&mut tasks)?;
    tasks[0].done = true;
    repo.update_and_detach(&tasks[0])?;

    println!("entity_repo_core version={}", core_version());
    for task in repo.table_no_tracking()? {
        println!("task id={} done={} title={}", task.id, task.done, task.title);
    }
    info!(
        "event=cli_smoke module=cli status=ok context_id={} tracked={}",
        ctx.context_id(),
        ctx.change_tracker().len()
    );
    Ok(())
}
