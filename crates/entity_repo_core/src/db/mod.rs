//! SQLite connection bootstrap and context configuration.
//!
//! # Responsibility
//! - Hold the options a context is opened with.
//! - Open and configure SQLite connections for contexts.
//!
//! # Invariants
//! - No context receives a connection before its pragmas are applied.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
pub mod options;

pub use open::open_connection;
pub use options::{DataSource, DbContextOptions};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    InvalidOptions(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidOptions(message) => write!(f, "invalid context options: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidOptions(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
