//! Model registration and DDL generation.
//!
//! # Responsibility
//! - Collect the entity mappings a context is allowed to work with.
//! - Validate table/column identifiers before any SQL is generated.
//! - Render `CREATE TABLE` / `DROP TABLE` statements for mapped tables.
//!
//! # Invariants
//! - A `Model` never contains two schemas for the same table.
//! - Identifiers in a built `Model` match `^[A-Za-z_][A-Za-z0-9_]*$`.

use crate::model::entity::{Column, Entity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::TypeId;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub(crate) const ID_COLUMN: &str = "id";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Invalid entity mapping detected while building a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidIdentifier(String),
    DuplicateTable(&'static str),
    DuplicateColumn {
        table: &'static str,
        column: &'static str,
    },
    ReservedColumn(&'static str),
    EmptyMapping(&'static str),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(name) => write!(f, "invalid sql identifier `{name}`"),
            Self::DuplicateTable(table) => write!(f, "table `{table}` is mapped twice"),
            Self::DuplicateColumn { table, column } => {
                write!(f, "column `{column}` is mapped twice in `{table}`")
            }
            Self::ReservedColumn(table) => {
                write!(f, "`{table}` maps a column named `{ID_COLUMN}`, which is reserved")
            }
            Self::EmptyMapping(table) => write!(f, "`{table}` maps no columns"),
        }
    }
}

impl Error for ModelError {}

/// Table layout of one mapped entity type.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: &'static str,
    pub columns: &'static [Column],
    type_id: TypeId,
}

impl TableSchema {
    fn of<E: Entity>() -> Self {
        Self {
            table: E::TABLE,
            columns: E::COLUMNS,
            type_id: TypeId::of::<E>(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        name == ID_COLUMN || self.columns.iter().any(|column| column.name == name)
    }

    pub fn create_sql(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote(self.table),
            quote(ID_COLUMN)
        );
        for column in self.columns {
            sql.push_str(&format!(",\n    {} {}", quote(column.name), column.kind.sql_name()));
            if !column.nullable {
                sql.push_str(" NOT NULL");
            }
            if column.unique {
                sql.push_str(" UNIQUE");
            }
        }
        sql.push_str("\n);");
        sql
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", quote(self.table))
    }

    pub(crate) fn select_sql(&self) -> String {
        let mut names = vec![quote(ID_COLUMN)];
        names.extend(self.columns.iter().map(|column| quote(column.name)));
        format!("SELECT {} FROM {}", names.join(", "), quote(self.table))
    }
}

/// The set of entity types a context maps.
#[derive(Debug, Clone, Default)]
pub struct Model {
    tables: Vec<TableSchema>,
}

impl Model {
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Looks up the schema registered for `E`.
    pub fn schema_of<E: Entity>(&self) -> Option<&TableSchema> {
        let type_id = TypeId::of::<E>();
        self.tables.iter().find(|schema| schema.type_id == type_id)
    }

    pub fn contains<E: Entity>(&self) -> bool {
        self.schema_of::<E>().is_some()
    }
}

/// Collects entity registrations and builds a validated `Model`.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    tables: Vec<TableSchema>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E`. Registering the same type twice is a no-op.
    pub fn entity<E: Entity>(mut self) -> Self {
        let schema = TableSchema::of::<E>();
        if !self.tables.iter().any(|known| known.type_id == schema.type_id) {
            self.tables.push(schema);
        }
        self
    }

    pub fn build(self) -> Result<Model, ModelError> {
        let mut seen_tables = HashSet::new();
        for schema in &self.tables {
            validate_identifier(schema.table)?;
            if !seen_tables.insert(schema.table.to_ascii_lowercase()) {
                return Err(ModelError::DuplicateTable(schema.table));
            }
            if schema.columns.is_empty() {
                return Err(ModelError::EmptyMapping(schema.table));
            }

            let mut seen_columns = HashSet::new();
            for column in schema.columns {
                validate_identifier(column.name)?;
                if column.name.eq_ignore_ascii_case(ID_COLUMN) {
                    return Err(ModelError::ReservedColumn(schema.table));
                }
                if !seen_columns.insert(column.name.to_ascii_lowercase()) {
                    return Err(ModelError::DuplicateColumn {
                        table: schema.table,
                        column: column.name,
                    });
                }
            }
        }

        Ok(Model {
            tables: self.tables,
        })
    }
}

fn validate_identifier(name: &str) -> Result<(), ModelError> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(ModelError::InvalidIdentifier(name.to_string()))
    }
}

pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

#[cfg(test)]
mod tests {
    use super::{ModelBuilder, ModelError};
    use crate::model::entity::{Column, Entity, EntityId};
    use rusqlite::types::Value;
    use rusqlite::Row;

    #[derive(Clone)]
    struct Tag {
        id: EntityId,
        label: String,
    }

    impl Entity for Tag {
        const TABLE: &'static str = "tags";
        const COLUMNS: &'static [Column] = &[Column::text("label").unique()];

        fn id(&self) -> EntityId {
            self.id
        }

        fn set_id(&mut self, id: EntityId) {
            self.id = id;
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Text(self.label.clone())]
        }

        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                id: row.get("id")?,
                label: row.get("label")?,
            })
        }
    }

    #[derive(Clone)]
    struct BadName;

    impl Entity for BadName {
        const TABLE: &'static str = "bad name";
        const COLUMNS: &'static [Column] = &[Column::text("x")];

        fn id(&self) -> EntityId {
            0
        }

        fn set_id(&mut self, _id: EntityId) {}

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Null]
        }

        fn from_row(_row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self)
        }
    }

    #[derive(Clone)]
    struct ShadowsId;

    impl Entity for ShadowsId {
        const TABLE: &'static str = "shadows";
        const COLUMNS: &'static [Column] = &[Column::integer("ID")];

        fn id(&self) -> EntityId {
            0
        }

        fn set_id(&mut self, _id: EntityId) {}

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Null]
        }

        fn from_row(_row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn create_sql_quotes_identifiers_and_constraints() {
        let model = ModelBuilder::new().entity::<Tag>().build().unwrap();
        let sql = model.schema_of::<Tag>().unwrap().create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"tags\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"label\" TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let model = ModelBuilder::new()
            .entity::<Tag>()
            .entity::<Tag>()
            .build()
            .unwrap();
        assert_eq!(model.tables().len(), 1);
        assert!(model.contains::<Tag>());
        assert!(!model.contains::<BadName>());
    }

    #[test]
    fn invalid_identifiers_and_reserved_columns_are_rejected() {
        let err = ModelBuilder::new().entity::<BadName>().build().unwrap_err();
        assert_eq!(err, ModelError::InvalidIdentifier("bad name".to_string()));

        let err = ModelBuilder::new().entity::<ShadowsId>().build().unwrap_err();
        assert_eq!(err, ModelError::ReservedColumn("shadows"));
    }
}
