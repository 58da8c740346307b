#![allow(dead_code)]

use entity_repo_core::{
    Column, Entity, EntityId, EntityValidationError, Model, ModelBuilder, ObjectContext,
};
use rusqlite::types::Value;
use rusqlite::Row;

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: EntityId,
    pub email: String,
    pub name: String,
    pub nickname: Option<String>,
}

impl Customer {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            id: 0,
            email: email.to_string(),
            name: name.to_string(),
            nickname: None,
        }
    }
}

impl Entity for Customer {
    const TABLE: &'static str = "customers";
    const COLUMNS: &'static [Column] = &[
        Column::text("email").unique(),
        Column::text("name"),
        Column::text("nickname").nullable(),
    ];

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.email.clone()),
            Value::Text(self.name.clone()),
            self.nickname.clone().map_or(Value::Null, Value::Text),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            name: row.get("name")?,
            nickname: row.get("nickname")?,
        })
    }

    fn validate(&self) -> Result<(), EntityValidationError> {
        if !self.email.contains('@') {
            return Err(EntityValidationError::new(
                Self::TABLE,
                format!("email `{}` has no domain", self.email),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: EntityId,
    pub code: String,
    pub total_cents: i64,
}

impl Order {
    pub fn new(code: &str, total_cents: i64) -> Self {
        Self {
            id: 0,
            code: code.to_string(),
            total_cents,
        }
    }
}

impl Entity for Order {
    const TABLE: &'static str = "orders";
    const COLUMNS: &'static [Column] = &[Column::text("code").unique(), Column::integer("total_cents")];

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.code.clone()), Value::Integer(self.total_cents)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            total_cents: row.get("total_cents")?,
        })
    }
}

/// Mapped in no model; used to check unmapped-entity errors.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub id: EntityId,
    pub message: String,
}

impl Entity for AuditEntry {
    const TABLE: &'static str = "audit_entries";
    const COLUMNS: &'static [Column] = &[Column::text("message")];

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.message.clone())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            message: row.get("message")?,
        })
    }
}

pub fn model() -> Model {
    ModelBuilder::new()
        .entity::<Customer>()
        .entity::<Order>()
        .build()
        .unwrap()
}

pub fn context() -> ObjectContext {
    ObjectContext::in_memory(model()).unwrap()
}
