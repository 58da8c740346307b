//! Entity mapping model.
//!
//! # Responsibility
//! - Define the contract persisted types implement (`Entity`).
//! - Register mapped types and derive table schemas from them.
//!
//! # Invariants
//! - Contexts only operate on entity types present in their `Model`.

pub mod builder;
pub mod entity;
