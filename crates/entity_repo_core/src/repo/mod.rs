//! Repository layer over the unit-of-work context.
//!
//! # Responsibility
//! - Define entity-generic data access contracts, sync and async.
//! - Keep change-tracker handling (rollback, detach) out of callers.
//!
//! # Invariants
//! - Repository writes enforce `Entity::validate()` before staging.
//! - Save failures surface as `RepoError::Save` with the full error text.

pub mod async_repo;
pub mod repository;
