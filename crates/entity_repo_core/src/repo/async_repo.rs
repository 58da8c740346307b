//! Asynchronous repository over a shared context.
//!
//! # Responsibility
//! - Offer the `Repository` operations as futures for async callers.
//! - Keep SQLite work off the async executor threads.
//!
//! # Invariants
//! - Every operation runs on the blocking pool while holding the context lock,
//!   so one context never sees concurrent use.
//! - Semantics match `EntityRepository` exactly; it does the actual work.

use crate::context::{DbContext, EntityQuery, ObjectContext};
use crate::model::entity::{Entity, EntityId};
use crate::repo::repository::{EntityRepository, RepoError, RepoResult, Repository};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

/// Context handle shared between async repositories.
pub type SharedContext = Arc<Mutex<ObjectContext>>;

pub fn shared(context: ObjectContext) -> SharedContext {
    Arc::new(Mutex::new(context))
}

/// Async counterpart of `Repository`; inputs are owned and inserted entities
/// are returned with their assigned ids.
#[async_trait]
pub trait AsyncRepository<E: Entity>: Send + Sync {
    async fn get_by_id(&self, id: EntityId) -> RepoResult<Option<E>>;

    async fn insert(&self, entity: E) -> RepoResult<E>;

    async fn insert_many(&self, entities: Vec<E>) -> RepoResult<Vec<E>>;

    async fn insert_and_detach(&self, entity: E) -> RepoResult<E>;

    async fn insert_many_and_detach(&self, entities: Vec<E>) -> RepoResult<Vec<E>>;

    async fn update(&self, entity: E) -> RepoResult<()>;

    async fn update_many(&self, entities: Vec<E>) -> RepoResult<()>;

    async fn update_and_detach(&self, entity: E) -> RepoResult<()>;

    async fn update_many_and_detach(&self, entities: Vec<E>) -> RepoResult<()>;

    async fn delete(&self, entity: E) -> RepoResult<()>;

    async fn delete_many(&self, entities: Vec<E>) -> RepoResult<()>;

    async fn delete_and_detach(&self, entity: E) -> RepoResult<()>;

    async fn delete_many_and_detach(&self, entities: Vec<E>) -> RepoResult<()>;

    async fn table(&self) -> RepoResult<Vec<E>>;

    async fn table_no_tracking(&self) -> RepoResult<Vec<E>>;

    async fn query(&self, query: EntityQuery) -> RepoResult<Vec<E>>;
}

/// `AsyncRepository` backed by a `SharedContext`.
pub struct AsyncEntityRepository<E: Entity> {
    context: SharedContext,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for AsyncEntityRepository<E> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> AsyncEntityRepository<E> {
    pub fn new(context: SharedContext) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    async fn run<T, F>(&self, operation: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&EntityRepository<'_, E>) -> RepoResult<T> + Send + 'static,
    {
        let context = Arc::clone(&self.context);
        run_blocking(move || {
            let guard = lock(&context)?;
            let repo = EntityRepository::<E, ObjectContext>::new(&guard);
            operation(&repo)
        })
        .await
    }
}

#[async_trait]
impl<E: Entity> AsyncRepository<E> for AsyncEntityRepository<E> {
    async fn get_by_id(&self, id: EntityId) -> RepoResult<Option<E>> {
        self.run(move |repo| repo.get_by_id(id)).await
    }

    async fn insert(&self, mut entity: E) -> RepoResult<E> {
        self.run(move |repo| repo.insert(&mut entity).map(|()| entity))
            .await
    }

    async fn insert_many(&self, mut entities: Vec<E>) -> RepoResult<Vec<E>> {
        self.run(move |repo| repo.insert_many(&mut entities).map(|()| entities))
            .await
    }

    async fn insert_and_detach(&self, mut entity: E) -> RepoResult<E> {
        self.run(move |repo| repo.insert_and_detach(&mut entity).map(|()| entity))
            .await
    }

    async fn insert_many_and_detach(&self, mut entities: Vec<E>) -> RepoResult<Vec<E>> {
        self.run(move |repo| {
            repo.insert_many_and_detach(&mut entities)
                .map(|()| entities)
        })
        .await
    }

    async fn update(&self, entity: E) -> RepoResult<()> {
        self.run(move |repo| repo.update(&entity)).await
    }

    async fn update_many(&self, entities: Vec<E>) -> RepoResult<()> {
        self.run(move |repo| repo.update_many(&entities)).await
    }

    async fn update_and_detach(&self, entity: E) -> RepoResult<()> {
        self.run(move |repo| repo.update_and_detach(&entity)).await
    }

    async fn update_many_and_detach(&self, entities: Vec<E>) -> RepoResult<()> {
        self.run(move |repo| repo.update_many_and_detach(&entities))
            .await
    }

    async fn delete(&self, entity: E) -> RepoResult<()> {
        self.run(move |repo| repo.delete(&entity)).await
    }

    async fn delete_many(&self, entities: Vec<E>) -> RepoResult<()> {
        self.run(move |repo| repo.delete_many(&entities)).await
    }

    async fn delete_and_detach(&self, entity: E) -> RepoResult<()> {
        self.run(move |repo| repo.delete_and_detach(&entity)).await
    }

    async fn delete_many_and_detach(&self, entities: Vec<E>) -> RepoResult<()> {
        self.run(move |repo| repo.delete_many_and_detach(&entities))
            .await
    }

    async fn table(&self) -> RepoResult<Vec<E>> {
        self.run(|repo| repo.table()).await
    }

    async fn table_no_tracking(&self) -> RepoResult<Vec<E>> {
        self.run(|repo| repo.table_no_tracking()).await
    }

    async fn query(&self, query: EntityQuery) -> RepoResult<Vec<E>> {
        self.run(move |repo| repo.query(&query)).await
    }
}

/// Saves pending changes of a shared context on the blocking pool.
pub async fn save_changes_async(context: &SharedContext) -> RepoResult<usize> {
    let context = Arc::clone(context);
    run_blocking(move || {
        let guard = lock(&context)?;
        Ok(guard.save_changes()?)
    })
    .await
}

fn lock(context: &SharedContext) -> RepoResult<std::sync::MutexGuard<'_, ObjectContext>> {
    context
        .lock()
        .map_err(|_| RepoError::Background("object context lock is poisoned".to_string()))
}

async fn run_blocking<T, F>(work: F) -> RepoResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> RepoResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| RepoError::Background(err.to_string()))?
}
