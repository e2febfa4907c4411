//! Generic repository over a shared session.
//!
//! # Responsibility
//! - Expose typed read operations (`QueryRepository`) and staged write
//!   operations (`WriteRepository`) for any `Entity`.
//! - Honor the auto-flush mode chosen at construction.
//!
//! # Invariants
//! - Argument checks and entity validation run before any I/O.
//! - Reads never stage mutations.
//! - In deferred mode (`auto_flush = false`) writes return `0`; that is not a
//!   failure signal.
//! - A cancelled token fails the call before I/O starts and aborts pending
//!   reads. A flush that has started runs to completion.

use super::codec::{decode, decode_all, delete_of, encode, update_of};
use super::error::{RepoError, RepoResult};
use super::include::IncludeSpec;
use super::query::Query;
use crate::model::entity::{Entity, EntityKey};
use crate::model::paged::PagedResult;
use crate::session::{Mutation, Session, SharedSession};
use async_trait::async_trait;
use log::debug;
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Construction-time repository configuration.
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// Flush after every write call.
    pub auto_flush: bool,
    /// Cancels every call made through the repository once triggered.
    pub cancel_token: Option<CancellationToken>,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            auto_flush: true,
            cancel_token: None,
        }
    }
}

/// Read-only repository operations.
#[async_trait]
pub trait QueryRepository: Send + Sync {
    /// Starts a composable query; nothing runs until it is materialized.
    fn query<T: Entity>(&self) -> Query<T> {
        Query::new()
    }

    /// Identity lookup through the session, including staged entities.
    async fn get_by_id<T: Entity>(&self, id: &T::Key) -> RepoResult<Option<T>>;

    async fn get_first_or_default<T, P>(&self, predicate: P) -> RepoResult<Option<T>>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static;

    async fn get_first_or_default_with<T, P>(
        &self,
        predicate: P,
        includes: IncludeSpec<T>,
    ) -> RepoResult<Option<T>>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static;

    async fn get_all<T: Entity>(&self) -> RepoResult<Vec<T>>;

    async fn get_list<T, P>(&self, predicate: P) -> RepoResult<Vec<T>>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static;

    async fn get_list_with<T, P>(&self, predicate: P, includes: IncludeSpec<T>) -> RepoResult<Vec<T>>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static;

    /// Materializes a composed query, including its skip/take window.
    async fn fetch<T: Entity>(&self, query: Query<T>) -> RepoResult<Vec<T>>;

    async fn fetch_first<T: Entity>(&self, query: Query<T>) -> RepoResult<Option<T>>;

    /// One page of `query`. Any skip/take on `query` is replaced by the page
    /// window; without an explicit ordering rows are ordered by key.
    async fn get_paged<T: Entity>(
        &self,
        page_index: u32,
        page_size: u32,
        query: Query<T>,
    ) -> RepoResult<PagedResult<T>>;

    async fn exists<T, P>(&self, predicate: P) -> RepoResult<bool>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static;

    /// Number of rows `fetch(query)` would return.
    async fn count<T: Entity>(&self, query: Query<T>) -> RepoResult<u64>;

    async fn count_all<T: Entity>(&self) -> RepoResult<u64> {
        self.count(Query::<T>::new()).await
    }
}

/// Mutating repository operations.
///
/// Each call returns rows affected when auto-flush is on, `0` otherwise.
#[async_trait]
pub trait WriteRepository: Send + Sync {
    /// Stages an insert. Unassigned keys are filled first: integer keys from
    /// the session sequence, UUID keys freshly generated. Text keys must be
    /// supplied by the caller.
    async fn add<T: Entity>(&self, entity: &mut T) -> RepoResult<usize>;

    /// Fails with `InvalidArgument` when `entities` is empty.
    async fn add_range<T: Entity>(&self, entities: &mut [T]) -> RepoResult<usize>;

    async fn update<T: Entity>(&self, entity: &T) -> RepoResult<usize>;

    async fn update_range<T: Entity>(&self, entities: &[T]) -> RepoResult<usize>;

    async fn delete<T: Entity>(&self, entity: &T) -> RepoResult<usize>;

    /// Missing rows are not an error; the call returns `0`.
    async fn delete_by_id<T: Entity>(&self, id: &T::Key) -> RepoResult<usize>;

    async fn delete_range<T: Entity>(&self, entities: &[T]) -> RepoResult<usize>;

    /// Persists every staged mutation now, regardless of auto-flush.
    async fn flush(&self) -> RepoResult<usize>;
}

/// Repository bound to one shared session.
pub struct Repository<S: Session> {
    session: SharedSession<S>,
    options: RepositoryOptions,
}

impl<S: Session> Repository<S> {
    /// Repository in auto-flush mode.
    pub fn new(session: SharedSession<S>) -> Self {
        Self::with_options(session, RepositoryOptions::default())
    }

    pub fn with_options(session: SharedSession<S>, options: RepositoryOptions) -> Self {
        Self { session, options }
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    pub fn auto_flush(&self) -> bool {
        self.options.auto_flush
    }

    pub fn session(&self) -> &SharedSession<S> {
        &self.session
    }

    fn ensure_not_cancelled(&self) -> RepoResult<()> {
        match &self.options.cancel_token {
            Some(token) if token.is_cancelled() => Err(RepoError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Runs a read, aborting it when the token fires first.
    async fn cancellable<R, F>(&self, read: F) -> RepoResult<R>
    where
        F: Future<Output = RepoResult<R>>,
    {
        self.ensure_not_cancelled()?;
        match &self.options.cancel_token {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(RepoError::Cancelled),
                result = read => result,
            },
            None => read.await,
        }
    }

    async fn select<T: Entity>(&self, query: &Query<T>, limit: Option<usize>) -> RepoResult<Vec<T>> {
        let mut session = self.session.lock().await;
        let rows = decode_all::<T>(session.scan(T::KIND).await?)?;
        let mut selected = query.window(query.select(rows));
        if let Some(limit) = limit {
            selected.truncate(limit);
        }
        query.includes().load(&mut *session, &mut selected).await?;
        Ok(selected)
    }

    async fn finish_write(&self, session: &mut S) -> RepoResult<usize> {
        if !self.options.auto_flush {
            return Ok(0);
        }
        Ok(session.flush().await?)
    }
}

impl<S: Session> Clone for Repository<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            options: self.options.clone(),
        }
    }
}

/// Assigns a key when needed and builds the insert mutation.
async fn prepare_insert<T: Entity, S: Session>(
    session: &mut S,
    entity: &mut T,
) -> RepoResult<Mutation> {
    if entity.id().is_unassigned() {
        let sequence = if <T::Key as EntityKey>::uses_sequence() {
            session.next_sequence(T::KIND).await?
        } else {
            0
        };
        let id = <T::Key as EntityKey>::generate(sequence).ok_or_else(|| {
            RepoError::invalid_argument(format!("{} requires a caller-supplied identifier", T::KIND))
        })?;
        entity.set_id(id);
    }
    Ok(Mutation::Insert {
        kind: T::KIND,
        key: entity.id().to_key_value(),
        body: encode(entity)?,
    })
}

fn check_caller_key<T: Entity>(entity: &T) -> RepoResult<()> {
    let caller_supplied =
        !<T::Key as EntityKey>::uses_sequence() && <T::Key as EntityKey>::generate(0).is_none();
    if caller_supplied && entity.id().is_unassigned() {
        return Err(RepoError::invalid_argument(format!(
            "{} requires a caller-supplied identifier",
            T::KIND
        )));
    }
    Ok(())
}

#[async_trait]
impl<S: Session> QueryRepository for Repository<S> {
    async fn get_by_id<T: Entity>(&self, id: &T::Key) -> RepoResult<Option<T>> {
        let key = id.to_key_value();
        self.cancellable(async {
            let mut session = self.session.lock().await;
            match session.find(T::KIND, &key).await? {
                Some(body) => decode(body).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    async fn get_first_or_default<T, P>(&self, predicate: P) -> RepoResult<Option<T>>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.fetch_first(Query::new().filter(predicate)).await
    }

    async fn get_first_or_default_with<T, P>(
        &self,
        predicate: P,
        includes: IncludeSpec<T>,
    ) -> RepoResult<Option<T>>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.fetch_first(Query::new().filter(predicate).with_includes(includes))
            .await
    }

    async fn get_all<T: Entity>(&self) -> RepoResult<Vec<T>> {
        self.fetch(Query::new()).await
    }

    async fn get_list<T, P>(&self, predicate: P) -> RepoResult<Vec<T>>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.fetch(Query::new().filter(predicate)).await
    }

    async fn get_list_with<T, P>(&self, predicate: P, includes: IncludeSpec<T>) -> RepoResult<Vec<T>>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.fetch(Query::new().filter(predicate).with_includes(includes))
            .await
    }

    async fn fetch<T: Entity>(&self, query: Query<T>) -> RepoResult<Vec<T>> {
        self.cancellable(self.select(&query, None)).await
    }

    async fn fetch_first<T: Entity>(&self, query: Query<T>) -> RepoResult<Option<T>> {
        let rows = self.cancellable(self.select(&query, Some(1))).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_paged<T: Entity>(
        &self,
        page_index: u32,
        page_size: u32,
        query: Query<T>,
    ) -> RepoResult<PagedResult<T>> {
        if page_size == 0 {
            return Err(RepoError::invalid_argument("page_size must be greater than zero"));
        }
        let skip = usize::try_from(u64::from(page_index) * u64::from(page_size))
            .map_err(|_| RepoError::invalid_argument("page_index is out of range"))?;
        let take = page_size as usize;
        let query = query.with_window(skip, take);
        let started_at = Instant::now();

        let page = self
            .cancellable(async {
                let mut session = self.session.lock().await;
                let rows = decode_all::<T>(session.scan(T::KIND).await?)?;
                let selected = query.select(rows);
                let total_count = selected.len() as u64;
                let mut items = query.window(selected);
                query.includes().load(&mut *session, &mut items).await?;
                Ok(PagedResult::new(items, total_count, page_index, page_size))
            })
            .await?;

        debug!(
            "event=repo_paged module=repo kind={} page_index={} page_size={} total_count={} ordered={} duration_ms={}",
            T::KIND,
            page_index,
            page_size,
            page.total_count(),
            query.has_ordering(),
            started_at.elapsed().as_millis()
        );
        Ok(page)
    }

    async fn exists<T, P>(&self, predicate: P) -> RepoResult<bool>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let query = Query::<T>::new().filter(predicate);
        self.cancellable(async {
            let mut session = self.session.lock().await;
            let rows = decode_all::<T>(session.scan(T::KIND).await?)?;
            Ok(rows.iter().any(|row| query.matches(row)))
        })
        .await
    }

    async fn count<T: Entity>(&self, query: Query<T>) -> RepoResult<u64> {
        self.cancellable(async {
            let mut session = self.session.lock().await;
            let rows = decode_all::<T>(session.scan(T::KIND).await?)?;
            Ok(query.window(query.select(rows)).len() as u64)
        })
        .await
    }
}

#[async_trait]
impl<S: Session> WriteRepository for Repository<S> {
    async fn add<T: Entity>(&self, entity: &mut T) -> RepoResult<usize> {
        self.ensure_not_cancelled()?;
        entity.validate()?;
        check_caller_key(entity)?;

        let mut session = self.session.lock().await;
        let mutation = prepare_insert(&mut *session, entity).await?;
        session.stage(mutation);
        self.finish_write(&mut session).await
    }

    async fn add_range<T: Entity>(&self, entities: &mut [T]) -> RepoResult<usize> {
        if entities.is_empty() {
            return Err(RepoError::invalid_argument(format!(
                "add_range requires at least one {}",
                T::KIND
            )));
        }
        self.ensure_not_cancelled()?;
        for entity in entities.iter() {
            entity.validate()?;
            check_caller_key(entity)?;
        }

        let mut session = self.session.lock().await;
        let mut mutations = Vec::with_capacity(entities.len());
        for entity in entities.iter_mut() {
            mutations.push(prepare_insert(&mut *session, entity).await?);
        }
        for mutation in mutations {
            session.stage(mutation);
        }
        self.finish_write(&mut session).await
    }

    async fn update<T: Entity>(&self, entity: &T) -> RepoResult<usize> {
        self.ensure_not_cancelled()?;
        let mutation = update_of(entity)?;

        let mut session = self.session.lock().await;
        session.stage(mutation);
        self.finish_write(&mut session).await
    }

    async fn update_range<T: Entity>(&self, entities: &[T]) -> RepoResult<usize> {
        self.ensure_not_cancelled()?;
        let mutations = entities
            .iter()
            .map(update_of::<T>)
            .collect::<RepoResult<Vec<_>>>()?;
        if mutations.is_empty() {
            return Ok(0);
        }

        let mut session = self.session.lock().await;
        for mutation in mutations {
            session.stage(mutation);
        }
        self.finish_write(&mut session).await
    }

    async fn delete<T: Entity>(&self, entity: &T) -> RepoResult<usize> {
        self.ensure_not_cancelled()?;
        let mutation = delete_of(entity)?;

        let mut session = self.session.lock().await;
        session.stage(mutation);
        self.finish_write(&mut session).await
    }

    async fn delete_by_id<T: Entity>(&self, id: &T::Key) -> RepoResult<usize> {
        self.ensure_not_cancelled()?;
        let key = id.to_key_value();

        let mut session = self.session.lock().await;
        if session.find(T::KIND, &key).await?.is_none() {
            return Ok(0);
        }
        session.stage(Mutation::Delete { kind: T::KIND, key });
        self.finish_write(&mut session).await
    }

    async fn delete_range<T: Entity>(&self, entities: &[T]) -> RepoResult<usize> {
        self.ensure_not_cancelled()?;
        let mutations = entities
            .iter()
            .map(delete_of::<T>)
            .collect::<RepoResult<Vec<_>>>()?;
        if mutations.is_empty() {
            return Ok(0);
        }

        let mut session = self.session.lock().await;
        for mutation in mutations {
            session.stage(mutation);
        }
        self.finish_write(&mut session).await
    }

    async fn flush(&self) -> RepoResult<usize> {
        self.ensure_not_cancelled()?;
        let mut session = self.session.lock().await;
        Ok(session.flush().await?)
    }
}
