//! Unit of work: one session, one deferred-flush repository, at most one
//! native transaction.
//!
//! # Responsibility
//! - Own the transactional boundary of one logical business operation.
//! - Expose a repository in deferred mode so writes accumulate until
//!   `flush`/`commit`.
//! - Run actions inside a transaction without ever nesting transactions.
//!
//! # Invariants
//! - `active_transaction` is the single source of truth for "in transaction".
//! - Nested `execute_in_transaction` calls reuse the outer transaction; only
//!   the outermost call begins and ends it.
//! - A failed commit leaves the transaction open. The unit of work never
//!   rolls back on its own except inside `execute_in_transaction`.
//! - Rollback does not revert staged state; discard the unit of work after it.
//! - A started flush or native commit runs to completion even when the
//!   cancellation token fires; the token is checked before each step.
//!
//! # See also
//! - `repo::repository` for the repository contracts.

use crate::repo::{RepoError, RepoResult, Repository, RepositoryOptions};
use crate::session::{Session, SharedSession, TransactionHandle};
use futures::future::BoxFuture;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// How the unit of work reacts to transaction calls that make no sense in the
/// current state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStrictness {
    /// `begin` while active is a no-op; `commit` without a transaction
    /// flushes.
    #[default]
    Lenient,
    /// Both cases fail with `RepoError::TransactionMisuse`.
    Strict,
}

#[derive(Debug, Clone, Default)]
pub struct UnitOfWorkOptions {
    pub strictness: TransactionStrictness,
    /// Shared with the repository; cancels every call once triggered.
    pub cancel_token: Option<CancellationToken>,
}

pub struct UnitOfWork<S: Session> {
    session: SharedSession<S>,
    repository: OnceCell<Repository<S>>,
    active_transaction: Option<TransactionHandle>,
    options: UnitOfWorkOptions,
    disposed: bool,
}

impl<S: Session> UnitOfWork<S> {
    pub fn new(session: SharedSession<S>) -> Self {
        Self::with_options(session, UnitOfWorkOptions::default())
    }

    pub fn with_options(session: SharedSession<S>, options: UnitOfWorkOptions) -> Self {
        Self {
            session,
            repository: OnceCell::new(),
            active_transaction: None,
            options,
            disposed: false,
        }
    }

    /// Repository bound to this unit's session with `auto_flush = false`.
    pub fn repository(&self) -> &Repository<S> {
        self.repository.get_or_init(|| {
            Repository::with_options(
                self.session.clone(),
                RepositoryOptions {
                    auto_flush: false,
                    cancel_token: self.options.cancel_token.clone(),
                },
            )
        })
    }

    /// The session is owned by the caller; disposing the unit does not close it.
    pub fn session(&self) -> &SharedSession<S> {
        &self.session
    }

    pub fn options(&self) -> &UnitOfWorkOptions {
        &self.options
    }

    pub fn has_active_transaction(&self) -> bool {
        self.active_transaction.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub async fn begin_transaction(&mut self) -> RepoResult<()> {
        self.ensure_usable()?;
        if let Some(active) = self.active_transaction {
            return match self.options.strictness {
                TransactionStrictness::Lenient => {
                    debug!(
                        "event=uow_begin module=uow status=skipped reason=already_active tx={}",
                        active.id()
                    );
                    Ok(())
                }
                TransactionStrictness::Strict => Err(RepoError::TransactionMisuse(format!(
                    "transaction {} is already active",
                    active.id()
                ))),
            };
        }

        let handle = self.session.lock().await.begin_transaction().await?;
        self.active_transaction = Some(handle);
        info!(
            "event=uow_begin module=uow status=ok tx={}",
            handle.id()
        );
        Ok(())
    }

    /// Persists staged changes; does not change transaction state.
    pub async fn flush(&mut self) -> RepoResult<usize> {
        self.ensure_usable()?;
        Ok(self.session.lock().await.flush().await?)
    }

    /// Flushes and commits the active transaction.
    ///
    /// Without a transaction this is a plain flush (lenient) or a
    /// `TransactionMisuse` (strict). On failure the transaction stays open.
    pub async fn commit(&mut self) -> RepoResult<usize> {
        self.ensure_usable()?;
        let Some(handle) = self.active_transaction else {
            return match self.options.strictness {
                TransactionStrictness::Lenient => self.flush().await,
                TransactionStrictness::Strict => Err(RepoError::TransactionMisuse(
                    "commit called without an active transaction".to_string(),
                )),
            };
        };

        let started_at = Instant::now();
        let mut session = self.session.lock().await;
        let rows = match session.flush().await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(
                    "event=uow_commit module=uow status=error step=flush tx={} error={}",
                    handle.id(),
                    err
                );
                return Err(err.into());
            }
        };
        if let Err(err) = session.commit_transaction(handle).await {
            warn!(
                "event=uow_commit module=uow status=error step=commit tx={} error={}",
                handle.id(),
                err
            );
            return Err(err.into());
        }
        drop(session);

        self.active_transaction = None;
        info!(
            "event=uow_commit module=uow status=ok tx={} rows={} duration_ms={}",
            handle.id(),
            rows,
            started_at.elapsed().as_millis()
        );
        Ok(rows)
    }

    /// Rolls back the active transaction; a no-op without one.
    ///
    /// Not subject to cancellation.
    pub async fn rollback(&mut self) -> RepoResult<()> {
        self.ensure_not_disposed()?;
        let Some(handle) = self.active_transaction else {
            return Ok(());
        };

        self.session
            .lock()
            .await
            .rollback_transaction(handle)
            .await?;
        self.active_transaction = None;
        info!(
            "event=uow_rollback module=uow status=ok tx={}",
            handle.id()
        );
        Ok(())
    }

    /// Runs `action` inside a transaction.
    ///
    /// Outermost call: begin, run, commit; any failure (including commit)
    /// rolls back and returns the original error, or the rollback error if
    /// rollback itself fails. Nested call (a transaction is already active):
    /// runs `action` directly and leaves the boundary to the outer caller.
    pub async fn execute_in_transaction<R, E, F>(&mut self, action: F) -> Result<R, E>
    where
        F: for<'a> FnOnce(&'a mut UnitOfWork<S>) -> BoxFuture<'a, Result<R, E>>,
        E: From<RepoError>,
    {
        self.ensure_usable()?;
        if self.active_transaction.is_some() {
            debug!("event=uow_execute module=uow status=nested");
            return action(self).await;
        }

        self.begin_transaction().await?;
        let outcome = match action(self).await {
            Ok(value) => self.commit().await.map(|_| value).map_err(E::from),
            Err(err) => Err(err),
        };
        if outcome.is_ok() {
            return outcome;
        }

        if let Err(rollback_err) = self.rollback().await {
            warn!(
                "event=uow_execute module=uow status=error step=rollback error={}",
                rollback_err
            );
            return Err(rollback_err.into());
        }
        debug!("event=uow_execute module=uow status=rolled_back");
        outcome
    }

    /// Rolls back any open transaction and retires the unit. Idempotent.
    pub async fn dispose(&mut self) -> RepoResult<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let Some(handle) = self.active_transaction.take() else {
            return Ok(());
        };
        let mut session = self.session.lock().await;
        if let Err(err) = session.rollback_transaction(handle).await {
            warn!(
                "event=uow_dispose module=uow status=error tx={} error={}",
                handle.id(),
                err
            );
            session.abandon_transaction(handle);
            return Err(err.into());
        }
        info!(
            "event=uow_dispose module=uow status=ok tx={} rolled_back=true",
            handle.id()
        );
        Ok(())
    }

    fn ensure_not_disposed(&self) -> RepoResult<()> {
        if self.disposed {
            return Err(RepoError::TransactionMisuse(
                "unit of work has been disposed".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_usable(&self) -> RepoResult<()> {
        self.ensure_not_disposed()?;
        match &self.options.cancel_token {
            Some(token) if token.is_cancelled() => Err(RepoError::Cancelled),
            _ => Ok(()),
        }
    }
}

impl<S: Session> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        let Some(handle) = self.active_transaction.take() else {
            return;
        };
        match self.session.try_lock() {
            Ok(mut session) => {
                session.abandon_transaction(handle);
                warn!(
                    "event=uow_drop module=uow status=abandoned tx={}",
                    handle.id()
                );
            }
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let session = Arc::clone(&self.session);
                    runtime.spawn(async move {
                        session.lock().await.abandon_transaction(handle);
                    });
                    warn!(
                        "event=uow_drop module=uow status=deferred tx={} reason=session_busy",
                        handle.id()
                    );
                }
                Err(_) => warn!(
                    "event=uow_drop module=uow status=error tx={} reason=session_busy_without_runtime",
                    handle.id()
                ),
            },
        }
    }
}
