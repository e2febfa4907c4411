//! Persistence session port.
//!
//! # Responsibility
//! - Define the narrow contract the data-access layer needs from a storage
//!   engine: identity lookup, scans, staged mutations, atomic flush and native
//!   transactions.
//! - Keep the contract untyped (`kind` + `KeyValue` + JSON body) so typed
//!   repositories stay generic over any entity.
//!
//! # Invariants
//! - Reads observe the session's own staged, unflushed mutations.
//! - `flush` is the atomicity boundary: all staged mutations land, or none do.
//! - At most one native transaction is open per session.
//!
//! # See also
//! - `session::sqlite` for the rusqlite-backed engine.

use crate::model::entity::KeyValue;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

mod change_set;
pub mod sqlite;

pub use change_set::{ChangeSet, StagedState};
pub use sqlite::SqliteSession;

pub type EngineResult<T> = Result<T, EngineError>;

/// A session shared by every repository bound to it.
///
/// The mutex is uncontended by contract: one logical operation owns the
/// session at a time. It exists so several repositories (and one unit of
/// work) can observe the same staged change set.
///
/// A unit of work dropped while someone else holds the lock cannot abandon
/// its transaction on the spot. It spawns the abandon on the current tokio
/// runtime instead, so the session only accepts a new transaction after that
/// lock is released. Outside a runtime the transaction stays open.
pub type SharedSession<S> = Arc<Mutex<S>>;

/// Wraps a session for sharing between repositories and a unit of work.
pub fn share<S: Session>(session: S) -> SharedSession<S> {
    Arc::new(Mutex::new(session))
}

/// Errors raised by the storage engine.
///
/// Propagated unchanged through repositories and units of work so callers
/// can match engine-specific failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Optimistic check failed: the row changed since it was read, or is gone.
    #[error("concurrency conflict on {kind} `{key}`: row was modified or no longer exists")]
    Conflict { kind: &'static str, key: KeyValue },
    #[error("corrupt {kind} row `{key}`: {message}")]
    CorruptRow {
        kind: &'static str,
        key: String,
        message: String,
    },
    #[error("invalid entity kind `{0}`")]
    InvalidKind(&'static str),
    #[error("key sequence exhausted for {0}")]
    SequenceExhausted(&'static str),
    #[error("transaction error: {0}")]
    Transaction(String),
    /// The blocking storage worker panicked or was cancelled.
    #[error("storage worker failed during {op}: {message}")]
    Worker { op: &'static str, message: String },
}

impl EngineError {
    /// True for unique/primary-key/foreign-key/check violations.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// A pending write recorded in a session's change set.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert {
        kind: &'static str,
        key: KeyValue,
        body: Value,
    },
    Update {
        kind: &'static str,
        key: KeyValue,
        body: Value,
    },
    Delete {
        kind: &'static str,
        key: KeyValue,
    },
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { kind, .. } | Self::Update { kind, .. } | Self::Delete { kind, .. } => {
                kind
            }
        }
    }

    pub fn key(&self) -> &KeyValue {
        match self {
            Self::Insert { key, .. } | Self::Update { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    fn targets(&self, kind: &str, key: &KeyValue) -> bool {
        self.kind() == kind && self.key() == key
    }
}

/// Opaque handle to the session's open native transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHandle {
    id: u64,
}

impl TransactionHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Storage session contract consumed by repositories and units of work.
///
/// One instance serves one logical operation and is not meant for concurrent
/// use; every method takes `&mut self`.
#[async_trait]
pub trait Session: Send + 'static {
    /// Identity lookup: staged state first, then the local identity map, then
    /// the store.
    async fn find(&mut self, kind: &'static str, key: &KeyValue) -> EngineResult<Option<Value>>;

    /// All rows of `kind` merged with staged mutations, ordered by key.
    async fn scan(&mut self, kind: &'static str) -> EngineResult<Vec<Value>>;

    /// Next integer key for sequence-backed identities.
    async fn next_sequence(&mut self, kind: &'static str) -> EngineResult<i64>;

    /// Records a mutation without touching the store.
    fn stage(&mut self, mutation: Mutation);

    fn has_staged_changes(&self) -> bool;

    /// Persists every staged mutation atomically; returns rows affected.
    ///
    /// On failure nothing is written and the staged set is kept.
    async fn flush(&mut self) -> EngineResult<usize>;

    async fn begin_transaction(&mut self) -> EngineResult<TransactionHandle>;

    /// Commits the transaction. On failure the transaction stays open.
    async fn commit_transaction(&mut self, handle: TransactionHandle) -> EngineResult<()>;

    async fn rollback_transaction(&mut self, handle: TransactionHandle) -> EngineResult<()>;

    /// Best-effort synchronous rollback used when an owner is dropped with a
    /// transaction still open. Never fails; problems are logged.
    fn abandon_transaction(&mut self, handle: TransactionHandle);
}
