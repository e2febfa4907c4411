//! SQLite-backed session engine.
//!
//! # Responsibility
//! - Implement the session port on one `rusqlite` connection.
//! - Keep an identity map of rows read through this session and the version
//!   each was read at.
//! - Run blocking SQLite calls on the tokio blocking pool.
//!
//! # Invariants
//! - Flush runs inside `SAVEPOINT repokit_flush`; a failed statement rolls the
//!   savepoint back so the store is untouched and any outer transaction stays
//!   open.
//! - Updates and deletes of rows read through this session are conditional on
//!   the version that was read.
//! - A flush or native commit that has started runs to completion even if the
//!   awaiting future is dropped. Its task is kept in the session and the next
//!   session call applies the outcome (or restores the staged set) first.

use super::{ChangeSet, EngineError, EngineResult, Mutation, Session, StagedState, TransactionHandle};
use crate::db::{ensure_entity_table, is_valid_table_name, open_db, open_db_in_memory, DbResult};
use crate::model::entity::KeyValue;
use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

impl ToSql for KeyValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Int(value) => ToSqlOutput::Borrowed(ValueRef::Integer(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    body: Value,
    version: i64,
}

/// One staged mutation plus the version it must still match.
#[derive(Debug, Clone)]
struct PlannedWrite {
    mutation: Mutation,
    expected_version: Option<i64>,
}

/// Store state of one key after a successful flush.
#[derive(Debug)]
struct WriteOutcome {
    kind: &'static str,
    key: KeyValue,
    /// `None` when the row was deleted.
    stored: Option<(Value, i64)>,
    rows: usize,
}

/// Blocking work whose awaiting future may have been dropped.
enum InFlight {
    Flush {
        task: JoinHandle<EngineResult<Vec<WriteOutcome>>>,
        changes: Vec<Mutation>,
        started_at: Instant,
    },
    Commit {
        task: JoinHandle<EngineResult<()>>,
        handle: TransactionHandle,
    },
}

impl InFlight {
    fn abort(&self) {
        match self {
            Self::Flush { task, .. } => task.abort(),
            Self::Commit { task, .. } => task.abort(),
        }
    }
}

/// Session over a single SQLite connection.
pub struct SqliteSession {
    conn: Arc<Mutex<Connection>>,
    tracked: HashMap<(&'static str, KeyValue), Tracked>,
    changes: ChangeSet,
    sequences: HashMap<&'static str, i64>,
    active: Option<TransactionHandle>,
    next_handle: u64,
    in_flight: Option<InFlight>,
}

impl SqliteSession {
    /// Wraps an already bootstrapped connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            tracked: HashMap::new(),
            changes: ChangeSet::new(),
            sequences: HashMap::new(),
            active: None,
            next_handle: 1,
            in_flight: None,
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Creates the document table for `kind` when it is not part of the
    /// migrated schema.
    pub fn ensure_table(&self, kind: &str) -> DbResult<()> {
        let conn = self.conn.lock();
        ensure_entity_table(&conn, kind)
    }

    /// Number of staged mutations not yet flushed.
    pub fn staged_len(&self) -> usize {
        self.changes.len()
    }

    async fn run<R, F>(&self, op: &'static str, work: F) -> EngineResult<R>
    where
        F: FnOnce(&mut Connection) -> EngineResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            work(&mut guard)
        })
        .await
        .map_err(|err| worker_error(op, err))?
    }

    fn check_handle(&self, handle: TransactionHandle) -> EngineResult<()> {
        match self.active {
            Some(active) if active == handle => Ok(()),
            Some(active) => Err(EngineError::Transaction(format!(
                "handle {} does not match active transaction {}",
                handle.id(),
                active.id()
            ))),
            None => Err(EngineError::Transaction(format!(
                "handle {} refers to no active transaction",
                handle.id()
            ))),
        }
    }

    fn forget_cached_state(&mut self) {
        self.tracked.clear();
        self.sequences.clear();
    }

    /// Finishes a flush or commit whose caller stopped waiting for it.
    ///
    /// Failures are logged here; a failed flush puts its mutations back so the
    /// next `flush` retries and reports them.
    async fn settle_interrupted(&mut self) {
        match self.in_flight {
            None => {}
            Some(InFlight::Flush { .. }) => {
                if let Err(err) = self.complete_flush().await {
                    warn!(
                        "event=session_flush module=session status=error interrupted=true error={}",
                        err
                    );
                }
            }
            Some(InFlight::Commit { .. }) => {
                if let Err(err) = self.complete_commit().await {
                    warn!(
                        "event=tx_commit module=session status=error interrupted=true error={}",
                        err
                    );
                }
            }
        }
    }

    /// Waits for the in-flight flush and folds its outcome into the session.
    ///
    /// Nothing after the await can be interrupted, so a dropped caller leaves
    /// the flush in `in_flight` for the next call to finish.
    async fn complete_flush(&mut self) -> EngineResult<usize> {
        let joined = match self.in_flight.as_mut() {
            Some(InFlight::Flush { task, .. }) => task.await,
            _ => return Ok(0),
        };
        let Some(InFlight::Flush {
            changes,
            started_at,
            ..
        }) = self.in_flight.take()
        else {
            return Ok(0);
        };
        let staged = changes.len();

        match joined.map_err(|err| worker_error("flush", err)).and_then(|result| result) {
            Ok(outcomes) => {
                let mut rows = 0;
                for outcome in outcomes {
                    rows += outcome.rows;
                    match outcome.stored {
                        Some((body, version)) => {
                            self.tracked
                                .insert((outcome.kind, outcome.key), Tracked { body, version });
                        }
                        None => {
                            self.tracked.remove(&(outcome.kind, outcome.key));
                        }
                    }
                }
                debug!(
                    "event=session_flush module=session status=ok staged={} rows={} duration_ms={}",
                    staged,
                    rows,
                    started_at.elapsed().as_millis()
                );
                Ok(rows)
            }
            Err(err) => {
                self.changes.restore(changes);
                warn!(
                    "event=session_flush module=session status=error staged={} duration_ms={} error={}",
                    staged,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Waits for the in-flight `COMMIT`. On failure the transaction stays open.
    async fn complete_commit(&mut self) -> EngineResult<()> {
        let joined = match self.in_flight.as_mut() {
            Some(InFlight::Commit { task, .. }) => task.await,
            _ => return Ok(()),
        };
        let Some(InFlight::Commit { handle, .. }) = self.in_flight.take() else {
            return Ok(());
        };

        joined
            .map_err(|err| worker_error("commit", err))
            .and_then(|result| result)?;
        self.active = None;
        debug!(
            "event=tx_commit module=session status=ok tx={}",
            handle.id()
        );
        Ok(())
    }
}

fn worker_error(op: &'static str, err: tokio::task::JoinError) -> EngineError {
    EngineError::Worker {
        op,
        message: err.to_string(),
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn find(&mut self, kind: &'static str, key: &KeyValue) -> EngineResult<Option<Value>> {
        check_kind(kind)?;
        self.settle_interrupted().await;
        match self.changes.lookup(kind, key) {
            Some(StagedState::Present(body)) => return Ok(Some(body.clone())),
            Some(StagedState::Deleted) => return Ok(None),
            None => {}
        }
        if let Some(tracked) = self.tracked.get(&(kind, key.clone())) {
            return Ok(Some(tracked.body.clone()));
        }

        let lookup_key = key.clone();
        let row = self
            .run("find", move |conn| {
                conn.query_row(
                    &format!("SELECT body, version FROM \"{kind}\" WHERE id = ?1;"),
                    params![lookup_key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()
                .map_err(EngineError::from)
            })
            .await?;

        match row {
            Some((text, version)) => {
                let body = parse_body(kind, key, &text)?;
                self.tracked.insert(
                    (kind, key.clone()),
                    Tracked {
                        body: body.clone(),
                        version,
                    },
                );
                Ok(Some(body))
            }
            None => Ok(None),
        }
    }

    async fn scan(&mut self, kind: &'static str) -> EngineResult<Vec<Value>> {
        check_kind(kind)?;
        self.settle_interrupted().await;
        let rows = self
            .run("scan", move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT id, body, version FROM \"{kind}\" ORDER BY id;"))?;
                let mut rows = stmt.query([])?;
                let mut loaded = Vec::new();
                while let Some(row) = rows.next()? {
                    let key = parse_key(kind, row.get::<_, SqlValue>(0)?)?;
                    loaded.push((key, row.get::<_, String>(1)?, row.get::<_, i64>(2)?));
                }
                Ok(loaded)
            })
            .await?;

        let mut merged = BTreeMap::new();
        for (key, text, version) in rows {
            let body = match self.tracked.entry((kind, key.clone())) {
                Entry::Occupied(entry) => entry.get().body.clone(),
                Entry::Vacant(entry) => {
                    let body = parse_body(kind, &key, &text)?;
                    entry.insert(Tracked {
                        body: body.clone(),
                        version,
                    });
                    body
                }
            };
            merged.insert(key, body);
        }
        self.changes.overlay(kind, &mut merged);
        Ok(merged.into_values().collect())
    }

    async fn next_sequence(&mut self, kind: &'static str) -> EngineResult<i64> {
        check_kind(kind)?;
        self.settle_interrupted().await;
        let stored_max = self
            .run("next_sequence", move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT COALESCE(MAX(id), 0) FROM \"{kind}\" WHERE typeof(id) = 'integer';"
                    ),
                    [],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(EngineError::from)
            })
            .await?;

        let staged_max = self.changes.max_int_key(kind).unwrap_or(0);
        let handed_out = self.sequences.get(kind).copied().unwrap_or(0);
        let next = stored_max
            .max(staged_max)
            .max(handed_out)
            .checked_add(1)
            .ok_or(EngineError::SequenceExhausted(kind))?;
        self.sequences.insert(kind, next);
        Ok(next)
    }

    fn stage(&mut self, mutation: Mutation) {
        debug!(
            "event=session_stage module=session kind={} key={}",
            mutation.kind(),
            mutation.key()
        );
        self.changes.stage(mutation);
    }

    fn has_staged_changes(&self) -> bool {
        !self.changes.is_empty() || matches!(self.in_flight, Some(InFlight::Flush { .. }))
    }

    async fn flush(&mut self) -> EngineResult<usize> {
        self.settle_interrupted().await;
        if self.changes.is_empty() {
            return Ok(0);
        }
        for mutation in self.changes.iter() {
            check_kind(mutation.kind())?;
        }

        let changes = self.changes.take();
        let plan: Vec<PlannedWrite> = changes
            .iter()
            .map(|mutation| PlannedWrite {
                expected_version: match mutation {
                    Mutation::Insert { .. } => None,
                    Mutation::Update { kind, key, .. } | Mutation::Delete { kind, key } => self
                        .tracked
                        .get(&(*kind, key.clone()))
                        .map(|tracked| tracked.version),
                },
                mutation: mutation.clone(),
            })
            .collect();

        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            apply_writes(&conn, &plan)
        });
        self.in_flight = Some(InFlight::Flush {
            task,
            changes,
            started_at: Instant::now(),
        });
        self.complete_flush().await
    }

    async fn begin_transaction(&mut self) -> EngineResult<TransactionHandle> {
        self.settle_interrupted().await;
        if let Some(active) = self.active {
            return Err(EngineError::Transaction(format!(
                "transaction {} is already active",
                active.id()
            )));
        }

        self.run("begin", |conn| {
            conn.execute_batch("BEGIN IMMEDIATE;")
                .map_err(EngineError::from)
        })
        .await?;

        let handle = TransactionHandle::new(self.next_handle);
        self.next_handle += 1;
        self.active = Some(handle);
        debug!(
            "event=tx_begin module=session status=ok tx={}",
            handle.id()
        );
        Ok(handle)
    }

    async fn commit_transaction(&mut self, handle: TransactionHandle) -> EngineResult<()> {
        self.settle_interrupted().await;
        self.check_handle(handle)?;

        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            conn.lock().execute_batch("COMMIT;").map_err(EngineError::from)
        });
        self.in_flight = Some(InFlight::Commit { task, handle });
        self.complete_commit().await
    }

    async fn rollback_transaction(&mut self, handle: TransactionHandle) -> EngineResult<()> {
        self.settle_interrupted().await;
        self.check_handle(handle)?;
        let (result, closed) = self
            .run("rollback", |conn| {
                let result = conn.execute_batch("ROLLBACK;");
                Ok((result, conn.is_autocommit()))
            })
            .await?;
        if closed {
            self.active = None;
            self.forget_cached_state();
        }
        result?;
        debug!(
            "event=tx_rollback module=session status=ok tx={}",
            handle.id()
        );
        Ok(())
    }

    fn abandon_transaction(&mut self, handle: TransactionHandle) {
        if self.active != Some(handle) {
            return;
        }
        self.active = None;
        self.forget_cached_state();
        // Its writes belong to the transaction being rolled back; a task that
        // has not started must not run after the rollback.
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort();
        }

        let conn = self.conn.lock();
        if conn.is_autocommit() {
            return;
        }
        match conn.execute_batch("ROLLBACK;") {
            Ok(()) => warn!(
                "event=tx_abandon module=session status=ok tx={}",
                handle.id()
            ),
            Err(err) => warn!(
                "event=tx_abandon module=session status=error tx={} error={}",
                handle.id(),
                err
            ),
        }
    }
}

fn check_kind(kind: &'static str) -> EngineResult<()> {
    if is_valid_table_name(kind) {
        Ok(())
    } else {
        Err(EngineError::InvalidKind(kind))
    }
}

fn parse_key(kind: &'static str, value: SqlValue) -> EngineResult<KeyValue> {
    match value {
        SqlValue::Integer(id) => Ok(KeyValue::Int(id)),
        SqlValue::Text(id) => Ok(KeyValue::Text(id)),
        other => Err(EngineError::CorruptRow {
            kind,
            key: format!("{other:?}"),
            message: "unsupported key type".to_string(),
        }),
    }
}

fn parse_body(kind: &'static str, key: &KeyValue, text: &str) -> EngineResult<Value> {
    serde_json::from_str(text).map_err(|err| EngineError::CorruptRow {
        kind,
        key: key.to_string(),
        message: err.to_string(),
    })
}

fn apply_writes(conn: &Connection, plan: &[PlannedWrite]) -> EngineResult<Vec<WriteOutcome>> {
    conn.execute_batch("SAVEPOINT repokit_flush;")?;

    let applied = plan
        .iter()
        .map(|write| apply_write(conn, write))
        .collect::<EngineResult<Vec<_>>>();

    let released = match applied {
        Ok(outcomes) => conn
            .execute_batch("RELEASE repokit_flush;")
            .map(|()| outcomes)
            .map_err(EngineError::from),
        Err(err) => Err(err),
    };

    if released.is_err() {
        if let Err(undo_err) =
            conn.execute_batch("ROLLBACK TO repokit_flush; RELEASE repokit_flush;")
        {
            warn!(
                "event=session_flush module=session status=error step=undo_savepoint error={}",
                undo_err
            );
        }
    }
    released
}

fn apply_write(conn: &Connection, write: &PlannedWrite) -> EngineResult<WriteOutcome> {
    match &write.mutation {
        Mutation::Insert { kind, key, body } => {
            let rows = conn.execute(
                &format!("INSERT INTO \"{kind}\" (id, body, version) VALUES (?1, ?2, 1);"),
                params![key, serde_json::to_string(body)?],
            )?;
            Ok(WriteOutcome {
                kind: *kind,
                key: key.clone(),
                stored: Some((body.clone(), 1)),
                rows,
            })
        }
        Mutation::Update { kind, key, body } => {
            let text = serde_json::to_string(body)?;
            let version = match write.expected_version {
                Some(expected) => conn
                    .query_row(
                        &format!(
                            "UPDATE \"{kind}\" SET body = ?1, version = version + 1
                             WHERE id = ?2 AND version = ?3
                             RETURNING version;"
                        ),
                        params![text, key, expected],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?,
                None => conn
                    .query_row(
                        &format!(
                            "UPDATE \"{kind}\" SET body = ?1, version = version + 1
                             WHERE id = ?2
                             RETURNING version;"
                        ),
                        params![text, key],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?,
            };
            let version = version.ok_or_else(|| EngineError::Conflict {
                kind: *kind,
                key: key.clone(),
            })?;
            Ok(WriteOutcome {
                kind: *kind,
                key: key.clone(),
                stored: Some((body.clone(), version)),
                rows: 1,
            })
        }
        Mutation::Delete { kind, key } => {
            let rows = match write.expected_version {
                Some(expected) => conn.execute(
                    &format!("DELETE FROM \"{kind}\" WHERE id = ?1 AND version = ?2;"),
                    params![key, expected],
                )?,
                None => conn.execute(
                    &format!("DELETE FROM \"{kind}\" WHERE id = ?1;"),
                    params![key],
                )?,
            };
            if rows == 0 {
                return Err(EngineError::Conflict {
                    kind: *kind,
                    key: key.clone(),
                });
            }
            Ok(WriteOutcome {
                kind: *kind,
                key: key.clone(),
                stored: None,
                rows,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteSession;
    use crate::model::entity::KeyValue;
    use crate::session::{Mutation, Session};
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::Arc;

    fn session() -> SqliteSession {
        let session = SqliteSession::open_in_memory().unwrap();
        session.ensure_table("widgets").unwrap();
        session
    }

    fn insert(id: i64, name: &str) -> Mutation {
        Mutation::Insert {
            kind: "widgets",
            key: KeyValue::Int(id),
            body: json!({ "id": id, "name": name }),
        }
    }

    #[tokio::test]
    async fn staged_rows_are_visible_before_flush() {
        let mut session = session();
        session.stage(insert(1, "bolt"));

        let found = session.find("widgets", &KeyValue::Int(1)).await.unwrap();
        assert_eq!(found, Some(json!({ "id": 1, "name": "bolt" })));
        assert_eq!(session.scan("widgets").await.unwrap().len(), 1);
        assert!(session.has_staged_changes());
    }

    #[tokio::test]
    async fn flush_persists_and_bumps_versions() {
        let mut session = session();
        session.stage(insert(1, "bolt"));
        assert_eq!(session.flush().await.unwrap(), 1);
        assert!(!session.has_staged_changes());

        session.stage(Mutation::Update {
            kind: "widgets",
            key: KeyValue::Int(1),
            body: json!({ "id": 1, "name": "nut" }),
        });
        assert_eq!(session.flush().await.unwrap(), 1);

        let conn = session.conn.lock();
        let (body, version): (String, i64) = conn
            .query_row("SELECT body, version FROM widgets WHERE id = 1;", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert!(body.contains("nut"));
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn failed_flush_writes_nothing_and_keeps_changes() {
        let mut session = session();
        session.stage(insert(1, "bolt"));
        session.flush().await.unwrap();

        session.stage(insert(2, "washer"));
        session.stage(insert(1, "duplicate"));
        let err = session.flush().await.unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(session.staged_len(), 2);

        let conn = session.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM widgets;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn interrupted_flush_is_settled_by_the_next_call() {
        let mut session = session();
        session.stage(insert(1, "bolt"));
        session.flush().await.unwrap();
        session.find("widgets", &KeyValue::Int(1)).await.unwrap();

        let conn = Arc::clone(&session.conn);
        let guard = conn.lock();
        session.stage(Mutation::Update {
            kind: "widgets",
            key: KeyValue::Int(1),
            body: json!({ "id": 1, "name": "nut" }),
        });
        assert!(session.flush().now_or_never().is_none());
        assert!(session.has_staged_changes());
        drop(guard);

        let found = session.find("widgets", &KeyValue::Int(1)).await.unwrap();
        assert_eq!(found, Some(json!({ "id": 1, "name": "nut" })));
        assert!(!session.has_staged_changes());

        session.stage(Mutation::Update {
            kind: "widgets",
            key: KeyValue::Int(1),
            body: json!({ "id": 1, "name": "washer" }),
        });
        assert_eq!(session.flush().await.unwrap(), 1);
        let version: i64 = session
            .conn
            .lock()
            .query_row("SELECT version FROM widgets WHERE id = 1;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 3);
    }

    #[tokio::test]
    async fn interrupted_commit_is_settled_before_the_next_begin() {
        let mut session = session();
        let tx = session.begin_transaction().await.unwrap();
        session.stage(insert(1, "bolt"));
        session.flush().await.unwrap();

        let conn = Arc::clone(&session.conn);
        let guard = conn.lock();
        assert!(session.commit_transaction(tx).now_or_never().is_none());
        drop(guard);

        let next = session.begin_transaction().await.unwrap();
        session.rollback_transaction(next).await.unwrap();
        assert_eq!(session.scan("widgets").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sequence_accounts_for_stored_and_staged_keys() {
        let mut session = session();
        assert_eq!(session.next_sequence("widgets").await.unwrap(), 1);
        session.stage(insert(5, "staged"));
        assert_eq!(session.next_sequence("widgets").await.unwrap(), 6);
        assert_eq!(session.next_sequence("widgets").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn update_of_row_changed_elsewhere_conflicts() {
        let mut session = session();
        session.stage(insert(1, "bolt"));
        session.flush().await.unwrap();
        session.find("widgets", &KeyValue::Int(1)).await.unwrap();

        session
            .conn
            .lock()
            .execute_batch("UPDATE widgets SET version = version + 1 WHERE id = 1;")
            .unwrap();

        session.stage(Mutation::Update {
            kind: "widgets",
            key: KeyValue::Int(1),
            body: json!({ "id": 1, "name": "stale" }),
        });
        let err = session.flush().await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn rollback_discards_flushed_rows() {
        let mut session = session();
        let tx = session.begin_transaction().await.unwrap();
        assert!(session.begin_transaction().await.is_err());

        session.stage(insert(1, "bolt"));
        session.flush().await.unwrap();
        session.rollback_transaction(tx).await.unwrap();

        assert!(session.scan("widgets").await.unwrap().is_empty());
        assert!(session.begin_transaction().await.is_ok());
    }

    #[tokio::test]
    async fn invalid_kind_is_rejected() {
        let mut session = session();
        let err = session
            .find("bad name", &KeyValue::Int(1))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::session::EngineError::InvalidKind(_)));
    }
}
