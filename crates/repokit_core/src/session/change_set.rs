//! Ordered set of staged mutations with coalescing.
//!
//! # Invariants
//! - At most one pending insert or update exists per key after the last
//!   pending delete of that key.
//! - Deleting a key whose insert is still pending drops the insert; nothing
//!   reaches the store for it.
//! - Mutation order is preserved for flush.

use super::Mutation;
use crate::model::entity::KeyValue;
use serde_json::Value;
use std::collections::BTreeMap;

/// Final staged state of one key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StagedState<'a> {
    Present(&'a Value),
    Deleted,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Mutation>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.changes.iter()
    }

    /// Removes and returns every staged mutation in order.
    pub fn take(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.changes)
    }

    /// Puts back mutations taken for a flush that failed.
    ///
    /// Mutations staged after the take (if any) stay after the restored ones.
    pub fn restore(&mut self, mut changes: Vec<Mutation>) {
        changes.append(&mut self.changes);
        self.changes = changes;
    }

    pub fn stage(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Insert { .. } => self.changes.push(mutation),
            Mutation::Update { kind, key, body } => {
                let pending = self
                    .last_index_for(kind, &key)
                    .and_then(|index| match &mut self.changes[index] {
                        Mutation::Insert { body: staged, .. }
                        | Mutation::Update { body: staged, .. } => Some(staged),
                        Mutation::Delete { .. } => None,
                    });
                if let Some(staged) = pending {
                    *staged = body;
                } else {
                    self.changes.push(Mutation::Update { kind, key, body });
                }
            }
            Mutation::Delete { kind, key } => {
                if let Some(index) = self.last_index_for(kind, &key) {
                    let pending_insert = matches!(self.changes[index], Mutation::Insert { .. });
                    let pending_update = matches!(self.changes[index], Mutation::Update { .. });
                    if pending_insert || pending_update {
                        self.changes.remove(index);
                    }
                    if pending_insert {
                        return;
                    }
                }
                self.changes.push(Mutation::Delete { kind, key });
            }
        }
    }

    /// Staged state of one key, if any mutation targets it.
    pub fn lookup(&self, kind: &str, key: &KeyValue) -> Option<StagedState<'_>> {
        self.changes
            .iter()
            .rev()
            .find(|mutation| mutation.targets(kind, key))
            .map(|mutation| match mutation {
                Mutation::Insert { body, .. } | Mutation::Update { body, .. } => {
                    StagedState::Present(body)
                }
                Mutation::Delete { .. } => StagedState::Deleted,
            })
    }

    /// Applies staged mutations of `kind` on top of persisted rows.
    pub fn overlay(&self, kind: &str, rows: &mut BTreeMap<KeyValue, Value>) {
        for mutation in self.changes.iter().filter(|mutation| mutation.kind() == kind) {
            match mutation {
                Mutation::Insert { key, body, .. } | Mutation::Update { key, body, .. } => {
                    rows.insert(key.clone(), body.clone());
                }
                Mutation::Delete { key, .. } => {
                    rows.remove(key);
                }
            }
        }
    }

    /// Largest integer key among staged inserts of `kind`.
    pub fn max_int_key(&self, kind: &str) -> Option<i64> {
        self.changes
            .iter()
            .filter_map(|mutation| match mutation {
                Mutation::Insert {
                    kind: staged,
                    key: KeyValue::Int(id),
                    ..
                } if *staged == kind => Some(*id),
                _ => None,
            })
            .max()
    }

    fn last_index_for(&self, kind: &str, key: &KeyValue) -> Option<usize> {
        self.changes
            .iter()
            .rposition(|mutation| mutation.targets(kind, key))
    }
}
