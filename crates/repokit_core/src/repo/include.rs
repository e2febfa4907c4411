//! Explicit eager-load specifications.
//!
//! # Responsibility
//! - Describe which related entities a read should load alongside its result.
//! - Load them in one pass over the result set, never on field access.
//!
//! # Invariants
//! - An empty spec loads nothing and never fails.
//! - Related rows are read through the same session, so staged changes are
//!   visible to includes exactly as they are to the primary query.

use super::codec::{decode, decode_all};
use super::error::RepoResult;
use crate::model::entity::{Entity, EntityKey};
use crate::session::Session;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

/// Loader for one relation of `T`.
#[async_trait]
pub trait Navigation<T: Entity>: Send + Sync {
    /// Relation name, used in logs.
    fn name(&self) -> &'static str;

    /// Fills the relation on every parent in `parents`.
    async fn load(&self, session: &mut dyn Session, parents: &mut [T]) -> RepoResult<()>;
}

/// Set of relations to eager-load for `T`.
pub struct IncludeSpec<T: Entity> {
    navigations: Vec<Arc<dyn Navigation<T>>>,
}

impl<T: Entity> IncludeSpec<T> {
    pub fn new() -> Self {
        Self {
            navigations: Vec::new(),
        }
    }

    /// Adds one relation; relations load in the order they were added.
    pub fn with(mut self, navigation: impl Navigation<T> + 'static) -> Self {
        self.navigations.push(Arc::new(navigation));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.navigations.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.navigations.iter().map(|nav| nav.name()).collect()
    }

    pub(crate) async fn load(&self, session: &mut dyn Session, items: &mut [T]) -> RepoResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        for navigation in &self.navigations {
            navigation.load(session, items).await?;
        }
        Ok(())
    }
}

impl<T: Entity> Default for IncludeSpec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for IncludeSpec<T> {
    fn clone(&self) -> Self {
        Self {
            navigations: self.navigations.clone(),
        }
    }
}

impl<T: Entity> Debug for IncludeSpec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.navigations.iter().map(|nav| nav.name()))
            .finish()
    }
}

/// One-to-many relation: children of `C` whose foreign key points at `P`.
pub struct HasMany<P: Entity, C: Entity> {
    name: &'static str,
    foreign_key: fn(&C) -> Option<P::Key>,
    assign: fn(&mut P, Vec<C>),
    _marker: PhantomData<fn() -> (P, C)>,
}

impl<P: Entity, C: Entity> HasMany<P, C> {
    pub fn new(
        name: &'static str,
        foreign_key: fn(&C) -> Option<P::Key>,
        assign: fn(&mut P, Vec<C>),
    ) -> Self {
        Self {
            name,
            foreign_key,
            assign,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<P: Entity, C: Entity> Navigation<P> for HasMany<P, C> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self, session: &mut dyn Session, parents: &mut [P]) -> RepoResult<()> {
        let children: Vec<C> = decode_all(session.scan(C::KIND).await?)?;

        let mut groups: HashMap<P::Key, Vec<C>> = HashMap::new();
        for child in children {
            if let Some(parent_key) = (self.foreign_key)(&child) {
                groups.entry(parent_key).or_default().push(child);
            }
        }
        for parent in parents.iter_mut() {
            let children = groups.get(parent.id()).cloned().unwrap_or_default();
            (self.assign)(parent, children);
        }
        Ok(())
    }
}

/// Many-to-one relation: the `P` referenced by a child's foreign key.
pub struct BelongsTo<C: Entity, P: Entity> {
    name: &'static str,
    foreign_key: fn(&C) -> Option<P::Key>,
    assign: fn(&mut C, Option<P>),
    _marker: PhantomData<fn() -> (C, P)>,
}

impl<C: Entity, P: Entity> BelongsTo<C, P> {
    pub fn new(
        name: &'static str,
        foreign_key: fn(&C) -> Option<P::Key>,
        assign: fn(&mut C, Option<P>),
    ) -> Self {
        Self {
            name,
            foreign_key,
            assign,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<C: Entity, P: Entity> Navigation<C> for BelongsTo<C, P> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self, session: &mut dyn Session, children: &mut [C]) -> RepoResult<()> {
        let mut parents: BTreeMap<P::Key, Option<P>> = BTreeMap::new();
        for child in children.iter() {
            if let Some(parent_key) = (self.foreign_key)(child) {
                parents.entry(parent_key).or_insert(None);
            }
        }
        for (parent_key, slot) in parents.iter_mut() {
            if let Some(body) = session.find(P::KIND, &parent_key.to_key_value()).await? {
                *slot = Some(decode::<P>(body)?);
            }
        }
        for child in children.iter_mut() {
            let parent = (self.foreign_key)(child)
                .and_then(|parent_key| parents.get(&parent_key).cloned().flatten());
            (self.assign)(child, parent);
        }
        Ok(())
    }
}
