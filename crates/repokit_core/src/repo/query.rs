//! Composable in-memory query over one entity type.
//!
//! # Responsibility
//! - Collect filters, ordering, includes and a skip/take window before a
//!   repository materializes the query.
//!
//! # Invariants
//! - Filters combine as a conjunction; an empty filter list matches all.
//! - Ordering always ends with key ascending, so equal sort keys and queries
//!   without ordering come back in a deterministic order.
//! - Building a query performs no I/O.

use super::include::{IncludeSpec, Navigation};
use crate::model::entity::Entity;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

pub struct Query<T: Entity> {
    filters: Vec<Predicate<T>>,
    ordering: Vec<Comparator<T>>,
    includes: IncludeSpec<T>,
    skip: usize,
    take: Option<usize>,
}

impl<T: Entity> Query<T> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            ordering: Vec::new(),
            includes: IncludeSpec::new(),
            skip: 0,
            take: None,
        }
    }

    /// Adds a filter; every filter must match.
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(predicate));
        self
    }

    /// Replaces the ordering with one ascending sort key.
    pub fn order_by<K, F>(mut self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.ordering.clear();
        self.then_by(key)
    }

    /// Replaces the ordering with one descending sort key.
    pub fn order_by_desc<K, F>(mut self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.ordering.clear();
        self.then_by_desc(key)
    }

    /// Adds an ascending tie-breaker after the current ordering.
    pub fn then_by<K, F>(mut self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.ordering
            .push(Arc::new(move |left: &T, right: &T| key(left).cmp(&key(right))));
        self
    }

    /// Adds a descending tie-breaker after the current ordering.
    pub fn then_by_desc<K, F>(mut self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.ordering
            .push(Arc::new(move |left: &T, right: &T| key(right).cmp(&key(left))));
        self
    }

    pub fn include(mut self, navigation: impl Navigation<T> + 'static) -> Self {
        self.includes = self.includes.with(navigation);
        self
    }

    pub fn with_includes(mut self, includes: IncludeSpec<T>) -> Self {
        self.includes = includes;
        self
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    pub fn has_ordering(&self) -> bool {
        !self.ordering.is_empty()
    }

    pub(crate) fn includes(&self) -> &IncludeSpec<T> {
        &self.includes
    }

    pub(crate) fn matches(&self, entity: &T) -> bool {
        self.filters.iter().all(|predicate| predicate(entity))
    }

    /// Keeps matching rows and sorts them; skip/take are not applied.
    pub(crate) fn select(&self, rows: Vec<T>) -> Vec<T> {
        let mut selected: Vec<T> = rows.into_iter().filter(|row| self.matches(row)).collect();
        selected.sort_by(|left, right| self.compare(left, right));
        selected
    }

    /// Applies the skip/take window to already selected rows.
    pub(crate) fn window(&self, rows: Vec<T>) -> Vec<T> {
        let rows = rows.into_iter().skip(self.skip);
        match self.take {
            Some(take) => rows.take(take).collect(),
            None => rows.collect(),
        }
    }

    pub(crate) fn with_window(mut self, skip: usize, take: usize) -> Self {
        self.skip = skip;
        self.take = Some(take);
        self
    }

    fn compare(&self, left: &T, right: &T) -> Ordering {
        self.ordering
            .iter()
            .map(|comparator| comparator(left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| left.id().cmp(right.id()))
    }
}

impl<T: Entity> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            ordering: self.ordering.clone(),
            includes: self.includes.clone(),
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<T: Entity> Debug for Query<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("kind", &T::KIND)
            .field("filters", &self.filters.len())
            .field("order_keys", &self.ordering.len())
            .field("includes", &self.includes)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish()
    }
}
