//! Paged query result.

use serde::{Deserialize, Serialize};

/// One page of items plus paging metadata.
///
/// `total_count` counts the filtered query before skip/take; `items` holds at
/// most `page_size` entries of the ordered filtered query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PagedResultWire<T>")]
pub struct PagedResult<T> {
    items: Vec<T>,
    total_count: u64,
    page_index: u32,
    page_size: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedResultWire<T> {
    items: Vec<T>,
    total_count: u64,
    page_index: u32,
    page_size: u32,
}

impl<T> TryFrom<PagedResultWire<T>> for PagedResult<T> {
    type Error = String;

    fn try_from(wire: PagedResultWire<T>) -> Result<Self, Self::Error> {
        if wire.items.len() > wire.page_size as usize {
            return Err(format!(
                "page holds {} items but page_size is {}",
                wire.items.len(),
                wire.page_size
            ));
        }
        if wire.items.len() as u64 > wire.total_count {
            return Err(format!(
                "page holds {} items but total_count is {}",
                wire.items.len(),
                wire.total_count
            ));
        }
        Ok(Self::new(
            wire.items,
            wire.total_count,
            wire.page_index,
            wire.page_size,
        ))
    }
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total_count: u64, page_index: u32, page_size: u32) -> Self {
        Self {
            items,
            total_count,
            page_index,
            page_size,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of pages needed for `total_count`; zero when nothing matched.
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(u64::from(self.page_size))
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_index > 0
    }

    pub fn has_next_page(&self) -> bool {
        u64::from(self.page_index) + 1 < self.total_pages()
    }

    /// Converts items while keeping the paging metadata, e.g. entity -> view model.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_index: self.page_index,
            page_size: self.page_size,
        }
    }
}
