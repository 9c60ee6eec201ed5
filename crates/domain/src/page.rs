use serde::{Deserialize, Serialize};

/// Limit/offset window applied after filtering and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    /// Maximum number of rows, or `None` for no limit.
    pub limit: Option<u32>,
    /// Number of rows to skip.
    pub offset: u32,
}

impl Page {
    /// Returns an unbounded page starting at the first row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Returns a bounded page.
    #[must_use]
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    /// Applies the window to an already ordered sequence.
    pub fn slice<T>(self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let skipped = items.into_iter().skip(self.offset as usize);
        match self.limit {
            Some(limit) => skipped.take(limit as usize).collect(),
            None => skipped.collect(),
        }
    }
}
