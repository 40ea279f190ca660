//! In-memory package reference scanner.

use super::PackageReferenceScanner;
use crate::error::Result;
use crate::types::PackageReference;
use async_trait::async_trait;
use std::collections::VecDeque;

/// A [`PackageReferenceScanner`] over records already held in memory.
///
/// Catalog implementations that load a page eagerly can hand it out through
/// this type; tests use it to script catalog responses.
#[derive(Debug, Clone, Default)]
pub struct SliceScanner {
    remaining: VecDeque<PackageReference>,
}

impl SliceScanner {
    /// Create a scanner yielding `records` in order.
    #[must_use]
    pub fn new(records: Vec<PackageReference>) -> Self {
        Self {
            remaining: records.into(),
        }
    }

    /// A scanner with nothing to yield.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl FromIterator<PackageReference> for SliceScanner {
    fn from_iter<T: IntoIterator<Item = PackageReference>>(iter: T) -> Self {
        Self {
            remaining: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PackageReferenceScanner for SliceScanner {
    async fn next_batch(&mut self, max: usize) -> Result<Vec<PackageReference>> {
        let take = max.min(self.remaining.len());
        Ok(self.remaining.drain(..take).collect())
    }
}
