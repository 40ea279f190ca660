//! Per-query dump lookup.

use crate::error::Result;
use crate::store::CatalogStore;
use crate::types::{Dump, UploadId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Dump records seen while answering one query.
///
/// The first record inserted for an ID wins. Visible uploads are inserted
/// before anything the catalog returns, so a location inside a visible
/// upload always reports the visible dump.
#[derive(Debug, Default)]
pub struct DumpCache {
    known: HashMap<UploadId, Dump>,
    missing: HashSet<UploadId>,
}

impl DumpCache {
    /// Create a cache seeded with `dumps`.
    pub fn new(dumps: impl IntoIterator<Item = Dump>) -> Self {
        let mut cache = Self::default();
        cache.extend(dumps);
        cache
    }

    /// Remember `dumps`, keeping existing entries for repeated IDs.
    pub fn extend(&mut self, dumps: impl IntoIterator<Item = Dump>) {
        for dump in dumps {
            self.missing.remove(&dump.id);
            self.known.entry(dump.id).or_insert(dump);
        }
    }

    /// The dump for `id`, if known.
    #[must_use]
    pub fn get(&self, id: UploadId) -> Option<&Dump> {
        self.known.get(&id)
    }

    /// Fetch the dumps of `ids` not seen yet with one catalog call.
    ///
    /// IDs the catalog does not know are remembered as missing and are not
    /// requested again.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the catalog store.
    pub async fn resolve(&mut self, catalog: &dyn CatalogStore, ids: &[UploadId]) -> Result<()> {
        let mut unknown = Vec::new();
        for &id in ids {
            let seen = self.known.contains_key(&id) || self.missing.contains(&id);
            if !seen && !unknown.contains(&id) {
                unknown.push(id);
            }
        }

        if unknown.is_empty() {
            return Ok(());
        }

        debug!(count = unknown.len(), "Fetching dumps for result locations");
        let dumps = catalog.dumps_by_ids(&unknown).await?;
        self.extend(dumps);

        for id in unknown {
            if !self.known.contains_key(&id) {
                warn!(upload = %id, "Catalog has no dump for result location");
                self.missing.insert(id);
            }
        }

        Ok(())
    }
}
