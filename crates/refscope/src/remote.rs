//! Cross-repository search for one qualified moniker.
//!
//! Uploads outside the visible set are found through the catalog: every
//! upload that references the moniker's package has a package reference
//! record carrying a [`CandidateFilter`] over the identifiers it uses.
//!
//! The search walks the catalog one page at a time. Each page is reduced to
//! a *batch* of plausible uploads: duplicates, ignored uploads and uploads
//! whose filter rules out the identifier are skipped. A batch's dumps are
//! then checked for stale commits and the rest are searched with a single
//! bulk moniker lookup.
//!
//! # Concurrency
//!
//! Up to `concurrency` batches are fetched at once. Results are stitched back
//! together in catalog order, so the output does not depend on which fetch
//! finishes first.
//!
//! # Resumption
//!
//! [`RemoteProgress`] records where a page stopped: the catalog offset
//! after the batch being consumed, that batch's upload IDs, and the location
//! offset inside it. Batches fetched past the stopping point are discarded
//! and refetched by the next page.

use crate::commit_cache::CommitCache;
use crate::error::Result;
use crate::store::{CatalogStore, IndexStore};
use crate::types::{Dump, Location, QualifiedMoniker, ResultKind, UploadId};
use futures::stream::{self, StreamExt};
use refscope_bloom::CandidateFilter;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Where a remote search for one moniker stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProgress {
    /// Batches fully consumed so far
    pub batch_index: usize,
    /// Catalog offset after `batch`, or `None` once the catalog is exhausted
    pub catalog_offset: Option<usize>,
    /// Upload IDs of the batch being consumed, empty between batches
    pub batch: Vec<UploadId>,
    /// Location offset within `batch`
    pub location_offset: usize,
}

impl RemoteProgress {
    /// Progress of a search that has not started.
    #[must_use]
    pub fn start() -> Self {
        Self {
            batch_index: 0,
            catalog_offset: Some(0),
            batch: Vec::new(),
            location_offset: 0,
        }
    }
}

impl Default for RemoteProgress {
    fn default() -> Self {
        Self::start()
    }
}

/// One window of remote results.
#[derive(Debug, Default)]
pub struct RemoteResults {
    /// Locations in catalog order
    pub locations: Vec<Location>,
    /// Live dumps of every batch that contributed locations
    pub dumps: Vec<Dump>,
    /// Where to resume, or `None` if this moniker has nothing left
    pub next: Option<RemoteProgress>,
}

/// Searches uploads that reference a moniker's package.
pub struct RemoteSearch<'a> {
    index: &'a dyn IndexStore,
    catalog: &'a dyn CatalogStore,
    commits: &'a CommitCache,
    kind: ResultKind,
    ignored: &'a HashSet<UploadId>,
    catalog_page_size: usize,
    concurrency: usize,
}

/// A batch queued for fetching.
#[derive(Debug)]
struct Batch {
    ids: Vec<UploadId>,
    offset: usize,
    catalog_end: Option<usize>,
}

/// What fetching one batch produced.
#[derive(Debug, Default)]
struct BatchResults {
    locations: Vec<Location>,
    total: usize,
    dumps: Vec<Dump>,
}

impl<'a> RemoteSearch<'a> {
    /// Create a search reading `kind` results.
    ///
    /// Uploads in `ignored` are never searched. `catalog_page_size` bounds
    /// the package reference records read per catalog call and `concurrency`
    /// the batches fetched at once; both are raised to at least 1.
    #[must_use]
    pub fn new(
        index: &'a dyn IndexStore,
        catalog: &'a dyn CatalogStore,
        commits: &'a CommitCache,
        kind: ResultKind,
        ignored: &'a HashSet<UploadId>,
        catalog_page_size: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            index,
            catalog,
            commits,
            kind,
            ignored,
            catalog_page_size: catalog_page_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Collect up to `limit` locations for `moniker`, resuming at `progress`.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the catalog or index store. Failed
    /// commit checks and undecodable filters only exclude the affected
    /// uploads.
    pub async fn search(
        &self,
        moniker: &QualifiedMoniker,
        progress: RemoteProgress,
        limit: usize,
    ) -> Result<RemoteResults> {
        let mut results = RemoteResults::default();
        let mut progress = progress;

        if limit == 0 {
            results.next = Some(progress);
            return Ok(results);
        }

        'window: loop {
            let window = self.next_window(moniker, &mut progress).await?;
            if window.is_empty() {
                debug!(
                    identifier = %moniker.moniker.identifier,
                    batches = progress.batch_index,
                    "Remote search exhausted"
                );
                return Ok(results);
            }

            let remaining = limit - results.locations.len();
            let fetched: Vec<Result<BatchResults>> = stream::iter(
                window
                    .iter()
                    .map(|batch| self.fetch_batch(moniker, batch, remaining)),
            )
            .buffered(self.concurrency)
            .collect()
            .await;

            for (batch, fetched) in window.into_iter().zip(fetched) {
                let fetched = fetched?;
                let room = limit - results.locations.len();
                let returned = fetched.locations.len();
                let taken = returned.min(room);
                // An offset past `usize::MAX` cannot be resumed, so the batch ends.
                let consumed = batch.offset.checked_add(taken);
                let exhausted = returned == 0
                    || consumed.is_none_or(|end| taken == returned && end >= fetched.total);

                results.locations.extend(fetched.locations.into_iter().take(taken));
                results.dumps.extend(fetched.dumps);

                if exhausted {
                    progress.batch_index = progress.batch_index.saturating_add(1);
                }

                let full = results.locations.len() >= limit;
                if !full && exhausted {
                    continue;
                }

                // Stop at this batch: either the page is full or the store
                // returned a short page and the batch must be read again.
                // Later batches in the window are refetched from the catalog.
                progress.catalog_offset = batch.catalog_end;
                match consumed.filter(|_| !exhausted) {
                    Some(consumed) => {
                        progress.batch = batch.ids;
                        progress.location_offset = consumed;
                    }
                    None => {
                        progress.batch.clear();
                        progress.location_offset = 0;
                    }
                }

                if full {
                    let more = progress.catalog_offset.is_some() || !progress.batch.is_empty();
                    results.next = more.then_some(progress);
                    return Ok(results);
                }
                continue 'window;
            }
        }
    }

    /// Queue the batch in progress followed by fresh catalog batches.
    ///
    /// On return `progress` no longer names a pending batch; its
    /// `catalog_offset` points past the last scanned catalog page.
    async fn next_window(
        &self,
        moniker: &QualifiedMoniker,
        progress: &mut RemoteProgress,
    ) -> Result<Vec<Batch>> {
        let mut window = Vec::with_capacity(self.concurrency);

        if !progress.batch.is_empty() {
            window.push(Batch {
                ids: std::mem::take(&mut progress.batch),
                offset: progress.location_offset,
                catalog_end: progress.catalog_offset,
            });
            progress.location_offset = 0;
        }

        while window.len() < self.concurrency {
            let Some(offset) = progress.catalog_offset else {
                break;
            };

            let (ids, catalog_end) = self.scan_catalog(moniker, offset).await?;
            progress.catalog_offset = catalog_end;

            if ids.is_empty() {
                // Every record on this page was filtered out.
                continue;
            }

            window.push(Batch {
                ids,
                offset: 0,
                catalog_end,
            });
        }

        Ok(window)
    }

    /// Read one catalog page starting at `offset`.
    ///
    /// Returns the surviving upload IDs in catalog order and the offset of
    /// the next page, or `None` once the catalog is exhausted.
    async fn scan_catalog(
        &self,
        moniker: &QualifiedMoniker,
        offset: usize,
    ) -> Result<(Vec<UploadId>, Option<usize>)> {
        let package = moniker.package();
        let (mut scanner, total) = self
            .catalog
            .reference_ids_and_filters(&package, self.catalog_page_size, offset)
            .await?;

        let identifier = moniker.moniker.identifier.as_str();
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut scanned = 0;

        'scan: loop {
            let records = scanner.next_batch(self.catalog_page_size).await?;
            if records.is_empty() {
                break;
            }

            for record in records {
                scanned += 1;

                if !seen.insert(record.upload_id) || self.ignored.contains(&record.upload_id) {
                    continue;
                }

                match CandidateFilter::from_bytes(&record.filter) {
                    Ok(filter) if filter.test(identifier) => ids.push(record.upload_id),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(upload = %record.upload_id, error = %e, "Skipping upload with undecodable filter");
                    }
                }

                if ids.len() >= self.catalog_page_size || scanned >= self.catalog_page_size {
                    break 'scan;
                }
            }
        }

        let catalog_end = offset
            .checked_add(scanned)
            .filter(|next| scanned > 0 && *next < total);

        debug!(
            package = %package.name,
            version = %package.version,
            offset,
            scanned,
            total,
            candidates = ids.len(),
            "Scanned package references"
        );

        Ok((ids, catalog_end))
    }

    /// Search one batch, skipping uploads whose commit is gone.
    async fn fetch_batch(
        &self,
        moniker: &QualifiedMoniker,
        batch: &Batch,
        limit: usize,
    ) -> Result<BatchResults> {
        let mut dumps = self.catalog.dumps_by_ids(&batch.ids).await?;
        dumps.sort_by_key(|dump| batch.ids.iter().position(|id| *id == dump.id));

        let mut live = Vec::with_capacity(dumps.len());
        for dump in dumps {
            if batch.ids.contains(&dump.id) && live_commit(self.commits, &dump).await {
                live.push(dump);
            }
        }

        if live.is_empty() {
            return Ok(BatchResults::default());
        }

        let ids: Vec<UploadId> = live.iter().map(|dump| dump.id).collect();
        let (locations, total) = self
            .index
            .bulk_moniker_results(
                self.kind,
                &ids,
                std::slice::from_ref(&moniker.moniker),
                limit,
                batch.offset,
            )
            .await?;

        debug!(
            uploads = ids.len(),
            offset = batch.offset,
            returned = locations.len(),
            total,
            "Fetched remote batch"
        );

        Ok(BatchResults {
            locations,
            total,
            dumps: live,
        })
    }
}

/// Returns `true` if `dump`'s commit still exists.
///
/// A failed check excludes the dump rather than failing the query.
pub(crate) async fn live_commit(commits: &CommitCache, dump: &Dump) -> bool {
    match commits.exists(dump.repository_id, &dump.commit).await {
        Ok(true) => true,
        Ok(false) => {
            debug!(upload = %dump.id, commit = %dump.commit, "Skipping upload with unknown commit");
            false
        }
        Err(e) => {
            warn!(upload = %dump.id, commit = %dump.commit, error = %e, "Commit check failed, skipping upload");
            false
        }
    }
}
