//! Top-level query resolution.
//!
//! A [`QueryResolver`] answers implementation, reference and definition
//! queries for one position in one viewed file. Paginated queries walk a
//! fixed phase sequence and report where they stopped as an opaque cursor:
//!
//! ```text
//! Local ──► Definitions ──► Remote(moniker 0) ──► ... ──► Remote(moniker n) ──► Done
//! ```
//!
//! - **Local** reads the visible uploads' own indexes.
//! - **Definitions** reads uploads that define the query's monikers.
//! - **Remote** reads uploads that reference the monikers' packages, one
//!   moniker at a time (see [`crate::remote`]).
//!
//! Local results always come alone: if the local phase produces anything
//! in a call, that call returns without touching the other phases and the
//! cursor points at the next phase.
//!
//! # Example
//!
//! ```rust,ignore
//! let ctx = ResolverContext::new(RepositoryId(42), "deadbeef", "s1/main.go", uploads, commits)
//!     .with_actor(Actor::user(1));
//! let resolver = QueryResolver::new(ctx, collaborators, ResolverConfig::default());
//!
//! let mut cursor = None;
//! loop {
//!     let page = resolver.references(10, 20, 50, cursor.as_deref()).await?;
//!     show(&page.locations);
//!     match page.cursor {
//!         Some(next) => cursor = Some(next),
//!         None => break,
//!     }
//! }
//! ```

use crate::adjust::{ViewedCommit, adjust_locations, filter_by_permissions};
use crate::commit_cache::CommitCache;
use crate::config::ResolverConfig;
use crate::cursor::Cursor;
use crate::dumps::DumpCache;
use crate::error::{Error, Result};
use crate::monikers::{EXPORT_KINDS, IMPLEMENTATION_KINDS, REFERENCE_KINDS, ordered_monikers};
use crate::remote::{RemoteProgress, RemoteSearch, live_commit};
use crate::store::{CatalogStore, IndexStore, PermissionChecker, PositionAdjuster};
use crate::types::{
    Actor, AdjustedLocation, Dump, Location, Moniker, MonikerKind, Position, QualifiedMoniker,
    RepositoryId, ResultKind, UploadId,
};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Page {
    /// Results the actor may read, in phase and catalog order
    pub locations: Vec<AdjustedLocation>,

    /// Cursor for the next page, or `None` when nothing is left
    pub cursor: Option<String>,

    /// Raw locations gathered for this page before adjustment and
    /// permission filtering
    pub candidates: usize,
}

/// The external services a resolver reads from.
#[derive(Clone)]
pub struct Collaborators {
    /// Precomputed index data
    pub index: Arc<dyn IndexStore>,
    /// Upload and package reference catalog
    pub catalog: Arc<dyn CatalogStore>,
    /// Commit-to-commit coordinate translation
    pub adjuster: Arc<dyn PositionAdjuster>,
    /// Path-level authorization
    pub permissions: Arc<dyn PermissionChecker>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("permissions_enabled", &self.permissions.enabled())
            .finish_non_exhaustive()
    }
}

/// What a resolver is looking at and on whose behalf.
#[derive(Debug)]
pub struct ResolverContext {
    /// Repository being viewed
    pub repository_id: RepositoryId,
    /// Commit being viewed
    pub commit: String,
    /// Repository-relative path of the viewed file
    pub path: String,
    /// Uploads whose indexes cover the viewed file, in preference order
    pub uploads: Vec<Dump>,
    /// Actor the query runs for
    pub actor: Actor,
    /// Commit existence answers for this query
    pub commits: CommitCache,
}

impl ResolverContext {
    /// Create a context for an anonymous actor.
    pub fn new(
        repository_id: RepositoryId,
        commit: impl Into<String>,
        path: impl Into<String>,
        uploads: Vec<Dump>,
        commits: CommitCache,
    ) -> Self {
        Self {
            repository_id,
            commit: commit.into(),
            path: path.into(),
            uploads,
            actor: Actor::anonymous(),
            commits,
        }
    }

    /// Run queries on behalf of `actor`.
    #[must_use]
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    fn viewed(&self) -> ViewedCommit<'_> {
        ViewedCommit {
            repository_id: self.repository_id,
            commit: &self.commit,
        }
    }
}

/// How a paginated query reads each phase.
#[derive(Debug, Clone, Copy)]
struct QueryKind {
    /// Results read locally and remotely
    results: ResultKind,
    /// Moniker kinds driving the definitions phase
    definition_monikers: &'static [MonikerKind],
    /// Results read from definition uploads
    definition_results: ResultKind,
    /// Moniker kinds driving the remote phase
    remote_monikers: &'static [MonikerKind],
    /// Skip visible uploads when reading definition uploads, and definition
    /// uploads when reading remote ones
    disjoint_phases: bool,
}

const IMPLEMENTATIONS: QueryKind = QueryKind {
    results: ResultKind::Implementations,
    definition_monikers: IMPLEMENTATION_KINDS,
    definition_results: ResultKind::Definitions,
    remote_monikers: EXPORT_KINDS,
    disjoint_phases: false,
};

const REFERENCES: QueryKind = QueryKind {
    results: ResultKind::References,
    definition_monikers: REFERENCE_KINDS,
    definition_results: ResultKind::References,
    remote_monikers: REFERENCE_KINDS,
    disjoint_phases: true,
};

/// An upload to search, with the request translated into its coordinates.
type Target = (Dump, String, Position);

/// Resolves queries for one position context.
#[derive(Debug)]
pub struct QueryResolver {
    ctx: ResolverContext,
    collaborators: Collaborators,
    config: ResolverConfig,
}

impl QueryResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(ctx: ResolverContext, collaborators: Collaborators, config: ResolverConfig) -> Self {
        Self {
            ctx,
            collaborators,
            config,
        }
    }

    /// The context queries run in.
    #[must_use]
    pub fn context(&self) -> &ResolverContext {
        &self.ctx
    }

    /// One page of implementations of the symbol at `(line, character)`.
    ///
    /// A `limit` of zero uses the configured default page size. Pass the
    /// previous page's cursor to continue; `None` or a malformed cursor
    /// starts from the beginning.
    ///
    /// # Errors
    ///
    /// Returns collaborator failures, and `Error::Timeout` when the
    /// configured deadline passes.
    pub async fn implementations(
        &self,
        line: u32,
        character: u32,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page> {
        self.guarded(
            None,
            self.page(IMPLEMENTATIONS, Position::new(line, character), limit, cursor),
        )
        .await
    }

    /// [`implementations`](Self::implementations), abandoned with
    /// `Error::Cancelled` once `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`implementations`](Self::implementations).
    pub async fn implementations_with_cancellation(
        &self,
        line: u32,
        character: u32,
        limit: usize,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page> {
        self.guarded(
            Some(cancel),
            self.page(IMPLEMENTATIONS, Position::new(line, character), limit, cursor),
        )
        .await
    }

    /// One page of references to the symbol at `(line, character)`.
    ///
    /// # Errors
    ///
    /// Returns collaborator failures, and `Error::Timeout` when the
    /// configured deadline passes.
    pub async fn references(
        &self,
        line: u32,
        character: u32,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page> {
        self.guarded(None, self.page(REFERENCES, Position::new(line, character), limit, cursor))
            .await
    }

    /// [`references`](Self::references), abandoned with `Error::Cancelled`
    /// once `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`references`](Self::references).
    pub async fn references_with_cancellation(
        &self,
        line: u32,
        character: u32,
        limit: usize,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page> {
        self.guarded(
            Some(cancel),
            self.page(REFERENCES, Position::new(line, character), limit, cursor),
        )
        .await
    }

    /// Definitions of the symbol at `(line, character)`.
    ///
    /// The first visible upload with a local definition answers. Otherwise
    /// the uploads defining the symbol's import and export monikers are read,
    /// up to the configured `definitions-limit`.
    ///
    /// # Errors
    ///
    /// Returns collaborator failures, and `Error::Timeout` when the
    /// configured deadline passes.
    pub async fn definitions(&self, line: u32, character: u32) -> Result<Vec<AdjustedLocation>> {
        self.guarded(None, self.definitions_at(Position::new(line, character)))
            .await
    }

    /// [`definitions`](Self::definitions), abandoned with `Error::Cancelled`
    /// once `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`definitions`](Self::definitions).
    pub async fn definitions_with_cancellation(
        &self,
        line: u32,
        character: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<AdjustedLocation>> {
        self.guarded(Some(cancel), self.definitions_at(Position::new(line, character)))
            .await
    }

    /// Race `query` against cancellation and the configured deadline.
    async fn guarded<T>(
        &self,
        cancel: Option<&CancellationToken>,
        query: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let bounded = async {
            match self.config.query_timeout() {
                Some(deadline) => tokio::time::timeout(deadline, query)
                    .await
                    .map_err(|_| Error::Timeout(deadline))?,
                None => query.await,
            }
        };

        match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        debug!("Query cancelled");
                        Err(Error::Cancelled)
                    }
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }

    async fn page(
        &self,
        kind: QueryKind,
        position: Position,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let mut cursor = Cursor::decode(cursor);
        if cursor.is_done() {
            return Ok(Page::default());
        }

        let limit = self.config.page_size(limit);
        self.ctx
            .commits
            .mark_known(self.ctx.repository_id, &self.ctx.commit)
            .await;

        let targets = self.targets(position).await?;
        let mut builder = PageBuilder::new(self, kind, targets, limit);

        while !builder.is_full() && !cursor.is_done() {
            debug!(?cursor, gathered = builder.locations.len(), "Entering query phase");

            cursor = match cursor {
                Cursor::Local {
                    upload_index,
                    offset,
                } => {
                    let next = builder.local(upload_index, offset).await?;
                    if !builder.locations.is_empty() {
                        cursor = next;
                        break;
                    }
                    next
                }
                Cursor::Definitions { offset } => builder.definitions(offset).await?,
                Cursor::Remote {
                    moniker_index,
                    batch_index,
                    catalog_offset,
                    batch,
                    location_offset,
                } => {
                    let progress = RemoteProgress {
                        batch_index,
                        catalog_offset,
                        batch,
                        location_offset,
                    };
                    builder.remote(moniker_index, progress).await?
                }
                Cursor::Done => Cursor::Done,
            };
        }

        builder.finish(cursor).await
    }

    async fn definitions_at(&self, position: Position) -> Result<Vec<AdjustedLocation>> {
        let targets = self.targets(position).await?;
        let index = self.collaborators.index.as_ref();
        let mut dumps = DumpCache::new(self.ctx.uploads.iter().cloned());

        for (dump, path, position) in &targets {
            let (locations, _) = index
                .locations_at(
                    ResultKind::Definitions,
                    dump.id,
                    path,
                    *position,
                    self.config.definitions_limit,
                    0,
                )
                .await?;

            if !locations.is_empty() {
                debug!(upload = %dump.id, count = locations.len(), "Found local definitions");
                return self.present(&mut dumps, &locations).await;
            }
        }

        let monikers = ordered_monikers(index, &targets, REFERENCE_KINDS).await?;
        if monikers.is_empty() {
            return Ok(Vec::new());
        }

        let mut live = Vec::new();
        for dump in self.collaborators.catalog.definition_dumps(&monikers).await? {
            if live_commit(&self.ctx.commits, &dump).await {
                live.push(dump);
            }
        }
        if live.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<UploadId> = live.iter().map(|dump| dump.id).collect();
        let plain: Vec<Moniker> = monikers.into_iter().map(|q| q.moniker).collect();
        let (locations, _) = index
            .bulk_moniker_results(
                ResultKind::Definitions,
                &ids,
                &plain,
                self.config.definitions_limit,
                0,
            )
            .await?;

        dumps.extend(live);
        self.present(&mut dumps, &locations).await
    }

    /// Translate the request into each visible upload's coordinates.
    ///
    /// Uploads the position cannot be mapped into are skipped.
    async fn targets(&self, position: Position) -> Result<Vec<Target>> {
        let mut targets = Vec::with_capacity(self.ctx.uploads.len());

        for dump in &self.ctx.uploads {
            let adjusted = self
                .collaborators
                .adjuster
                .adjust_position(
                    self.ctx.repository_id,
                    &self.ctx.commit,
                    &dump.commit,
                    &self.ctx.path,
                    position,
                )
                .await?;

            match adjusted {
                Some(adjusted) => targets.push((
                    dump.clone(),
                    dump.path_in_bundle(&self.ctx.path).to_string(),
                    adjusted,
                )),
                None => {
                    debug!(upload = %dump.id, "Position has no counterpart in upload, skipping");
                }
            }
        }

        Ok(targets)
    }

    /// Adjust raw locations and drop what the actor may not read.
    async fn present(
        &self,
        dumps: &mut DumpCache,
        locations: &[Location],
    ) -> Result<Vec<AdjustedLocation>> {
        let ids: Vec<UploadId> = locations.iter().map(|l| l.upload_id).collect();
        dumps
            .resolve(self.collaborators.catalog.as_ref(), &ids)
            .await?;

        let adjusted = adjust_locations(
            self.collaborators.adjuster.as_ref(),
            self.ctx.viewed(),
            dumps,
            locations,
        )
        .await?;

        filter_by_permissions(
            self.collaborators.permissions.as_ref(),
            self.ctx.actor,
            adjusted,
        )
        .await
    }
}

/// Accumulates one page of a paginated query.
struct PageBuilder<'r> {
    resolver: &'r QueryResolver,
    kind: QueryKind,
    targets: Vec<Target>,
    limit: usize,
    locations: Vec<Location>,
    dumps: DumpCache,
    definition_monikers: Option<Vec<QualifiedMoniker>>,
    definition_dumps: Option<Vec<Dump>>,
    remote_monikers: Option<Vec<QualifiedMoniker>>,
}

impl<'r> PageBuilder<'r> {
    fn new(
        resolver: &'r QueryResolver,
        kind: QueryKind,
        targets: Vec<Target>,
        limit: usize,
    ) -> Self {
        Self {
            resolver,
            kind,
            targets,
            limit,
            locations: Vec::new(),
            dumps: DumpCache::new(resolver.ctx.uploads.iter().cloned()),
            definition_monikers: None,
            definition_dumps: None,
            remote_monikers: None,
        }
    }

    fn is_full(&self) -> bool {
        self.locations.len() >= self.limit
    }

    fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.locations.len())
    }

    fn index(&self) -> &'r dyn IndexStore {
        self.resolver.collaborators.index.as_ref()
    }

    fn catalog(&self) -> &'r dyn CatalogStore {
        self.resolver.collaborators.catalog.as_ref()
    }

    /// Read visible uploads starting at `upload_index`, `offset`.
    async fn local(&mut self, upload_index: usize, offset: usize) -> Result<Cursor> {
        let mut upload_index = upload_index;
        let mut offset = offset;

        while upload_index < self.targets.len() {
            if self.is_full() {
                return Ok(Cursor::Local {
                    upload_index,
                    offset,
                });
            }

            let remaining = self.remaining();
            let (dump, path, position) = &self.targets[upload_index];
            let (found, total) = self
                .index()
                .locations_at(self.kind.results, dump.id, path, *position, remaining, offset)
                .await?;

            let returned = found.len();
            let taken = returned.min(remaining);
            self.locations.extend(found.into_iter().take(taken));

            let Some(next) = offset.checked_add(taken) else {
                warn!(
                    upload = %dump.id,
                    offset,
                    "Location offset overflowed, skipping rest of upload"
                );
                upload_index += 1;
                offset = 0;
                continue;
            };
            offset = next;

            if returned == 0 || (taken == returned && offset >= total) {
                upload_index += 1;
                offset = 0;
            }
        }

        Ok(Cursor::Definitions { offset: 0 })
    }

    /// Read uploads defining the query's monikers starting at `offset`.
    async fn definitions(&mut self, offset: usize) -> Result<Cursor> {
        let monikers = self.definition_monikers().await?;
        if monikers.is_empty() {
            return Ok(Cursor::remote_start(0));
        }

        let visible: HashSet<UploadId> =
            self.resolver.ctx.uploads.iter().map(|dump| dump.id).collect();
        let mut live = Vec::new();
        for dump in self.definition_dumps().await? {
            if self.kind.disjoint_phases && visible.contains(&dump.id) {
                continue;
            }
            if live_commit(&self.resolver.ctx.commits, &dump).await {
                live.push(dump);
            }
        }
        if live.is_empty() {
            return Ok(Cursor::remote_start(0));
        }

        let ids: Vec<UploadId> = live.iter().map(|dump| dump.id).collect();
        let plain: Vec<Moniker> = monikers.into_iter().map(|q| q.moniker).collect();
        self.dumps.extend(live);

        let mut offset = offset;
        loop {
            if self.is_full() {
                return Ok(Cursor::Definitions { offset });
            }

            let remaining = self.remaining();
            let (found, total) = self
                .index()
                .bulk_moniker_results(self.kind.definition_results, &ids, &plain, remaining, offset)
                .await?;

            let returned = found.len();
            let taken = returned.min(remaining);
            self.locations.extend(found.into_iter().take(taken));

            let Some(next) = offset.checked_add(taken) else {
                warn!(offset, "Definition offset overflowed, moving on to remote uploads");
                return Ok(Cursor::remote_start(0));
            };
            offset = next;

            if returned == 0 || (taken == returned && offset >= total) {
                return Ok(Cursor::remote_start(0));
            }
        }
    }

    /// Read uploads referencing the query's monikers' packages.
    async fn remote(&mut self, moniker_index: usize, progress: RemoteProgress) -> Result<Cursor> {
        let monikers = self.remote_monikers().await?;
        if moniker_index >= monikers.len() {
            return Ok(Cursor::Done);
        }

        let resolver = self.resolver;
        let mut ignored: HashSet<UploadId> =
            resolver.ctx.uploads.iter().map(|dump| dump.id).collect();
        if self.kind.disjoint_phases {
            let definition_monikers = self.definition_monikers().await?;
            if !definition_monikers.is_empty() {
                ignored.extend(self.definition_dumps().await?.iter().map(|dump| dump.id));
            }
        }

        let config = &resolver.config;
        let search = RemoteSearch::new(
            self.index(),
            self.catalog(),
            &resolver.ctx.commits,
            self.kind.results,
            &ignored,
            config.maximum_indexes_per_moniker_search,
            config.remote_concurrency,
        );

        let mut moniker_index = moniker_index;
        let mut progress = progress;
        while moniker_index < monikers.len() {
            if self.is_full() {
                return Ok(remote_cursor(moniker_index, progress));
            }

            let results = search
                .search(&monikers[moniker_index], progress, self.remaining())
                .await?;
            self.locations.extend(results.locations);
            self.dumps.extend(results.dumps);

            match results.next {
                Some(next) => progress = next,
                None => {
                    moniker_index += 1;
                    progress = RemoteProgress::start();
                }
            }
        }

        Ok(Cursor::Done)
    }

    async fn definition_monikers(&mut self) -> Result<Vec<QualifiedMoniker>> {
        if let Some(monikers) = &self.definition_monikers {
            return Ok(monikers.clone());
        }

        let monikers =
            ordered_monikers(self.index(), &self.targets, self.kind.definition_monikers).await?;
        self.definition_monikers = Some(monikers.clone());
        Ok(monikers)
    }

    async fn definition_dumps(&mut self) -> Result<Vec<Dump>> {
        if let Some(dumps) = &self.definition_dumps {
            return Ok(dumps.clone());
        }

        let monikers = self.definition_monikers().await?;
        let dumps = self.catalog().definition_dumps(&monikers).await?;
        debug!(count = dumps.len(), "Resolved definition uploads");
        self.definition_dumps = Some(dumps.clone());
        Ok(dumps)
    }

    async fn remote_monikers(&mut self) -> Result<Vec<QualifiedMoniker>> {
        if self.kind.remote_monikers == self.kind.definition_monikers {
            return self.definition_monikers().await;
        }

        if let Some(monikers) = &self.remote_monikers {
            return Ok(monikers.clone());
        }

        let monikers =
            ordered_monikers(self.index(), &self.targets, self.kind.remote_monikers).await?;
        self.remote_monikers = Some(monikers.clone());
        Ok(monikers)
    }

    async fn finish(mut self, cursor: Cursor) -> Result<Page> {
        let candidates = self.locations.len();
        let locations = self.resolver.present(&mut self.dumps, &self.locations).await?;

        debug!(
            candidates,
            returned = locations.len(),
            done = cursor.is_done(),
            "Assembled page"
        );

        Ok(Page {
            locations,
            cursor: cursor.encode(),
            candidates,
        })
    }
}

fn remote_cursor(moniker_index: usize, progress: RemoteProgress) -> Cursor {
    Cursor::Remote {
        moniker_index,
        batch_index: progress.batch_index,
        catalog_offset: progress.catalog_offset,
        batch: progress.batch,
        location_offset: progress.location_offset,
    }
}
