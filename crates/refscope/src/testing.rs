//! Scripted fake collaborators for tests.
//!
//! Each fake exposes one [`Script`] per trait method. A script answers calls
//! from a queue of pushed return values first and falls back to a default
//! hook once the queue is empty. Every call's arguments are recorded so tests
//! can assert on call order and call counts.
//!
//! # Availability
//!
//! This module is available when:
//! - Running tests (`#[cfg(test)]`)
//! - The `test-util` feature is enabled
//!
//! # Example
//!
//! ```rust,ignore
//! use refscope::testing::FakeIndexStore;
//! use refscope::types::{Location, Range};
//!
//! let index = FakeIndexStore::new();
//! index
//!     .locations_at
//!     .push_return(Ok((vec![Location::new(51, "a.go", Range::default())], 1)));
//!
//! // ... run a query ...
//!
//! assert_eq!(index.locations_at.history().len(), 1);
//! ```

use crate::error::Result;
use crate::store::{
    CatalogStore, CommitOracle, IndexStore, PackageReferenceScanner, PermissionChecker,
    PositionAdjuster, SliceScanner,
};
use crate::types::{
    Actor, Dump, Location, Moniker, Package, PackageInformation, Perms, Position,
    QualifiedMoniker, Range, RepositoryId, ResultKind, UploadId,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

type Hook<A, R> = Box<dyn Fn(&A) -> R + Send + Sync>;

struct ScriptState<A, R> {
    returns: VecDeque<R>,
    default: Hook<A, R>,
    history: Vec<A>,
}

/// Queued return values, a default hook, and a call log for one method.
pub struct Script<A, R> {
    state: Mutex<ScriptState<A, R>>,
}

impl<A: Clone, R> Script<A, R> {
    /// Create a script answering with `default` when nothing is queued.
    pub fn new(default: impl Fn(&A) -> R + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                returns: VecDeque::new(),
                default: Box::new(default),
                history: Vec::new(),
            }),
        }
    }

    /// Queue a return value for the next unanswered call.
    pub fn push_return(&self, value: R) {
        self.lock().returns.push_back(value);
    }

    /// Replace the default hook used once the queue is empty.
    pub fn set_default_hook(&self, hook: impl Fn(&A) -> R + Send + Sync + 'static) {
        self.lock().default = Box::new(hook);
    }

    /// Arguments of every call so far, in call order.
    pub fn history(&self) -> Vec<A> {
        self.lock().history.clone()
    }

    /// Record a call and produce its answer.
    pub fn call(&self, args: A) -> R {
        let mut state = self.lock();
        let value = match state.returns.pop_front() {
            Some(value) => value,
            None => (state.default)(&args),
        };
        state.history.push(args);
        value
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState<A, R>> {
        self.state.lock().expect("script lock poisoned")
    }
}

// ============================================================================
// Index store
// ============================================================================

/// Arguments of an [`IndexStore::locations_at`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationsAtCall {
    /// Result family
    pub kind: ResultKind,
    /// Upload queried
    pub upload_id: UploadId,
    /// Path inside the upload
    pub path: String,
    /// Position inside the upload's commit
    pub position: Position,
    /// Page size
    pub limit: usize,
    /// Page offset
    pub offset: usize,
}

/// Arguments of an [`IndexStore::monikers_at`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonikersAtCall {
    /// Upload queried
    pub upload_id: UploadId,
    /// Path inside the upload
    pub path: String,
    /// Position inside the upload's commit
    pub position: Position,
}

/// Arguments of an [`IndexStore::package_information`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInformationCall {
    /// Upload queried
    pub upload_id: UploadId,
    /// Path inside the upload
    pub path: String,
    /// Package information reference
    pub package_information_id: String,
}

/// Arguments of an [`IndexStore::bulk_moniker_results`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkMonikerCall {
    /// Result family
    pub kind: ResultKind,
    /// Uploads searched
    pub upload_ids: Vec<UploadId>,
    /// Monikers searched
    pub monikers: Vec<Moniker>,
    /// Page size
    pub limit: usize,
    /// Page offset
    pub offset: usize,
}

/// Scripted [`IndexStore`]. Defaults answer "nothing found".
pub struct FakeIndexStore {
    /// Script for [`IndexStore::locations_at`]
    pub locations_at: Script<LocationsAtCall, Result<(Vec<Location>, usize)>>,
    /// Script for [`IndexStore::monikers_at`]
    pub monikers_at: Script<MonikersAtCall, Result<Vec<Moniker>>>,
    /// Script for [`IndexStore::package_information`]
    pub package_information: Script<PackageInformationCall, Result<Option<PackageInformation>>>,
    /// Script for [`IndexStore::bulk_moniker_results`]
    pub bulk_moniker_results: Script<BulkMonikerCall, Result<(Vec<Location>, usize)>>,
}

impl FakeIndexStore {
    /// Create a fake with empty default answers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locations_at: Script::new(|_| Ok((Vec::new(), 0))),
            monikers_at: Script::new(|_| Ok(Vec::new())),
            package_information: Script::new(|_| Ok(None)),
            bulk_moniker_results: Script::new(|_| Ok((Vec::new(), 0))),
        }
    }
}

impl Default for FakeIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexStore for FakeIndexStore {
    async fn locations_at(
        &self,
        kind: ResultKind,
        upload_id: UploadId,
        path: &str,
        position: Position,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Location>, usize)> {
        self.locations_at.call(LocationsAtCall {
            kind,
            upload_id,
            path: path.to_string(),
            position,
            limit,
            offset,
        })
    }

    async fn monikers_at(
        &self,
        upload_id: UploadId,
        path: &str,
        position: Position,
    ) -> Result<Vec<Moniker>> {
        self.monikers_at.call(MonikersAtCall {
            upload_id,
            path: path.to_string(),
            position,
        })
    }

    async fn package_information(
        &self,
        upload_id: UploadId,
        path: &str,
        package_information_id: &str,
    ) -> Result<Option<PackageInformation>> {
        self.package_information.call(PackageInformationCall {
            upload_id,
            path: path.to_string(),
            package_information_id: package_information_id.to_string(),
        })
    }

    async fn bulk_moniker_results(
        &self,
        kind: ResultKind,
        upload_ids: &[UploadId],
        monikers: &[Moniker],
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Location>, usize)> {
        self.bulk_moniker_results.call(BulkMonikerCall {
            kind,
            upload_ids: upload_ids.to_vec(),
            monikers: monikers.to_vec(),
            limit,
            offset,
        })
    }
}

// ============================================================================
// Catalog store
// ============================================================================

/// Arguments of a [`CatalogStore::reference_ids_and_filters`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceIdsCall {
    /// Package searched
    pub package: Package,
    /// Page size
    pub limit: usize,
    /// Records skipped
    pub offset: usize,
}

/// Scripted [`CatalogStore`]. Defaults answer "nothing found".
pub struct FakeCatalogStore {
    /// Script for [`CatalogStore::dumps_by_ids`]
    pub dumps_by_ids: Script<Vec<UploadId>, Result<Vec<Dump>>>,
    /// Script for [`CatalogStore::definition_dumps`]
    pub definition_dumps: Script<Vec<QualifiedMoniker>, Result<Vec<Dump>>>,
    /// Script for [`CatalogStore::reference_ids_and_filters`]
    pub reference_ids_and_filters: Script<ReferenceIdsCall, Result<(SliceScanner, usize)>>,
}

impl FakeCatalogStore {
    /// Create a fake with empty default answers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dumps_by_ids: Script::new(|_| Ok(Vec::new())),
            definition_dumps: Script::new(|_| Ok(Vec::new())),
            reference_ids_and_filters: Script::new(|_| Ok((SliceScanner::empty(), 0))),
        }
    }
}

impl Default for FakeCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for FakeCatalogStore {
    async fn dumps_by_ids(&self, ids: &[UploadId]) -> Result<Vec<Dump>> {
        self.dumps_by_ids.call(ids.to_vec())
    }

    async fn definition_dumps(&self, monikers: &[QualifiedMoniker]) -> Result<Vec<Dump>> {
        self.definition_dumps.call(monikers.to_vec())
    }

    async fn reference_ids_and_filters(
        &self,
        package: &Package,
        limit: usize,
        offset: usize,
    ) -> Result<(Box<dyn PackageReferenceScanner>, usize)> {
        let (scanner, total) = self.reference_ids_and_filters.call(ReferenceIdsCall {
            package: package.clone(),
            limit,
            offset,
        })?;
        Ok((Box::new(scanner), total))
    }
}

// ============================================================================
// Commit oracle, adjuster, permissions
// ============================================================================

/// Scripted [`CommitOracle`]. Every commit exists by default.
pub struct FakeCommitOracle {
    /// Script for [`CommitOracle::commit_exists`]
    pub commit_exists: Script<(RepositoryId, String), Result<bool>>,
}

impl FakeCommitOracle {
    /// Create a fake where every commit exists.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commit_exists: Script::new(|_| Ok(true)),
        }
    }
}

impl Default for FakeCommitOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommitOracle for FakeCommitOracle {
    async fn commit_exists(&self, repository_id: RepositoryId, commit: &str) -> Result<bool> {
        self.commit_exists
            .call((repository_id, commit.to_string()))
    }
}

/// Arguments of a [`PositionAdjuster::adjust_range`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustRangeCall {
    /// Repository of the commits
    pub repository_id: RepositoryId,
    /// Commit the range is valid in
    pub from_commit: String,
    /// Commit to translate to
    pub to_commit: String,
    /// Repository-relative path
    pub path: String,
    /// Range to translate
    pub range: Range,
}

/// Arguments of a [`PositionAdjuster::adjust_position`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustPositionCall {
    /// Repository of the commits
    pub repository_id: RepositoryId,
    /// Commit the position is valid in
    pub from_commit: String,
    /// Commit to translate to
    pub to_commit: String,
    /// Repository-relative path
    pub path: String,
    /// Position to translate
    pub position: Position,
}

/// Scripted [`PositionAdjuster`]. Translates nothing by default.
pub struct FakeAdjuster {
    /// Script for [`PositionAdjuster::adjust_position`]
    pub adjust_position: Script<AdjustPositionCall, Result<Option<Position>>>,
    /// Script for [`PositionAdjuster::adjust_range`]
    pub adjust_range: Script<AdjustRangeCall, Result<Option<Range>>>,
}

impl FakeAdjuster {
    /// Create a fake returning every input unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adjust_position: Script::new(|call: &AdjustPositionCall| Ok(Some(call.position))),
            adjust_range: Script::new(|call: &AdjustRangeCall| Ok(Some(call.range))),
        }
    }
}

impl Default for FakeAdjuster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionAdjuster for FakeAdjuster {
    async fn adjust_position(
        &self,
        repository_id: RepositoryId,
        from_commit: &str,
        to_commit: &str,
        path: &str,
        position: Position,
    ) -> Result<Option<Position>> {
        self.adjust_position.call(AdjustPositionCall {
            repository_id,
            from_commit: from_commit.to_string(),
            to_commit: to_commit.to_string(),
            path: path.to_string(),
            position,
        })
    }

    async fn adjust_range(
        &self,
        repository_id: RepositoryId,
        from_commit: &str,
        to_commit: &str,
        path: &str,
        range: Range,
    ) -> Result<Option<Range>> {
        self.adjust_range.call(AdjustRangeCall {
            repository_id,
            from_commit: from_commit.to_string(),
            to_commit: to_commit.to_string(),
            path: path.to_string(),
            range,
        })
    }
}

/// Scripted [`PermissionChecker`]. Disabled and permissive by default.
pub struct FakePermissionChecker {
    enabled: bool,
    /// Script for [`PermissionChecker::permissions`]
    pub permissions: Script<(Actor, RepositoryId, String), Result<Perms>>,
}

impl FakePermissionChecker {
    /// A checker with path-level permissions turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            permissions: Script::new(|_| Ok(Perms::Read)),
        }
    }

    /// An enabled checker granting `Read` exactly where `allow` returns `true`.
    pub fn allowing(allow: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            enabled: true,
            permissions: Script::new(move |(_, _, path): &(Actor, RepositoryId, String)| {
                Ok(if allow(path) { Perms::Read } else { Perms::None })
            }),
        }
    }
}

impl Default for FakePermissionChecker {
    fn default() -> Self {
        Self::disabled()
    }
}

#[async_trait]
impl PermissionChecker for FakePermissionChecker {
    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn permissions(
        &self,
        actor: Actor,
        repository_id: RepositoryId,
        path: &str,
    ) -> Result<Perms> {
        self.permissions
            .call((actor, repository_id, path.to_string()))
    }
}
