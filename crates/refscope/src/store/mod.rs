//! Collaborator abstractions consumed by the resolver.
//!
//! The resolver never talks to a database, a git server or an authorization
//! service directly. Each external capability is one async trait:
//!
//! - [`IndexStore`]: precomputed index data for a single upload, plus bulk
//!   moniker lookups across uploads
//! - [`CatalogStore`]: which uploads exist and which packages they reference
//! - [`CommitOracle`]: whether a commit still exists in its repository
//! - [`PositionAdjuster`]: diff-based translation between commits
//! - [`PermissionChecker`]: path-level read authorization
//!
//! All traits are object-safe and `Send + Sync` so a resolver can hold them as
//! `Arc<dyn Trait>` and share them across concurrent batch lookups.
//!
//! # Error Handling
//!
//! Implementations report failures through the matching [`Error`] variant
//! (`Error::IndexStore`, `Error::Catalog`, ...). The resolver propagates them
//! unchanged. "Not found" answers are expressed in the return type (`None`,
//! `false`, empty vectors) and never as errors.
//!
//! [`Error`]: crate::error::Error

use crate::error::Result;
use crate::types::{
    Actor, Dump, Location, Moniker, Package, PackageInformation, PackageReference, Perms,
    Position, QualifiedMoniker, Range, RepositoryId, ResultKind, UploadId,
};
use async_trait::async_trait;

mod scanner;

pub use scanner::SliceScanner;

/// Read access to precomputed index data.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Locations of the given kind for the symbol at `position`.
    ///
    /// `path` is relative to the upload's root. Returns one page of at most
    /// `limit` locations starting at `offset`, and the total number of
    /// locations available.
    async fn locations_at(
        &self,
        kind: ResultKind,
        upload_id: UploadId,
        path: &str,
        position: Position,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Location>, usize)>;

    /// Monikers attached to the ranges enclosing `position`, innermost first.
    async fn monikers_at(
        &self,
        upload_id: UploadId,
        path: &str,
        position: Position,
    ) -> Result<Vec<Moniker>>;

    /// Package information referenced by a moniker.
    ///
    /// Returns `None` if the upload has no such package information.
    async fn package_information(
        &self,
        upload_id: UploadId,
        path: &str,
        package_information_id: &str,
    ) -> Result<Option<PackageInformation>>;

    /// Locations of the given kind for any of `monikers` across `upload_ids`.
    ///
    /// Returns one page of at most `limit` locations starting at `offset`,
    /// and the total number of locations available across all uploads.
    async fn bulk_moniker_results(
        &self,
        kind: ResultKind,
        upload_ids: &[UploadId],
        monikers: &[Moniker],
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Location>, usize)>;
}

/// Forward-only access to package reference records.
///
/// Callers request batches until an empty batch signals exhaustion. Asking
/// again after exhaustion keeps returning empty batches.
#[async_trait]
pub trait PackageReferenceScanner: Send {
    /// Return up to `max` further records, or an empty vector when exhausted.
    async fn next_batch(&mut self, max: usize) -> Result<Vec<PackageReference>>;
}

/// The catalog of uploads and their package references.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Dump records for the given IDs. Unknown IDs are omitted.
    async fn dumps_by_ids(&self, ids: &[UploadId]) -> Result<Vec<Dump>>;

    /// Uploads that define (export) any of the given monikers.
    async fn definition_dumps(&self, monikers: &[QualifiedMoniker]) -> Result<Vec<Dump>>;

    /// Package references to `package`, skipping the first `offset` records
    /// and yielding at most `limit`.
    ///
    /// Also returns the total number of matching records, independent of
    /// `limit` and `offset`.
    async fn reference_ids_and_filters(
        &self,
        package: &Package,
        limit: usize,
        offset: usize,
    ) -> Result<(Box<dyn PackageReferenceScanner>, usize)>;
}

/// Answers whether a commit still exists.
#[async_trait]
pub trait CommitOracle: Send + Sync {
    /// Returns `true` if `commit` is still reachable in `repository_id`.
    async fn commit_exists(&self, repository_id: RepositoryId, commit: &str) -> Result<bool>;
}

/// Translates coordinates between two commits of one repository.
#[async_trait]
pub trait PositionAdjuster: Send + Sync {
    /// Map `position` in `path` from `from_commit` to `to_commit`.
    ///
    /// Returns `None` if the position has no counterpart (e.g. the file or
    /// line was deleted).
    async fn adjust_position(
        &self,
        repository_id: RepositoryId,
        from_commit: &str,
        to_commit: &str,
        path: &str,
        position: Position,
    ) -> Result<Option<Position>>;

    /// Map `range` in `path` from `from_commit` to `to_commit`.
    async fn adjust_range(
        &self,
        repository_id: RepositoryId,
        from_commit: &str,
        to_commit: &str,
        path: &str,
        range: Range,
    ) -> Result<Option<Range>>;
}

/// Path-level authorization.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Returns `false` if path-level permissions are not configured, in which
    /// case every path is readable.
    fn enabled(&self) -> bool;

    /// Permissions of `actor` on `path` in `repository_id`.
    async fn permissions(
        &self,
        actor: Actor,
        repository_id: RepositoryId,
        path: &str,
    ) -> Result<Perms>;
}

/// A [`PositionAdjuster`] for callers viewing exactly the indexed commits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdjuster;

#[async_trait]
impl PositionAdjuster for NoopAdjuster {
    async fn adjust_position(
        &self,
        _repository_id: RepositoryId,
        _from_commit: &str,
        _to_commit: &str,
        _path: &str,
        position: Position,
    ) -> Result<Option<Position>> {
        Ok(Some(position))
    }

    async fn adjust_range(
        &self,
        _repository_id: RepositoryId,
        _from_commit: &str,
        _to_commit: &str,
        _path: &str,
        range: Range,
    ) -> Result<Option<Range>> {
        Ok(Some(range))
    }
}

/// A [`PermissionChecker`] with path-level permissions disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PermissionChecker for AllowAll {
    fn enabled(&self) -> bool {
        false
    }

    async fn permissions(
        &self,
        _actor: Actor,
        _repository_id: RepositoryId,
        _path: &str,
    ) -> Result<Perms> {
        Ok(Perms::Read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_adjuster_is_identity() {
        let adjuster: Box<dyn PositionAdjuster> = Box::new(NoopAdjuster);
        let range = Range::new(1, 2, 3, 4);

        let adjusted = adjuster
            .adjust_range(RepositoryId(42), "a", "b", "x.go", range)
            .await
            .unwrap();
        assert_eq!(adjusted, Some(range));

        let position = adjuster
            .adjust_position(RepositoryId(42), "a", "b", "x.go", Position::new(10, 20))
            .await
            .unwrap();
        assert_eq!(position, Some(Position::new(10, 20)));
    }

    #[tokio::test]
    async fn test_allow_all_is_disabled_and_permissive() {
        let checker: Box<dyn PermissionChecker> = Box::new(AllowAll);

        assert!(!checker.enabled());
        let perms = checker
            .permissions(Actor::anonymous(), RepositoryId(1), "secret/x.go")
            .await
            .unwrap();
        assert!(perms.can_read());
    }
}
