//! Location adjustment and permission filtering.
//!
//! Raw locations are valid at the commit their upload indexed. Before a
//! caller sees them they are:
//!
//! 1. rewritten to repository-relative paths (`dump.root + path`)
//! 2. translated to the commit being viewed, when both share a repository
//! 3. filtered down to paths the actor may read
//!
//! Each step preserves the order of its input.

use crate::dumps::DumpCache;
use crate::error::Result;
use crate::store::{PermissionChecker, PositionAdjuster};
use crate::types::{Actor, AdjustedLocation, Dump, Location, RepositoryId};
use tracing::{debug, warn};

/// The commit results are translated into.
#[derive(Debug, Clone, Copy)]
pub struct ViewedCommit<'a> {
    /// Repository being viewed
    pub repository_id: RepositoryId,
    /// Commit being viewed
    pub commit: &'a str,
}

/// Translate one location from its dump's commit to the viewed commit.
///
/// Locations in another repository have no diff to apply and keep the
/// indexed commit and range. Returns `None` if the adjuster cannot map the
/// range, in which case the location must not be shown.
///
/// # Errors
///
/// Returns any error reported by the position adjuster.
pub async fn adjust_location(
    adjuster: &dyn PositionAdjuster,
    viewed: ViewedCommit<'_>,
    dump: &Dump,
    location: &Location,
) -> Result<Option<AdjustedLocation>> {
    let path = dump.repository_path(&location.path);

    if dump.repository_id != viewed.repository_id {
        return Ok(Some(AdjustedLocation {
            dump: dump.clone(),
            path,
            adjusted_commit: dump.commit.clone(),
            adjusted_range: location.range,
        }));
    }

    let Some(adjusted_range) = adjuster
        .adjust_range(
            viewed.repository_id,
            &dump.commit,
            viewed.commit,
            &path,
            location.range,
        )
        .await?
    else {
        debug!(upload = %dump.id, path = %path, "Dropping location without counterpart at viewed commit");
        return Ok(None);
    };

    Ok(Some(AdjustedLocation {
        dump: dump.clone(),
        path,
        adjusted_commit: viewed.commit.to_string(),
        adjusted_range,
    }))
}

/// Adjust every location whose dump is known, in order.
///
/// Locations whose upload is missing from `dumps` are dropped with a
/// warning.
///
/// # Errors
///
/// Returns any error reported by the position adjuster.
pub async fn adjust_locations(
    adjuster: &dyn PositionAdjuster,
    viewed: ViewedCommit<'_>,
    dumps: &DumpCache,
    locations: &[Location],
) -> Result<Vec<AdjustedLocation>> {
    let mut adjusted = Vec::with_capacity(locations.len());

    for location in locations {
        let Some(dump) = dumps.get(location.upload_id) else {
            warn!(upload = %location.upload_id, path = %location.path, "Dropping location from unknown dump");
            continue;
        };

        if let Some(location) = adjust_location(adjuster, viewed, dump, location).await? {
            adjusted.push(location);
        }
    }

    Ok(adjusted)
}

/// Keep the locations `actor` may read, in their original order.
///
/// When the checker is disabled every location is kept. When it is enabled,
/// anonymous actors see nothing.
///
/// # Errors
///
/// Returns any error reported by the permission checker.
pub async fn filter_by_permissions(
    checker: &dyn PermissionChecker,
    actor: Actor,
    locations: Vec<AdjustedLocation>,
) -> Result<Vec<AdjustedLocation>> {
    if !checker.enabled() {
        return Ok(locations);
    }

    if !actor.is_authenticated() {
        debug!(count = locations.len(), "Anonymous actor, hiding permission-checked locations");
        return Ok(Vec::new());
    }

    let mut permitted = Vec::with_capacity(locations.len());
    for location in locations {
        let perms = checker
            .permissions(actor, location.dump.repository_id, &location.path)
            .await?;
        if perms.can_read() {
            permitted.push(location);
        }
    }

    Ok(permitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{FakeAdjuster, FakePermissionChecker};
    use crate::store::{AllowAll, NoopAdjuster};
    use crate::types::Range;

    const VIEWED: ViewedCommit<'static> = ViewedCommit {
        repository_id: RepositoryId(42),
        commit: "deadbeef",
    };

    fn adjusted(path: &str) -> AdjustedLocation {
        AdjustedLocation {
            dump: Dump::new(51, 42, "deadbeef", "sub2/"),
            path: path.to_string(),
            adjusted_commit: "deadbeef".to_string(),
            adjusted_range: Range::new(1, 2, 3, 4),
        }
    }

    #[tokio::test]
    async fn test_same_repository_is_translated_to_viewed_commit() {
        let adjuster = FakeAdjuster::new();
        adjuster
            .adjust_range
            .push_return(Ok(Some(Range::new(11, 12, 13, 14))));
        let dump = Dump::new(51, 42, "cafebabe", "sub2/");
        let location = Location::new(51, "a.go", Range::new(1, 2, 3, 4));

        let result = adjust_location(&adjuster, VIEWED, &dump, &location)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.path, "sub2/a.go");
        assert_eq!(result.adjusted_commit, "deadbeef");
        assert_eq!(result.adjusted_range, Range::new(11, 12, 13, 14));

        let calls = adjuster.adjust_range.history();
        assert_eq!(calls[0].from_commit, "cafebabe");
        assert_eq!(calls[0].to_commit, "deadbeef");
        assert_eq!(calls[0].path, "sub2/a.go");
    }

    #[tokio::test]
    async fn test_other_repository_keeps_indexed_commit() {
        let adjuster = FakeAdjuster::new();
        let dump = Dump::new(250, 7, "feedface", "lib/");
        let location = Location::new(250, "pad.ts", Range::new(5, 0, 5, 7));

        let result = adjust_location(&adjuster, VIEWED, &dump, &location)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.path, "lib/pad.ts");
        assert_eq!(result.adjusted_commit, "feedface");
        assert_eq!(result.adjusted_range, Range::new(5, 0, 5, 7));
        assert!(adjuster.adjust_range.history().is_empty());
    }

    #[tokio::test]
    async fn test_unmappable_and_unknown_locations_are_dropped() {
        let adjuster = FakeAdjuster::new();
        adjuster.adjust_range.push_return(Ok(None));
        let dumps = DumpCache::new([Dump::new(51, 42, "deadbeef", "sub2/")]);
        let locations = vec![
            Location::new(51, "gone.go", Range::new(1, 0, 1, 1)),
            Location::new(99, "orphan.go", Range::new(1, 0, 1, 1)),
            Location::new(51, "kept.go", Range::new(2, 0, 2, 1)),
        ];

        let result = adjust_locations(&adjuster, VIEWED, &dumps, &locations)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].path, "sub2/kept.go");
    }

    #[tokio::test]
    async fn test_adjuster_errors_propagate() {
        let adjuster = FakeAdjuster::new();
        adjuster
            .adjust_range
            .push_return(Err(Error::Adjuster("diff unavailable".to_string())));
        let dumps = DumpCache::new([Dump::new(51, 42, "deadbeef", "sub2/")]);
        let locations = vec![Location::new(51, "a.go", Range::default())];

        let result = adjust_locations(&adjuster, VIEWED, &dumps, &locations).await;

        assert!(matches!(result, Err(Error::Adjuster(_))));
    }

    #[tokio::test]
    async fn test_noop_adjuster_keeps_everything() {
        let dumps = DumpCache::new([Dump::new(51, 42, "deadbeef", "sub2/")]);
        let locations = vec![Location::new(51, "a.go", Range::new(1, 2, 3, 4))];

        let result = adjust_locations(&NoopAdjuster, VIEWED, &dumps, &locations)
            .await
            .unwrap();

        assert_eq!(result, vec![adjusted("sub2/a.go")]);
    }

    #[tokio::test]
    async fn test_permission_filter_is_stable_subsequence() {
        let checker = FakePermissionChecker::allowing(|path| path.ends_with("a.go"));
        let locations = vec![
            adjusted("sub2/a.go"),
            adjusted("sub2/b.go"),
            adjusted("sub3/a.go"),
            adjusted("sub2/c.go"),
        ];

        let result = filter_by_permissions(&checker, Actor::user(1), locations)
            .await
            .unwrap();

        let paths: Vec<_> = result.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["sub2/a.go", "sub3/a.go"]);
        assert_eq!(checker.permissions.history()[0].1, RepositoryId(42));
    }

    #[tokio::test]
    async fn test_disabled_checker_skips_lookups() {
        let checker = FakePermissionChecker::disabled();
        let locations = vec![adjusted("sub2/a.go")];

        let result = filter_by_permissions(&checker, Actor::anonymous(), locations.clone())
            .await
            .unwrap();

        assert_eq!(result, locations);
        assert!(checker.permissions.history().is_empty());

        let result = filter_by_permissions(&AllowAll, Actor::anonymous(), locations.clone())
            .await
            .unwrap();
        assert_eq!(result, locations);
    }

    #[tokio::test]
    async fn test_anonymous_actor_sees_nothing_when_enabled() {
        let checker = FakePermissionChecker::allowing(|_| true);

        let result = filter_by_permissions(&checker, Actor::anonymous(), vec![adjusted("sub2/a.go")])
            .await
            .unwrap();

        assert!(result.is_empty());
        assert!(checker.permissions.history().is_empty());
    }
}
