//! Moniker resolution.
//!
//! Turns the raw monikers an index attaches to a position into
//! [`QualifiedMoniker`]s: monikers paired with the package they belong to.
//! Only qualified monikers can drive a cross-repository search, because the
//! catalog is keyed by package.

use crate::error::Result;
use crate::store::IndexStore;
use crate::types::{Dump, MonikerKind, Position, QualifiedMoniker};
use tracing::debug;

/// Moniker kinds naming the interface an implementation query starts from.
pub const IMPLEMENTATION_KINDS: &[MonikerKind] = &[MonikerKind::Implementation];

/// Moniker kinds other uploads implement against.
pub const EXPORT_KINDS: &[MonikerKind] = &[MonikerKind::Export];

/// Moniker kinds that identify the symbol a reference or definition query
/// starts from.
pub const REFERENCE_KINDS: &[MonikerKind] = &[MonikerKind::Import, MonikerKind::Export];

/// Qualified monikers at `position` in one upload.
///
/// Keeps monikers whose kind is in `kinds`, in the order the index store
/// returns them. Monikers without package information are dropped. A
/// moniker naming the same symbol in the same package as an earlier one is
/// dropped too.
///
/// `path` is relative to the upload's root.
///
/// # Errors
///
/// Returns any error reported by the index store.
pub async fn monikers_at(
    index: &dyn IndexStore,
    dump: &Dump,
    path: &str,
    position: Position,
    kinds: &[MonikerKind],
) -> Result<Vec<QualifiedMoniker>> {
    let mut qualified = Vec::new();
    extend_monikers(index, dump, path, position, kinds, &mut qualified).await?;
    Ok(qualified)
}

/// Qualified monikers across several uploads, in upload order.
///
/// Each entry pairs an upload with the path and position to query inside
/// it. Duplicates across uploads collapse to their first occurrence.
///
/// # Errors
///
/// Returns any error reported by the index store.
pub async fn ordered_monikers(
    index: &dyn IndexStore,
    targets: &[(Dump, String, Position)],
    kinds: &[MonikerKind],
) -> Result<Vec<QualifiedMoniker>> {
    let mut qualified = Vec::new();
    for (dump, path, position) in targets {
        extend_monikers(index, dump, path, *position, kinds, &mut qualified).await?;
    }

    debug!(count = qualified.len(), "Resolved qualified monikers");
    Ok(qualified)
}

async fn extend_monikers(
    index: &dyn IndexStore,
    dump: &Dump,
    path: &str,
    position: Position,
    kinds: &[MonikerKind],
    qualified: &mut Vec<QualifiedMoniker>,
) -> Result<()> {
    let monikers = index.monikers_at(dump.id, path, position).await?;

    for moniker in monikers {
        if !kinds.contains(&moniker.kind) {
            continue;
        }

        let Some(package_information_id) = moniker.package_information_id.as_deref() else {
            continue;
        };

        let Some(package_information) = index
            .package_information(dump.id, path, package_information_id)
            .await?
        else {
            debug!(
                upload = %dump.id,
                identifier = %moniker.identifier,
                "Moniker has no package information"
            );
            continue;
        };

        let candidate = QualifiedMoniker {
            moniker,
            package_information,
        };
        if !qualified.iter().any(|seen| seen.is_same_symbol(&candidate)) {
            qualified.push(candidate);
        }
    }

    Ok(())
}
