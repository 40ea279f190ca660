//! In-memory collaborators shared across integration tests.
//!
//! Unlike the scripted fakes in `refscope::testing`, these stores answer
//! from data tables, so a resolver can be driven through any number of
//! pages against one fixed world.

#![allow(dead_code)]

use async_trait::async_trait;
use refscope::Result;
use refscope::commit_cache::CommitCache;
use refscope::config::ResolverConfig;
use refscope::resolver::{Collaborators, QueryResolver, ResolverContext};
use refscope::store::{
    CatalogStore, CommitOracle, IndexStore, NoopAdjuster, PackageReferenceScanner,
    PermissionChecker, SliceScanner,
};
use refscope::types::{
    Actor, Dump, Location, Moniker, MonikerKind, Package, PackageInformation, PackageReference,
    Perms, Position, QualifiedMoniker, Range, RepositoryId, ResultKind, UploadId,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Route resolver logs to the test harness.
///
/// Controlled via `RUST_LOG`, e.g. `RUST_LOG=refscope=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("refscope=warn")),
        )
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Index data keyed by upload.
#[derive(Default)]
pub struct MemoryIndex {
    locations: HashMap<(UploadId, ResultKind), Vec<Location>>,
    monikers: HashMap<UploadId, Vec<Moniker>>,
    packages: HashMap<String, PackageInformation>,
    symbol_results: HashMap<(UploadId, ResultKind, String), Vec<Location>>,
}

fn page(locations: &[Location], limit: usize, offset: usize) -> (Vec<Location>, usize) {
    let served = locations.iter().skip(offset).take(limit).cloned().collect();
    (served, locations.len())
}

#[async_trait]
impl IndexStore for MemoryIndex {
    async fn locations_at(
        &self,
        kind: ResultKind,
        upload_id: UploadId,
        _path: &str,
        _position: Position,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Location>, usize)> {
        let locations = self
            .locations
            .get(&(upload_id, kind))
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(page(locations, limit, offset))
    }

    async fn monikers_at(
        &self,
        upload_id: UploadId,
        _path: &str,
        _position: Position,
    ) -> Result<Vec<Moniker>> {
        Ok(self.monikers.get(&upload_id).cloned().unwrap_or_default())
    }

    async fn package_information(
        &self,
        _upload_id: UploadId,
        _path: &str,
        package_information_id: &str,
    ) -> Result<Option<PackageInformation>> {
        Ok(self.packages.get(package_information_id).cloned())
    }

    async fn bulk_moniker_results(
        &self,
        kind: ResultKind,
        upload_ids: &[UploadId],
        monikers: &[Moniker],
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Location>, usize)> {
        let mut all = Vec::new();
        for &upload_id in upload_ids {
            for moniker in monikers {
                let key = (upload_id, kind, moniker.identifier.clone());
                if let Some(locations) = self.symbol_results.get(&key) {
                    all.extend(locations.iter().cloned());
                }
            }
        }
        Ok(page(&all, limit, offset))
    }
}

/// Upload catalog keyed by ID, defined identifier and package.
#[derive(Default)]
pub struct MemoryCatalog {
    dumps: HashMap<UploadId, Dump>,
    definers: HashMap<String, Vec<UploadId>>,
    references: HashMap<(String, String), Vec<PackageReference>>,
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn dumps_by_ids(&self, ids: &[UploadId]) -> Result<Vec<Dump>> {
        Ok(ids.iter().filter_map(|id| self.dumps.get(id).cloned()).collect())
    }

    async fn definition_dumps(&self, monikers: &[QualifiedMoniker]) -> Result<Vec<Dump>> {
        let mut seen = HashSet::new();
        let mut dumps = Vec::new();
        for qualified in monikers {
            let Some(ids) = self.definers.get(&qualified.moniker.identifier) else {
                continue;
            };
            for id in ids {
                if seen.insert(*id)
                    && let Some(dump) = self.dumps.get(id)
                {
                    dumps.push(dump.clone());
                }
            }
        }
        Ok(dumps)
    }

    async fn reference_ids_and_filters(
        &self,
        package: &Package,
        limit: usize,
        offset: usize,
    ) -> Result<(Box<dyn PackageReferenceScanner>, usize)> {
        let key = (package.name.clone(), package.version.clone());
        let records = self.references.get(&key).cloned().unwrap_or_default();
        let total = records.len();
        let served = records.into_iter().skip(offset).take(limit).collect();
        Ok((Box::new(SliceScanner::new(served)), total))
    }
}

/// Every commit exists except the listed ones.
#[derive(Default)]
pub struct MemoryCommits {
    missing: HashSet<String>,
}

#[async_trait]
impl CommitOracle for MemoryCommits {
    async fn commit_exists(&self, _repository_id: RepositoryId, commit: &str) -> Result<bool> {
        Ok(!self.missing.contains(commit))
    }
}

/// Grants read access to paths under the listed prefixes.
pub struct PrefixPermissions {
    prefixes: Vec<String>,
}

impl PrefixPermissions {
    pub fn new(prefixes: &[&str]) -> Self {
        Self {
            prefixes: prefixes.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    pub fn allows(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}

#[async_trait]
impl PermissionChecker for PrefixPermissions {
    fn enabled(&self) -> bool {
        true
    }

    async fn permissions(
        &self,
        _actor: Actor,
        _repository_id: RepositoryId,
        path: &str,
    ) -> Result<Perms> {
        Ok(if self.allows(path) {
            Perms::Read
        } else {
            Perms::None
        })
    }
}

/// Path-level permissions turned off.
pub struct Unrestricted;

#[async_trait]
impl PermissionChecker for Unrestricted {
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

/// A complete set of collaborators plus the viewed file.
pub struct World {
    pub index: MemoryIndex,
    pub catalog: MemoryCatalog,
    pub commits: MemoryCommits,
    pub visible: Vec<Dump>,
}

pub const VIEWED_REPOSITORY: RepositoryId = RepositoryId(1);
pub const VIEWED_COMMIT: &str = "c0";
pub const VIEWED_PATH: &str = "src/main.ts";

fn range(line: u32) -> Range {
    Range::new(line, 0, line, 8)
}

fn reference_record(upload_id: i64, identifiers: &[&str]) -> PackageReference {
    PackageReference {
        upload_id: UploadId(upload_id),
        package: Package {
            scheme: "tsc".to_string(),
            name: "leftpad".to_string(),
            version: "1.0.0".to_string(),
        },
        filter: ResolverConfig::default()
            .candidate_filter(identifiers.iter().copied())
            .unwrap()
            .to_bytes(),
    }
}

impl World {
    /// Uploads and indexes around a `pad_left` call in `src/main.ts`.
    ///
    /// - Visible uploads 1 (root `""`) and 2 (root `web/`) hold five local
    ///   references between them.
    /// - Upload 10 in repository 2 defines `pad_left` and references it
    ///   three times.
    /// - Uploads 20 to 27 reference the `leftpad` package, upload `n`
    ///   holding `n - 19` references. Upload 22's filter rules the
    ///   identifier out and upload 25 sits at a deleted commit, leaving 27
    ///   remote references.
    /// - The catalog also lists the visible and defining uploads, which
    ///   reference queries must skip.
    pub fn leftpad() -> Self {
        init_tracing();

        let mut index = MemoryIndex::default();
        let mut catalog = MemoryCatalog::default();
        let mut commits = MemoryCommits::default();

        let visible = vec![
            Dump::new(1, 1, VIEWED_COMMIT, ""),
            Dump::new(2, 1, VIEWED_COMMIT, "web/"),
        ];

        index.locations.insert(
            (UploadId(1), ResultKind::References),
            vec![
                Location::new(1, "src/main.ts", range(3)),
                Location::new(1, "src/util.ts", range(7)),
                Location::new(1, "test/main.test.ts", range(9)),
            ],
        );
        index.locations.insert(
            (UploadId(2), ResultKind::References),
            vec![
                Location::new(2, "app.ts", range(1)),
                Location::new(2, "app.ts", range(2)),
            ],
        );
        index.monikers.insert(
            UploadId(1),
            vec![Moniker::new(MonikerKind::Import, "tsc", "pad_left", Some("p1"))],
        );
        index
            .packages
            .insert("p1".to_string(), PackageInformation::new("leftpad", "1.0.0"));

        catalog.dumps.insert(UploadId(10), Dump::new(10, 2, "d10", ""));
        catalog
            .definers
            .insert("pad_left".to_string(), vec![UploadId(10)]);
        index.symbol_results.insert(
            (UploadId(10), ResultKind::References, "pad_left".to_string()),
            (1..=3)
                .map(|line| Location::new(10, "index.ts", range(line)))
                .collect(),
        );
        index.symbol_results.insert(
            (UploadId(10), ResultKind::Definitions, "pad_left".to_string()),
            vec![Location::new(10, "index.ts", range(1))],
        );

        let mut records = vec![
            reference_record(1, &["pad_left"]),
            reference_record(10, &["pad_left"]),
        ];
        for id in 20..=27_i64 {
            let repository = id - 17;
            let commit = format!("r{id}");
            catalog
                .dumps
                .insert(UploadId(id), Dump::new(id, repository, commit, ""));

            let identifiers: &[&str] = if id == 22 { &[] } else { &["pad_left", "pad_right"] };
            records.push(reference_record(id, identifiers));

            let count = u32::try_from(id - 19).unwrap_or_default();
            let locations = (1..=count)
                .map(|line| {
                    let dir = if line % 2 == 1 { "lib" } else { "test" };
                    Location::new(id, format!("{dir}/pad{id}.ts"), range(line))
                })
                .collect();
            index.symbol_results.insert(
                (UploadId(id), ResultKind::References, "pad_left".to_string()),
                locations,
            );
        }
        commits.missing.insert("r25".to_string());
        catalog
            .references
            .insert(("leftpad".to_string(), "1.0.0".to_string()), records);

        Self {
            index,
            catalog,
            commits,
            visible,
        }
    }

    /// Build a resolver over this world.
    pub fn resolver(
        self,
        actor: Actor,
        permissions: Arc<dyn PermissionChecker>,
        config: ResolverConfig,
    ) -> QueryResolver {
        let commits = CommitCache::new(Arc::new(self.commits));
        let ctx = ResolverContext::new(
            VIEWED_REPOSITORY,
            VIEWED_COMMIT,
            VIEWED_PATH,
            self.visible,
            commits,
        )
        .with_actor(actor);
        let collaborators = Collaborators {
            index: Arc::new(self.index),
            catalog: Arc::new(self.catalog),
            adjuster: Arc::new(NoopAdjuster),
            permissions,
        };
        QueryResolver::new(ctx, collaborators, config)
    }
}

/// A config with small catalog pages and windows, so short fixtures still
/// cross batch and window boundaries.
pub fn small_windows() -> ResolverConfig {
    ResolverConfig {
        maximum_indexes_per_moniker_search: 3,
        remote_concurrency: 2,
        ..ResolverConfig::default()
    }
}

/// Run `references` to exhaustion with page size `limit`.
pub async fn all_references(resolver: &QueryResolver, limit: usize) -> Vec<refscope::Page> {
    let mut pages = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = resolver
            .references(5, 10, limit, cursor.as_deref())
            .await
            .expect("references query failed");
        cursor.clone_from(&page.cursor);
        pages.push(page);
        if cursor.is_none() {
            return pages;
        }
    }
}
