//! Domain types for cross-repository reference resolution.
//!
//! These types represent the core domain model:
//! - **Catalog entities**: `Dump`, `PackageReference`
//! - **Index data**: `Location`, `Moniker`, `PackageInformation`
//! - **Results**: `AdjustedLocation`
//!
//! Everything here is plain value data. A query owns what it produces and
//! nothing outlives the query that created it.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Strongly-typed ID wrappers
// ============================================================================

/// A strongly-typed upload (dump) ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(pub i64);

impl UploadId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for UploadId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strongly-typed repository ID.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RepositoryId(pub i64);

impl RepositoryId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for RepositoryId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Catalog entities
// ============================================================================

/// An immutable, precomputed index for one root of one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dump {
    /// Upload identifier
    pub id: UploadId,

    /// Repository the indexed commit belongs to
    pub repository_id: RepositoryId,

    /// Indexed commit (content hash)
    pub commit: String,

    /// Directory prefix of the indexed root, with a trailing slash (or empty)
    pub root: String,
}

impl Dump {
    /// Create a dump record.
    pub fn new(
        id: i64,
        repository_id: i64,
        commit: impl Into<String>,
        root: impl Into<String>,
    ) -> Self {
        Self {
            id: UploadId(id),
            repository_id: RepositoryId(repository_id),
            commit: commit.into(),
            root: root.into(),
        }
    }

    /// Translate a repository-relative path into a path inside this dump.
    ///
    /// Paths outside the root are returned unchanged.
    #[must_use]
    pub fn path_in_bundle<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(self.root.as_str()).unwrap_or(path)
    }

    /// Translate a path inside this dump into a repository-relative path.
    #[must_use]
    pub fn repository_path(&self, path: &str) -> String {
        format!("{}{}", self.root, path)
    }
}

/// Identity of an external package: the catalog key for package references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    /// Moniker scheme (e.g. `tsc`, `gomod`)
    pub scheme: String,

    /// Package name
    pub name: String,

    /// Package version
    pub version: String,
}

/// A catalog record asserting that an upload may reference a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReference {
    /// The upload holding the reference
    pub upload_id: UploadId,

    /// The referenced package
    pub package: Package,

    /// Encoded candidate filter over the identifiers the upload uses
    pub filter: Vec<u8>,
}

// ============================================================================
// Index data
// ============================================================================

/// A zero-based position inside a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Zero-based line
    pub line: u32,

    /// Zero-based UTF-16 character offset
    pub character: u32,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A span inside a file: `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    /// First position covered by the range
    pub start: Position,

    /// First position past the range
    pub end: Position,
}

impl Range {
    /// Create a range from its corners.
    #[must_use]
    pub fn new(start_line: u32, start_character: u32, end_line: u32, end_character: u32) -> Self {
        Self {
            start: Position::new(start_line, start_character),
            end: Position::new(end_line, end_character),
        }
    }
}

/// A raw search result, always scoped to one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Upload the result was found in
    pub upload_id: UploadId,

    /// Path relative to the upload's root
    pub path: String,

    /// Range at the upload's commit
    pub range: Range,
}

impl Location {
    /// Create a location.
    pub fn new(upload_id: i64, path: impl Into<String>, range: Range) -> Self {
        Self {
            upload_id: UploadId(upload_id),
            path: path.into(),
            range,
        }
    }
}

/// A result translated into the coordinate space of the viewed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustedLocation {
    /// The upload the result came from
    pub dump: Dump,

    /// Repository-relative path (`dump.root` + raw path)
    pub path: String,

    /// Commit the range is valid in
    pub adjusted_commit: String,

    /// Range valid at `adjusted_commit`
    pub adjusted_range: Range,
}

/// The role a moniker plays for its symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonikerKind {
    /// Symbol defined elsewhere and used here
    Import,

    /// Symbol defined here and visible outside
    Export,

    /// Symbol implementing an interface defined elsewhere
    Implementation,

    /// Symbol not visible outside its upload
    Local,
}

impl fmt::Display for MonikerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Import => write!(f, "import"),
            Self::Export => write!(f, "export"),
            Self::Implementation => write!(f, "implementation"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// A symbol's externally visible, scheme-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Moniker {
    /// Role of the moniker
    pub kind: MonikerKind,

    /// Naming scheme
    pub scheme: String,

    /// Identifier within the scheme
    pub identifier: String,

    /// Index-local reference to the moniker's package information
    pub package_information_id: Option<String>,
}

impl Moniker {
    /// Create a moniker.
    pub fn new(
        kind: MonikerKind,
        scheme: impl Into<String>,
        identifier: impl Into<String>,
        package_information_id: Option<&str>,
    ) -> Self {
        Self {
            kind,
            scheme: scheme.into(),
            identifier: identifier.into(),
            package_information_id: package_information_id.map(str::to_string),
        }
    }

    /// Returns `true` if both monikers name the same symbol, whatever their kind.
    #[must_use]
    pub fn is_candidate_equivalent(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.identifier == other.identifier
    }
}

/// The package a moniker belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageInformation {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,
}

impl PackageInformation {
    /// Create package information.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A moniker paired with the package it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedMoniker {
    /// The moniker
    pub moniker: Moniker,

    /// Its package
    pub package_information: PackageInformation,
}

impl QualifiedMoniker {
    /// The catalog key for this moniker's package.
    #[must_use]
    pub fn package(&self) -> Package {
        Package {
            scheme: self.moniker.scheme.clone(),
            name: self.package_information.name.clone(),
            version: self.package_information.version.clone(),
        }
    }

    /// Returns `true` if both name the same symbol in the same package.
    #[must_use]
    pub fn is_same_symbol(&self, other: &Self) -> bool {
        self.moniker.is_candidate_equivalent(&other.moniker)
            && self.package_information == other.package_information
    }
}

/// Which family of index results a lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Definition ranges
    Definitions,

    /// Reference ranges
    References,

    /// Implementation ranges
    Implementations,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definitions => write!(f, "definitions"),
            Self::References => write!(f, "references"),
            Self::Implementations => write!(f, "implementations"),
        }
    }
}

// ============================================================================
// Authorization
// ============================================================================

/// The user a query runs on behalf of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Actor {
    /// User ID, or `None` for anonymous requests
    pub uid: Option<i32>,
}

impl Actor {
    /// An authenticated user.
    #[must_use]
    pub fn user(uid: i32) -> Self {
        Self { uid: Some(uid) }
    }

    /// An anonymous request.
    #[must_use]
    pub fn anonymous() -> Self {
        Self { uid: None }
    }

    /// Returns `true` if the actor is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.uid.is_some()
    }
}

/// Path-level permission granted to an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Perms {
    /// No access
    None,

    /// Read access
    Read,

    /// Read and write access
    Write,
}

impl Perms {
    /// Returns `true` if these permissions allow reading.
    #[must_use]
    pub fn can_read(self) -> bool {
        self >= Self::Read
    }
}
