//! Pagination cursors.
//!
//! A cursor records where the next page of a query starts. Callers see it
//! only as an opaque string: URL-safe base64 over a JSON rendering of
//! [`Cursor`]. Nothing in the string is meaningful outside this crate and
//! its shape may change between versions.
//!
//! Decoding is lenient. A cursor that fails to decode (truncated, tampered,
//! or from an older version) restarts the query from the beginning instead
//! of failing it. So does a cursor holding a position past `i64::MAX`, which
//! no store can serve.

use crate::types::UploadId;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Position of a paginated query in its phase sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum Cursor {
    /// Searching the visible uploads' own indexes.
    Local {
        /// Index into the visible upload list
        upload_index: usize,
        /// Location offset within that upload
        offset: usize,
    },

    /// Searching uploads that define the query's monikers.
    Definitions {
        /// Location offset across all definition uploads
        offset: usize,
    },

    /// Searching uploads that reference the query's monikers' packages.
    Remote {
        /// Index into the ordered qualified monikers
        moniker_index: usize,
        /// Number of batches fully consumed for this moniker
        batch_index: usize,
        /// Catalog offset after `batch`, or `None` once the catalog is exhausted
        catalog_offset: Option<usize>,
        /// Upload IDs of the batch being consumed
        batch: Vec<UploadId>,
        /// Location offset within `batch`
        location_offset: usize,
    },

    /// Nothing left to return.
    Done,
}

impl Cursor {
    /// The cursor of a fresh query.
    #[must_use]
    pub fn start() -> Self {
        Self::Local {
            upload_index: 0,
            offset: 0,
        }
    }

    /// The first cursor of the remote search for moniker `moniker_index`.
    #[must_use]
    pub fn remote_start(moniker_index: usize) -> Self {
        Self::Remote {
            moniker_index,
            batch_index: 0,
            catalog_offset: Some(0),
            batch: Vec::new(),
            location_offset: 0,
        }
    }

    /// Returns `true` if no further page exists.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Render the cursor for a caller. `Done` renders as `None`.
    #[must_use]
    pub fn encode(&self) -> Option<String> {
        if self.is_done() {
            return None;
        }

        match serde_json::to_vec(self) {
            Ok(json) => Some(URL_SAFE_NO_PAD.encode(json)),
            Err(e) => {
                warn!(error = %e, "Failed to serialize cursor, ending pagination");
                None
            }
        }
    }

    /// Parse a caller-supplied cursor. Absent and malformed cursors both
    /// yield [`Cursor::start`].
    #[must_use]
    pub fn decode(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
            return Self::start();
        };

        match Self::try_decode(raw) {
            Some(cursor) => cursor,
            None => {
                warn!(cursor = raw, "Ignoring malformed cursor, restarting query");
                Self::start()
            }
        }
    }

    fn try_decode(raw: &str) -> Option<Self> {
        let json = URL_SAFE_NO_PAD.decode(raw).ok()?;
        let cursor: Self = serde_json::from_slice(&json).ok()?;
        cursor.in_bounds().then_some(cursor)
    }

    /// Returns `true` if every index and offset fits in an `i64`.
    fn in_bounds(&self) -> bool {
        let fits = |value: usize| i64::try_from(value).is_ok();
        match self {
            Self::Local {
                upload_index,
                offset,
            } => fits(*upload_index) && fits(*offset),
            Self::Definitions { offset } => fits(*offset),
            Self::Remote {
                moniker_index,
                batch_index,
                catalog_offset,
                location_offset,
                ..
            } => {
                fits(*moniker_index)
                    && fits(*batch_index)
                    && catalog_offset.is_none_or(fits)
                    && fits(*location_offset)
            }
            Self::Done => true,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::start()
    }
}
