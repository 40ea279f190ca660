//! Per-query memoization of commit existence.
//!
//! A remote search may check the same commit many times: several candidate
//! uploads often share a commit, and definition and reference searches see
//! overlapping uploads. [`CommitCache`] asks the [`CommitOracle`] once per
//! `(repository, commit)` pair and remembers the answer.
//!
//! The cache lives exactly as long as one query. Repositories change over
//! time, so existence answers are never shared between queries; each
//! [`QueryResolver`](crate::resolver::QueryResolver) owns a fresh instance.

use crate::error::Result;
use crate::store::CommitOracle;
use crate::types::RepositoryId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Memoizes [`CommitOracle::commit_exists`] for the lifetime of one query.
pub struct CommitCache {
    oracle: Arc<dyn CommitOracle>,
    known: Mutex<HashMap<(RepositoryId, String), bool>>,
}

impl CommitCache {
    /// Create an empty cache in front of `oracle`.
    #[must_use]
    pub fn new(oracle: Arc<dyn CommitOracle>) -> Self {
        Self {
            oracle,
            known: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `commit` exists in `repository_id`.
    ///
    /// Oracle failures are returned to the caller and are not cached, so a
    /// later check of the same pair asks the oracle again.
    ///
    /// # Errors
    ///
    /// Returns whatever error the oracle reports.
    pub async fn exists(&self, repository_id: RepositoryId, commit: &str) -> Result<bool> {
        let key = (repository_id, commit.to_string());
        if let Some(&exists) = self.known.lock().await.get(&key) {
            return Ok(exists);
        }

        // The lock is not held across the oracle call; two concurrent checks
        // for one pair may both ask, and both record the same answer.
        let exists = self.oracle.commit_exists(repository_id, commit).await?;
        debug!(repository = %repository_id, commit, exists, "Resolved commit existence");

        self.known.lock().await.insert(key, exists);
        Ok(exists)
    }

    /// Record a commit known to exist without asking the oracle.
    pub async fn mark_known(&self, repository_id: RepositoryId, commit: &str) {
        self.known
            .lock()
            .await
            .insert((repository_id, commit.to_string()), true);
    }

    /// Number of memoized pairs.
    pub async fn len(&self) -> usize {
        self.known.lock().await.len()
    }

    /// Returns `true` if nothing has been memoized yet.
    pub async fn is_empty(&self) -> bool {
        self.known.lock().await.is_empty()
    }
}

impl std::fmt::Debug for CommitCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitCache").finish_non_exhaustive()
    }
}
