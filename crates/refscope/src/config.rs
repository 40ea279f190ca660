//! Resolver configuration.
//!
//! Configuration is plain YAML with kebab-case keys. Every field has a
//! default, so an empty file (or no file at all) yields a usable config:
//!
//! ```yaml
//! default-page-size: 100
//! maximum-indexes-per-moniker-search: 500
//! remote-concurrency: 4
//! definitions-limit: 100
//! query-timeout-ms: 30000
//! bloom-false-positive-rate: 0.01
//! ```

use crate::error::{Error, Result};
use refscope_bloom::CandidateFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Page size used when a caller asks for `limit == 0`
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Candidate uploads examined per moniker per catalog page
pub const DEFAULT_MAXIMUM_INDEXES_PER_MONIKER_SEARCH: usize = 500;

/// Remote batches fetched concurrently
pub const DEFAULT_REMOTE_CONCURRENCY: usize = 4;

/// Locations fetched from definition uploads when resolving definitions
pub const DEFAULT_DEFINITIONS_LIMIT: usize = 100;

/// Target false-positive rate for candidate filters built with this config
pub const DEFAULT_BLOOM_FALSE_POSITIVE_RATE: f64 = refscope_bloom::DEFAULT_FALSE_POSITIVE_RATE;

/// Tunables for a [`QueryResolver`](crate::resolver::QueryResolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Page size used when the caller passes a zero limit
    pub default_page_size: usize,

    /// Catalog page size for package reference scans
    pub maximum_indexes_per_moniker_search: usize,

    /// Upper bound on concurrently fetched remote batches
    pub remote_concurrency: usize,

    /// Result window for `definitions` lookups against definition uploads
    pub definitions_limit: usize,

    /// Deadline for one query, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_timeout_ms: Option<u64>,

    /// False-positive target for filters built by catalog writers
    pub bloom_false_positive_rate: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            maximum_indexes_per_moniker_search: DEFAULT_MAXIMUM_INDEXES_PER_MONIKER_SEARCH,
            remote_concurrency: DEFAULT_REMOTE_CONCURRENCY,
            definitions_limit: DEFAULT_DEFINITIONS_LIMIT,
            query_timeout_ms: None,
            bloom_false_positive_rate: DEFAULT_BLOOM_FALSE_POSITIVE_RATE,
        }
    }
}

impl ResolverConfig {
    /// Load configuration from a YAML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// it is not valid YAML or fails [`validate`](Self::validate).
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if serialization fails and `Error::Io` if the
    /// file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Check that every field is within its allowed range.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            return Err(Error::Config(
                "default-page-size must be at least 1".to_string(),
            ));
        }

        if self.maximum_indexes_per_moniker_search == 0 {
            return Err(Error::Config(
                "maximum-indexes-per-moniker-search must be at least 1".to_string(),
            ));
        }

        if self.remote_concurrency == 0 {
            return Err(Error::Config(
                "remote-concurrency must be at least 1".to_string(),
            ));
        }

        if self.definitions_limit == 0 {
            return Err(Error::Config(
                "definitions-limit must be at least 1".to_string(),
            ));
        }

        if self.query_timeout_ms == Some(0) {
            return Err(Error::Config(
                "query-timeout-ms must be positive when set".to_string(),
            ));
        }

        let rate = self.bloom_false_positive_rate;
        if !(rate > 0.0 && rate < 1.0) {
            return Err(Error::Config(format!(
                "bloom-false-positive-rate must be in (0, 1), got {rate}"
            )));
        }

        Ok(())
    }

    /// The per-query deadline, if one is configured.
    #[must_use]
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Build the candidate filter stored with a package reference, sized for
    /// `bloom_false_positive_rate`.
    ///
    /// Catalog writers call this so that every filter a resolver later tests
    /// honors the configured rate.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configured rate is outside `(0, 1)`.
    pub fn candidate_filter<I, S>(&self, identifiers: I) -> Result<CandidateFilter>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CandidateFilter::with_false_positive_rate(identifiers, self.bloom_false_positive_rate)
            .map_err(|e| Error::Config(format!("bloom-false-positive-rate: {e}")))
    }

    /// Resolve a caller-supplied page size.
    #[must_use]
    pub fn page_size(&self, limit: usize) -> usize {
        if limit == 0 {
            self.default_page_size
        } else {
            limit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = ResolverConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.default_page_size, 100);
        assert_eq!(config.remote_concurrency, 4);
        assert_eq!(config.query_timeout(), None);
    }

    #[test]
    fn test_page_size_substitutes_default_for_zero() {
        let config = ResolverConfig::default();

        assert_eq!(config.page_size(0), 100);
        assert_eq!(config.page_size(7), 7);
    }

    #[rstest]
    #[case::zero_page_size("default-page-size: 0", "default-page-size")]
    #[case::zero_concurrency("remote-concurrency: 0", "remote-concurrency")]
    #[case::zero_search_limit(
        "maximum-indexes-per-moniker-search: 0",
        "maximum-indexes-per-moniker-search"
    )]
    #[case::zero_timeout("query-timeout-ms: 0", "query-timeout-ms")]
    #[case::rate_too_high("bloom-false-positive-rate: 1.0", "bloom-false-positive-rate")]
    #[case::rate_zero("bloom-false-positive-rate: 0.0", "bloom-false-positive-rate")]
    fn test_validate_rejects(#[case] yaml: &str, #[case] field: &str) {
        let config: ResolverConfig = serde_yaml::from_str(yaml).unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(field), "unexpected error: {err}");
    }

    #[test]
    fn test_candidate_filter_uses_configured_rate() {
        let identifiers: Vec<String> = (0..200).map(|i| format!("ident-{i}")).collect();
        let strict = ResolverConfig::default();
        let loose = ResolverConfig {
            bloom_false_positive_rate: 0.2,
            ..ResolverConfig::default()
        };

        let strict_filter = strict.candidate_filter(&identifiers).unwrap();
        let loose_filter = loose.candidate_filter(&identifiers).unwrap();

        assert_eq!(strict_filter, CandidateFilter::create(&identifiers));
        assert!(loose_filter.num_bits() < strict_filter.num_bits());
        assert!(identifiers.iter().all(|id| loose_filter.test(id)));
    }

    #[test]
    fn test_candidate_filter_rejects_invalid_rate() {
        let config = ResolverConfig {
            bloom_false_positive_rate: 1.5,
            ..ResolverConfig::default()
        };

        let err = config.candidate_filter(["pad_left"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("bloom-false-positive-rate"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: ResolverConfig =
            serde_yaml::from_str("remote-concurrency: 8\nquery-timeout-ms: 2500").unwrap();

        assert_eq!(config.remote_concurrency, 8);
        assert_eq!(config.query_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result: std::result::Result<ResolverConfig, _> =
            serde_yaml::from_str("remote_concurrency: 8");

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("refscope.yaml");

        let original = ResolverConfig {
            remote_concurrency: 2,
            query_timeout_ms: Some(5000),
            ..ResolverConfig::default()
        };
        original.save(&config_path).await.unwrap();

        let loaded = ResolverConfig::load(&config_path).await.unwrap();
        assert_eq!(original, loaded);

        let content = tokio::fs::read_to_string(&config_path).await.unwrap();
        assert!(content.contains("remote-concurrency: 2"));
        assert!(content.contains("query-timeout-ms: 5000"));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("refscope.yaml");
        tokio::fs::write(&config_path, "remote-concurrency: 0\n")
            .await
            .unwrap();

        let result = ResolverConfig::load(&config_path).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();

        let result = ResolverConfig::load(&temp_dir.path().join("missing.yaml")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
