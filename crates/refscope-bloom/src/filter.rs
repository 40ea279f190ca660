//! The candidate filter: a Bloom filter over symbol identifiers.
//!
//! Each package-reference record in the catalog carries one encoded filter
//! built from the identifiers its upload imports from that package. A search
//! for a moniker tests the moniker's identifier against the filter before
//! touching the upload's index:
//!
//! - a negative answer is definitive, the upload cannot contain the identifier
//! - a positive answer is only a hint and must be confirmed by a real lookup
//!
//! # Encoding
//!
//! Filters round-trip through [`CandidateFilter::to_bytes`] and
//! [`CandidateFilter::from_bytes`]. The payload is a small JSON document with
//! the bit count, hash count, encoded identifier count and the bit words.
//!
//! # Example
//!
//! ```
//! use refscope_bloom::CandidateFilter;
//!
//! let filter = CandidateFilter::create(["padLeft", "pad_left", "left_pad"]);
//! assert!(filter.test("padLeft"));
//!
//! let decoded = CandidateFilter::from_bytes(&filter.to_bytes()).unwrap();
//! assert_eq!(filter, decoded);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Default target false-positive rate for [`CandidateFilter::create`].
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Smallest bit vector ever allocated.
pub const MIN_BITS: u64 = 64;

/// Upper bound on the number of bit positions set per identifier.
pub const MAX_HASHES: u32 = 16;

const SEED_PRIMARY: u64 = 0x5bd1_e995_9e37_79b9;
const SEED_SECONDARY: u64 = 0xc2b2_ae3d_27d4_eb4f;

/// A probabilistic set of identifiers with no false negatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFilter {
    /// Number of addressable bits (always a multiple of 64).
    #[serde(rename = "m")]
    num_bits: u64,

    /// Number of bit positions per identifier.
    #[serde(rename = "k")]
    num_hashes: u32,

    /// Number of distinct identifiers encoded.
    #[serde(rename = "n")]
    count: u64,

    /// Bit storage, little-endian within each word.
    #[serde(rename = "b")]
    words: Vec<u64>,
}

impl CandidateFilter {
    /// Build a filter at the default false-positive rate.
    pub fn create<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(identifiers, DEFAULT_FALSE_POSITIVE_RATE)
    }

    /// Build a filter sized for the given false-positive rate.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRate` if `rate` is not strictly between 0 and 1.
    pub fn with_false_positive_rate<I, S>(identifiers: I, rate: f64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !(rate > 0.0 && rate < 1.0) {
            return Err(Error::InvalidRate(rate));
        }
        Ok(Self::build(identifiers, rate))
    }

    fn build<I, S>(identifiers: I, rate: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let identifiers: Vec<S> = identifiers.into_iter().collect();
        let distinct: HashSet<&str> = identifiers.iter().map(AsRef::as_ref).collect();

        let (num_bits, num_hashes) = parameters(distinct.len(), rate);
        let word_count = usize::try_from(num_bits / 64).unwrap_or(usize::MAX);
        let mut filter = Self {
            num_bits,
            num_hashes,
            count: distinct.len() as u64,
            words: vec![0; word_count],
        };

        for identifier in distinct {
            for bit in bit_positions(identifier, num_bits, num_hashes) {
                filter.set(bit);
            }
        }

        debug!(
            identifiers = filter.count,
            bits = num_bits,
            hashes = num_hashes,
            "Built candidate filter"
        );
        filter
    }

    /// Returns `false` only if `identifier` was never encoded.
    #[must_use]
    pub fn test(&self, identifier: &str) -> bool {
        if self.count == 0 {
            return false;
        }
        bit_positions(identifier, self.num_bits, self.num_hashes).all(|bit| self.get(bit))
    }

    /// Returns `true` if any of the identifiers may have been encoded.
    #[must_use]
    pub fn test_any<S: AsRef<str>>(&self, identifiers: &[S]) -> bool {
        identifiers.iter().any(|id| self.test(id.as_ref()))
    }

    /// Number of distinct identifiers encoded.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Returns `true` if no identifiers were encoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of bit positions per identifier.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Theoretical false-positive rate for the encoded identifier count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimated_false_positive_rate(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let k = f64::from(self.num_hashes);
        let exponent = -k * self.count as f64 / self.num_bits as f64;
        (1.0 - exponent.exp()).powf(k)
    }

    /// Encode the filter for storage alongside a package reference.
    ///
    /// # Panics
    ///
    /// Never in practice: every field is an integer or a `Vec<u64>`, which
    /// JSON always represents.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("candidate filter fields are plain integers")
    }

    /// Decode a filter produced by [`CandidateFilter::to_bytes`].
    ///
    /// # Errors
    ///
    /// - `Error::Decode` if the payload is not a filter document
    /// - `Error::Corrupt` if the parameters disagree with the bit storage
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let filter: Self = serde_json::from_slice(bytes)?;

        if filter.num_bits == 0 || filter.num_bits % 64 != 0 {
            return Err(Error::Corrupt(format!(
                "bit count {} is not a positive multiple of 64",
                filter.num_bits
            )));
        }
        if filter.words.len() as u64 != filter.num_bits / 64 {
            return Err(Error::Corrupt(format!(
                "expected {} words, found {}",
                filter.num_bits / 64,
                filter.words.len()
            )));
        }
        if !(1..=MAX_HASHES).contains(&filter.num_hashes) {
            return Err(Error::Corrupt(format!(
                "hash count {} out of range",
                filter.num_hashes
            )));
        }

        Ok(filter)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set(&mut self, bit: u64) {
        self.words[(bit / 64) as usize] |= 1 << (bit % 64);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn get(&self, bit: u64) -> bool {
        self.words[(bit / 64) as usize] & (1 << (bit % 64)) != 0
    }
}

/// Optimal bit and hash counts for `n` identifiers at rate `p`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn parameters(n: usize, p: f64) -> (u64, u32) {
    if n == 0 {
        return (MIN_BITS, 1);
    }

    let ln2 = std::f64::consts::LN_2;
    let n = n as f64;
    let bits = (-n * p.ln() / (ln2 * ln2)).ceil() as u64;
    let bits = bits.max(MIN_BITS).div_ceil(64) * 64;
    let hashes = ((bits as f64 / n) * ln2).round() as u32;

    (bits, hashes.clamp(1, MAX_HASHES))
}

/// Bit positions for an identifier, via double hashing.
fn bit_positions(identifier: &str, num_bits: u64, num_hashes: u32) -> impl Iterator<Item = u64> {
    let primary = xxh3_64_with_seed(identifier.as_bytes(), SEED_PRIMARY);
    let secondary = xxh3_64_with_seed(identifier.as_bytes(), SEED_SECONDARY) | 1;

    (0..u64::from(num_hashes))
        .map(move |i| primary.wrapping_add(i.wrapping_mul(secondary)) % num_bits)
}
