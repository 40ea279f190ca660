//! Candidate filters for cross-repository symbol search.
//!
//! A [`CandidateFilter`] is a Bloom filter over symbol identifiers. It answers
//! "could this upload reference identifier X?" with no false negatives and a
//! bounded false-positive rate, which lets a search skip uploads that provably
//! cannot match before paying for an index lookup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod filter;

pub use error::{Error, Result};
pub use filter::{CandidateFilter, DEFAULT_FALSE_POSITIVE_RATE};
