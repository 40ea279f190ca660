//! Refscope - cross-repository symbol reference resolution.
//!
//! Given a position in a file at some commit, refscope finds the
//! implementations, references and definitions of the symbol there by reading
//! precomputed code-intelligence indexes ("uploads"). It searches the uploads
//! covering the file first and falls back to uploads in other repositories
//! that reference the symbol's package. Every result is translated to the
//! commit being viewed and filtered by the caller's read permissions.
//!
//! Storage, version control and authorization are reached through the
//! collaborator traits in [`store`]. The entry point is
//! [`resolver::QueryResolver`].

#![forbid(unsafe_code)]

pub mod adjust;
pub mod commit_cache;
pub mod config;
pub mod cursor;
pub mod dumps;
pub mod error;
pub mod monikers;
pub mod remote;
pub mod resolver;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use commit_cache::CommitCache;
pub use config::ResolverConfig;
pub use error::{Error, Result};
pub use resolver::{Collaborators, Page, QueryResolver, ResolverContext};
