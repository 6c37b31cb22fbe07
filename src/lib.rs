//! # svn-harvest - Incremental Subversion History Crawler
//!
//! Harvests the commit history of a Subversion repository and turns each
//! revision, and each path changed within it, into a record ready for a
//! search index.
//!
//! ## Overview
//!
//! A crawl narrows the requested revision range to one where the crawled path
//! actually exists, walks the log for that range, filters changed paths by
//! pattern and size, and fetches the content of what remains. Records carry
//! content-addressed ids, so crawling the same range twice is idempotent.
//!
//! ## Architecture
//!
//! ```text
//! ConnectorRegistry ──open──▶ Repository (svn CLI / in-memory)
//!                                  │
//!            ┌─────────────────────┼──────────────────────┐
//!            ▼                     ▼                      ▼
//!      range resolver        log enumeration       EntryFilter
//!                                  │                      │
//!                                  └──▶ mappers ◀─────────┘
//!                                          │
//!                                   Vec<Revision>
//!                                          │
//!                   River ──▶ IndexSink (bulk) ──▶ RevisionCheckpoint
//! ```
//!
//! ## Modules
//!
//! - [`repository`]: repository connectors and the scheme registry
//! - [`crawler`]: range resolution, filtering, mapping and the crawl driver
//! - [`sink`]: index actions and bulk submission
//! - [`river`]: polling scheduler with checkpointing
//! - [`checkpoint`]: persisted last-indexed revision per repository path
//! - [`lock`]: cross-process crawl locks
//! - [`config`]: TOML configuration with environment overrides
//! - [`types`]: data model and serialized record shapes
//! - [`error`]: error types
//! - [`paths`]: platform directories
//!
//! ## Usage Example
//!
//! ```no_run
//! use svn_harvest::crawler::Crawler;
//! use svn_harvest::repository::ConnectorRegistry;
//! use svn_harvest::types::{CrawlParameters, RepositoryAddress};
//! use tokio_util::sync::CancellationToken;
//!
//! fn main() -> anyhow::Result<()> {
//!     let crawler = Crawler::new(ConnectorRegistry::with_defaults());
//!     let address = RepositoryAddress::parse("file:///var/svn/repo")?;
//!     let params = CrawlParameters::new("/trunk").with_exclude_patterns(&[r".*\.jar"])?;
//!
//!     let outcome = crawler.crawl(&address, &params, &CancellationToken::new())?;
//!     for revision in &outcome.revisions {
//!         println!("r{}: {} documents", revision.revision, revision.documents.len());
//!     }
//!     Ok(())
//! }
//! ```

/// Persisted last indexed revision per repository path
pub mod checkpoint;

/// Configuration management with environment variable overrides
pub mod config;

/// History crawling: range resolution, filtering, mapping
pub mod crawler;

/// Error types and utilities
pub mod error;

/// Cross-process crawl locks
pub mod lock;

/// Platform-specific directories
pub mod paths;

/// Repository connectors
pub mod repository;

/// Polling scheduler feeding the sink
pub mod river;

/// Index actions and bulk submission
pub mod sink;

/// Data model and serialized record shapes
pub mod types;
