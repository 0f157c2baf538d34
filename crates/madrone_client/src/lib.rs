//! # MadroneDB Client
//!
//! Resilient session layer over a MadroneDB document cluster.
//!
//! This crate provides:
//! - A session registry handing out one cluster connection per client thread
//! - Transparent reconnect-and-retry for operations outside transactions
//! - Transaction begin/commit/rollback with pushed-down autocommit
//! - Collection handles that survive reconnection by re-resolving themselves
//! - Idempotent DDL (creates and drops converge under concurrency)
//! - Aggregated, cache-friendly collection statistics
//! - An encrypted in-process credential cache
//!
//! ## Architecture
//!
//! Every client thread owns one [`Session`], fetched from the
//! [`SessionRegistry`] by id. A session wraps exactly one cluster link and
//! serializes all traffic over it. Reconnection replaces the link without
//! changing the session's identity; [`Collection`] handles notice the new
//! link generation and re-resolve their references before the next
//! operation.
//!
//! ## Key Invariants
//!
//! - An operation is never retried inside an open transaction
//! - Batch writes are sent exactly once per chunk
//! - Cursors never outlive the link that produced them
//! - Every credential failure surfaces as the same authentication error
//! - Partially created collections are rolled back before the error returns

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod addr;
mod collection;
mod config;
mod credential;
mod error;
mod index;
mod registry;
mod session;
mod stats;

pub use addr::{AddressSet, MAX_ADDRESSES};
pub use collection::Collection;
pub use config::{ClientConfig, ConfigHandle};
pub use credential::CredentialCache;
pub use error::{Error, Result, AUTH_FORBIDDEN};
pub use index::equivalent_legacy_index;
pub use registry::{CollectionShare, SessionRegistry};
pub use session::{IsolationLevel, Session};
pub use stats::{CollectionStatistics, StatisticsBuilder, PAGE_SIZE_MAX, PAGE_SIZE_MIN};

pub use madrone_driver::{QueryOptions, SnapshotKind};
