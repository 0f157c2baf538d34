//! Cluster protocol driver seam for MadroneDB.
//!
//! This crate defines the narrow surface the session layer speaks to a
//! MadroneDB cluster through, plus an in-memory cluster that implements it
//! for tests and benches:
//!
//! - [`ClusterDriver`] opens [`ClusterLink`]s (one per session).
//! - [`ClusterLink`] carries connection lifecycle, session attributes,
//!   transactions, and namespace/collection management.
//! - [`CollectionRef`] carries the per-collection data and index operations
//!   and is only valid for the link generation it was resolved under.
//! - [`Cursor`] streams result documents and reports exhaustion through the
//!   [`StatusCode::EndOfData`] status.
//!
//! Errors are carried as [`DriverError`], a status code plus the server
//! message. The session layer classifies these codes; the driver never
//! retries or reconnects on its own.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
pub mod fields;
mod memory;
mod types;

pub use connection::{ClusterDriver, ClusterLink, CollectionRef, Cursor};
pub use error::{DriverError, DriverResult, StatusCode};
pub use memory::{MemoryCluster, MemoryDriver, Op};
pub use types::{Credentials, QueryOptions, SnapshotKind};
