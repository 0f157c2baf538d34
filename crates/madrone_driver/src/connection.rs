//! Cluster driver trait definitions.

use crate::error::DriverResult;
use crate::types::{Credentials, QueryOptions, SnapshotKind};
use bson::Document;
use uuid::Uuid;

/// Factory for physical cluster links.
///
/// One driver instance serves the whole process; every session asks it for
/// its own exclusively-owned link.
pub trait ClusterDriver: Send + Sync {
    /// Opens a new, not-yet-connected link.
    fn open_link(&self) -> Box<dyn ClusterLink>;
}

/// One physical connection to the cluster.
///
/// The session layer treats the protocol behind this trait as a black box and
/// interprets nothing but the returned [`StatusCode`](crate::StatusCode)s.
///
/// # Invariants
///
/// - `connect` on an already-connected link re-dials and stamps a fresh
///   generation; it never reuses the previous physical connection
/// - every successful `connect` changes `generation()`
/// - collection references obtained through `get_collection` are bound to the
///   generation active at resolve time and report `NotConnected` once the
///   link reconnects or drops
/// - a link is owned by exactly one session and is never shared
pub trait ClusterLink: Send {
    /// Dials the given endpoints and authenticates.
    ///
    /// # Errors
    ///
    /// Returns `NetworkUnreachable` when no endpoint accepts the connection,
    /// a credential-class code when authentication is rejected, and
    /// `InvalidArgument` for an empty endpoint list.
    fn connect(&mut self, endpoints: &[String], credentials: &Credentials) -> DriverResult<()>;

    /// Tears the physical connection down. Safe to call when not connected.
    fn disconnect(&mut self);

    /// Whether the link currently holds a live connection.
    fn is_connected(&self) -> bool;

    /// Generation stamp of the current physical connection.
    ///
    /// Nil until the first successful `connect`; replaced on every later one.
    fn generation(&self) -> Uuid;

    /// Merges the given attributes into the server-side session.
    fn set_session_attributes(&mut self, attributes: &Document) -> DriverResult<()>;

    /// Asks the server to interrupt whatever this link is executing.
    fn interrupt(&mut self) -> DriverResult<()>;

    /// Fetches the server's detail object for the last failed operation.
    fn last_error_detail(&mut self) -> DriverResult<Option<Document>>;

    /// Opens an engine-level snapshot cursor.
    fn snapshot(
        &mut self,
        kind: SnapshotKind,
        condition: &Document,
    ) -> DriverResult<Box<dyn Cursor>>;

    /// Begins a cluster transaction on this link.
    fn begin_transaction(&mut self) -> DriverResult<()>;

    /// Commits the open transaction; `hint` may be empty.
    fn commit_transaction(&mut self, hint: &Document) -> DriverResult<()>;

    /// Rolls the open transaction back.
    fn rollback_transaction(&mut self) -> DriverResult<()>;

    /// Checks that the namespace exists.
    ///
    /// # Errors
    ///
    /// Returns `NamespaceNotFound` when it does not.
    fn get_namespace(&mut self, namespace: &str) -> DriverResult<()>;

    /// Creates a namespace with the given options.
    fn create_namespace(&mut self, namespace: &str, options: &Document) -> DriverResult<()>;

    /// Drops a namespace and every collection in it.
    fn drop_namespace(&mut self, namespace: &str) -> DriverResult<()>;

    /// Resolves a collection reference bound to the current generation.
    fn get_collection(
        &mut self,
        namespace: &str,
        collection: &str,
    ) -> DriverResult<Box<dyn CollectionRef>>;

    /// Creates a collection with the given options.
    fn create_collection(
        &mut self,
        namespace: &str,
        collection: &str,
        options: &Document,
    ) -> DriverResult<()>;

    /// Renames a collection within its namespace.
    fn rename_collection(&mut self, namespace: &str, from: &str, to: &str) -> DriverResult<()>;

    /// Drops a collection.
    fn drop_collection(&mut self, namespace: &str, collection: &str) -> DriverResult<()>;
}

/// A resolved reference to one collection, bound to a link generation.
pub trait CollectionRef: Send {
    /// Opens a query cursor.
    fn query(
        &mut self,
        condition: &Document,
        options: &QueryOptions,
    ) -> DriverResult<Box<dyn Cursor>>;

    /// Opens a cursor that removes each document as it is returned.
    fn query_and_remove(
        &mut self,
        condition: &Document,
        options: &QueryOptions,
    ) -> DriverResult<Box<dyn Cursor>>;

    /// Inserts a single document.
    fn insert(&mut self, document: &Document) -> DriverResult<()>;

    /// Inserts a batch of documents in one round trip.
    fn insert_many(
        &mut self,
        documents: &[Document],
        replace_on_duplicate: bool,
    ) -> DriverResult<()>;

    /// Updates matching documents, inserting when nothing matches.
    fn upsert(&mut self, rule: &Document, condition: &Document, hint: &Document)
        -> DriverResult<()>;

    /// Updates matching documents.
    fn update(&mut self, rule: &Document, condition: &Document, hint: &Document)
        -> DriverResult<()>;

    /// Deletes matching documents.
    fn delete(&mut self, condition: &Document, hint: &Document) -> DriverResult<()>;

    /// Counts matching documents.
    fn count(&mut self, condition: &Document) -> DriverResult<i64>;

    /// Creates an index from a bare key pattern.
    fn create_index(
        &mut self,
        key_pattern: &Document,
        name: &str,
        unique: bool,
        enforced: bool,
    ) -> DriverResult<()>;

    /// Creates an index from a key pattern plus an options document.
    fn create_index_with_options(
        &mut self,
        key_pattern: &Document,
        name: &str,
        options: &Document,
    ) -> DriverResult<()>;

    /// Fetches the descriptor of the named index.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` when no index carries this name.
    fn get_index(&mut self, name: &str) -> DriverResult<Document>;

    /// Opens a cursor over all index descriptors.
    fn list_indexes(&mut self) -> DriverResult<Box<dyn Cursor>>;

    /// Drops the named index.
    fn drop_index(&mut self, name: &str) -> DriverResult<()>;

    /// Removes every document, keeping the collection and its indexes.
    fn truncate(&mut self) -> DriverResult<()>;

    /// Alters collection attributes.
    fn set_attributes(&mut self, options: &Document) -> DriverResult<()>;

    /// Attaches an auto-increment sequence to a field.
    fn create_autoincrement(&mut self, options: &Document) -> DriverResult<()>;

    /// Detaches the auto-increment sequence from a field.
    fn drop_autoincrement(&mut self, field: &str) -> DriverResult<()>;

    /// Attaches a source collection to this (partitioned) collection.
    fn attach_collection(&mut self, source: &str, options: &Document) -> DriverResult<()>;

    /// Detaches a previously attached source collection.
    fn detach_collection(&mut self, source: &str) -> DriverResult<()>;

    /// Moves a percentage of this collection between replica groups.
    fn split(&mut self, source_group: &str, target_group: &str, percent: f64) -> DriverResult<()>;

    /// Drops the collection itself.
    fn drop(&mut self) -> DriverResult<()>;

    /// Opens a cursor over per-node storage detail documents.
    fn detail(&mut self) -> DriverResult<Box<dyn Cursor>>;
}

/// A server-side cursor.
pub trait Cursor: Send {
    /// Advances and returns the next document.
    ///
    /// # Errors
    ///
    /// Returns `EndOfData` once the cursor is exhausted.
    fn next(&mut self) -> DriverResult<Document>;

    /// Returns the document the cursor currently points at, without advancing.
    ///
    /// # Errors
    ///
    /// Returns `EndOfData` before the first `next` and after exhaustion.
    fn current(&mut self) -> DriverResult<Document>;

    /// Releases the server-side context.
    fn close(&mut self) -> DriverResult<()>;
}
