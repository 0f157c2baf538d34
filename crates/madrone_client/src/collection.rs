//! Collection handles: reference resolution, scans, writes, and the
//! idempotent DDL carve-outs.

use crate::error::{Error, Result};
use crate::index::equivalent_legacy_index;
use crate::session::{Session, SessionInner};
use crate::stats::{CollectionStatistics, StatisticsBuilder};
use bson::Document;
use madrone_driver::{CollectionRef, Cursor, DriverResult, QueryOptions, StatusCode};
use parking_lot::Mutex;
use std::fmt;
use uuid::Uuid;

struct HandleState {
    reference: Box<dyn CollectionRef>,
    generation: Uuid,
    cursor: Option<Box<dyn Cursor>>,
}

/// A handle to one collection, resolved over its session's link.
///
/// The handle remembers the link generation its reference was resolved
/// under. When the session reconnects, the next operation re-resolves the
/// reference transparently and abandons any open scan, because cursors
/// cannot outlive the link that produced them.
///
/// Handles serialize their own operations; the session serializes the link.
/// A handle never outlives its session.
pub struct Collection<'a> {
    session: &'a Session,
    namespace: String,
    name: String,
    state: Mutex<HandleState>,
}

impl<'a> Collection<'a> {
    pub(crate) fn open(session: &'a Session, namespace: &str, name: &str) -> Result<Self> {
        if namespace.is_empty() || name.is_empty() {
            return Err(Error::invalid_argument(
                "namespace and collection names must be non-empty",
            ));
        }
        let (reference, generation) = session.retry(|inner| {
            let reference = inner.link.get_collection(namespace, name)?;
            Ok((reference, inner.link.generation()))
        })?;
        Ok(Self {
            session,
            namespace: namespace.to_string(),
            name: name.to_string(),
            state: Mutex::new(HandleState {
                reference,
                generation,
                cursor: None,
            }),
        })
    }

    /// The namespace this handle was resolved in.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Re-resolves the reference when the link generation moved on. Any
    /// open cursor belonged to the old link and is dropped with it.
    fn resolve(
        state: &mut HandleState,
        inner: &mut SessionInner,
        namespace: &str,
        name: &str,
    ) -> DriverResult<()> {
        if state.generation != inner.link.generation() {
            state.reference = inner.link.get_collection(namespace, name)?;
            state.generation = inner.link.generation();
            state.cursor = None;
        }
        Ok(())
    }

    /// Runs `operation` against a current reference, with the session's
    /// reconnect-and-retry policy around the whole resolve-plus-operation
    /// step.
    fn with_reference<T>(
        &self,
        mut operation: impl FnMut(&mut dyn CollectionRef) -> DriverResult<T>,
    ) -> Result<T> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.session.retry(|inner| {
            Self::resolve(state, inner, &self.namespace, &self.name)?;
            operation(state.reference.as_mut())
        })
    }

    /// Inserts a single document.
    pub fn insert(&self, document: &Document) -> Result<()> {
        self.with_reference(|reference| reference.insert(document))
    }

    /// Inserts a batch of documents as one driver call, bypassing the
    /// configured chunking.
    ///
    /// The batch is sent exactly once; see [`bulk_insert`](Self::bulk_insert)
    /// for why half-applied batches are not replayed.
    pub fn insert_many(&self, documents: &[Document], replace_on_duplicate: bool) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.session
            .retry(|inner| Self::resolve(state, inner, &self.namespace, &self.name))?;
        self.session
            .run_once(|| state.reference.insert_many(documents, replace_on_duplicate))
    }

    /// Inserts a batch of documents, split into configured chunk sizes.
    ///
    /// Each chunk is sent exactly once: replaying a half-applied batch after
    /// a reconnect could double-insert, so a failure surfaces immediately
    /// and the caller decides what to do with the remainder.
    pub fn bulk_insert(&self, documents: &[Document], replace_on_duplicate: bool) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let chunk_size = self.session.config_snapshot().bulk_insert_size().max(1);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.session
            .retry(|inner| Self::resolve(state, inner, &self.namespace, &self.name))?;
        for chunk in documents.chunks(chunk_size) {
            self.session
                .run_once(|| state.reference.insert_many(chunk, replace_on_duplicate))?;
        }
        Ok(())
    }

    /// Updates matching documents, inserting the rule's result when nothing
    /// matches.
    pub fn upsert(&self, rule: &Document, condition: &Document, hint: &Document) -> Result<()> {
        self.with_reference(|reference| reference.upsert(rule, condition, hint))
    }

    /// Updates matching documents.
    pub fn update(&self, rule: &Document, condition: &Document, hint: &Document) -> Result<()> {
        self.with_reference(|reference| reference.update(rule, condition, hint))
    }

    /// Deletes matching documents.
    pub fn delete(&self, condition: &Document, hint: &Document) -> Result<()> {
        self.with_reference(|reference| reference.delete(condition, hint))
    }

    /// Counts matching documents.
    pub fn count(&self, condition: &Document) -> Result<i64> {
        self.with_reference(|reference| reference.count(condition))
    }

    /// Opens a scan over matching documents, replacing any previous scan on
    /// this handle. Stream the results with [`next`](Self::next).
    pub fn query(&self, condition: &Document, options: &QueryOptions) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(mut previous) = state.cursor.take() {
            let _ = previous.close();
        }
        let cursor = self.session.retry(|inner| {
            Self::resolve(state, inner, &self.namespace, &self.name)?;
            state.reference.query(condition, options)
        })?;
        state.cursor = Some(cursor);
        Ok(())
    }

    /// Opens a scan that removes each document as it is returned.
    pub fn query_and_remove(&self, condition: &Document, options: &QueryOptions) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(mut previous) = state.cursor.take() {
            let _ = previous.close();
        }
        let cursor = self.session.retry(|inner| {
            Self::resolve(state, inner, &self.namespace, &self.name)?;
            state.reference.query_and_remove(condition, options)
        })?;
        state.cursor = Some(cursor);
        Ok(())
    }

    /// Fetches at most one matching document without touching the handle's
    /// scan cursor.
    pub fn query_one(
        &self,
        condition: &Document,
        options: &QueryOptions,
    ) -> Result<Option<Document>> {
        let limited = options.clone().with_limit(1);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut cursor = self.session.retry(|inner| {
            Self::resolve(state, inner, &self.namespace, &self.name)?;
            state.reference.query(condition, &limited)
        })?;
        match cursor.next() {
            Ok(document) => {
                let _ = cursor.close();
                Ok(Some(document))
            }
            Err(err) if err.code() == StatusCode::EndOfData => Ok(None),
            Err(err) => Err(Error::from_driver(err)),
        }
    }

    /// Advances the open scan. `None` once the scan is exhausted or when no
    /// scan is open.
    ///
    /// Scan positions live on one link, so this step never reconnects; a
    /// severed link surfaces as a network error and the caller re-queries.
    pub fn next(&self) -> Result<Option<Document>> {
        let mut guard = self.state.lock();
        let Some(cursor) = guard.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.next() {
            Ok(document) => Ok(Some(document)),
            Err(err) if err.code() == StatusCode::EndOfData => Ok(None),
            Err(err) => Err(Error::from_driver(err)),
        }
    }

    /// Re-reads the scan's current document without advancing. `None` when
    /// no scan is open or nothing has been fetched yet.
    pub fn current(&self) -> Result<Option<Document>> {
        let mut guard = self.state.lock();
        let Some(cursor) = guard.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.current() {
            Ok(document) => Ok(Some(document)),
            Err(err) if err.code() == StatusCode::EndOfData => Ok(None),
            Err(err) => Err(Error::from_driver(err)),
        }
    }

    /// Ends the open scan, if any. A close that fails because the link died
    /// is moot and is not reported.
    pub fn close_cursor(&self) {
        let mut guard = self.state.lock();
        if let Some(mut cursor) = guard.cursor.take() {
            if let Err(err) = cursor.close() {
                tracing::debug!(
                    "closing scan on {}.{} failed: {err}",
                    self.namespace,
                    self.name
                );
            }
        }
    }

    /// Creates an index from a bare key pattern. Re-creating an index this
    /// session already defined identically is a success.
    pub fn create_index(
        &self,
        key_pattern: &Document,
        name: &str,
        unique: bool,
        enforced: bool,
    ) -> Result<()> {
        self.with_reference(|reference| {
            match reference.create_index(key_pattern, name, unique, enforced) {
                Err(err) if err.code() == StatusCode::IndexAlreadyDefined => Ok(()),
                other => other,
            }
        })
    }

    /// Creates an index from a key pattern plus an options document.
    ///
    /// Identical redefinitions succeed. A name collision with a descriptor
    /// in the legacy on-disk format also succeeds when the live descriptor
    /// covers what was asked for; anything murkier keeps the collision
    /// error.
    pub fn create_index_with_options(
        &self,
        key_pattern: &Document,
        name: &str,
        options: &Document,
    ) -> Result<()> {
        self.with_reference(|reference| {
            match reference.create_index_with_options(key_pattern, name, options) {
                Err(err) if err.code() == StatusCode::IndexAlreadyDefined => Ok(()),
                Err(err) if err.code() == StatusCode::IndexExists => {
                    match reference.get_index(name) {
                        Ok(existing)
                            if equivalent_legacy_index(&existing, key_pattern, options) =>
                        {
                            Ok(())
                        }
                        _ => Err(err),
                    }
                }
                other => other,
            }
        })
    }

    /// Drops an index. An index that is already gone counts as dropped.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.with_reference(|reference| match reference.drop_index(name) {
            Err(err) if err.code() == StatusCode::IndexNotFound => Ok(()),
            other => other,
        })
    }

    /// Fetches the descriptors of every index on the collection.
    pub fn indexes(&self) -> Result<Vec<Document>> {
        self.with_reference(|reference| {
            let cursor = reference.list_indexes()?;
            drain(cursor)
        })
    }

    /// Defines an autoincrement field. A definition that already exists is
    /// kept as-is.
    pub fn create_autoincrement(&self, options: &Document) -> Result<()> {
        self.with_reference(|reference| match reference.create_autoincrement(options) {
            Err(err) if err.code() == StatusCode::AutoIncrementConflict => Ok(()),
            other => other,
        })
    }

    /// Removes an autoincrement field. A field that is already gone counts
    /// as removed.
    pub fn drop_autoincrement(&self, field: &str) -> Result<()> {
        self.with_reference(|reference| match reference.drop_autoincrement(field) {
            Err(err) if err.code() == StatusCode::AutoIncrementMissing => Ok(()),
            other => other,
        })
    }

    /// Attaches a source collection to this partitioned collection.
    pub fn attach_collection(&self, source: &str, options: &Document) -> Result<()> {
        self.with_reference(|reference| reference.attach_collection(source, options))
    }

    /// Detaches a source collection from this partitioned collection.
    pub fn detach_collection(&self, source: &str) -> Result<()> {
        self.with_reference(|reference| reference.detach_collection(source))
    }

    /// Moves a percentage of this collection from one replica group to
    /// another.
    pub fn split(&self, source_group: &str, target_group: &str, percent: f64) -> Result<()> {
        self.with_reference(|reference| reference.split(source_group, target_group, percent))
    }

    /// Removes every document while keeping the collection and its indexes.
    pub fn truncate(&self) -> Result<()> {
        self.with_reference(|reference| reference.truncate())
    }

    /// Alters collection attributes.
    pub fn set_attributes(&self, options: &Document) -> Result<()> {
        self.with_reference(|reference| reference.set_attributes(options))
    }

    /// Drops the collection. A collection something else already removed
    /// counts as dropped, as does its whole namespace being gone.
    pub fn drop(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.session.retry(|inner| {
            let outcome = Self::resolve(state, inner, &self.namespace, &self.name)
                .and_then(|()| CollectionRef::drop(state.reference.as_mut()));
            match outcome {
                Err(err)
                    if matches!(
                        err.code(),
                        StatusCode::CollectionNotFound | StatusCode::NamespaceNotFound
                    ) =>
                {
                    Ok(())
                }
                other => other,
            }
        })?;
        state.cursor = None;
        Ok(())
    }

    /// Raw per-node storage detail documents, one per node that holds a
    /// piece of this collection.
    pub fn detail(&self) -> Result<Vec<Document>> {
        self.with_reference(|reference| {
            let cursor = reference.detail()?;
            drain(cursor)
        })
    }

    /// Aggregated storage statistics, folded across every node that holds a
    /// piece of this collection.
    ///
    /// # Errors
    ///
    /// `Internal` when a node reports a malformed detail document.
    pub fn statistics(&self) -> Result<CollectionStatistics> {
        let nodes = self.detail()?;
        let mut builder = StatisticsBuilder::new();
        for node in &nodes {
            builder.absorb(node)?;
        }
        Ok(builder.finish())
    }
}

impl fmt::Debug for Collection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Drains a cursor to completion, treating end-of-data as the terminator.
fn drain(mut cursor: Box<dyn Cursor>) -> DriverResult<Vec<Document>> {
    let mut documents = Vec::new();
    loop {
        match cursor.next() {
            Ok(document) => documents.push(document),
            Err(err) if err.code() == StatusCode::EndOfData => break,
            Err(err) => return Err(err),
        }
    }
    let _ = cursor.close();
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, ConfigHandle};
    use crate::credential::CredentialCache;
    use bson::doc;
    use madrone_driver::{MemoryCluster, MemoryDriver, Op};
    use std::sync::Arc;

    fn connected_session(config: ClientConfig) -> (Session, Arc<MemoryCluster>) {
        let driver = MemoryDriver::new();
        let cluster = driver.cluster();
        let session = Session::new(
            1,
            false,
            &driver,
            ConfigHandle::new(config),
            Arc::new(CredentialCache::new()),
        );
        session.connect().unwrap();
        (session, cluster)
    }

    #[test]
    fn handle_survives_reconnect() {
        let (session, cluster) = connected_session(ClientConfig::default());
        let table = session.create_collection("db", "t").unwrap();
        table.insert(&doc! { "a": 1 }).unwrap();

        cluster.fail_next(Op::Count, StatusCode::ConnectionLost, 1);
        assert_eq!(table.count(&Document::new()).unwrap(), 1);
        // Initial open plus one re-resolution after the reconnect.
        assert_eq!(cluster.calls(Op::GetCollection), 2);
        assert_eq!(cluster.calls(Op::Connect), 2);
    }

    #[test]
    fn bulk_insert_chunks_by_configured_size() {
        let (session, cluster) =
            connected_session(ClientConfig::new().with_bulk_insert_size(2));
        let table = session.create_collection("db", "t").unwrap();

        let rows: Vec<Document> = (0..5).map(|i| doc! { "i": i }).collect();
        table.bulk_insert(&rows, false).unwrap();
        assert_eq!(cluster.calls(Op::InsertMany), 3);
        assert_eq!(table.count(&Document::new()).unwrap(), 5);
    }

    #[test]
    fn failed_batch_is_never_replayed() {
        let (session, cluster) =
            connected_session(ClientConfig::new().with_bulk_insert_size(10));
        let table = session.create_collection("db", "t").unwrap();

        cluster.fail_next(Op::InsertMany, StatusCode::ConnectionLost, 1);
        let rows: Vec<Document> = (0..3).map(|i| doc! { "i": i }).collect();
        let err = table.bulk_insert(&rows, false).unwrap_err();
        assert!(err.is_network());
        assert_eq!(cluster.calls(Op::InsertMany), 1);
    }

    #[test]
    fn insert_many_ignores_the_chunk_size() {
        let (session, cluster) =
            connected_session(ClientConfig::new().with_bulk_insert_size(2));
        let table = session.create_collection("db", "t").unwrap();

        let rows: Vec<Document> = (0..5).map(|i| doc! { "i": i }).collect();
        table.insert_many(&rows, false).unwrap();
        assert_eq!(cluster.calls(Op::InsertMany), 1);
        assert_eq!(table.count(&Document::new()).unwrap(), 5);
    }

    #[test]
    fn dropping_a_dropped_collection_succeeds() {
        let (session, cluster) = connected_session(ClientConfig::default());
        let table = session.create_collection("db", "t").unwrap();

        table.drop().unwrap();
        assert!(!cluster.collection_exists("db", "t"));
        table.drop().unwrap();
        assert_eq!(cluster.calls(Op::Drop), 2);
    }

    #[test]
    fn scan_lifecycle() {
        let (session, _cluster) = connected_session(ClientConfig::default());
        let table = session.create_collection("db", "t").unwrap();
        table.insert(&doc! { "i": 1 }).unwrap();
        table.insert(&doc! { "i": 2 }).unwrap();

        table.query(&Document::new(), &QueryOptions::new()).unwrap();
        let first = table.next().unwrap().unwrap();
        assert_eq!(table.current().unwrap().unwrap(), first);
        assert!(table.next().unwrap().is_some());
        assert!(table.next().unwrap().is_none());

        table.close_cursor();
        assert!(table.next().unwrap().is_none());
    }

    #[test]
    fn query_one_is_limit_one() {
        let (session, _cluster) = connected_session(ClientConfig::default());
        let table = session.create_collection("db", "t").unwrap();
        table.insert(&doc! { "i": 1, "tag": "x" }).unwrap();
        table.insert(&doc! { "i": 2, "tag": "x" }).unwrap();

        let row = table
            .query_one(&doc! { "tag": "x" }, &QueryOptions::new())
            .unwrap();
        assert!(row.is_some());
        let missing = table
            .query_one(&doc! { "tag": "y" }, &QueryOptions::new())
            .unwrap();
        assert!(missing.is_none());
    }
}
