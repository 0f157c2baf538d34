//! In-memory cluster for tests and benches.
//!
//! [`MemoryCluster`] implements enough server behavior for the session layer
//! to be exercised end to end: namespaces, collections, documents with an
//! equality-only condition matcher, `$set`/`$inc` update rules, index
//! descriptors in the wire shape, per-operation call counters and fault
//! injection. It is not a query engine; sort orders and access-plan hints are
//! accepted and ignored, and session/transaction snapshots are empty.

use crate::connection::{ClusterDriver, ClusterLink, CollectionRef, Cursor};
use crate::error::{DriverError, DriverResult, StatusCode};
use crate::fields::{
    AUTOINCREMENT_FIELD, DETAILS, ENFORCED, INDEX_DEF, INDEX_KEY, INDEX_NAME, LEGACY_ENFORCED,
    LEGACY_UNIQUE, NOT_NULL, OID, PAGE_SIZE, TOTAL_DATA_FREE_SPACE, TOTAL_DATA_PAGES,
    TOTAL_INDEX_PAGES, TOTAL_RECORDS, UNIQUE,
};
use crate::types::{Credentials, QueryOptions, SnapshotKind};
use bson::{doc, Bson, Document};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Operations the cluster counts and can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Physical connect (including reconnects).
    Connect,
    /// Session attribute update.
    SetSessionAttributes,
    /// Interrupt signal.
    Interrupt,
    /// Last-error detail fetch.
    LastError,
    /// Engine snapshot query.
    Snapshot,
    /// Transaction begin.
    BeginTransaction,
    /// Transaction commit.
    CommitTransaction,
    /// Transaction rollback.
    RollbackTransaction,
    /// Namespace existence check.
    GetNamespace,
    /// Namespace creation.
    CreateNamespace,
    /// Namespace drop.
    DropNamespace,
    /// Collection reference resolution.
    GetCollection,
    /// Collection creation.
    CreateCollection,
    /// Collection rename.
    RenameCollection,
    /// Collection drop through the link.
    DropCollection,
    /// Query returning a cursor.
    Query,
    /// Query-and-remove returning a cursor.
    QueryAndRemove,
    /// Single-document insert.
    Insert,
    /// Batch insert.
    InsertMany,
    /// Upsert.
    Upsert,
    /// Update.
    Update,
    /// Delete.
    Delete,
    /// Document count.
    Count,
    /// Index creation (either form).
    CreateIndex,
    /// Index descriptor fetch.
    GetIndex,
    /// Index listing.
    ListIndexes,
    /// Index drop.
    DropIndex,
    /// Collection truncate.
    Truncate,
    /// Collection attribute update.
    SetAttributes,
    /// Auto-increment creation.
    CreateAutoincrement,
    /// Auto-increment drop.
    DropAutoincrement,
    /// Sub-collection attach.
    AttachCollection,
    /// Sub-collection detach.
    DetachCollection,
    /// Shard split.
    Split,
    /// Collection drop through its reference.
    Drop,
    /// Storage detail query.
    Detail,
    /// Cursor advance.
    CursorNext,
}

struct Fault {
    op: Op,
    code: StatusCode,
    remaining: u32,
}

#[derive(Default)]
struct CollectionData {
    documents: Vec<Document>,
    indexes: HashMap<String, Document>,
    autoincrements: HashMap<String, Document>,
    attached: Vec<String>,
    attributes: Document,
    details: Option<Vec<Document>>,
}

#[derive(Default)]
struct Namespace {
    options: Document,
    collections: HashMap<String, CollectionData>,
}

#[derive(Default)]
struct ClusterState {
    namespaces: HashMap<String, Namespace>,
    required_password: Option<(String, String)>,
    required_token: Option<(String, String)>,
    counters: HashMap<Op, u64>,
    faults: Vec<Fault>,
    session_attributes: Document,
    last_error: Option<Document>,
}

/// Process-local cluster state shared by every link a [`MemoryDriver`] opens.
#[derive(Default)]
pub struct MemoryCluster {
    state: Mutex<ClusterState>,
}

/// Connection-scoped state shared between a link and its references.
struct LinkShared {
    connected: AtomicBool,
    generation: Mutex<Uuid>,
    in_transaction: AtomicBool,
}

impl MemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires password authentication for the given user.
    pub fn require_password(&self, user: impl Into<String>, password: impl Into<String>) {
        self.state.lock().required_password = Some((user.into(), password.into()));
    }

    /// Requires token authentication for the given user.
    pub fn require_token(&self, user: impl Into<String>, token: impl Into<String>) {
        self.state.lock().required_token = Some((user.into(), token.into()));
    }

    /// Makes the next `times` invocations of `op` fail with `code`.
    ///
    /// Network-class codes also sever the link the operation arrived on.
    pub fn fail_next(&self, op: Op, code: StatusCode, times: u32) {
        self.state.lock().faults.push(Fault {
            op,
            code,
            remaining: times,
        });
    }

    /// How many times `op` has been invoked.
    #[must_use]
    pub fn calls(&self, op: Op) -> u64 {
        self.state.lock().counters.get(&op).copied().unwrap_or(0)
    }

    /// Resets all call counters.
    pub fn reset_calls(&self) {
        self.state.lock().counters.clear();
    }

    /// Whether the namespace exists.
    #[must_use]
    pub fn namespace_exists(&self, namespace: &str) -> bool {
        self.state.lock().namespaces.contains_key(namespace)
    }

    /// Whether the collection exists.
    #[must_use]
    pub fn collection_exists(&self, namespace: &str, collection: &str) -> bool {
        self.state
            .lock()
            .namespaces
            .get(namespace)
            .is_some_and(|ns| ns.collections.contains_key(collection))
    }

    /// Copies out the stored documents of a collection.
    pub fn collection_documents(
        &self,
        namespace: &str,
        collection: &str,
    ) -> DriverResult<Vec<Document>> {
        let state = self.state.lock();
        let ns = state
            .namespaces
            .get(namespace)
            .ok_or_else(|| namespace_not_found(namespace))?;
        let col = ns
            .collections
            .get(collection)
            .ok_or_else(|| collection_not_found(namespace, collection))?;
        Ok(col.documents.clone())
    }

    /// The merged session attributes the cluster has seen so far.
    #[must_use]
    pub fn session_attributes(&self) -> Document {
        self.state.lock().session_attributes.clone()
    }

    /// Plants an index descriptor in the legacy on-disk shape
    /// (lowercase flags, no not-null field).
    pub fn seed_legacy_index(
        &self,
        namespace: &str,
        collection: &str,
        name: &str,
        key_pattern: Document,
        unique: bool,
    ) -> DriverResult<()> {
        let descriptor = doc! {
            INDEX_DEF: {
                INDEX_NAME: name,
                INDEX_KEY: key_pattern,
                LEGACY_UNIQUE: unique,
                LEGACY_ENFORCED: false,
            }
        };
        self.with_collection(namespace, collection, |col| {
            col.indexes.insert(name.to_string(), descriptor);
            Ok(())
        })
    }

    /// Replaces the per-node storage detail documents streamed by `detail`.
    pub fn seed_detail_documents(
        &self,
        namespace: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> DriverResult<()> {
        self.with_collection(namespace, collection, |col| {
            col.details = Some(documents);
            Ok(())
        })
    }

    fn with_collection<T>(
        &self,
        namespace: &str,
        collection: &str,
        f: impl FnOnce(&mut CollectionData) -> DriverResult<T>,
    ) -> DriverResult<T> {
        let mut state = self.state.lock();
        let ns = state
            .namespaces
            .get_mut(namespace)
            .ok_or_else(|| namespace_not_found(namespace))?;
        let col = ns
            .collections
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(namespace, collection))?;
        f(col)
    }

    /// Counts the call, pops a matching injected fault, and checks that the
    /// link is still usable. Every server-side operation funnels through
    /// here so counters and faults stay uniform.
    fn enter(&self, op: Op, shared: &LinkShared, resolved: Option<Uuid>) -> DriverResult<()> {
        let mut state = self.state.lock();
        *state.counters.entry(op).or_insert(0) += 1;

        if let Some(idx) = state
            .faults
            .iter()
            .position(|f| f.remaining > 0 && f.op == op)
        {
            state.faults[idx].remaining -= 1;
            let code = state.faults[idx].code;
            if state.faults[idx].remaining == 0 {
                state.faults.remove(idx);
            }
            let err = DriverError::new(code, format!("injected {op:?} failure"));
            state.last_error = Some(doc! { "description": err.message() });
            drop(state);
            if code.is_network() {
                shared.connected.store(false, Ordering::SeqCst);
            }
            return Err(err);
        }
        drop(state);

        if op != Op::Connect && !shared.connected.load(Ordering::SeqCst) {
            return Err(DriverError::not_connected("link is not connected"));
        }
        if let Some(generation) = resolved {
            if generation != *shared.generation.lock() {
                return Err(DriverError::not_connected(
                    "collection reference outlived its connection",
                ));
            }
        }
        Ok(())
    }
}

fn namespace_not_found(namespace: &str) -> DriverError {
    DriverError::new(
        StatusCode::NamespaceNotFound,
        format!("namespace not found: {namespace}"),
    )
}

fn collection_not_found(namespace: &str, collection: &str) -> DriverError {
    DriverError::new(
        StatusCode::CollectionNotFound,
        format!("collection not found: {namespace}.{collection}"),
    )
}

/// Equality-only condition matcher; query operators are not interpreted.
fn matches(document: &Document, condition: &Document) -> bool {
    condition.iter().all(|(k, v)| document.get(k) == Some(v))
}

fn numeric(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(d)) => *d as i64,
        _ => 0,
    }
}

/// Applies `$set`/`$inc` rules; a rule without operators replaces the
/// document body (keeping `_id`).
fn apply_rule(document: &mut Document, rule: &Document) {
    let has_operator = rule.keys().any(|k| k.starts_with('$'));
    if !has_operator {
        let id = document.get(OID).cloned();
        document.clear();
        if let Some(id) = id {
            document.insert(OID, id);
        }
        for (k, v) in rule {
            document.insert(k.clone(), v.clone());
        }
        return;
    }
    for (op, spec) in rule {
        let Bson::Document(spec) = spec else { continue };
        match op.as_str() {
            "$set" => {
                for (k, v) in spec {
                    document.insert(k.clone(), v.clone());
                }
            }
            "$inc" => {
                for (k, v) in spec {
                    let next = numeric(document.get(k)) + numeric(Some(v));
                    document.insert(k.clone(), Bson::Int64(next));
                }
            }
            _ => {}
        }
    }
}

fn select(col: &CollectionData, condition: &Document, options: &QueryOptions) -> Vec<Document> {
    let mut out: Vec<Document> = col
        .documents
        .iter()
        .filter(|d| matches(d, condition))
        .cloned()
        .collect();
    if !options.selector.is_empty() {
        for doc in &mut out {
            let keys: Vec<String> = doc
                .keys()
                .filter(|k| !options.selector.contains_key(*k))
                .cloned()
                .collect();
            for k in keys {
                doc.remove(&k);
            }
        }
    }
    let skip = usize::try_from(options.skip).unwrap_or(0);
    if skip > 0 {
        out.drain(..skip.min(out.len()));
    }
    if options.limit >= 0 {
        out.truncate(usize::try_from(options.limit).unwrap_or(usize::MAX));
    }
    out
}

/// Driver factory backed by a [`MemoryCluster`].
pub struct MemoryDriver {
    cluster: Arc<MemoryCluster>,
}

impl MemoryDriver {
    /// Creates a driver over a fresh cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cluster(Arc::new(MemoryCluster::new()))
    }

    /// Creates a driver over an existing cluster.
    #[must_use]
    pub fn with_cluster(cluster: Arc<MemoryCluster>) -> Self {
        Self { cluster }
    }

    /// The shared cluster, for seeding and assertions.
    #[must_use]
    pub fn cluster(&self) -> Arc<MemoryCluster> {
        Arc::clone(&self.cluster)
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterDriver for MemoryDriver {
    fn open_link(&self) -> Box<dyn ClusterLink> {
        Box::new(MemoryLink {
            cluster: Arc::clone(&self.cluster),
            shared: Arc::new(LinkShared {
                connected: AtomicBool::new(false),
                generation: Mutex::new(Uuid::nil()),
                in_transaction: AtomicBool::new(false),
            }),
        })
    }
}

struct MemoryLink {
    cluster: Arc<MemoryCluster>,
    shared: Arc<LinkShared>,
}

impl MemoryLink {
    fn check_credentials(&self, credentials: &Credentials) -> DriverResult<()> {
        let state = self.cluster.state.lock();
        match credentials {
            Credentials::Password { user, password } => {
                if let Some((want_user, want_password)) = &state.required_password {
                    if user != want_user {
                        return Err(DriverError::new(
                            StatusCode::UserNotFound,
                            format!("unknown user: {user}"),
                        ));
                    }
                    if password != want_password {
                        return Err(DriverError::new(
                            StatusCode::AuthenticationFailed,
                            "password rejected",
                        ));
                    }
                }
            }
            Credentials::Token { user, token, .. } => {
                if let Some((want_user, want_token)) = &state.required_token {
                    if user != want_user {
                        return Err(DriverError::new(
                            StatusCode::UserNotFound,
                            format!("unknown user: {user}"),
                        ));
                    }
                    if token != want_token {
                        return Err(DriverError::new(
                            StatusCode::AuthenticationFailed,
                            "token rejected",
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

impl ClusterLink for MemoryLink {
    fn connect(&mut self, endpoints: &[String], credentials: &Credentials) -> DriverResult<()> {
        self.cluster.enter(Op::Connect, &self.shared, None)?;
        if endpoints.is_empty() {
            return Err(DriverError::invalid_argument("no coordinator addresses"));
        }
        self.check_credentials(credentials)?;
        self.shared.connected.store(true, Ordering::SeqCst);
        self.shared.in_transaction.store(false, Ordering::SeqCst);
        *self.shared.generation.lock() = Uuid::new_v4();
        Ok(())
    }

    fn disconnect(&mut self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.in_transaction.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn generation(&self) -> Uuid {
        *self.shared.generation.lock()
    }

    fn set_session_attributes(&mut self, attributes: &Document) -> DriverResult<()> {
        self.cluster
            .enter(Op::SetSessionAttributes, &self.shared, None)?;
        let mut state = self.cluster.state.lock();
        for (k, v) in attributes {
            state.session_attributes.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn interrupt(&mut self) -> DriverResult<()> {
        self.cluster.enter(Op::Interrupt, &self.shared, None)
    }

    fn last_error_detail(&mut self) -> DriverResult<Option<Document>> {
        self.cluster.enter(Op::LastError, &self.shared, None)?;
        Ok(self.cluster.state.lock().last_error.clone())
    }

    fn snapshot(
        &mut self,
        kind: SnapshotKind,
        condition: &Document,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.cluster.enter(Op::Snapshot, &self.shared, None)?;
        let state = self.cluster.state.lock();
        let docs = match kind {
            SnapshotKind::Database => vec![doc! {
                "NamespaceCount": state.namespaces.len() as i64,
                PAGE_SIZE: 65536_i32,
            }],
            SnapshotKind::Collections => {
                let mut docs = Vec::new();
                for (ns_name, ns) in &state.namespaces {
                    for cl_name in ns.collections.keys() {
                        docs.push(doc! { "Name": format!("{ns_name}.{cl_name}") });
                    }
                }
                docs
            }
            SnapshotKind::Sessions | SnapshotKind::Transactions => Vec::new(),
        };
        drop(state);
        let docs = docs
            .into_iter()
            .filter(|d| matches(d, condition))
            .collect();
        Ok(Box::new(MemoryCursor::new(
            Arc::clone(&self.cluster),
            Arc::clone(&self.shared),
            docs,
        )))
    }

    fn begin_transaction(&mut self) -> DriverResult<()> {
        self.cluster
            .enter(Op::BeginTransaction, &self.shared, None)?;
        self.shared.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn commit_transaction(&mut self, _hint: &Document) -> DriverResult<()> {
        self.cluster
            .enter(Op::CommitTransaction, &self.shared, None)?;
        self.shared.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn rollback_transaction(&mut self) -> DriverResult<()> {
        self.cluster
            .enter(Op::RollbackTransaction, &self.shared, None)?;
        self.shared.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn get_namespace(&mut self, namespace: &str) -> DriverResult<()> {
        self.cluster.enter(Op::GetNamespace, &self.shared, None)?;
        let state = self.cluster.state.lock();
        if state.namespaces.contains_key(namespace) {
            Ok(())
        } else {
            Err(namespace_not_found(namespace))
        }
    }

    fn create_namespace(&mut self, namespace: &str, options: &Document) -> DriverResult<()> {
        self.cluster
            .enter(Op::CreateNamespace, &self.shared, None)?;
        let mut state = self.cluster.state.lock();
        if state.namespaces.contains_key(namespace) {
            return Err(DriverError::new(
                StatusCode::NamespaceExists,
                format!("namespace exists: {namespace}"),
            ));
        }
        state.namespaces.insert(
            namespace.to_string(),
            Namespace {
                options: options.clone(),
                collections: HashMap::new(),
            },
        );
        Ok(())
    }

    fn drop_namespace(&mut self, namespace: &str) -> DriverResult<()> {
        self.cluster.enter(Op::DropNamespace, &self.shared, None)?;
        let mut state = self.cluster.state.lock();
        if state.namespaces.remove(namespace).is_none() {
            return Err(namespace_not_found(namespace));
        }
        Ok(())
    }

    fn get_collection(
        &mut self,
        namespace: &str,
        collection: &str,
    ) -> DriverResult<Box<dyn CollectionRef>> {
        self.cluster.enter(Op::GetCollection, &self.shared, None)?;
        let state = self.cluster.state.lock();
        let ns = state
            .namespaces
            .get(namespace)
            .ok_or_else(|| namespace_not_found(namespace))?;
        if !ns.collections.contains_key(collection) {
            return Err(collection_not_found(namespace, collection));
        }
        drop(state);
        Ok(Box::new(MemoryCollection {
            cluster: Arc::clone(&self.cluster),
            shared: Arc::clone(&self.shared),
            generation: *self.shared.generation.lock(),
            namespace: namespace.to_string(),
            name: collection.to_string(),
        }))
    }

    fn create_collection(
        &mut self,
        namespace: &str,
        collection: &str,
        options: &Document,
    ) -> DriverResult<()> {
        self.cluster
            .enter(Op::CreateCollection, &self.shared, None)?;
        let mut state = self.cluster.state.lock();
        let ns = state
            .namespaces
            .get_mut(namespace)
            .ok_or_else(|| namespace_not_found(namespace))?;
        if ns.collections.contains_key(collection) {
            return Err(DriverError::new(
                StatusCode::CollectionExists,
                format!("collection exists: {namespace}.{collection}"),
            ));
        }
        ns.collections.insert(
            collection.to_string(),
            CollectionData {
                attributes: options.clone(),
                ..CollectionData::default()
            },
        );
        Ok(())
    }

    fn rename_collection(&mut self, namespace: &str, from: &str, to: &str) -> DriverResult<()> {
        self.cluster
            .enter(Op::RenameCollection, &self.shared, None)?;
        let mut state = self.cluster.state.lock();
        let ns = state
            .namespaces
            .get_mut(namespace)
            .ok_or_else(|| namespace_not_found(namespace))?;
        if ns.collections.contains_key(to) {
            return Err(DriverError::new(
                StatusCode::CollectionExists,
                format!("collection exists: {namespace}.{to}"),
            ));
        }
        let col = ns
            .collections
            .remove(from)
            .ok_or_else(|| collection_not_found(namespace, from))?;
        ns.collections.insert(to.to_string(), col);
        Ok(())
    }

    fn drop_collection(&mut self, namespace: &str, collection: &str) -> DriverResult<()> {
        self.cluster
            .enter(Op::DropCollection, &self.shared, None)?;
        let mut state = self.cluster.state.lock();
        let ns = state
            .namespaces
            .get_mut(namespace)
            .ok_or_else(|| namespace_not_found(namespace))?;
        if ns.collections.remove(collection).is_none() {
            return Err(collection_not_found(namespace, collection));
        }
        Ok(())
    }
}

struct MemoryCollection {
    cluster: Arc<MemoryCluster>,
    shared: Arc<LinkShared>,
    generation: Uuid,
    namespace: String,
    name: String,
}

impl MemoryCollection {
    fn enter(&self, op: Op) -> DriverResult<()> {
        self.cluster.enter(op, &self.shared, Some(self.generation))
    }

    fn with_data<T>(
        &self,
        f: impl FnOnce(&mut CollectionData) -> DriverResult<T>,
    ) -> DriverResult<T> {
        self.cluster.with_collection(&self.namespace, &self.name, f)
    }

    fn cursor(&self, docs: Vec<Document>) -> Box<dyn Cursor> {
        Box::new(MemoryCursor::new(
            Arc::clone(&self.cluster),
            Arc::clone(&self.shared),
            docs,
        ))
    }
}

impl CollectionRef for MemoryCollection {
    fn query(
        &mut self,
        condition: &Document,
        options: &QueryOptions,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.enter(Op::Query)?;
        let docs = self.with_data(|col| Ok(select(col, condition, options)))?;
        Ok(self.cursor(docs))
    }

    fn query_and_remove(
        &mut self,
        condition: &Document,
        options: &QueryOptions,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.enter(Op::QueryAndRemove)?;
        let docs = self.with_data(|col| {
            let removed = select(col, condition, options);
            col.documents.retain(|d| !matches(d, condition));
            Ok(removed)
        })?;
        Ok(self.cursor(docs))
    }

    fn insert(&mut self, document: &Document) -> DriverResult<()> {
        self.enter(Op::Insert)?;
        self.with_data(|col| {
            col.documents.push(document.clone());
            Ok(())
        })
    }

    fn insert_many(
        &mut self,
        documents: &[Document],
        replace_on_duplicate: bool,
    ) -> DriverResult<()> {
        self.enter(Op::InsertMany)?;
        self.with_data(|col| {
            for doc in documents {
                if replace_on_duplicate {
                    if let Some(id) = doc.get(OID) {
                        if let Some(existing) = col
                            .documents
                            .iter_mut()
                            .find(|d| d.get(OID) == Some(id))
                        {
                            *existing = doc.clone();
                            continue;
                        }
                    }
                }
                col.documents.push(doc.clone());
            }
            Ok(())
        })
    }

    fn upsert(
        &mut self,
        rule: &Document,
        condition: &Document,
        _hint: &Document,
    ) -> DriverResult<()> {
        self.enter(Op::Upsert)?;
        self.with_data(|col| {
            let mut touched = false;
            for doc in col.documents.iter_mut().filter(|d| matches(d, condition)) {
                apply_rule(doc, rule);
                touched = true;
            }
            if !touched {
                let mut doc = condition.clone();
                apply_rule(&mut doc, rule);
                col.documents.push(doc);
            }
            Ok(())
        })
    }

    fn update(
        &mut self,
        rule: &Document,
        condition: &Document,
        _hint: &Document,
    ) -> DriverResult<()> {
        self.enter(Op::Update)?;
        self.with_data(|col| {
            for doc in col.documents.iter_mut().filter(|d| matches(d, condition)) {
                apply_rule(doc, rule);
            }
            Ok(())
        })
    }

    fn delete(&mut self, condition: &Document, _hint: &Document) -> DriverResult<()> {
        self.enter(Op::Delete)?;
        self.with_data(|col| {
            col.documents.retain(|d| !matches(d, condition));
            Ok(())
        })
    }

    fn count(&mut self, condition: &Document) -> DriverResult<i64> {
        self.enter(Op::Count)?;
        self.with_data(|col| {
            Ok(col.documents.iter().filter(|d| matches(d, condition)).count() as i64)
        })
    }

    fn create_index(
        &mut self,
        key_pattern: &Document,
        name: &str,
        unique: bool,
        enforced: bool,
    ) -> DriverResult<()> {
        self.enter(Op::CreateIndex)?;
        let descriptor = doc! {
            INDEX_DEF: {
                INDEX_NAME: name,
                INDEX_KEY: key_pattern.clone(),
                LEGACY_UNIQUE: unique,
                LEGACY_ENFORCED: enforced,
                NOT_NULL: false,
            }
        };
        self.with_data(|col| store_index(col, name, descriptor))
    }

    fn create_index_with_options(
        &mut self,
        key_pattern: &Document,
        name: &str,
        options: &Document,
    ) -> DriverResult<()> {
        self.enter(Op::CreateIndex)?;
        let descriptor = doc! {
            INDEX_DEF: {
                INDEX_NAME: name,
                INDEX_KEY: key_pattern.clone(),
                LEGACY_UNIQUE: options.get_bool(UNIQUE).unwrap_or(false),
                LEGACY_ENFORCED: options.get_bool(ENFORCED).unwrap_or(false),
                NOT_NULL: options.get_bool(NOT_NULL).unwrap_or(false),
            }
        };
        self.with_data(|col| store_index(col, name, descriptor))
    }

    fn get_index(&mut self, name: &str) -> DriverResult<Document> {
        self.enter(Op::GetIndex)?;
        self.with_data(|col| {
            col.indexes.get(name).cloned().ok_or_else(|| {
                DriverError::new(StatusCode::IndexNotFound, format!("index not found: {name}"))
            })
        })
    }

    fn list_indexes(&mut self) -> DriverResult<Box<dyn Cursor>> {
        self.enter(Op::ListIndexes)?;
        let docs = self.with_data(|col| Ok(col.indexes.values().cloned().collect()))?;
        Ok(self.cursor(docs))
    }

    fn drop_index(&mut self, name: &str) -> DriverResult<()> {
        self.enter(Op::DropIndex)?;
        self.with_data(|col| {
            col.indexes.remove(name).map(|_| ()).ok_or_else(|| {
                DriverError::new(StatusCode::IndexNotFound, format!("index not found: {name}"))
            })
        })
    }

    fn truncate(&mut self) -> DriverResult<()> {
        self.enter(Op::Truncate)?;
        self.with_data(|col| {
            col.documents.clear();
            Ok(())
        })
    }

    fn set_attributes(&mut self, options: &Document) -> DriverResult<()> {
        self.enter(Op::SetAttributes)?;
        self.with_data(|col| {
            for (k, v) in options {
                col.attributes.insert(k.clone(), v.clone());
            }
            Ok(())
        })
    }

    fn create_autoincrement(&mut self, options: &Document) -> DriverResult<()> {
        self.enter(Op::CreateAutoincrement)?;
        let field = options
            .get_str(AUTOINCREMENT_FIELD)
            .unwrap_or_default()
            .to_string();
        if field.is_empty() {
            return Err(DriverError::invalid_argument(
                "auto-increment options carry no field name",
            ));
        }
        self.with_data(|col| {
            if col.autoincrements.contains_key(&field) {
                return Err(DriverError::new(
                    StatusCode::AutoIncrementConflict,
                    format!("auto-increment already defined on: {field}"),
                ));
            }
            col.autoincrements.insert(field.clone(), options.clone());
            Ok(())
        })
    }

    fn drop_autoincrement(&mut self, field: &str) -> DriverResult<()> {
        self.enter(Op::DropAutoincrement)?;
        self.with_data(|col| {
            col.autoincrements.remove(field).map(|_| ()).ok_or_else(|| {
                DriverError::new(
                    StatusCode::AutoIncrementMissing,
                    format!("no auto-increment on: {field}"),
                )
            })
        })
    }

    fn attach_collection(&mut self, source: &str, _options: &Document) -> DriverResult<()> {
        self.enter(Op::AttachCollection)?;
        self.with_data(|col| {
            col.attached.push(source.to_string());
            Ok(())
        })
    }

    fn detach_collection(&mut self, source: &str) -> DriverResult<()> {
        self.enter(Op::DetachCollection)?;
        self.with_data(|col| {
            let before = col.attached.len();
            col.attached.retain(|s| s != source);
            if col.attached.len() == before {
                return Err(DriverError::invalid_argument(format!(
                    "not attached: {source}"
                )));
            }
            Ok(())
        })
    }

    fn split(&mut self, _source_group: &str, _target_group: &str, percent: f64) -> DriverResult<()> {
        self.enter(Op::Split)?;
        if !(0.0..=100.0).contains(&percent) || percent == 0.0 {
            return Err(DriverError::invalid_argument(format!(
                "split percent out of range: {percent}"
            )));
        }
        self.with_data(|_| Ok(()))
    }

    fn drop(&mut self) -> DriverResult<()> {
        self.enter(Op::Drop)?;
        let mut state = self.cluster.state.lock();
        let ns = state
            .namespaces
            .get_mut(&self.namespace)
            .ok_or_else(|| namespace_not_found(&self.namespace))?;
        if ns.collections.remove(&self.name).is_none() {
            return Err(collection_not_found(&self.namespace, &self.name));
        }
        Ok(())
    }

    fn detail(&mut self) -> DriverResult<Box<dyn Cursor>> {
        self.enter(Op::Detail)?;
        let docs = self.with_data(|col| {
            Ok(col.details.clone().unwrap_or_else(|| {
                vec![doc! {
                    DETAILS: [{
                        PAGE_SIZE: 65536_i32,
                        TOTAL_DATA_PAGES: col.documents.len() as i64,
                        TOTAL_INDEX_PAGES: col.indexes.len() as i64,
                        TOTAL_DATA_FREE_SPACE: 0_i64,
                        TOTAL_RECORDS: col.documents.len() as i64,
                    }]
                }]
            }))
        })?;
        Ok(self.cursor(docs))
    }
}

fn store_index(col: &mut CollectionData, name: &str, descriptor: Document) -> DriverResult<()> {
    match col.indexes.get(name) {
        Some(existing) if *existing == descriptor => Err(DriverError::new(
            StatusCode::IndexAlreadyDefined,
            format!("index already defined: {name}"),
        )),
        Some(_) => Err(DriverError::new(
            StatusCode::IndexExists,
            format!("index exists with a different definition: {name}"),
        )),
        None => {
            col.indexes.insert(name.to_string(), descriptor);
            Ok(())
        }
    }
}

struct MemoryCursor {
    cluster: Arc<MemoryCluster>,
    shared: Arc<LinkShared>,
    generation: Uuid,
    docs: Vec<Document>,
    pos: usize,
    closed: bool,
}

impl MemoryCursor {
    fn new(cluster: Arc<MemoryCluster>, shared: Arc<LinkShared>, docs: Vec<Document>) -> Self {
        let generation = *shared.generation.lock();
        Self {
            cluster,
            shared,
            generation,
            docs,
            pos: 0,
            closed: false,
        }
    }
}

impl Cursor for MemoryCursor {
    fn next(&mut self) -> DriverResult<Document> {
        self.cluster
            .enter(Op::CursorNext, &self.shared, Some(self.generation))?;
        if self.closed || self.pos >= self.docs.len() {
            return Err(DriverError::end_of_data());
        }
        let doc = self.docs[self.pos].clone();
        self.pos += 1;
        Ok(doc)
    }

    fn current(&mut self) -> DriverResult<Document> {
        if self.closed || self.pos == 0 || self.pos > self.docs.len() {
            return Err(DriverError::end_of_data());
        }
        Ok(self.docs[self.pos - 1].clone())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        Ok(())
    }
}
