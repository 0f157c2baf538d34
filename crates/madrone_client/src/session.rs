//! Session connection: connect, retry, transactions, lifecycle.

use crate::addr::AddressSet;
use crate::collection::Collection;
use crate::config::{ClientConfig, ConfigHandle};
use crate::credential::CredentialCache;
use crate::error::{Error, Result};
use crate::registry::CollectionShare;
use crate::stats::CollectionStatistics;
use bson::{doc, Document};
use madrone_driver::fields::{
    PAGE_SIZE, REPL_SIZE, SOURCE, TRANS_AUTO_COMMIT, TRANS_AUTO_ROLLBACK, TRANS_ISOLATION,
};
use madrone_driver::{
    ClusterDriver, ClusterLink, Credentials, DriverError, DriverResult, SnapshotKind, StatusCode,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extra attempts the retry wrapper may spend after the first failure.
const RETRY_BUDGET: u32 = 2;

/// Page size newly provisioned namespaces are created with.
const NAMESPACE_PAGE_SIZE: i32 = 65536;

/// Prefix of the source tag registered with the cluster at connect.
const SOURCE_PREFIX: &str = "madrone";

/// Transaction isolation levels callers can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Reads may observe uncommitted writes.
    ReadUncommitted,
    /// Reads observe only committed writes.
    ReadCommitted,
    /// Reads within one transaction are repeatable.
    RepeatableRead,
    /// Not supported by the cluster; requesting it is an error.
    Serializable,
}

impl IsolationLevel {
    /// The cluster's numeric encoding; serializable has none.
    #[must_use]
    pub const fn wire_code(self) -> Option<i32> {
        match self {
            Self::ReadUncommitted => Some(0),
            Self::ReadCommitted => Some(1),
            Self::RepeatableRead => Some(3),
            Self::Serializable => None,
        }
    }

    /// Decodes the cluster's numeric encoding. Code 2 is reserved by the
    /// cluster and decodes to `None`.
    #[must_use]
    pub const fn from_wire(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::ReadUncommitted),
            1 => Some(Self::ReadCommitted),
            3 => Some(Self::RepeatableRead),
            _ => None,
        }
    }
}

pub(crate) struct SessionInner {
    pub(crate) link: Box<dyn ClusterLink>,
    authenticated: bool,
    transaction_active: bool,
    pushed_autocommit: bool,
    last_isolation: Option<IsolationLevel>,
}

struct ShareEntry {
    share: Arc<CollectionShare>,
    uncommitted_rows: i64,
}

/// One logical session's exclusively owned cluster connection.
///
/// A session is created through the registry, holds exactly one link, and
/// serializes every cluster call it issues. Reconnection never changes the
/// session's identity; it only re-establishes the link, which invalidates
/// collection references resolved under the previous link generation.
pub struct Session {
    session_id: u64,
    replica_thread: bool,
    config: ConfigHandle,
    credentials: Arc<CredentialCache>,
    shares: Mutex<HashMap<String, ShareEntry>>,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub(crate) fn new(
        session_id: u64,
        replica_thread: bool,
        driver: &dyn ClusterDriver,
        config: ConfigHandle,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            session_id,
            replica_thread,
            config,
            credentials,
            shares: Mutex::new(HashMap::new()),
            inner: Mutex::new(SessionInner {
                link: driver.open_link(),
                authenticated: false,
                transaction_active: false,
                pushed_autocommit: false,
                last_isolation: None,
            }),
        }
    }

    /// The owning session id, assigned once at creation.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Whether this session serves a replica thread. Fixed at creation.
    #[must_use]
    pub fn replica_thread(&self) -> bool {
        self.replica_thread
    }

    /// Whether a transaction is currently active.
    #[must_use]
    pub fn transaction_active(&self) -> bool {
        self.inner.lock().transaction_active
    }

    /// Whether statement-level autocommit has been pushed down.
    #[must_use]
    pub fn pushed_autocommit(&self) -> bool {
        self.inner.lock().pushed_autocommit
    }

    /// Records the caller's statement-level autocommit decision. Consulted
    /// by [`begin_transaction`](Self::begin_transaction) and cleared when the
    /// enclosing commit or rollback returns.
    pub fn set_pushed_autocommit(&self, on: bool) {
        self.inner.lock().pushed_autocommit = on;
    }

    pub(crate) fn config_snapshot(&self) -> Arc<ClientConfig> {
        self.config.snapshot()
    }

    /// Ensures the connection is live and authenticated.
    ///
    /// A session that is already both is left untouched. Otherwise the
    /// configured address list is parsed, the cached credential revealed,
    /// and the link re-dialed; success registers the session's source tag
    /// and transaction policy with the cluster. Any failure tears the link
    /// down before returning.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a malformed address list, `Network` when no
    /// coordinator is reachable, `Authentication` for every credential or
    /// authority problem.
    pub fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.connect_locked(&mut inner)
    }

    fn connect_locked(&self, inner: &mut SessionInner) -> Result<()> {
        if inner.link.is_connected() && inner.authenticated {
            return Ok(());
        }
        inner.authenticated = false;
        inner.transaction_active = false;
        inner.last_isolation = None;

        let config = self.config.snapshot();
        let mut addresses = AddressSet::new(config.max_addresses());
        addresses.parse(config.coord_addresses())?;

        let credentials = if config.token().is_empty() {
            let password = self.credentials.reveal()?;
            Credentials::Password {
                user: config.user().to_string(),
                password: password.as_str().to_string(),
            }
        } else {
            Credentials::Token {
                user: config.user().to_string(),
                token: config.token().to_string(),
                cipherfile: config.cipherfile().to_string(),
            }
        };

        if let Err(err) = inner.link.connect(addresses.addresses(), &credentials) {
            inner.link.disconnect();
            return Err(map_connect_error(err));
        }

        let attributes = doc! {
            SOURCE: self.source_tag(config.host_label()),
            TRANS_AUTO_ROLLBACK: false,
            TRANS_AUTO_COMMIT: config.autocommit(),
        };
        if let Err(err) = inner.link.set_session_attributes(&attributes) {
            inner.link.disconnect();
            return Err(map_connect_error(err));
        }

        inner.authenticated = true;
        debug!("session {} connected", self.session_id);
        Ok(())
    }

    fn source_tag(&self, host_label: &str) -> String {
        let pid = std::process::id();
        if host_label.is_empty() {
            format!("{SOURCE_PREFIX}:{pid}:{}", self.session_id)
        } else {
            format!("{SOURCE_PREFIX}:{host_label}:{pid}:{}", self.session_id)
        }
    }

    /// Runs `operation` with transparent reconnect on connectivity loss.
    ///
    /// The operation runs once; after a network-class failure outside any
    /// transaction it is re-run up to two more times, reconnecting first.
    /// Inside a transaction the failure surfaces immediately, because
    /// re-running it on a fresh link would silently abandon transactional
    /// context. If a reconnect itself fails, the original operation error is
    /// the one mapped and returned.
    pub(crate) fn retry<T>(
        &self,
        operation: impl FnMut(&mut SessionInner) -> DriverResult<T>,
    ) -> Result<T> {
        let mut inner = self.inner.lock();
        self.retry_locked(&mut inner, operation)
    }

    fn retry_locked<T>(
        &self,
        inner: &mut SessionInner,
        mut operation: impl FnMut(&mut SessionInner) -> DriverResult<T>,
    ) -> Result<T> {
        let mut budget = RETRY_BUDGET;
        loop {
            let err = match operation(inner) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_network() || inner.transaction_active || budget == 0 {
                return Err(Error::from_driver(err));
            }
            budget -= 1;
            debug!(
                "session {} reconnecting after network failure: {err}",
                self.session_id
            );
            if self.connect_locked(inner).is_err() {
                return Err(Error::from_driver(err));
            }
        }
    }

    /// Runs `operation` exactly once under the connection lock, mapping any
    /// failure without retrying. Batch writes use this path.
    pub(crate) fn run_once<T>(&self, operation: impl FnOnce() -> DriverResult<T>) -> Result<T> {
        let _guard = self.inner.lock();
        operation().map_err(Error::from_driver)
    }

    /// Begins a transaction at the requested isolation.
    ///
    /// A no-op when transactions are disabled by configuration. When the
    /// requested isolation differs from the last one set on this link, a
    /// session-attribute update is pushed (and cached only on success)
    /// before the begin. In pushed-autocommit mode the transaction is marked
    /// active without a cluster-level begin.
    ///
    /// # Errors
    ///
    /// `NotAllowed` for serializable isolation; otherwise whatever the
    /// attribute push or cluster begin surfaces.
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Result<()> {
        let config = self.config.snapshot();
        if !config.use_transaction() {
            return Ok(());
        }
        let Some(code) = isolation.wire_code() else {
            return Err(Error::not_allowed("serializable isolation is not supported"));
        };

        let mut inner = self.inner.lock();
        if inner.last_isolation != Some(isolation) {
            let attributes = doc! { TRANS_ISOLATION: code };
            self.retry_locked(&mut inner, |inner| {
                inner.link.set_session_attributes(&attributes)
            })?;
            inner.last_isolation = Some(isolation);
        }

        if !inner.transaction_active {
            if inner.pushed_autocommit {
                inner.transaction_active = true;
            } else {
                self.retry_locked(&mut inner, |inner| inner.link.begin_transaction())?;
                inner.transaction_active = true;
            }
        }
        Ok(())
    }

    /// Commits the active transaction, if any.
    ///
    /// The active flag is cleared before the cluster commit is issued, so a
    /// reconnect triggered by a failing commit never observes the session as
    /// still inside the transaction. On a network failure the link is
    /// re-established best-effort before the commit error is returned. The
    /// pushed-autocommit flag is cleared unconditionally.
    pub fn commit_transaction(&self, hint: &Document) -> Result<()> {
        let mut inner = self.inner.lock();
        let result = if inner.transaction_active {
            inner.transaction_active = false;
            if inner.pushed_autocommit {
                Ok(())
            } else {
                match inner.link.commit_transaction(hint) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        if err.is_network() {
                            let _ = self.connect_locked(&mut inner);
                        }
                        Err(Error::from_driver(err))
                    }
                }
            }
        } else {
            Ok(())
        };
        inner.pushed_autocommit = false;
        result
    }

    /// Rolls back the active transaction, if any.
    ///
    /// Rollback is a cleanup path and never surfaces an error: a failed
    /// cluster rollback is logged and swallowed after a best-effort
    /// reconnect on network failure.
    pub fn rollback_transaction(&self) {
        let mut inner = self.inner.lock();
        if inner.transaction_active {
            inner.transaction_active = false;
            if !inner.pushed_autocommit {
                if let Err(err) = inner.link.rollback_transaction() {
                    if err.is_network() {
                        let _ = self.connect_locked(&mut inner);
                    }
                    warn!(
                        "session {} transaction rollback failed, continuing: {err}",
                        self.session_id
                    );
                }
            }
        }
        inner.pushed_autocommit = false;
    }

    /// Resolves a handle to an existing collection.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for empty names, `NotFound` when the namespace or
    /// collection does not exist.
    pub fn collection(&self, namespace: &str, name: &str) -> Result<Collection<'_>> {
        Collection::open(self, namespace, name)
    }

    /// Creates a collection (and its namespace if needed) and resolves a
    /// handle to it.
    ///
    /// Already-exists responses from concurrent creators are success paths.
    /// If creation fails partway, whatever this call itself created is
    /// dropped again before the error is returned, so callers never observe
    /// half-created state.
    pub fn create_collection(&self, namespace: &str, name: &str) -> Result<Collection<'_>> {
        if namespace.is_empty() || name.is_empty() {
            return Err(Error::invalid_argument(
                "namespace and collection names must be non-empty",
            ));
        }
        let config = self.config.snapshot();
        let mut inner = self.inner.lock();
        self.connect_locked(&mut inner)?;

        let mut created_namespace = false;
        let mut created_collection = false;
        let mut budget = RETRY_BUDGET;
        let result = loop {
            match self.provision_step(
                &mut inner,
                namespace,
                name,
                &config,
                &mut created_namespace,
                &mut created_collection,
            ) {
                Ok(true) => break Ok(()),
                Ok(false) => {
                    // The namespace vanished between steps; re-provision.
                    if budget == 0 {
                        break Err(Error::not_found(format!(
                            "namespace kept vanishing during creation: {namespace}"
                        )));
                    }
                    budget -= 1;
                }
                Err(err) if err.is_network() && !inner.transaction_active && budget > 0 => {
                    budget -= 1;
                    if self.connect_locked(&mut inner).is_err() {
                        break Err(Error::from_driver(err));
                    }
                }
                Err(err) => break Err(Error::from_driver(err)),
            }
        };

        if let Err(err) = result {
            if created_namespace {
                if let Err(drop_err) = inner.link.drop_namespace(namespace) {
                    warn!("failed to drop partially created namespace {namespace}: {drop_err}");
                }
            } else if created_collection {
                if let Err(drop_err) = inner.link.drop_collection(namespace, name) {
                    warn!(
                        "failed to drop partially created collection {namespace}.{name}: {drop_err}"
                    );
                }
            }
            return Err(err);
        }

        drop(inner);
        Collection::open(self, namespace, name)
    }

    /// One provisioning pass. `Ok(true)` means the collection now exists,
    /// `Ok(false)` that the namespace vanished mid-pass and the caller
    /// should re-run.
    fn provision_step(
        &self,
        inner: &mut SessionInner,
        namespace: &str,
        name: &str,
        config: &ClientConfig,
        created_namespace: &mut bool,
        created_collection: &mut bool,
    ) -> DriverResult<bool> {
        if let Err(err) = inner.link.get_namespace(namespace) {
            if err.code() != StatusCode::NamespaceNotFound {
                return Err(err);
            }
            let options = doc! { PAGE_SIZE: NAMESPACE_PAGE_SIZE };
            match inner.link.create_namespace(namespace, &options) {
                Ok(()) => *created_namespace = true,
                // A concurrent creator won the race; it owns the namespace.
                Err(err) if err.code() == StatusCode::NamespaceExists => {}
                Err(err) => return Err(err),
            }
        }

        let options = doc! { REPL_SIZE: config.replica_size() };
        match inner.link.create_collection(namespace, name, &options) {
            Ok(()) => {
                *created_collection = true;
                Ok(true)
            }
            Err(err) if err.code() == StatusCode::CollectionExists => Ok(true),
            Err(err) if err.code() == StatusCode::NamespaceNotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Drops a collection. An absent collection or namespace counts as
    /// already dropped.
    pub fn drop_collection(&self, namespace: &str, name: &str) -> Result<()> {
        match self.retry(|inner| inner.link.drop_collection(namespace, name)) {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Drops a namespace and everything in it. An absent namespace counts
    /// as already dropped.
    pub fn drop_namespace(&self, namespace: &str) -> Result<()> {
        match self.retry(|inner| inner.link.drop_namespace(namespace)) {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Renames a collection within its namespace.
    pub fn rename_collection(&self, namespace: &str, from: &str, to: &str) -> Result<()> {
        self.retry(|inner| inner.link.rename_collection(namespace, from, to))
    }

    /// Fetches the first document of an engine snapshot.
    ///
    /// # Errors
    ///
    /// `EndOfData` when the snapshot matched nothing.
    pub fn snapshot(&self, kind: SnapshotKind, condition: &Document) -> Result<Document> {
        self.retry(|inner| {
            let mut cursor = inner.link.snapshot(kind, condition)?;
            let document = cursor.next()?;
            let _ = cursor.close();
            Ok(document)
        })
    }

    /// Asks the cluster to interrupt whatever this connection is doing.
    pub fn interrupt_operation(&self) -> Result<()> {
        self.retry(|inner| inner.link.interrupt())
    }

    /// Fetches the server's detail object for the last failed operation on
    /// this connection. Absent detail is not an error.
    pub fn last_error_detail(&self) -> Result<Option<Document>> {
        self.retry(|inner| inner.link.last_error_detail())
    }

    /// Aggregated storage statistics for one collection, folded across all
    /// nodes that hold a piece of it.
    pub fn collection_statistics(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<CollectionStatistics> {
        self.collection(namespace, name)?.statistics()
    }

    /// Registers a collection share with this session's side table.
    pub fn register_share(&self, share: &Arc<CollectionShare>) {
        let mut shares = self.shares.lock();
        shares
            .entry(share.qualified_name().to_string())
            .or_insert_with(|| ShareEntry {
                share: Arc::clone(share),
                uncommitted_rows: 0,
            });
    }

    /// Adds `delta` uncommitted rows to the share's running total,
    /// registering the share if needed.
    pub fn add_uncommitted_rows(&self, share: &Arc<CollectionShare>, delta: i64) {
        let mut shares = self.shares.lock();
        let entry = shares
            .entry(share.qualified_name().to_string())
            .or_insert_with(|| ShareEntry {
                share: Arc::clone(share),
                uncommitted_rows: 0,
            });
        entry.uncommitted_rows += delta;
    }

    /// Reads and resets the share's uncommitted row total. Commit paths use
    /// this to publish deltas into the share's cached statistics.
    pub fn take_uncommitted_rows(&self, share: &CollectionShare) -> i64 {
        let mut shares = self.shares.lock();
        shares
            .get_mut(share.qualified_name())
            .map_or(0, |entry| std::mem::take(&mut entry.uncommitted_rows))
    }

    /// The shares this session currently tracks.
    #[must_use]
    pub fn shares(&self) -> Vec<Arc<CollectionShare>> {
        self.shares
            .lock()
            .values()
            .map(|entry| Arc::clone(&entry.share))
            .collect()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("replica_thread", &self.replica_thread)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.get_mut().link.disconnect();
    }
}

/// Connect-time error policy: every credential and connectivity problem is
/// collapsed into the fixed forbidden-access signal, except a raw
/// network-unreachable condition, which callers may want to retry.
fn map_connect_error(err: DriverError) -> Error {
    if err.code() == StatusCode::NetworkUnreachable {
        return Error::from_driver(err);
    }
    if err.is_network() || err.code().is_credential() {
        return Error::authentication();
    }
    Error::from_driver(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use madrone_driver::{MemoryCluster, MemoryDriver, Op};

    fn test_session() -> (Session, Arc<MemoryCluster>) {
        session_with_config(ClientConfig::default())
    }

    fn session_with_config(config: ClientConfig) -> (Session, Arc<MemoryCluster>) {
        let driver = MemoryDriver::new();
        let cluster = driver.cluster();
        let session = Session::new(
            7,
            false,
            &driver,
            ConfigHandle::new(config),
            Arc::new(CredentialCache::new()),
        );
        (session, cluster)
    }

    #[test]
    fn isolation_wire_codes() {
        assert_eq!(IsolationLevel::ReadUncommitted.wire_code(), Some(0));
        assert_eq!(IsolationLevel::ReadCommitted.wire_code(), Some(1));
        assert_eq!(IsolationLevel::RepeatableRead.wire_code(), Some(3));
        assert_eq!(IsolationLevel::Serializable.wire_code(), None);

        assert_eq!(IsolationLevel::from_wire(0), Some(IsolationLevel::ReadUncommitted));
        assert_eq!(IsolationLevel::from_wire(1), Some(IsolationLevel::ReadCommitted));
        assert_eq!(IsolationLevel::from_wire(2), None);
        assert_eq!(IsolationLevel::from_wire(3), Some(IsolationLevel::RepeatableRead));
        assert_eq!(IsolationLevel::from_wire(9), None);
    }

    #[test]
    fn connect_is_a_noop_when_authenticated() {
        let (session, cluster) = test_session();
        session.connect().unwrap();
        session.connect().unwrap();
        assert_eq!(cluster.calls(Op::Connect), 1);
    }

    #[test]
    fn connect_fails_fast_on_malformed_addresses() {
        let (session, cluster) =
            session_with_config(ClientConfig::new().with_coord_addresses("no-port"));
        let err = session.connect().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert_eq!(cluster.calls(Op::Connect), 0);
    }

    #[test]
    fn serializable_isolation_is_rejected() {
        let (session, cluster) = test_session();
        session.connect().unwrap();
        let err = session
            .begin_transaction(IsolationLevel::Serializable)
            .unwrap_err();
        assert!(matches!(err, Error::NotAllowed { .. }));
        assert!(!session.transaction_active());
        assert_eq!(cluster.calls(Op::BeginTransaction), 0);
    }

    #[test]
    fn transactions_disabled_make_begin_a_noop() {
        let (session, cluster) =
            session_with_config(ClientConfig::new().with_use_transaction(false));
        session.connect().unwrap();
        session
            .begin_transaction(IsolationLevel::ReadCommitted)
            .unwrap();
        assert!(!session.transaction_active());
        assert_eq!(cluster.calls(Op::BeginTransaction), 0);
        assert_eq!(cluster.calls(Op::SetSessionAttributes), 1); // connect only
    }

    #[test]
    fn pushed_autocommit_skips_cluster_transaction() {
        let (session, cluster) = test_session();
        session.connect().unwrap();
        session.set_pushed_autocommit(true);

        session
            .begin_transaction(IsolationLevel::ReadCommitted)
            .unwrap();
        assert!(session.transaction_active());
        assert_eq!(cluster.calls(Op::BeginTransaction), 0);

        session.commit_transaction(&Document::new()).unwrap();
        assert!(!session.transaction_active());
        assert!(!session.pushed_autocommit());
        assert_eq!(cluster.calls(Op::CommitTransaction), 0);
    }

    #[test]
    fn rollback_swallows_cluster_failures() {
        let (session, cluster) = test_session();
        session.connect().unwrap();
        session
            .begin_transaction(IsolationLevel::ReadCommitted)
            .unwrap();

        cluster.fail_next(Op::RollbackTransaction, StatusCode::ServerError, 1);
        session.rollback_transaction();
        assert!(!session.transaction_active());
    }

    #[test]
    fn share_deltas_accumulate_and_reset() {
        let (session, _cluster) = test_session();
        let share = Arc::new(CollectionShare::new("db", "t"));

        session.register_share(&share);
        session.add_uncommitted_rows(&share, 3);
        session.add_uncommitted_rows(&share, 2);
        assert_eq!(session.take_uncommitted_rows(&share), 5);
        assert_eq!(session.take_uncommitted_rows(&share), 0);
        assert_eq!(session.shares().len(), 1);
    }
}
