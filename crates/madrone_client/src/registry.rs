//! Process-wide session registry and the per-collection share state.

use crate::config::{ClientConfig, ConfigHandle};
use crate::credential::CredentialCache;
use crate::error::Result;
use crate::session::Session;
use crate::stats::CollectionStatistics;
use madrone_driver::ClusterDriver;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// State shared by every consumer of one collection across sessions.
///
/// The share carries no connection. It exists so that expensive aggregated
/// statistics are computed once and then served from cache, with committed
/// row deltas folded in between refreshes.
pub struct CollectionShare {
    qualified_name: String,
    cached_statistics: Mutex<Option<CollectionStatistics>>,
}

impl CollectionShare {
    /// Creates a share for `namespace.name`.
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            qualified_name: format!("{namespace}.{name}"),
            cached_statistics: Mutex::new(None),
        }
    }

    /// The `namespace.name` key this share stands for.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// The cached statistics, if a refresh has happened.
    #[must_use]
    pub fn cached_statistics(&self) -> Option<CollectionStatistics> {
        *self.cached_statistics.lock()
    }

    /// Publishes freshly aggregated statistics.
    pub fn store_statistics(&self, statistics: CollectionStatistics) {
        *self.cached_statistics.lock() = Some(statistics);
    }

    /// Folds a committed row-count delta into the cache. A share with no
    /// cache yet stays empty; the next refresh sees the true count anyway.
    pub fn apply_row_delta(&self, delta: i64) {
        let mut cached = self.cached_statistics.lock();
        if let Some(statistics) = cached.as_mut() {
            statistics.total_records = (statistics.total_records + delta).max(0);
        }
    }

    /// Drops the cache, forcing the next reader to refresh.
    pub fn invalidate_statistics(&self) {
        *self.cached_statistics.lock() = None;
    }
}

/// Owner of every session in the process.
///
/// Consumers address sessions by an externally assigned id (one per client
/// thread). The registry hands out `Arc`s so callers can hold a session
/// across calls while the registry keeps the authoritative map; releasing
/// an id drops the registry's reference, and the session disconnects once
/// the last holder lets go.
pub struct SessionRegistry {
    driver: Box<dyn ClusterDriver>,
    config: ConfigHandle,
    credentials: Arc<CredentialCache>,
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
}

impl SessionRegistry {
    /// Creates a registry over `driver` with an empty credential cache.
    pub fn new(driver: impl ClusterDriver + 'static, config: ClientConfig) -> Self {
        Self {
            driver: Box::new(driver),
            config: ConfigHandle::new(config),
            credentials: Arc::new(CredentialCache::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Fetches the session for `session_id`, creating it on first use.
    ///
    /// With `revalidate` set the session's connection is verified (and
    /// re-established if needed) before it is returned, so the caller holds
    /// a session that is ready to carry an operation.
    ///
    /// A session id is expected to keep its replica flag for its lifetime;
    /// a mismatch is a caller bug and is logged, not honored.
    ///
    /// # Errors
    ///
    /// Only from revalidation, with [`Session::connect`]'s error contract.
    pub fn get_or_create(
        &self,
        session_id: u64,
        replica_thread: bool,
        revalidate: bool,
    ) -> Result<Arc<Session>> {
        let session = self.lookup_or_insert(session_id, replica_thread);
        if revalidate {
            session.connect()?;
        }
        Ok(session)
    }

    fn lookup_or_insert(&self, session_id: u64, replica_thread: bool) -> Arc<Session> {
        if let Some(session) = self.sessions.read().get(&session_id) {
            check_replica_flag(session, replica_thread);
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        let session = sessions.entry(session_id).or_insert_with(|| {
            info!("creating session {session_id}");
            Arc::new(Session::new(
                session_id,
                replica_thread,
                self.driver.as_ref(),
                self.config.clone(),
                Arc::clone(&self.credentials),
            ))
        });
        check_replica_flag(session, replica_thread);
        Arc::clone(session)
    }

    /// Forgets the session for `session_id`. The session disconnects when
    /// its last outside holder drops it.
    pub fn release(&self, session_id: u64) {
        self.sessions.write().remove(&session_id);
    }

    /// Number of sessions currently registered.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// The current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<ClientConfig> {
        self.config.snapshot()
    }

    /// Publishes a new configuration. Existing sessions pick it up on their
    /// next connect or bulk operation; live connections are left alone.
    pub fn replace_config(&self, config: ClientConfig) {
        self.config.replace(config);
    }

    /// Seals a new password into the shared credential cache, wiping the
    /// caller's plaintext. Sessions use it at their next connect.
    ///
    /// # Errors
    ///
    /// `Internal` when sealing fails.
    pub fn update_credential(&self, password: &mut String) -> Result<()> {
        self.credentials.update(password)
    }
}

fn check_replica_flag(session: &Session, replica_thread: bool) {
    debug_assert_eq!(
        session.replica_thread(),
        replica_thread,
        "session reused under a different replica flag"
    );
    if session.replica_thread() != replica_thread {
        warn!(
            "session {} reused with replica flag {replica_thread}, keeping its original",
            session.session_id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use madrone_driver::{MemoryDriver, Op};

    fn registry() -> (SessionRegistry, Arc<madrone_driver::MemoryCluster>) {
        let driver = MemoryDriver::new();
        let cluster = driver.cluster();
        (SessionRegistry::new(driver, ClientConfig::default()), cluster)
    }

    #[test]
    fn sessions_are_one_per_id() {
        let (registry, _cluster) = registry();
        let first = registry.get_or_create(1, false, false).unwrap();
        let again = registry.get_or_create(1, false, false).unwrap();
        let other = registry.get_or_create(2, false, false).unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.session_count(), 2);
    }

    #[test]
    fn release_forgets_the_session() {
        let (registry, _cluster) = registry();
        let _session = registry.get_or_create(1, false, false).unwrap();
        registry.release(1);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn revalidation_connects() {
        let (registry, cluster) = registry();
        registry.get_or_create(1, false, true).unwrap();
        assert_eq!(cluster.calls(Op::Connect), 1);

        // Already live: no second dial.
        registry.get_or_create(1, false, true).unwrap();
        assert_eq!(cluster.calls(Op::Connect), 1);
    }

    #[test]
    fn updated_credential_reaches_new_connections() {
        let driver = MemoryDriver::new();
        let cluster = driver.cluster();
        cluster.require_password("admin", "sesame");
        let registry = SessionRegistry::new(
            driver,
            ClientConfig::new().with_user("admin"),
        );

        let session = registry.get_or_create(1, false, false).unwrap();
        assert!(session.connect().is_err());

        let mut password = String::from("sesame");
        registry.update_credential(&mut password).unwrap();
        assert!(password.is_empty());
        session.connect().unwrap();
    }

    #[test]
    fn replaced_config_is_visible_in_snapshots() {
        let (registry, _cluster) = registry();
        registry.replace_config(ClientConfig::new().with_bulk_insert_size(7));
        assert_eq!(registry.config().bulk_insert_size(), 7);
    }

    #[test]
    fn share_statistics_cache_round_trip() {
        let share = CollectionShare::new("db", "t");
        assert!(share.cached_statistics().is_none());
        assert_eq!(share.qualified_name(), "db.t");

        let statistics = CollectionStatistics {
            page_size: 4096,
            total_data_pages: 10,
            total_index_pages: 2,
            total_data_free_space: 0,
            total_records: 100,
        };
        share.store_statistics(statistics);
        share.apply_row_delta(-150);
        let cached = share.cached_statistics().unwrap();
        assert_eq!(cached.total_records, 0);

        share.invalidate_statistics();
        assert!(share.cached_statistics().is_none());
    }
}
