//! Session configuration snapshots.

use crate::addr::MAX_ADDRESSES;
use parking_lot::RwLock;
use std::sync::Arc;

/// Immutable configuration read once per connect attempt.
///
/// Sessions never see live mutation: they take an [`Arc`] snapshot from a
/// [`ConfigHandle`] at connect time and at the few call sites that consult
/// per-operation settings (bulk-insert size, replica size).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    coord_addresses: String,
    user: String,
    token: String,
    cipherfile: String,
    host_label: String,
    use_transaction: bool,
    autocommit: bool,
    max_addresses: usize,
    bulk_insert_size: usize,
    replica_size: i32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            coord_addresses: "localhost:11810".to_string(),
            user: String::new(),
            token: String::new(),
            cipherfile: String::new(),
            host_label: String::new(),
            use_transaction: true,
            autocommit: true,
            max_addresses: MAX_ADDRESSES,
            bulk_insert_size: 2000,
            replica_size: 1,
        }
    }
}

impl ClientConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the comma-separated coordinator address list.
    #[must_use]
    pub fn with_coord_addresses(mut self, addresses: impl Into<String>) -> Self {
        self.coord_addresses = addresses.into();
        self
    }

    /// Sets the authentication user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Sets a token credential; non-empty tokens take precedence over the
    /// cached password at connect time.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Sets the cipher file path handed through with token credentials.
    #[must_use]
    pub fn with_cipherfile(mut self, cipherfile: impl Into<String>) -> Self {
        self.cipherfile = cipherfile.into();
        self
    }

    /// Sets the host label embedded in the session source tag. Empty labels
    /// are omitted from the tag.
    #[must_use]
    pub fn with_host_label(mut self, label: impl Into<String>) -> Self {
        self.host_label = label.into();
        self
    }

    /// Enables or disables cluster transactions.
    #[must_use]
    pub const fn with_use_transaction(mut self, on: bool) -> Self {
        self.use_transaction = on;
        self
    }

    /// Sets the autocommit default registered with the cluster at connect.
    #[must_use]
    pub const fn with_autocommit(mut self, on: bool) -> Self {
        self.autocommit = on;
        self
    }

    /// Sets the coordinator address cap.
    #[must_use]
    pub const fn with_max_addresses(mut self, max: usize) -> Self {
        self.max_addresses = max;
        self
    }

    /// Sets how many documents a bulk insert sends per batch call.
    #[must_use]
    pub const fn with_bulk_insert_size(mut self, size: usize) -> Self {
        self.bulk_insert_size = size;
        self
    }

    /// Sets the replica count newly created collections ask for.
    #[must_use]
    pub const fn with_replica_size(mut self, size: i32) -> Self {
        self.replica_size = size;
        self
    }

    /// The raw coordinator address list.
    #[must_use]
    pub fn coord_addresses(&self) -> &str {
        &self.coord_addresses
    }

    /// The authentication user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The token credential (empty when password authentication is used).
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The cipher file path.
    #[must_use]
    pub fn cipherfile(&self) -> &str {
        &self.cipherfile
    }

    /// The host label embedded in the session source tag.
    #[must_use]
    pub fn host_label(&self) -> &str {
        &self.host_label
    }

    /// Whether cluster transactions are enabled.
    #[must_use]
    pub const fn use_transaction(&self) -> bool {
        self.use_transaction
    }

    /// The autocommit default.
    #[must_use]
    pub const fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// The coordinator address cap.
    #[must_use]
    pub const fn max_addresses(&self) -> usize {
        self.max_addresses
    }

    /// Documents per bulk-insert batch call.
    #[must_use]
    pub const fn bulk_insert_size(&self) -> usize {
        self.bulk_insert_size
    }

    /// Replica count for newly created collections.
    #[must_use]
    pub const fn replica_size(&self) -> i32 {
        self.replica_size
    }
}

/// Shared handle publishing configuration snapshots to sessions.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<ClientConfig>>>,
}

impl ConfigHandle {
    /// Publishes an initial configuration.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// The current configuration snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.inner.read())
    }

    /// Atomically replaces the published configuration. Sessions pick the
    /// new value up at their next snapshot.
    pub fn replace(&self, config: ClientConfig) {
        *self.inner.write() = Arc::new(config);
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.coord_addresses(), "localhost:11810");
        assert_eq!(config.user(), "");
        assert!(config.use_transaction());
        assert!(config.autocommit());
        assert_eq!(config.max_addresses(), 128);
        assert_eq!(config.bulk_insert_size(), 2000);
        assert_eq!(config.replica_size(), 1);
    }

    #[test]
    fn builders_override_fields() {
        let config = ClientConfig::new()
            .with_coord_addresses("a:1,b:2")
            .with_user("sa")
            .with_use_transaction(false)
            .with_bulk_insert_size(16);
        assert_eq!(config.coord_addresses(), "a:1,b:2");
        assert_eq!(config.user(), "sa");
        assert!(!config.use_transaction());
        assert_eq!(config.bulk_insert_size(), 16);
    }

    #[test]
    fn handle_publishes_replacements() {
        let handle = ConfigHandle::default();
        let before = handle.snapshot();
        handle.replace(ClientConfig::new().with_user("sa"));
        let after = handle.snapshot();
        assert_eq!(before.user(), "");
        assert_eq!(after.user(), "sa");
    }
}
