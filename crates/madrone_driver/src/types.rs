//! Shared types crossing the driver seam.

use bson::Document;

/// Credentials presented to the cluster at connect time.
///
/// Token credentials carry the cipher-file path opaquely; the driver decides
/// how (and whether) it can use it and reports `CipherFileMissing` if not.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Plain user/password authentication.
    Password {
        /// User name (may be empty for anonymous clusters).
        user: String,
        /// Decrypted password.
        password: String,
    },
    /// Token authentication backed by a cipher file.
    Token {
        /// User name.
        user: String,
        /// Authentication token.
        token: String,
        /// Path to the cipher file, passed through uninterpreted.
        cipherfile: String,
    },
}

impl Credentials {
    /// The user name carried by either credential form.
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            Credentials::Password { user, .. } | Credentials::Token { user, .. } => user,
        }
    }
}

/// Options for a collection query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Field selector (projection); empty selects everything.
    pub selector: Document,
    /// Sort order; empty means server order.
    pub order_by: Document,
    /// Access-plan hint; empty lets the server choose.
    pub hint: Document,
    /// Documents to skip before returning.
    pub skip: i64,
    /// Maximum documents to return; negative means no limit.
    pub limit: i64,
    /// Acquire update locks on returned documents.
    pub for_update: bool,
}

impl QueryOptions {
    /// Creates options that return every document in server order.
    #[must_use]
    pub fn new() -> Self {
        Self {
            selector: Document::new(),
            order_by: Document::new(),
            hint: Document::new(),
            skip: 0,
            limit: -1,
            for_update: false,
        }
    }

    /// Sets the field selector.
    #[must_use]
    pub fn with_selector(mut self, selector: Document) -> Self {
        self.selector = selector;
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn with_order_by(mut self, order_by: Document) -> Self {
        self.order_by = order_by;
        self
    }

    /// Sets the access-plan hint.
    #[must_use]
    pub fn with_hint(mut self, hint: Document) -> Self {
        self.hint = hint;
        self
    }

    /// Sets the skip count.
    #[must_use]
    pub fn with_skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the return limit.
    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Requests update locks on the returned documents.
    #[must_use]
    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine-level snapshot families a link can be asked for.
///
/// Discriminants are the cluster's snapshot type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SnapshotKind {
    /// Active sessions.
    Sessions = 2,
    /// Collections and their placement.
    Collections = 4,
    /// Whole-database summary.
    Database = 6,
    /// Open transactions.
    Transactions = 9,
}
