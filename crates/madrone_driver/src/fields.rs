//! Wire field names shared by the session layer and drivers.
//!
//! These are the BSON keys the cluster speaks. They are fixed by the server,
//! not by this crate; both sides of the driver seam refer to them through
//! these constants so the spelling lives in one place.

/// Session attribute: client source tag (`"prefix:host:pid:session"`).
pub const SOURCE: &str = "Source";
/// Session attribute: roll back automatically when the link drops.
pub const TRANS_AUTO_ROLLBACK: &str = "TransAutoRollback";
/// Session attribute: statement-level autocommit policy.
pub const TRANS_AUTO_COMMIT: &str = "TransAutoCommit";
/// Session attribute: numeric transaction isolation level.
pub const TRANS_ISOLATION: &str = "TransIsolation";

/// Index descriptor: the recorded definition document.
pub const INDEX_DEF: &str = "IndexDef";
/// Index definition: key pattern.
pub const INDEX_KEY: &str = "key";
/// Index definition: index name.
pub const INDEX_NAME: &str = "name";
/// Index options: uniqueness (current format).
pub const UNIQUE: &str = "Unique";
/// Index definition: uniqueness (legacy lowercase format).
pub const LEGACY_UNIQUE: &str = "unique";
/// Index options: enforcement (current format).
pub const ENFORCED: &str = "Enforced";
/// Index definition: enforcement (legacy lowercase format).
pub const LEGACY_ENFORCED: &str = "enforced";
/// Index options and definition: not-null constraint.
pub const NOT_NULL: &str = "NotNull";

/// Statistics document: per-node detail array.
pub const DETAILS: &str = "Details";
/// Page size in bytes; a namespace option and a statistics detail field.
pub const PAGE_SIZE: &str = "PageSize";
/// Statistics detail: data page count.
pub const TOTAL_DATA_PAGES: &str = "TotalDataPages";
/// Statistics detail: index page count.
pub const TOTAL_INDEX_PAGES: &str = "TotalIndexPages";
/// Statistics detail: free space in bytes.
pub const TOTAL_DATA_FREE_SPACE: &str = "TotalDataFreeSpace";
/// Statistics detail: record count.
pub const TOTAL_RECORDS: &str = "TotalRecords";

/// Collection option: replica write concern.
pub const REPL_SIZE: &str = "ReplSize";
/// Auto-increment option: the field the sequence is attached to.
pub const AUTOINCREMENT_FIELD: &str = "Field";
/// Document key: object id.
pub const OID: &str = "_id";
