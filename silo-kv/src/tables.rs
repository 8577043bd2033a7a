//! Table configuration for the chaindata schema.
//!
//! A table is a named ordered key/value namespace. Some tables keep multiple
//! values per key in a sorted secondary sequence ("dup-sort"); cursor
//! traversal over those tables has a second axis. The set of tables and
//! their flags is static for the life of a database handle: handles never
//! ask the server which tables exist.

use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Table names
// ---------------------------------------------------------------------------

pub const HEADERS: &str = "Headers";
pub const HEADER_NUMBERS: &str = "HeaderNumbers";
pub const CANONICAL_HEADERS: &str = "CanonicalHeaders";
pub const BLOCK_BODIES: &str = "BlockBodies";
pub const TRANSACTIONS: &str = "Transactions";
pub const RECEIPTS: &str = "Receipts";
pub const TX_LOOKUP: &str = "TxLookup";
pub const PLAIN_STATE: &str = "PlainState";
pub const HASHED_ACCOUNTS: &str = "HashedAccounts";
pub const HASHED_STORAGE: &str = "HashedStorage";
pub const ACCOUNT_CHANGE_SETS: &str = "AccountChangeSets";
pub const STORAGE_CHANGE_SETS: &str = "StorageChangeSets";
pub const CODE: &str = "Code";
pub const SEQUENCES: &str = "Sequences";
pub const SYNC_STAGE_PROGRESS: &str = "SyncStageProgress";
pub const CONFIG: &str = "Config";

// ---------------------------------------------------------------------------
// Configuration types
// ---------------------------------------------------------------------------

/// Ordering mode of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFlags {
    /// One value per key.
    #[default]
    Default,
    /// Multiple values per key, held in a sorted secondary sequence.
    DupSort,
}

/// Static per-table configuration known to a database handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCfgItem {
    pub flags: TableFlags,
}

impl TableCfgItem {
    pub const fn new(flags: TableFlags) -> Self {
        Self { flags }
    }

    pub const fn is_dup_sort(&self) -> bool {
        matches!(self.flags, TableFlags::DupSort)
    }
}

/// The effective table map of a handle: table name to configuration.
pub type TableCfg = BTreeMap<String, TableCfgItem>;

/// The default chaindata table map.
///
/// Callers customize it through the builder's table-config transform; the
/// handle clones the result so the default here is never shared mutably.
pub fn chaindata_tables() -> TableCfg {
    let plain = TableCfgItem::new(TableFlags::Default);
    let dup = TableCfgItem::new(TableFlags::DupSort);

    [
        (HEADERS, plain),
        (HEADER_NUMBERS, plain),
        (CANONICAL_HEADERS, plain),
        (BLOCK_BODIES, plain),
        (TRANSACTIONS, plain),
        (RECEIPTS, plain),
        (TX_LOOKUP, plain),
        (PLAIN_STATE, dup),
        (HASHED_ACCOUNTS, plain),
        (HASHED_STORAGE, dup),
        (ACCOUNT_CHANGE_SETS, dup),
        (STORAGE_CHANGE_SETS, dup),
        (CODE, plain),
        (SEQUENCES, plain),
        (SYNC_STAGE_PROGRESS, plain),
        (CONFIG, plain),
    ]
    .into_iter()
    .map(|(name, cfg)| (name.to_string(), cfg))
    .collect()
}
