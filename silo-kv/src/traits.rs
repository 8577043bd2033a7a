//! The ordered KV trait surface.
//!
//! The surface is split into capability sets: the read-only traits ([`KvDb`],
//! [`KvTx`], [`KvCursor`], [`KvCursorDupSort`]) are what most consumers code
//! against, while the `Rw` extensions exist for callers that need one uniform
//! type over read-only and read/write backends. A backend that cannot write
//! implements the `Rw` methods as unconditional panics: calling a write
//! method on it is a programmer error, not a runtime condition to recover
//! from.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::KvError;
use crate::tables::TableCfg;

/// A key/value record. Keys order lexicographically as unsigned bytes.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Callback driven by the transaction walkers. Returning an error aborts
/// the walk and propagates to the caller.
pub type Walker<'a> = &'a mut (dyn FnMut(&[u8], &[u8]) -> Result<(), KvError> + Send);

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// A handle to an ordered KV database. Safe to share across concurrent
/// callers; each caller begins its own transaction.
#[async_trait]
pub trait KvDb: Send + Sync {
    type Tx: KvTx;

    /// The effective table map of this handle.
    fn all_tables(&self) -> &TableCfg;

    /// Begin a read-only transaction under `ctx`. Cancelling `ctx` tears the
    /// transaction down and fails its in-flight operations.
    async fn begin_ro(&self, ctx: &CancellationToken) -> Result<Self::Tx, KvError>;

    /// Release the handle. Idempotent; transactions begun earlier keep their
    /// own channels and are unaffected until they roll back.
    fn close(&self);
}

/// Read/write extension of [`KvDb`].
#[async_trait]
pub trait KvRwDb: KvDb {
    async fn begin_rw(&self, ctx: &CancellationToken) -> Result<Self::Tx, KvError>;
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A read-only transactional scope over the database.
///
/// A transaction is single-speaker: it must not be shared across tasks. All
/// cursor operations inside one transaction are totally ordered by program
/// order, including operations on distinct cursors.
#[async_trait]
pub trait KvTx: Send {
    type Cursor: KvCursor;
    type DupCursor: KvCursorDupSort;

    /// Point lookup through the transaction's per-table stateless cursor.
    async fn get_one(&mut self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    /// Existence test: a `seek` followed by byte equality with `key`.
    async fn has(&mut self, table: &str, key: &[u8]) -> Result<bool, KvError>;

    /// Open a new independently positioned cursor over `table`.
    async fn cursor(&mut self, table: &str) -> Result<Self::Cursor, KvError>;

    /// Like [`KvTx::cursor`], tagging the handle as dup-sort capable. The
    /// client does not verify that `table` is actually dup-sorted; the
    /// server's behavior on a mismatch is authoritative.
    async fn cursor_dup_sort(&mut self, table: &str) -> Result<Self::DupCursor, KvError>;

    /// Walk `table` from the first key ≥ `from_prefix` to the end of the
    /// table, invoking `walker` per record. The cursor used is closed on
    /// every exit path.
    async fn for_each(
        &mut self,
        table: &str,
        from_prefix: &[u8],
        walker: Walker<'_>,
    ) -> Result<(), KvError>;

    /// Like [`KvTx::for_each`], but stops as soon as a key no longer starts
    /// with `prefix`.
    async fn for_prefix(
        &mut self,
        table: &str,
        prefix: &[u8],
        walker: Walker<'_>,
    ) -> Result<(), KvError>;

    /// Like [`KvTx::for_each`], capped at `amount` records.
    async fn for_amount(
        &mut self,
        table: &str,
        from_prefix: &[u8],
        amount: u32,
        walker: Walker<'_>,
    ) -> Result<(), KvError>;

    /// Close every cursor opened in this transaction in insertion order,
    /// then close the channel. Idempotent: a second call is a silent no-op.
    async fn rollback(&mut self);

    fn collect_metrics(&self) {}
}

/// Read/write extension of [`KvTx`].
#[async_trait]
pub trait KvRwTx: KvTx {
    async fn commit(&mut self) -> Result<(), KvError>;
    async fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn delete(&mut self, table: &str, key: &[u8]) -> Result<(), KvError>;
    async fn append(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn append_dup(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn increment_sequence(&mut self, table: &str, amount: u64) -> Result<u64, KvError>;
    async fn read_sequence(&mut self, table: &str) -> Result<u64, KvError>;
    async fn bucket_size(&mut self, table: &str) -> Result<u64, KvError>;
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// A positioned iterator over one table within one transaction.
///
/// Every positioning operation returns `Some((key, value))` for a record and
/// `None` as the end-of-range sentinel. A present key may be empty; absence
/// and emptiness are distinct.
#[async_trait]
pub trait KvCursor: Send {
    async fn first(&mut self) -> Result<Option<KvPair>, KvError>;
    async fn last(&mut self) -> Result<Option<KvPair>, KvError>;
    async fn current(&mut self) -> Result<Option<KvPair>, KvError>;
    async fn next(&mut self) -> Result<Option<KvPair>, KvError>;
    async fn prev(&mut self) -> Result<Option<KvPair>, KvError>;

    /// Position at the smallest key ≥ `key`.
    async fn seek(&mut self, key: &[u8]) -> Result<Option<KvPair>, KvError>;

    /// Position at the record whose key equals `key`, if any.
    async fn seek_exact(&mut self, key: &[u8]) -> Result<Option<KvPair>, KvError>;

    /// Release the cursor. After close, every call fails without touching
    /// the wire.
    async fn close(&mut self);
}

/// Cursor extension for dup-sorted tables: traversal of the sorted value
/// sequence under a single key.
#[async_trait]
pub trait KvCursorDupSort: KvCursor {
    /// First value of the current key.
    async fn first_dup(&mut self) -> Result<Option<Vec<u8>>, KvError>;
    /// Last value of the current key.
    async fn last_dup(&mut self) -> Result<Option<Vec<u8>>, KvError>;
    /// Next value of the current key; `None` once the key's sequence is
    /// exhausted.
    async fn next_dup(&mut self) -> Result<Option<KvPair>, KvError>;
    /// First value of the next distinct key.
    async fn next_no_dup(&mut self) -> Result<Option<KvPair>, KvError>;
    async fn prev_dup(&mut self) -> Result<Option<KvPair>, KvError>;
    async fn prev_no_dup(&mut self) -> Result<Option<KvPair>, KvError>;

    /// Among the values of `key`, the smallest value ≥ `value`.
    async fn seek_both_range(&mut self, key: &[u8], value: &[u8])
        -> Result<Option<Vec<u8>>, KvError>;

    /// Exact `(key, value)` lookup.
    async fn seek_both_exact(&mut self, key: &[u8], value: &[u8])
        -> Result<Option<KvPair>, KvError>;
}

/// Read/write extension of [`KvCursor`].
#[async_trait]
pub trait KvRwCursor: KvCursor {
    async fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn put_no_overwrite(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn append(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn delete(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn delete_current(&mut self) -> Result<(), KvError>;
    async fn count(&mut self) -> Result<u64, KvError>;
}

/// Read/write extension of [`KvCursorDupSort`].
#[async_trait]
pub trait KvRwCursorDupSort: KvCursorDupSort + KvRwCursor {
    async fn delete_exact(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn append_dup(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn put_no_dup_data(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    async fn delete_current_duplicates(&mut self) -> Result<(), KvError>;
    async fn count_duplicates(&mut self) -> Result<u64, KvError>;
}
