//! Error type shared by the KV trait surface.

use thiserror::Error;

/// Errors surfaced by KV databases, transactions, and cursors.
///
/// Absence is not an error: lookups and positioning operations signal a
/// missing record with `Ok(None)`, never with a variant of this enum.
#[derive(Debug, Error)]
pub enum KvError {
    /// The underlying connection or stream failed mid-operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer violated the request/response protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The operation's cancellation scope fired before a response arrived.
    #[error("operation canceled")]
    Canceled,

    /// The parent transaction was rolled back or its channel died.
    #[error("transaction is closed")]
    TxClosed,

    /// The cursor was explicitly closed; the handle is no longer usable.
    #[error("cursor is closed")]
    CursorClosed,

    /// The database handle was closed.
    #[error("database handle is closed")]
    DbClosed,

    /// The table name is not present in the handle's table configuration.
    #[error("unknown table {0:?}")]
    UnknownTable(String),

    /// TLS material could not be loaded or applied.
    #[error("tls configuration: {0}")]
    Tls(String),

    /// A walker callback asked to abort the iteration.
    #[error("walk aborted: {0}")]
    Aborted(String),
}
