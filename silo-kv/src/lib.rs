//! Storage model for silo.
//!
//! This crate defines the pieces shared by every silo storage backend:
//! - Table configuration: which named tables exist and which of them keep
//!   duplicate keys with a sorted secondary value axis ([`tables`]).
//! - The ordered KV trait surface: databases, transactions, cursors, and the
//!   dup-sort cursor extension ([`traits`]).
//! - Interface versioning for the remote wire contract ([`version`]).
//!
//! Backends live in sibling crates; this crate stays free of any transport
//! or storage-engine dependency.

pub mod error;
pub mod tables;
pub mod traits;
pub mod version;

pub use error::KvError;
pub use tokio_util::sync::CancellationToken;
pub use tables::{chaindata_tables, TableCfg, TableCfgItem, TableFlags};
pub use traits::{
    KvCursor, KvCursorDupSort, KvDb, KvPair, KvRwCursor, KvRwCursorDupSort, KvRwDb, KvRwTx, KvTx,
    Walker,
};
pub use version::{CompatFn, Version};
