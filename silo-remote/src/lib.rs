//! Remote ordered KV client.
//!
//! Exposes the API of an embedded ordered key/value store (including
//! dup-sorted tables) while the actual storage lives in another process
//! behind a bidirectional streaming RPC. Each read transaction is carried on
//! one dedicated stream; cursors are opened, positioned, and read over that
//! stream as a strictly paired request/response conversation. Semantically
//! the surface is indistinguishable from a local cursor over a local store.
//!
//! The client is read-only: the write half of the trait surface panics
//! unconditionally and never reaches the wire.

mod builder;
mod channel;
mod cursor;
mod db;
mod loopback;
mod tls;
mod tx;

pub use builder::{RemoteKvBuilder, TlsMode};
pub use cursor::{RemoteCursor, RemoteDupSortCursor};
pub use db::RemoteKv;
pub use loopback::{Loopback, LoopbackIncoming};
pub use tx::RemoteTx;
