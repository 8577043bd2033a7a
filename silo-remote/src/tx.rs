//! The remote read transaction.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use silo_kv::{
    KvCursor, KvError, KvRwTx, KvTx, TableCfg, TableCfgItem, Walker,
};
use silo_proto::remote::{CursorOp, Op};

use crate::channel::TxChannel;
use crate::cursor::{RemoteCursor, RemoteDupSortCursor};

const READ_ONLY: &str = "remote kv is read-only";

/// Transaction lifecycle. New cursor operations are rejected as soon as a
/// rollback starts; once closed, every handle minted from the transaction is
/// invalid and fails without touching the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Closing,
    Closed,
}

/// A read-only transaction over one dedicated RPC stream.
///
/// Not meant to be shared across tasks: the channel has one logical speaker
/// and one logical listener, and every operation issued through the
/// transaction or its cursors is serialized over it.
pub struct RemoteTx {
    chan: Arc<TxChannel>,
    tables: Arc<TableCfg>,
    /// One cached cursor per table, reused by `get_one`/`has` point reads.
    stateless: HashMap<String, RemoteCursor>,
    state: TxState,
}

impl RemoteTx {
    pub(crate) fn new(chan: Arc<TxChannel>, tables: Arc<TableCfg>) -> Self {
        Self { chan, tables, stateless: HashMap::new(), state: TxState::Active }
    }

    /// Mark this transaction as having asked the server to stream records
    /// ahead of the request/response rhythm. Nothing in this crate sets it;
    /// it is the seam for a streaming read extension. Teardown consults the
    /// flag and hard-cancels instead of half-closing when it is set.
    pub async fn request_streaming(&mut self) {
        self.chan.request_streaming().await;
    }

    fn ensure_active(&self) -> Result<(), KvError> {
        match self.state {
            TxState::Active => Ok(()),
            TxState::Closing | TxState::Closed => Err(KvError::TxClosed),
        }
    }

    fn table_cfg(&self, table: &str) -> Result<TableCfgItem, KvError> {
        self.tables
            .get(table)
            .copied()
            .ok_or_else(|| KvError::UnknownTable(table.to_string()))
    }

    async fn open_cursor(&self, table: &str) -> Result<RemoteCursor, KvError> {
        self.ensure_active()?;
        let cfg = self.table_cfg(table)?;
        RemoteCursor::open(self.chan.clone(), table, cfg).await
    }

    async fn stateless_cursor(&mut self, table: &str) -> Result<&mut RemoteCursor, KvError> {
        self.ensure_active()?;
        let cfg = self.table_cfg(table)?;
        match self.stateless.entry(table.to_string()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let cursor = RemoteCursor::open(self.chan.clone(), table, cfg).await?;
                Ok(slot.insert(cursor))
            }
        }
    }

    async fn walk(
        cursor: &mut RemoteCursor,
        from: &[u8],
        prefix: Option<&[u8]>,
        mut remaining: Option<u32>,
        walker: Walker<'_>,
    ) -> Result<(), KvError> {
        let mut record = cursor.seek(from).await?;
        while let Some((key, value)) = record {
            if let Some(prefix) = prefix {
                if !key.starts_with(prefix) {
                    break;
                }
            }
            if let Some(left) = remaining.as_mut() {
                if *left == 0 {
                    break;
                }
                *left -= 1;
            }
            walker(&key, &value)?;
            record = cursor.next().await?;
        }
        Ok(())
    }

    async fn walk_with(
        &mut self,
        table: &str,
        from: &[u8],
        prefix: Option<&[u8]>,
        remaining: Option<u32>,
        walker: Walker<'_>,
    ) -> Result<(), KvError> {
        let mut cursor = self.open_cursor(table).await?;
        let walked = Self::walk(&mut cursor, from, prefix, remaining, walker).await;
        cursor.close().await;
        walked
    }
}

#[async_trait]
impl KvTx for RemoteTx {
    type Cursor = RemoteCursor;
    type DupCursor = RemoteDupSortCursor;

    async fn get_one(&mut self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        let cursor = self.stateless_cursor(table).await?;
        Ok(cursor.seek_exact(key).await?.map(|(_, value)| value))
    }

    async fn has(&mut self, table: &str, key: &[u8]) -> Result<bool, KvError> {
        let cursor = self.stateless_cursor(table).await?;
        match cursor.seek(key).await? {
            Some((found, _)) => Ok(found == key),
            None => Ok(false),
        }
    }

    async fn cursor(&mut self, table: &str) -> Result<RemoteCursor, KvError> {
        self.open_cursor(table).await
    }

    async fn cursor_dup_sort(&mut self, table: &str) -> Result<RemoteDupSortCursor, KvError> {
        Ok(RemoteDupSortCursor::new(self.open_cursor(table).await?))
    }

    async fn for_each(
        &mut self,
        table: &str,
        from_prefix: &[u8],
        walker: Walker<'_>,
    ) -> Result<(), KvError> {
        self.walk_with(table, from_prefix, None, None, walker).await
    }

    async fn for_prefix(
        &mut self,
        table: &str,
        prefix: &[u8],
        walker: Walker<'_>,
    ) -> Result<(), KvError> {
        self.walk_with(table, prefix, Some(prefix), None, walker).await
    }

    async fn for_amount(
        &mut self,
        table: &str,
        from_prefix: &[u8],
        amount: u32,
        walker: Walker<'_>,
    ) -> Result<(), KvError> {
        self.walk_with(table, from_prefix, None, Some(amount), walker).await
    }

    async fn rollback(&mut self) {
        if self.state == TxState::Closed {
            return;
        }
        self.state = TxState::Closing;
        for id in self.chan.take_cursors().await {
            let ack = self
                .chan
                .round_trip(CursorOp {
                    op: Op::Close as i32,
                    cursor: id,
                    bucket_name: String::new(),
                    k: None,
                    v: None,
                })
                .await;
            if let Err(err) = ack {
                tracing::debug!(cursor = id, error = %err, "closing cursor during rollback");
            }
        }
        self.chan.close().await;
        self.stateless.clear();
        self.state = TxState::Closed;
    }
}

#[async_trait]
impl KvRwTx for RemoteTx {
    async fn commit(&mut self) -> Result<(), KvError> {
        panic!("{READ_ONLY}: commit");
    }

    async fn put(&mut self, _table: &str, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: put");
    }

    async fn delete(&mut self, _table: &str, _key: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: delete");
    }

    async fn append(&mut self, _table: &str, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: append");
    }

    async fn append_dup(&mut self, _table: &str, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: append_dup");
    }

    async fn increment_sequence(&mut self, _table: &str, _amount: u64) -> Result<u64, KvError> {
        panic!("{READ_ONLY}: increment_sequence");
    }

    async fn read_sequence(&mut self, _table: &str) -> Result<u64, KvError> {
        panic!("{READ_ONLY}: read_sequence");
    }

    async fn bucket_size(&mut self, _table: &str) -> Result<u64, KvError> {
        panic!("{READ_ONLY}: bucket_size");
    }
}
