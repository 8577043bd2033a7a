//! Remote cursors: one request/response turn per positioning operation.

use std::sync::Arc;

use async_trait::async_trait;
use silo_kv::{
    KvCursor, KvCursorDupSort, KvError, KvPair, KvRwCursor, KvRwCursorDupSort, TableCfgItem,
};
use silo_proto::remote::{CursorOp, Op, Pair};

use crate::channel::TxChannel;

const READ_ONLY: &str = "remote kv is read-only";

/// A positioned iterator over one table, addressed by a server-assigned id.
/// Valid only while the parent transaction's channel is live.
pub struct RemoteCursor {
    chan: Arc<TxChannel>,
    table: String,
    cfg: TableCfgItem,
    id: u32,
    open: bool,
}

impl RemoteCursor {
    pub(crate) async fn open(
        chan: Arc<TxChannel>,
        table: &str,
        cfg: TableCfgItem,
    ) -> Result<Self, KvError> {
        let reply = chan
            .round_trip(CursorOp {
                op: Op::Open as i32,
                cursor: 0,
                bucket_name: table.to_string(),
                k: None,
                v: None,
            })
            .await?;
        let id = reply.cursor_id;
        chan.register_cursor(id).await;
        Ok(Self { chan, table: table.to_string(), cfg, id, open: true })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_dup_sort(&self) -> bool {
        self.cfg.is_dup_sort()
    }

    async fn turn(
        &mut self,
        op: Op,
        k: Option<Vec<u8>>,
        v: Option<Vec<u8>>,
    ) -> Result<Pair, KvError> {
        if !self.open {
            return Err(KvError::CursorClosed);
        }
        self.chan
            .round_trip(CursorOp { op: op as i32, cursor: self.id, bucket_name: String::new(), k, v })
            .await
    }

    async fn turn_pair(
        &mut self,
        op: Op,
        k: Option<Vec<u8>>,
        v: Option<Vec<u8>>,
    ) -> Result<Option<KvPair>, KvError> {
        Ok(into_pair(self.turn(op, k, v).await?))
    }

    async fn turn_value(
        &mut self,
        op: Op,
        k: Option<Vec<u8>>,
        v: Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.turn(op, k, v).await?.v)
    }
}

/// A present key, even an empty one, means a record; an absent key is the
/// end-of-range sentinel.
fn into_pair(reply: Pair) -> Option<KvPair> {
    reply.k.map(|k| (k, reply.v.unwrap_or_default()))
}

#[async_trait]
impl KvCursor for RemoteCursor {
    async fn first(&mut self) -> Result<Option<KvPair>, KvError> {
        self.turn_pair(Op::First, None, None).await
    }

    async fn last(&mut self) -> Result<Option<KvPair>, KvError> {
        self.turn_pair(Op::Last, None, None).await
    }

    async fn current(&mut self) -> Result<Option<KvPair>, KvError> {
        self.turn_pair(Op::Current, None, None).await
    }

    async fn next(&mut self) -> Result<Option<KvPair>, KvError> {
        self.turn_pair(Op::Next, None, None).await
    }

    async fn prev(&mut self) -> Result<Option<KvPair>, KvError> {
        self.turn_pair(Op::Prev, None, None).await
    }

    async fn seek(&mut self, key: &[u8]) -> Result<Option<KvPair>, KvError> {
        self.turn_pair(Op::Seek, Some(key.to_vec()), None).await
    }

    async fn seek_exact(&mut self, key: &[u8]) -> Result<Option<KvPair>, KvError> {
        self.turn_pair(Op::SeekExact, Some(key.to_vec()), None).await
    }

    async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let _ = self
            .chan
            .round_trip(CursorOp {
                op: Op::Close as i32,
                cursor: self.id,
                bucket_name: String::new(),
                k: None,
                v: None,
            })
            .await;
        self.chan.unregister_cursor(self.id).await;
    }
}

#[async_trait]
impl KvRwCursor for RemoteCursor {
    async fn put(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor put");
    }

    async fn put_no_overwrite(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor put_no_overwrite");
    }

    async fn append(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor append");
    }

    async fn delete(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor delete");
    }

    async fn delete_current(&mut self) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor delete_current");
    }

    async fn count(&mut self) -> Result<u64, KvError> {
        panic!("{READ_ONLY}: cursor count");
    }
}

/// Dup-sort-capable cursor. The dup operations are forwarded verbatim; if
/// the table is not actually dup-sorted the server's reply is authoritative.
pub struct RemoteDupSortCursor {
    inner: RemoteCursor,
}

impl RemoteDupSortCursor {
    pub(crate) fn new(inner: RemoteCursor) -> Self {
        Self { inner }
    }

    pub fn table(&self) -> &str {
        self.inner.table()
    }
}

#[async_trait]
impl KvCursor for RemoteDupSortCursor {
    async fn first(&mut self) -> Result<Option<KvPair>, KvError> {
        self.inner.first().await
    }

    async fn last(&mut self) -> Result<Option<KvPair>, KvError> {
        self.inner.last().await
    }

    async fn current(&mut self) -> Result<Option<KvPair>, KvError> {
        self.inner.current().await
    }

    async fn next(&mut self) -> Result<Option<KvPair>, KvError> {
        self.inner.next().await
    }

    async fn prev(&mut self) -> Result<Option<KvPair>, KvError> {
        self.inner.prev().await
    }

    async fn seek(&mut self, key: &[u8]) -> Result<Option<KvPair>, KvError> {
        self.inner.seek(key).await
    }

    async fn seek_exact(&mut self, key: &[u8]) -> Result<Option<KvPair>, KvError> {
        self.inner.seek_exact(key).await
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }
}

#[async_trait]
impl KvCursorDupSort for RemoteDupSortCursor {
    async fn first_dup(&mut self) -> Result<Option<Vec<u8>>, KvError> {
        self.inner.turn_value(Op::FirstDup, None, None).await
    }

    async fn last_dup(&mut self) -> Result<Option<Vec<u8>>, KvError> {
        self.inner.turn_value(Op::LastDup, None, None).await
    }

    async fn next_dup(&mut self) -> Result<Option<KvPair>, KvError> {
        self.inner.turn_pair(Op::NextDup, None, None).await
    }

    async fn next_no_dup(&mut self) -> Result<Option<KvPair>, KvError> {
        self.inner.turn_pair(Op::NextNoDup, None, None).await
    }

    async fn prev_dup(&mut self) -> Result<Option<KvPair>, KvError> {
        self.inner.turn_pair(Op::PrevDup, None, None).await
    }

    async fn prev_no_dup(&mut self) -> Result<Option<KvPair>, KvError> {
        self.inner.turn_pair(Op::PrevNoDup, None, None).await
    }

    async fn seek_both_range(
        &mut self,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<Vec<u8>>, KvError> {
        self.inner.turn_value(Op::SeekBoth, Some(key.to_vec()), Some(value.to_vec())).await
    }

    async fn seek_both_exact(
        &mut self,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<KvPair>, KvError> {
        self.inner.turn_pair(Op::SeekBothExact, Some(key.to_vec()), Some(value.to_vec())).await
    }
}

#[async_trait]
impl KvRwCursor for RemoteDupSortCursor {
    async fn put(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor put");
    }

    async fn put_no_overwrite(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor put_no_overwrite");
    }

    async fn append(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor append");
    }

    async fn delete(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor delete");
    }

    async fn delete_current(&mut self) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor delete_current");
    }

    async fn count(&mut self) -> Result<u64, KvError> {
        panic!("{READ_ONLY}: cursor count");
    }
}

#[async_trait]
impl KvRwCursorDupSort for RemoteDupSortCursor {
    async fn delete_exact(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor delete_exact");
    }

    async fn append_dup(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor append_dup");
    }

    async fn put_no_dup_data(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor put_no_dup_data");
    }

    async fn delete_current_duplicates(&mut self) -> Result<(), KvError> {
        panic!("{READ_ONLY}: cursor delete_current_duplicates");
    }

    async fn count_duplicates(&mut self) -> Result<u64, KvError> {
        panic!("{READ_ONLY}: cursor count_duplicates");
    }
}
