//! The remote database handle.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use silo_kv::{CompatFn, KvDb, KvError, KvRwDb, TableCfg, Version};
use silo_proto::remote::kv_client::KvClient;
use silo_proto::remote::Empty;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

use crate::builder::MAX_RECV_MSG_BYTES;
use crate::channel::{status_to_error, TxChannel};
use crate::tx::RemoteTx;

const READ_ONLY: &str = "remote kv is read-only";

/// Long-lived connection factory for remote read transactions.
///
/// Safe to share across concurrent callers: each `begin_ro` opens its own
/// stream on the shared transport. Closing the handle drops the transport;
/// it does not reach into transactions begun earlier.
pub struct RemoteKv {
    transport: Mutex<Option<Channel>>,
    tables: Arc<TableCfg>,
    version: Version,
    compat: CompatFn,
    addr: String,
}

impl RemoteKv {
    pub(crate) fn new(
        transport: Channel,
        tables: TableCfg,
        version: Version,
        compat: CompatFn,
        addr: String,
    ) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            tables: Arc::new(tables),
            version,
            compat,
            addr,
        }
    }

    fn client(&self) -> Result<KvClient<Channel>, KvError> {
        let guard = self.transport.lock().unwrap_or_else(|poison| poison.into_inner());
        let transport = guard.clone().ok_or(KvError::DbClosed)?;
        Ok(KvClient::new(transport).max_decoding_message_size(MAX_RECV_MSG_BYTES))
    }

    /// The underlying transport, shared by all transactions of this handle.
    pub fn grpc_channel(&self) -> Option<Channel> {
        self.transport.lock().unwrap_or_else(|poison| poison.into_inner()).clone()
    }

    /// Ask the server for its interface version and judge it against the
    /// version this handle was built with. Mismatch and RPC failure are
    /// logged and reported as `false`, never as an error.
    pub async fn ensure_version_compatibility(&self) -> bool {
        let mut client = match self.client() {
            Ok(client) => client,
            Err(_) => {
                tracing::error!("version check on a closed handle");
                return false;
            }
        };
        match client.version(Empty {}).await {
            Ok(reply) => {
                let server: Version = reply.into_inner().into();
                if (self.compat)(&self.version, &server) {
                    tracing::info!(client = %self.version, server = %server, "interface versions compatible");
                    true
                } else {
                    tracing::error!(client = %self.version, server = %server, "incompatible interface versions");
                    false
                }
            }
            Err(status) => {
                tracing::error!(error = %status, "fetching remote interface version");
                false
            }
        }
    }

    /// Begin a read-only transaction under a child scope of `ctx`. If the
    /// stream cannot be opened the child scope is cancelled before the error
    /// is returned, so nothing dangles.
    pub async fn begin_ro(&self, ctx: &CancellationToken) -> Result<RemoteTx, KvError> {
        let mut client = self.client()?;
        let cancel = ctx.child_token();
        let (req_tx, req_rx) = mpsc::channel(1);
        let opened = tokio::select! {
            _ = cancel.cancelled() => Err(KvError::Canceled),
            res = client.tx(ReceiverStream::new(req_rx)) => res.map_err(status_to_error),
        };
        match opened {
            Ok(response) => {
                let chan = TxChannel::new(req_tx, response.into_inner(), cancel);
                Ok(RemoteTx::new(Arc::new(chan), self.tables.clone()))
            }
            Err(err) => {
                cancel.cancel();
                Err(err)
            }
        }
    }

    /// Run `scope` inside a fresh read-only transaction and roll back on
    /// every exit path. The scope's result is handed through.
    pub async fn view<T, F>(&self, ctx: &CancellationToken, scope: F) -> Result<T, KvError>
    where
        F: for<'tx> FnOnce(&'tx mut RemoteTx) -> BoxFuture<'tx, Result<T, KvError>> + Send,
        T: Send,
    {
        use silo_kv::KvTx;

        let mut tx = self.begin_ro(ctx).await?;
        let result = scope(&mut tx).await;
        tx.rollback().await;
        result
    }

    /// Write-scope counterpart of [`RemoteKv::view`]; this client has none.
    pub async fn update<T, F>(&self, _ctx: &CancellationToken, _scope: F) -> Result<T, KvError>
    where
        F: for<'tx> FnOnce(&'tx mut RemoteTx) -> BoxFuture<'tx, Result<T, KvError>> + Send,
        T: Send,
    {
        panic!("{READ_ONLY}: update");
    }

    /// Drop the transport. Idempotent; only the first call logs.
    pub fn close(&self) {
        let mut guard = self.transport.lock().unwrap_or_else(|poison| poison.into_inner());
        if guard.take().is_some() {
            tracing::info!(addr = %self.addr, "remote database closed");
        }
    }
}

#[async_trait]
impl KvDb for RemoteKv {
    type Tx = RemoteTx;

    fn all_tables(&self) -> &TableCfg {
        &self.tables
    }

    async fn begin_ro(&self, ctx: &CancellationToken) -> Result<RemoteTx, KvError> {
        RemoteKv::begin_ro(self, ctx).await
    }

    fn close(&self) {
        RemoteKv::close(self);
    }
}

#[async_trait]
impl KvRwDb for RemoteKv {
    async fn begin_rw(&self, _ctx: &CancellationToken) -> Result<RemoteTx, KvError> {
        panic!("{READ_ONLY}: begin_rw");
    }
}
