//! The per-transaction wire channel.
//!
//! One channel per transaction. The channel owns the request sender and the
//! response stream of a single `Tx` RPC and enforces strict pairing: for
//! every request sent, exactly one response is awaited before the next
//! request goes out. The async mutex around the state is what serializes
//! operations issued through distinct cursor handles of one transaction.

use silo_kv::KvError;
use silo_proto::remote::{CursorOp, Pair};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status, Streaming};

pub(crate) struct TxChannel {
    state: Mutex<ChannelState>,
    cancel: CancellationToken,
}

struct ChannelState {
    req_tx: Option<mpsc::Sender<CursorOp>>,
    resp_rx: Option<Streaming<Pair>>,
    /// Server-assigned ids of cursors still open, in insertion order.
    open_cursors: Vec<u32>,
    /// Set when a caller has asked the server to stream records ahead of
    /// the request/response rhythm. Teardown consults it: a mid-stream
    /// server cannot drain a graceful half-close promptly.
    streaming_requested: bool,
}

impl TxChannel {
    pub(crate) fn new(
        req_tx: mpsc::Sender<CursorOp>,
        resp_rx: Streaming<Pair>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: Mutex::new(ChannelState {
                req_tx: Some(req_tx),
                resp_rx: Some(resp_rx),
                open_cursors: Vec::new(),
                streaming_requested: false,
            }),
            cancel,
        }
    }

    /// Send one request and await its response, racing the transaction's
    /// cancellation scope. Fails without touching the wire once the channel
    /// has been torn down.
    pub(crate) async fn round_trip(&self, op: CursorOp) -> Result<Pair, KvError> {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        let (Some(req_tx), Some(resp_rx)) = (state.req_tx.as_ref(), state.resp_rx.as_mut()) else {
            return Err(KvError::TxClosed);
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(KvError::Canceled),
            res = exchange(req_tx, resp_rx, op) => res,
        }
    }

    pub(crate) async fn register_cursor(&self, id: u32) {
        self.state.lock().await.open_cursors.push(id);
    }

    pub(crate) async fn unregister_cursor(&self, id: u32) {
        self.state.lock().await.open_cursors.retain(|open| *open != id);
    }

    /// Take the ids of all still-open cursors, in insertion order.
    pub(crate) async fn take_cursors(&self) -> Vec<u32> {
        std::mem::take(&mut self.state.lock().await.open_cursors)
    }

    pub(crate) async fn request_streaming(&self) {
        self.state.lock().await.streaming_requested = true;
    }

    /// Tear the channel down.
    ///
    /// No-op when already closed. When streaming was requested the server is
    /// presumed mid-stream and gets a hard cancel; otherwise the request
    /// sender is dropped as a half-close marker and the terminal
    /// acknowledgment is awaited, with EOF and cancellation treated as the
    /// normal quiet outcome. The child cancellation always fires at the end
    /// so the stream is terminated even when the graceful path went wrong.
    pub(crate) async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.req_tx.is_none() {
            return;
        }
        state.req_tx = None;
        if state.streaming_requested {
            state.resp_rx = None;
        } else if let Some(mut resp_rx) = state.resp_rx.take() {
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                res = resp_rx.message() => match res {
                    Ok(_) => {}
                    Err(status) if status.code() == Code::Cancelled => {}
                    Err(status) => {
                        tracing::warn!(error = %status, "unexpected error from server after close");
                    }
                },
            }
        }
        state.streaming_requested = false;
        state.open_cursors.clear();
        self.cancel.cancel();
    }
}

async fn exchange(
    req_tx: &mpsc::Sender<CursorOp>,
    resp_rx: &mut Streaming<Pair>,
    op: CursorOp,
) -> Result<Pair, KvError> {
    if req_tx.send(op).await.is_err() {
        return Err(KvError::Transport("request stream closed".into()));
    }
    match resp_rx.message().await {
        Ok(Some(pair)) => Ok(pair),
        Ok(None) => Err(KvError::Protocol("stream ended in place of a response".into())),
        Err(status) => Err(status_to_error(status)),
    }
}

/// Map a terminal RPC status onto the KV error kinds. Cancellation keeps its
/// own kind so callers can tell a torn-down scope from a dead transport.
pub(crate) fn status_to_error(status: Status) -> KvError {
    match status.code() {
        Code::Cancelled => KvError::Canceled,
        _ => KvError::Transport(status.to_string()),
    }
}
