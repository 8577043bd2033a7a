//! In-process transport for tests.
//!
//! A dialable pair: the client half plugs into the builder's `in_mem`
//! option, the server half is an incoming-connection stream for
//! `serve_with_incoming`. Each dial produces a fresh duplex pipe.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

const PIPE_CAPACITY: usize = 1 << 20;

/// Client half of the loopback transport.
#[derive(Clone)]
pub struct Loopback {
    accept_tx: mpsc::UnboundedSender<DuplexStream>,
}

/// Server half: yields one connection per dial.
pub struct LoopbackIncoming {
    accept_rx: mpsc::UnboundedReceiver<DuplexStream>,
}

impl Loopback {
    pub fn pair() -> (Loopback, LoopbackIncoming) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (Loopback { accept_tx }, LoopbackIncoming { accept_rx })
    }

    pub(crate) fn dial(&self) -> io::Result<DuplexStream> {
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        self.accept_tx
            .send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "loopback listener is gone"))?;
        Ok(client)
    }
}

impl Stream for LoopbackIncoming {
    type Item = io::Result<DuplexStream>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.accept_rx.poll_recv(cx).map(|conn| conn.map(Ok))
    }
}
