//! Connection builder for the remote KV client.

use std::path::PathBuf;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use silo_kv::tables::chaindata_tables;
use silo_kv::version::default_compat;
use silo_kv::{CompatFn, KvError, TableCfg, Version};
use tokio::time::Instant;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity, Uri};
use tower::service_fn;

use crate::db::RemoteKv;
use crate::loopback::Loopback;

/// Overall deadline for establishing the initial connection.
pub(crate) const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
/// Largest single response accepted from the server.
pub(crate) const MAX_RECV_MSG_BYTES: usize = 15 * 1024 * 1024;
/// Pacing of connect retries within the dial deadline.
const CONNECT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const CONNECT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// TLS material for the dial target.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    #[default]
    Disabled,
    /// Server-authenticated TLS: `trust_anchor` is the PEM certificate the
    /// server's chain must verify against.
    ServerAuth { trust_anchor: PathBuf },
    /// Mutual TLS from a client certificate/key pair and a CA certificate.
    ///
    /// `skip_hostname_verification` waives only the server-name check, for
    /// deployments where certificate names are not aligned with dial
    /// targets. Chain verification against `ca` still happens.
    Mutual {
        cert: PathBuf,
        key: PathBuf,
        ca: PathBuf,
        skip_hostname_verification: bool,
    },
}

/// Value-typed, chainable configuration for a [`RemoteKv`] handle.
pub struct RemoteKvBuilder {
    dial_address: String,
    version: Version,
    compat: CompatFn,
    tables_cfg: Box<dyn FnOnce(TableCfg) -> TableCfg + Send>,
    tls: TlsMode,
    in_mem: Option<Loopback>,
}

impl RemoteKvBuilder {
    /// Start from defaults: the chaindata table map, the default version
    /// compatibility rule, plaintext transport, no dial target yet.
    pub fn new(version: Version) -> Self {
        Self {
            dial_address: String::new(),
            version,
            compat: default_compat,
            tables_cfg: Box::new(|tables| tables),
            tls: TlsMode::Disabled,
            in_mem: None,
        }
    }

    /// Set the dial target, e.g. `"127.0.0.1:9090"`.
    pub fn path(mut self, address: impl Into<String>) -> Self {
        self.dial_address = address.into();
        self
    }

    /// Replace the table map: the transform receives the default chaindata
    /// map and returns the effective one.
    pub fn with_tables_config(
        mut self,
        f: impl FnOnce(TableCfg) -> TableCfg + Send + 'static,
    ) -> Self {
        self.tables_cfg = Box::new(f);
        self
    }

    /// Override the version compatibility predicate.
    pub fn with_compatibility(mut self, compat: CompatFn) -> Self {
        self.compat = compat;
        self
    }

    /// Dial an in-process loopback listener instead of a network address.
    pub fn in_mem(mut self, loopback: Loopback) -> Self {
        self.in_mem = Some(loopback);
        self
    }

    /// Configure TLS material for the dial target.
    pub fn tls(mut self, mode: TlsMode) -> Self {
        self.tls = mode;
        self
    }

    /// Selector kept for surface symmetry with writable backends.
    pub fn read_only(self) -> Self {
        self
    }

    /// Open the connection and materialize the handle. The effective table
    /// map is computed here and owned by the handle.
    pub async fn open(self) -> Result<RemoteKv, KvError> {
        let tables = (self.tables_cfg)(chaindata_tables());
        let (transport, addr) = match self.in_mem {
            Some(loopback) => (dial_loopback(loopback).await?, "in-mem".to_string()),
            None => (dial_remote(&self.dial_address, &self.tls).await?, self.dial_address),
        };
        Ok(RemoteKv::new(transport, tables, self.version, self.compat, addr))
    }

    /// Like [`RemoteKvBuilder::open`], but aborts on failure. For callers
    /// that treat misconfiguration as fatal.
    pub async fn must_open(self) -> RemoteKv {
        match self.open().await {
            Ok(db) => db,
            Err(err) => panic!("remote kv open failed: {err}"),
        }
    }
}

async fn dial_loopback(loopback: Loopback) -> Result<Channel, KvError> {
    Endpoint::from_static("http://in-mem")
        .connect_timeout(DIAL_TIMEOUT)
        .connect_with_connector(service_fn(move |_: Uri| {
            let loopback = loopback.clone();
            async move { loopback.dial().map(TokioIo::new) }
        }))
        .await
        .map_err(|err| KvError::Transport(err.to_string()))
}

async fn dial_remote(address: &str, tls: &TlsMode) -> Result<Channel, KvError> {
    if let TlsMode::Mutual { cert, key, ca, skip_hostname_verification: true } = tls {
        let url = normalize_url(address, true);
        return crate::tls::dial_mutual_skip_hostname(&url, cert, key, ca).await;
    }

    let url = normalize_url(address, !matches!(tls, TlsMode::Disabled));
    let mut endpoint = Endpoint::from_shared(url)
        .map_err(|err| KvError::Transport(err.to_string()))?
        .connect_timeout(DIAL_TIMEOUT);

    match tls {
        TlsMode::Disabled => {}
        TlsMode::ServerAuth { trust_anchor } => {
            let pem = read_pem(trust_anchor).await?;
            let config = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
            endpoint = endpoint.tls_config(config).map_err(|err| KvError::Tls(err.to_string()))?;
        }
        TlsMode::Mutual { cert, key, ca, .. } => {
            let config = ClientTlsConfig::new()
                .identity(Identity::from_pem(read_pem(cert).await?, read_pem(key).await?))
                .ca_certificate(Certificate::from_pem(read_pem(ca).await?));
            endpoint = endpoint.tls_config(config).map_err(|err| KvError::Tls(err.to_string()))?;
        }
    }

    dial_with_backoff(endpoint).await
}

async fn read_pem(path: &std::path::Path) -> Result<Vec<u8>, KvError> {
    tokio::fs::read(path)
        .await
        .map_err(|err| KvError::Tls(format!("{}: {err}", path.display())))
}

/// Retry the initial connect with doubling backoff until the dial deadline
/// runs out. Reconnection after the channel is up is the transport's job.
async fn dial_with_backoff(endpoint: Endpoint) -> Result<Channel, KvError> {
    let deadline = Instant::now() + DIAL_TIMEOUT;
    let mut backoff = CONNECT_BACKOFF_BASE;
    loop {
        match endpoint.connect().await {
            Ok(transport) => return Ok(transport),
            Err(err) => {
                if Instant::now() + backoff >= deadline {
                    return Err(KvError::Transport(err.to_string()));
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(CONNECT_BACKOFF_MAX);
            }
        }
    }
}

fn normalize_url(address: &str, tls: bool) -> String {
    if address.contains("://") {
        address.to_string()
    } else if tls {
        format!("https://{address}")
    } else {
        format!("http://{address}")
    }
}
