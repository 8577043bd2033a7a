//! Mutual TLS with the server-name check waived.
//!
//! Some deployments dial an address whose name does not appear in the peer
//! certificate. The builder's `skip_hostname_verification` opt-in routes
//! through here: the chain is still verified against the supplied CA, and
//! only the not-valid-for-name outcome is ignored.

use std::path::Path;
use std::sync::Arc;

use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use silo_kv::KvError;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use crate::builder::DIAL_TIMEOUT;

pub(crate) async fn dial_mutual_skip_hostname(
    url: &str,
    cert: &Path,
    key: &Path,
    ca: &Path,
) -> Result<Channel, KvError> {
    let cert_pem = tokio::fs::read(cert).await.map_err(tls_err)?;
    let key_pem = tokio::fs::read(key).await.map_err(tls_err)?;
    let ca_pem = tokio::fs::read(ca).await.map_err(tls_err)?;

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut ca_pem.as_slice()) {
        roots.add(cert.map_err(tls_err)?).map_err(tls_err)?;
    }
    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(tls_err)?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(tls_err)?
        .ok_or_else(|| KvError::Tls(format!("no private key in {}", key.display())))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = SkipServerName::new(Arc::new(roots), provider.clone())?;
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(tls_err)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_client_auth_cert(certs, key)
        .map_err(tls_err)?;
    config.alpn_protocols = vec![b"h2".to_vec()];

    let uri = Uri::try_from(url).map_err(|err| KvError::Transport(err.to_string()))?;
    let host = uri
        .host()
        .ok_or_else(|| KvError::Transport(format!("no host in {url}")))?
        .to_string();
    let port = uri.port_u16().unwrap_or(443);
    let server_name =
        ServerName::try_from(host.clone()).map_err(|err| KvError::Tls(err.to_string()))?;
    let connector = TlsConnector::from(Arc::new(config));

    Endpoint::from_shared(url.to_string())
        .map_err(|err| KvError::Transport(err.to_string()))?
        .connect_timeout(DIAL_TIMEOUT)
        .connect_with_connector(service_fn(move |_: Uri| {
            let connector = connector.clone();
            let server_name = server_name.clone();
            let host = host.clone();
            async move {
                let tcp = TcpStream::connect((host.as_str(), port)).await?;
                let tls = connector.connect(server_name, tcp).await?;
                Ok::<_, std::io::Error>(TokioIo::new(tls))
            }
        }))
        .await
        .map_err(|err| KvError::Transport(err.to_string()))
}

fn tls_err(err: impl std::fmt::Display) -> KvError {
    KvError::Tls(err.to_string())
}

/// Delegates to the webpki verifier and accepts exactly one failure class:
/// certificate not valid for the dialed name.
#[derive(Debug)]
struct SkipServerName {
    inner: Arc<WebPkiServerVerifier>,
}

impl SkipServerName {
    fn new(roots: Arc<RootCertStore>, provider: Arc<CryptoProvider>) -> Result<Self, KvError> {
        let inner = WebPkiServerVerifier::builder_with_provider(roots, provider)
            .build()
            .map_err(tls_err)?;
        Ok(Self { inner })
    }
}

impl ServerCertVerifier for SkipServerName {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName
                | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
