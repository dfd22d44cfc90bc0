//! TLS serving for axum routers.
//!
//! Both the admission webhook and marble workloads terminate TLS in-process:
//! connections are accepted with `tokio-rustls` and handed to `hyper-util`.
//! All configs use the `ring` provider explicitly so that no process-wide
//! default has to be installed.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Errors from building a TLS configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Reading PEM material from disk failed.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Certificate material is unusable.
    #[error("certificate error: {0}")]
    Certificate(String),
    /// Private key material is unusable.
    #[error("private key error: {0}")]
    PrivateKey(String),
    /// rustls rejected the configuration.
    #[error("TLS configuration error: {0}")]
    Config(String),
}

/// The crypto provider used for every TLS config in this crate.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a server config from PEM material.
///
/// When `client_roots_pem` is given, clients must present a certificate
/// chaining to one of those roots.
///
/// # Errors
///
/// Returns a [`TlsError`] when any PEM input is unusable or rustls rejects
/// the combination.
pub fn server_config(
    cert_chain_pem: &[u8],
    key_pem: &[u8],
    client_roots_pem: Option<&[u8]>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let provider = crypto_provider();

    let certs = parse_certificates(cert_chain_pem)?;
    if certs.is_empty() {
        return Err(TlsError::Certificate("no certificates found".into()));
    }
    let key = PrivateKeyDer::from_pem_slice(key_pem)
        .map_err(|e| TlsError::PrivateKey(format!("failed to parse private key: {e}")))?;

    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Config(e.to_string()))?;

    let builder = match client_roots_pem {
        Some(roots_pem) => {
            let mut roots = RootCertStore::empty();
            for cert in parse_certificates(roots_pem)? {
                roots.add(cert).map_err(|e| {
                    TlsError::Certificate(format!("failed to add client root: {e}"))
                })?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|e| TlsError::Config(format!("client verifier error: {e}")))?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder
        .with_single_cert(certs, key)
        .map_err(|e| TlsError::Config(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Build a server config (no client auth) from PEM files on disk.
///
/// # Errors
///
/// Returns a [`TlsError`] when a file cannot be read or its contents are
/// unusable.
pub fn server_config_from_files(
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<ServerConfig>, TlsError> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })
    };
    server_config(&read(cert_path)?, &read(key_path)?, None)
}

/// Serve `app` over TLS on `listener` until `shutdown` resolves.
///
/// Each connection is handled on its own task. Handshake and connection
/// errors are logged and never stop the accept loop.
///
/// # Errors
///
/// Returns an error when accepting from the listener fails.
pub async fn serve(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    app: Router,
    shutdown: impl Future<Output = ()> + Send,
) -> std::io::Result<()> {
    let acceptor = TlsAcceptor::from(config);
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            () = &mut shutdown => {
                info!("shutdown requested, no longer accepting connections");
                return Ok(());
            }
        };

        let acceptor = acceptor.clone();
        let service = TowerToHyperService::new(app.clone());
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(tls_stream) => tls_stream,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "TLS handshake failed");
                    return;
                }
            };

            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(tls_stream), service)
                .await
            {
                debug!(peer = %peer, error = %e, "connection closed with error");
            }
        });
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Certificate(format!("failed to parse certificates: {e}")))
}
