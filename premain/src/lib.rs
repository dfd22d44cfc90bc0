//! Sample marble workloads, run only after the bootstrap gate has verified
//! the marble's certificate.
//!
//! - [`MarbleServer`] serves an mTLS endpoint that admits clients whose
//!   certificate chains to the same root.
//! - [`MarbleClient`] calls such an endpoint with the marble's identity.
//!
//! Both use nothing but the [`VerifiedBundle`] they are handed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use marblemesh::bootstrap::{VerifiedBundle, Workload, WorkloadError};
use marblemesh::tls;

/// Body served at `/`.
pub const WELCOME: &str = "Welcome to this Marbelous world!";

/// Default listen address for [`MarbleServer`].
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Default target for [`MarbleClient`].
pub const DEFAULT_URL: &str = "https://localhost:8080/";

type Shutdown = Pin<Box<dyn Future<Output = ()> + Send>>;

/// mTLS server workload.
pub struct MarbleServer {
    listen: SocketAddr,
    listener: Option<TcpListener>,
    shutdown: Option<Shutdown>,
}

impl MarbleServer {
    /// Server that binds `listen` once released.
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            listen,
            listener: None,
            shutdown: None,
        }
    }

    /// Server on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns the listener's error when its local address is unavailable.
    pub fn from_listener(listener: TcpListener) -> std::io::Result<Self> {
        Ok(Self {
            listen: listener.local_addr()?,
            listener: Some(listener),
            shutdown: None,
        })
    }

    /// Stop when `signal` resolves instead of on Ctrl-C or SIGTERM.
    #[must_use]
    pub fn with_shutdown(mut self, signal: impl Future<Output = ()> + Send + 'static) -> Self {
        self.shutdown = Some(Box::pin(signal));
        self
    }
}

impl std::fmt::Debug for MarbleServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarbleServer")
            .field("listen", &self.listen)
            .finish_non_exhaustive()
    }
}

/// The application served behind mTLS.
pub fn app() -> Router {
    Router::new().route("/", get(|| async { WELCOME }))
}

#[async_trait]
impl Workload for MarbleServer {
    async fn run(&mut self, bundle: VerifiedBundle) -> Result<(), WorkloadError> {
        let config = tls::server_config(
            bundle.certificate_pem(),
            bundle.private_key_pem(),
            Some(bundle.root_ca_pem()),
        )
        .map_err(|e| WorkloadError::Setup(e.to_string()))?;

        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => TcpListener::bind(self.listen)
                .await
                .map_err(|e| WorkloadError::Setup(format!("failed to bind {}: {e}", self.listen)))?,
        };

        info!(addr = %self.listen, identity = %bundle.identity().name, "marble server listening");

        let shutdown: Shutdown = match self.shutdown.take() {
            Some(signal) => signal,
            None => Box::pin(tls::shutdown_signal()),
        };
        tls::serve(listener, config, app(), shutdown)
            .await
            .map_err(|e| WorkloadError::Usage(format!("server failed: {e}")))
    }
}

/// mTLS client workload: one GET, success iff the response is 2xx.
#[derive(Debug, Clone)]
pub struct MarbleClient {
    url: String,
    body: Option<String>,
}

impl MarbleClient {
    /// Client for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: None,
        }
    }

    /// Body of the last successful response.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

#[async_trait]
impl Workload for MarbleClient {
    async fn run(&mut self, bundle: VerifiedBundle) -> Result<(), WorkloadError> {
        let mut identity_pem = bundle.certificate_pem().to_vec();
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(bundle.private_key_pem());
        let identity = reqwest::Identity::from_pem(&identity_pem)
            .map_err(|e| WorkloadError::Setup(format!("unusable client identity: {e}")))?;
        let root = reqwest::Certificate::from_pem(bundle.root_ca_pem())
            .map_err(|e| WorkloadError::Setup(format!("unusable root certificate: {e}")))?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(root)
            .identity(identity)
            .build()
            .map_err(|e| WorkloadError::Setup(format!("failed to build client: {e}")))?;

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| WorkloadError::Usage(format!("request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkloadError::Usage(format!(
                "{} answered {status}",
                self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| WorkloadError::Usage(format!("failed to read response: {e}")))?;
        info!(url = %self.url, %status, "marble client request succeeded");
        self.body = Some(body);
        Ok(())
    }
}
