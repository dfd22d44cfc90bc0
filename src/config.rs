//! Configuration loading for the admission webhook.
//!
//! All fields have defaults, so an empty (or absent) `webhook.toml` is
//! valid. Command-line flags are applied on top by the binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::admission::{AdmissionState, DEFAULT_MAX_BODY_BYTES};
use crate::mutate::{InjectionPolicy, SGX_TOLERATION_KEY};

/// Top-level webhook configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Address the HTTPS listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Coordinator address injected into every marble container.
    #[serde(default = "default_coordinator_addr")]
    pub coordinator_addr: String,

    /// Maximum accepted admission review size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Toleration key injected by `/mutate`.
    #[serde(default = "default_toleration_key")]
    pub sgx_toleration_key: String,

    /// Serving certificate and key.
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            coordinator_addr: default_coordinator_addr(),
            max_body_bytes: default_max_body_bytes(),
            sgx_toleration_key: default_toleration_key(),
            tls: TlsConfig::default(),
        }
    }
}

impl WebhookConfig {
    /// The immutable state handed to the admission router.
    pub fn admission_state(&self) -> AdmissionState {
        AdmissionState {
            policy: InjectionPolicy {
                coordinator_addr: self.coordinator_addr.clone(),
                toleration_key: self.sgx_toleration_key.clone(),
            },
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Serving certificate locations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate chain (`WEBHOOK_CRT`).
    #[serde(default)]
    pub cert_path: Option<PathBuf>,

    /// PEM private key (`WEBHOOK_KEY`).
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

// Default value functions for serde

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8443))
}
fn default_coordinator_addr() -> String {
    "coordinator-mesh-api.marblerun:25554".to_owned()
}
fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}
fn default_toleration_key() -> String {
    SGX_TOLERATION_KEY.to_owned()
}

/// Load the webhook config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<WebhookConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: WebhookConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}
