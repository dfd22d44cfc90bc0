//! Environment contract between the admission webhook and marble processes.
//!
//! The webhook writes the coordinator address, marble type, DNS names and
//! UUID file path into every container. The hosting platform materialises
//! the certificate, root CA and private key entries after attestation.
//! A marble reads all of them from an [`EnvSnapshot`] taken once at start.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Address of the coordinator the marble talks to.
pub const COORDINATOR_ADDR_ENV: &str = "EDG_MARBLE_COORDINATOR_ADDR";
/// Marble type, derived from the pod name.
pub const MARBLE_TYPE_ENV: &str = "EDG_MARBLE_TYPE";
/// Comma-separated DNS names the marble certificate should cover.
pub const DNS_NAMES_ENV: &str = "EDG_MARBLE_DNS_NAMES";
/// Path where the marble persists its UUID.
pub const UUID_FILE_ENV: &str = "EDG_MARBLE_UUID_FILE";

/// PEM-encoded marble leaf certificate.
pub const MARBLE_CERT_ENV: &str = "EDG_MARBLE_CERT";
/// PEM-encoded root CA of the coordinator.
pub const ROOT_CA_ENV: &str = "EDG_ROOT_CA";
/// PEM-encoded marble private key.
pub const MARBLE_PRIVATE_KEY_ENV: &str = "EDG_MARBLE_PRIVATE_KEY";

/// Immutable copy of the process environment.
///
/// Taken once at startup so that later changes to the real environment
/// cannot influence the bootstrap sequence.
#[derive(Clone, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for EnvSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSnapshot")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl EnvSnapshot {
    /// Capture the current process environment. Entries that are not valid
    /// UTF-8 are skipped.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Build a snapshot from a key-value map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Returns the value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for EnvSnapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Connection parameters injected by the webhook, read as plain strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarbleParameters {
    /// Coordinator address (`host:port`).
    pub coordinator_addr: Option<String>,
    /// Marble type.
    pub marble_type: Option<String>,
    /// DNS names for the marble certificate.
    pub dns_names: Vec<String>,
    /// UUID file location.
    pub uuid_file: Option<PathBuf>,
}

impl MarbleParameters {
    /// Read the webhook-produced entries from `env`. Empty values count as
    /// absent.
    pub fn from_env(env: &EnvSnapshot) -> Self {
        let non_empty = |name: &str| env.get(name).filter(|v| !v.is_empty()).map(str::to_owned);

        let dns_names = env
            .get(DNS_NAMES_ENV)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            coordinator_addr: non_empty(COORDINATOR_ADDR_ENV),
            marble_type: non_empty(MARBLE_TYPE_ENV),
            dns_names,
            uuid_file: non_empty(UUID_FILE_ENV).map(PathBuf::from),
        }
    }
}
