//! Credential loading from the environment snapshot.

use rustls::pki_types::pem::{PemObject, SectionKind};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::marble::{EnvSnapshot, MARBLE_CERT_ENV, MARBLE_PRIVATE_KEY_ENV, ROOT_CA_ENV};

/// Errors from loading a single credential.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The entry is absent or empty.
    #[error("could not find {name} in environment")]
    Missing {
        /// Environment entry name.
        name: String,
    },
    /// The entry is present but is not usable PEM.
    #[error("could not decode {name} in PEM format: {reason}")]
    Undecodable {
        /// Environment entry name.
        name: String,
        /// Why decoding failed.
        reason: String,
    },
}

/// First PEM section of a credential.
#[derive(Clone)]
pub struct PemBlock {
    /// Section label.
    pub kind: SectionKind,
    /// Decoded DER contents.
    pub der: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for PemBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PemBlock")
            .field("kind", &self.kind)
            .field("der_len", &self.der.len())
            .finish()
    }
}

/// A credential as loaded: its decoded first block and the raw PEM text.
#[derive(Clone)]
pub struct LoadedCredential {
    /// Decoded first block.
    pub block: PemBlock,
    /// Raw PEM bytes as found in the environment.
    pub raw: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for LoadedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedCredential")
            .field("block", &self.block)
            .field("raw", &"[REDACTED]")
            .finish()
    }
}

/// Load and decode the credential stored under `name`.
///
/// # Errors
///
/// Returns [`CredentialError::Missing`] when the entry is absent or empty
/// and [`CredentialError::Undecodable`] when it contains no PEM section.
pub fn load(env: &EnvSnapshot, name: &str) -> Result<LoadedCredential, CredentialError> {
    let raw = env
        .get(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CredentialError::Missing {
            name: name.to_owned(),
        })?;

    let (kind, der) = <(SectionKind, Vec<u8>)>::from_pem_slice(raw.as_bytes()).map_err(|e| {
        CredentialError::Undecodable {
            name: name.to_owned(),
            reason: e.to_string(),
        }
    })?;

    Ok(LoadedCredential {
        block: PemBlock {
            kind,
            der: Zeroizing::new(der),
        },
        raw: Zeroizing::new(raw.as_bytes().to_vec()),
    })
}

/// The three credentials a marble needs, loaded together.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    /// Marble leaf certificate.
    pub leaf_certificate: LoadedCredential,
    /// Marble private key.
    pub private_key: LoadedCredential,
    /// Coordinator root CA.
    pub root_ca: LoadedCredential,
}

impl CredentialBundle {
    /// Load all three credentials. Any single failure fails the whole load.
    ///
    /// # Errors
    ///
    /// Returns the first [`CredentialError`] in the order certificate, root
    /// CA, private key. A section of the wrong kind counts as undecodable.
    pub fn load(env: &EnvSnapshot) -> Result<Self, CredentialError> {
        let leaf_certificate = load(env, MARBLE_CERT_ENV)?;
        expect_kind(&leaf_certificate, MARBLE_CERT_ENV, &[SectionKind::Certificate])?;

        let root_ca = load(env, ROOT_CA_ENV)?;
        expect_kind(&root_ca, ROOT_CA_ENV, &[SectionKind::Certificate])?;

        let private_key = load(env, MARBLE_PRIVATE_KEY_ENV)?;
        expect_kind(
            &private_key,
            MARBLE_PRIVATE_KEY_ENV,
            &[
                SectionKind::PrivateKey,
                SectionKind::RsaPrivateKey,
                SectionKind::EcPrivateKey,
            ],
        )?;

        Ok(Self {
            leaf_certificate,
            private_key,
            root_ca,
        })
    }
}

fn expect_kind(
    credential: &LoadedCredential,
    name: &str,
    allowed: &[SectionKind],
) -> Result<(), CredentialError> {
    if allowed.contains(&credential.block.kind) {
        return Ok(());
    }
    Err(CredentialError::Undecodable {
        name: name.to_owned(),
        reason: format!("unexpected PEM section {:?}", credential.block.kind),
    })
}
