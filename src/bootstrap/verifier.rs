//! Certificate chain verification against a pinned root.
//!
//! Fails closed: every parse error, chain error, validity error or name
//! mismatch is a [`ChainVerificationError`]. Never logs.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, RootCertStore};
use thiserror::Error;

use crate::tls::crypto_provider;

/// Why a certificate chain was not accepted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainVerificationError {
    /// The root CA input contained no usable certificate.
    #[error("no usable trust roots")]
    NoTrustRoots,
    /// The leaf could not be parsed.
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),
    /// The expected identity is not a valid DNS name or IP address.
    #[error("invalid expected identity {0:?}")]
    InvalidIdentity(String),
    /// The leaf does not chain to any root in the pool.
    #[error("certificate signed by unknown authority")]
    UntrustedIssuer,
    /// Chain built but the leaf is not acceptable (validity, name, usage).
    #[error("certificate rejected: {0}")]
    Rejected(String),
}

/// Identity established by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// The name the leaf was verified for.
    pub name: String,
}

/// Everything a verification is checked against.
pub struct VerificationContext {
    verifier: Arc<WebPkiServerVerifier>,
    trust_root_count: usize,
    current_time: SystemTime,
    expected_identity: String,
}

impl std::fmt::Debug for VerificationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationContext")
            .field("trust_root_count", &self.trust_root_count)
            .field("current_time", &self.current_time)
            .field("expected_identity", &self.expected_identity)
            .finish()
    }
}

impl VerificationContext {
    /// Build a context whose trust pool holds every certificate in
    /// `root_ca_pem`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainVerificationError::NoTrustRoots`] when no certificate
    /// in the input can serve as a trust anchor.
    pub fn new(
        root_ca_pem: &[u8],
        current_time: SystemTime,
        expected_identity: impl Into<String>,
    ) -> Result<Self, ChainVerificationError> {
        let mut roots = RootCertStore::empty();
        let (added, _ignored) = roots.add_parsable_certificates(
            CertificateDer::pem_slice_iter(root_ca_pem).filter_map(Result::ok),
        );
        if added == 0 {
            return Err(ChainVerificationError::NoTrustRoots);
        }

        let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), crypto_provider())
            .build()
            .map_err(|e| ChainVerificationError::Rejected(e.to_string()))?;

        Ok(Self {
            verifier,
            trust_root_count: added,
            current_time,
            expected_identity: expected_identity.into(),
        })
    }

    /// Number of anchors in the trust pool.
    pub fn trust_root_count(&self) -> usize {
        self.trust_root_count
    }

    /// Identity the leaf must carry.
    pub fn expected_identity(&self) -> &str {
        &self.expected_identity
    }

    /// Verify a DER leaf certificate.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainVerificationError`] describing the first failed
    /// check.
    pub fn verify(
        &self,
        leaf: &CertificateDer<'_>,
    ) -> Result<VerifiedIdentity, ChainVerificationError> {
        let server_name = ServerName::try_from(self.expected_identity.as_str())
            .map_err(|_| ChainVerificationError::InvalidIdentity(self.expected_identity.clone()))?;

        let since_epoch = self
            .current_time
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ChainVerificationError::Rejected("clock is before the Unix epoch".into()))?;

        self.verifier
            .verify_server_cert(
                leaf,
                &[],
                &server_name,
                &[],
                UnixTime::since_unix_epoch(since_epoch),
            )
            .map_err(classify)?;

        Ok(VerifiedIdentity {
            name: self.expected_identity.clone(),
        })
    }
}

/// Verify a PEM leaf against a PEM root pool at `current_time` for
/// `expected_identity`.
///
/// # Errors
///
/// Returns a [`ChainVerificationError`] on any failure, including an
/// unparsable leaf.
pub fn verify_chain(
    leaf_pem: &[u8],
    root_ca_pem: &[u8],
    current_time: SystemTime,
    expected_identity: &str,
) -> Result<VerifiedIdentity, ChainVerificationError> {
    let context = VerificationContext::new(root_ca_pem, current_time, expected_identity)?;
    let leaf = CertificateDer::from_pem_slice(leaf_pem)
        .map_err(|e| ChainVerificationError::MalformedCertificate(e.to_string()))?;
    context.verify(&leaf)
}

fn classify(err: rustls::Error) -> ChainVerificationError {
    match err {
        rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer) => {
            ChainVerificationError::UntrustedIssuer
        }
        rustls::Error::InvalidCertificate(CertificateError::BadEncoding) => {
            ChainVerificationError::MalformedCertificate("bad DER encoding".into())
        }
        other => ChainVerificationError::Rejected(other.to_string()),
    }
}
