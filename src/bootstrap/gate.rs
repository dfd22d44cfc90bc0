//! The bootstrap gate: credentials in, verified bundle out, workload runs.
//!
//! ```text
//! Uninitialized -> CredentialsLoaded -> ChainVerified -> Authenticated -> Running
//!        \________________\__________________\______________> Rejected(reason)
//! ```
//!
//! The gate never exits the process. It reports an [`ExitStatus`] to its
//! caller, which decides what to do with it.

use std::time::SystemTime;

use async_trait::async_trait;
use rustls::pki_types::CertificateDer;
use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::credentials::{CredentialBundle, CredentialError};
use super::verifier::{ChainVerificationError, VerificationContext, VerifiedIdentity};
use crate::marble::EnvSnapshot;

/// Identity marble certificates are issued for unless configured otherwise.
pub const DEFAULT_EXPECTED_IDENTITY: &str = "localhost";

/// Outcome reported to whoever launched the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The workload ran and finished without error.
    Success,
    /// Setup failure unrelated to trust.
    InternalError,
    /// The trust path rejected the marble. Never retried automatically.
    AuthenticationError,
    /// The workload failed after being granted control. May be retried.
    UsageError,
}

impl ExitStatus {
    /// Process exit code for this outcome.
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::InternalError => 2,
            Self::AuthenticationError => 4,
            Self::UsageError => 8,
        }
    }

    /// Whether a supervisor may retry after this outcome.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::UsageError)
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}

/// Why the trust path rejected the marble.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    /// A credential was missing or undecodable.
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// The leaf did not verify against the root.
    #[error("failed to verify certificate chain: {0}")]
    ChainVerification(#[from] ChainVerificationError),
}

/// Failures reported by a workload after it was granted control.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// Resource or setup failure, e.g. binding a socket.
    #[error("workload setup failed: {0}")]
    Setup(String),
    /// The workload's own operation failed, e.g. a downstream call.
    #[error("workload failed: {0}")]
    Usage(String),
}

/// Everything that can end a gate run early.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The trust path rejected the marble.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    /// A step was invoked out of order or after a terminal state.
    #[error("invalid gate transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Phase the gate was in.
        from: Phase,
        /// Phase the caller tried to reach.
        to: Phase,
    },
    /// The workload failed.
    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

impl BootstrapError {
    /// Map the failure onto the exit taxonomy.
    pub const fn exit_status(&self) -> ExitStatus {
        match self {
            Self::Rejected(_) => ExitStatus::AuthenticationError,
            Self::InvalidTransition { .. } | Self::Workload(WorkloadError::Setup(_)) => {
                ExitStatus::InternalError
            }
            Self::Workload(WorkloadError::Usage(_)) => ExitStatus::UsageError,
        }
    }
}

/// Credentials that passed verification, handed to the workload.
#[derive(Clone)]
pub struct VerifiedBundle {
    identity: VerifiedIdentity,
    leaf: CertificateDer<'static>,
    certificate_pem: Vec<u8>,
    private_key_pem: Zeroizing<Vec<u8>>,
    root_ca_pem: Vec<u8>,
}

impl std::fmt::Debug for VerifiedBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedBundle")
            .field("identity", &self.identity)
            .field("private_key_pem", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl VerifiedBundle {
    /// Identity the leaf was verified for.
    pub fn identity(&self) -> &VerifiedIdentity {
        &self.identity
    }

    /// Verified leaf certificate (DER).
    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.leaf
    }

    /// Leaf certificate exactly as provisioned (PEM).
    pub fn certificate_pem(&self) -> &[u8] {
        &self.certificate_pem
    }

    /// Private key exactly as provisioned (PEM).
    pub fn private_key_pem(&self) -> &[u8] {
        &self.private_key_pem
    }

    /// Root CA exactly as provisioned (PEM).
    pub fn root_ca_pem(&self) -> &[u8] {
        &self.root_ca_pem
    }
}

/// User code that runs once trust is established.
#[async_trait]
pub trait Workload: Send {
    /// Run with the verified credentials.
    async fn run(&mut self, bundle: VerifiedBundle) -> Result<(), WorkloadError>;
}

/// Gate settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Name the marble certificate must be valid for.
    pub expected_identity: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            expected_identity: DEFAULT_EXPECTED_IDENTITY.to_owned(),
        }
    }
}

/// Observable position in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing loaded yet.
    Uninitialized,
    /// Credential bundle loaded.
    CredentialsLoaded,
    /// Leaf verified against the root.
    ChainVerified,
    /// Verified bundle handed over.
    Authenticated,
    /// Workload started.
    Running,
    /// Trust path failed. Terminal.
    Rejected,
}

enum GateState {
    Uninitialized,
    CredentialsLoaded(CredentialBundle),
    ChainVerified(VerifiedBundle),
    Authenticated,
    Running,
    Rejected(Rejection),
}

impl GateState {
    fn phase(&self) -> Phase {
        match self {
            Self::Uninitialized => Phase::Uninitialized,
            Self::CredentialsLoaded(_) => Phase::CredentialsLoaded,
            Self::ChainVerified(_) => Phase::ChainVerified,
            Self::Authenticated => Phase::Authenticated,
            Self::Running => Phase::Running,
            Self::Rejected(_) => Phase::Rejected,
        }
    }
}

/// Single-use bootstrap state machine.
pub struct BootstrapGate {
    config: GateConfig,
    state: GateState,
}

impl BootstrapGate {
    /// New gate in [`Phase::Uninitialized`].
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            state: GateState::Uninitialized,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Reason for rejection, once rejected.
    pub fn rejection(&self) -> Option<&Rejection> {
        match &self.state {
            GateState::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    /// `Uninitialized -> CredentialsLoaded`.
    ///
    /// # Errors
    ///
    /// Rejects the marble when any credential is missing or undecodable.
    pub fn load_credentials(&mut self, env: &EnvSnapshot) -> Result<(), BootstrapError> {
        self.expect_phase(Phase::Uninitialized, Phase::CredentialsLoaded)?;

        match CredentialBundle::load(env) {
            Ok(bundle) => {
                self.state = GateState::CredentialsLoaded(bundle);
                info!("marble credentials loaded");
                Ok(())
            }
            Err(e) => Err(self.reject(e.into())),
        }
    }

    /// `CredentialsLoaded -> ChainVerified`, checking the leaf against the
    /// loaded root at `now` for the configured identity.
    ///
    /// # Errors
    ///
    /// Rejects the marble when verification fails for any reason.
    pub fn verify_chain(&mut self, now: SystemTime) -> Result<VerifiedIdentity, BootstrapError> {
        self.expect_phase(Phase::CredentialsLoaded, Phase::ChainVerified)?;
        let GateState::CredentialsLoaded(bundle) =
            std::mem::replace(&mut self.state, GateState::Uninitialized)
        else {
            return Err(self.invalid(Phase::ChainVerified));
        };

        let leaf = CertificateDer::from(bundle.leaf_certificate.block.der.to_vec());
        let verified = VerificationContext::new(
            &bundle.root_ca.raw,
            now,
            self.config.expected_identity.as_str(),
        )
        .and_then(|context| context.verify(&leaf));

        let identity = match verified {
            Ok(identity) => identity,
            Err(e) => return Err(self.reject(e.into())),
        };

        info!(identity = %identity.name, "marble certificate chain verified");
        self.state = GateState::ChainVerified(VerifiedBundle {
            identity: identity.clone(),
            leaf,
            certificate_pem: bundle.leaf_certificate.raw.to_vec(),
            private_key_pem: bundle.private_key.raw,
            root_ca_pem: bundle.root_ca.raw.to_vec(),
        });
        Ok(identity)
    }

    /// `ChainVerified -> Authenticated -> Running`: hand the verified bundle
    /// to `workload` and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidTransition`] unless the chain was
    /// verified, and [`BootstrapError::Workload`] when the workload fails.
    pub async fn release<W>(&mut self, workload: &mut W) -> Result<(), BootstrapError>
    where
        W: Workload + ?Sized,
    {
        self.expect_phase(Phase::ChainVerified, Phase::Authenticated)?;
        let GateState::ChainVerified(bundle) =
            std::mem::replace(&mut self.state, GateState::Authenticated)
        else {
            return Err(self.invalid(Phase::Authenticated));
        };
        info!(identity = %bundle.identity.name, "marble authenticated, releasing workload");

        self.state = GateState::Running;
        workload.run(bundle).await?;
        Ok(())
    }

    /// Run the full sequence with the current wall clock.
    pub async fn run<W>(self, env: &EnvSnapshot, workload: &mut W) -> ExitStatus
    where
        W: Workload + ?Sized,
    {
        self.run_at(env, SystemTime::now(), workload).await
    }

    /// Run the full sequence, verifying validity at `now`.
    pub async fn run_at<W>(
        mut self,
        env: &EnvSnapshot,
        now: SystemTime,
        workload: &mut W,
    ) -> ExitStatus
    where
        W: Workload + ?Sized,
    {
        match self.sequence(env, now, workload).await {
            Ok(()) => ExitStatus::Success,
            Err(e) => {
                let status = e.exit_status();
                warn!(error = %e, ?status, "marble bootstrap failed");
                status
            }
        }
    }

    async fn sequence<W>(
        &mut self,
        env: &EnvSnapshot,
        now: SystemTime,
        workload: &mut W,
    ) -> Result<(), BootstrapError>
    where
        W: Workload + ?Sized,
    {
        self.load_credentials(env)?;
        self.verify_chain(now)?;
        self.release(workload).await
    }

    fn expect_phase(&self, expected: Phase, to: Phase) -> Result<(), BootstrapError> {
        if self.phase() == expected {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn invalid(&self, to: Phase) -> BootstrapError {
        BootstrapError::InvalidTransition {
            from: self.phase(),
            to,
        }
    }

    fn reject(&mut self, reason: Rejection) -> BootstrapError {
        warn!(reason = %reason, "marble rejected");
        self.state = GateState::Rejected(reason.clone());
        BootstrapError::Rejected(reason)
    }
}
