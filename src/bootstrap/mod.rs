//! Attested bootstrap: credentials from the environment, a verified chain,
//! then the workload.

pub mod credentials;
pub mod gate;
pub mod verifier;

pub use credentials::{CredentialBundle, CredentialError, LoadedCredential, PemBlock};
pub use gate::{
    BootstrapError, BootstrapGate, ExitStatus, GateConfig, Phase, Rejection, VerifiedBundle,
    Workload, WorkloadError, DEFAULT_EXPECTED_IDENTITY,
};
pub use verifier::{verify_chain, ChainVerificationError, VerificationContext, VerifiedIdentity};
