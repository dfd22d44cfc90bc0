//! Throwaway certificate authorities for the bootstrap tests.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
};

use marblemesh::marble::{EnvSnapshot, MARBLE_CERT_ENV, MARBLE_PRIVATE_KEY_ENV, ROOT_CA_ENV};

/// A self-signed root that can issue leaves.
pub struct Authority {
    cert: Certificate,
    key: KeyPair,
}

/// An issued leaf certificate and its key, both PEM.
pub struct Leaf {
    pub cert_pem: String,
    pub key_pem: String,
}

fn key_pair() -> KeyPair {
    match KeyPair::generate() {
        Ok(key) => key,
        Err(err) => panic!("key generation should succeed: {err}"),
    }
}

fn params(names: &[&str]) -> CertificateParams {
    let names: Vec<String> = names.iter().map(|name| (*name).to_owned()).collect();
    match CertificateParams::new(names) {
        Ok(params) => params,
        Err(err) => panic!("certificate params should build: {err}"),
    }
}

impl Authority {
    /// New root CA with `common_name` as its subject.
    pub fn new(common_name: &str) -> Self {
        let mut params = params(&[]);
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, common_name);
        params.distinguished_name = subject;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let key = key_pair();
        let cert = match params.self_signed(&key) {
            Ok(cert) => cert,
            Err(err) => panic!("root should self-sign: {err}"),
        };
        Self { cert, key }
    }

    /// Root certificate PEM.
    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Leaf valid for `names` with default validity.
    pub fn issue(&self, names: &[&str]) -> Leaf {
        self.issue_with(names, |_| {})
    }

    /// Leaf valid for `names`, with `configure` applied to its parameters.
    pub fn issue_with(&self, names: &[&str], configure: impl FnOnce(&mut CertificateParams)) -> Leaf {
        let mut params = params(names);
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, "marble");
        params.distinguished_name = subject;
        configure(&mut params);

        let key = key_pair();
        let cert = match params.signed_by(&key, &self.cert, &self.key) {
            Ok(cert) => cert,
            Err(err) => panic!("leaf should be signed: {err}"),
        };
        Leaf {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        }
    }
}

/// The environment the hosting platform provides after provisioning.
pub fn marble_env(root_pem: &str, leaf: &Leaf) -> EnvSnapshot {
    [
        (MARBLE_CERT_ENV, leaf.cert_pem.as_str()),
        (ROOT_CA_ENV, root_pem),
        (MARBLE_PRIVATE_KEY_ENV, leaf.key_pem.as_str()),
    ]
    .into_iter()
    .collect()
}
