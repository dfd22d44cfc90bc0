//! Coverage for webhook config parsing.

use std::io::Write;
use std::path::Path;

use marblemesh::config::{load_config, WebhookConfig};
use marblemesh::mutate::SGX_TOLERATION_KEY;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
    file.write_all(contents.as_bytes())
        .expect("should write config");
    file
}

#[test]
fn parse_full_config() {
    let file = write_config(
        r#"
listen_addr = "127.0.0.1:9443"
coordinator_addr = "coordinator.marblerun.svc:2001"
max_body_bytes = 65536
sgx_toleration_key = "sgx.intel.com/epc"

[tls]
cert_path = "/etc/webhook/tls.crt"
key_path = "/etc/webhook/tls.key"
"#,
    );
    let config_result = load_config(file.path());
    assert!(config_result.is_ok());
    let config = match config_result {
        Ok(config) => config,
        Err(err) => panic!("full config should parse: {err}"),
    };

    assert_eq!(config.listen_addr.to_string(), "127.0.0.1:9443");
    assert_eq!(config.coordinator_addr, "coordinator.marblerun.svc:2001");
    assert_eq!(config.max_body_bytes, 65536);
    assert_eq!(config.sgx_toleration_key, "sgx.intel.com/epc");
    assert_eq!(
        config.tls.cert_path.as_deref(),
        Some(Path::new("/etc/webhook/tls.crt"))
    );
    assert_eq!(
        config.tls.key_path.as_deref(),
        Some(Path::new("/etc/webhook/tls.key"))
    );

    let state = config.admission_state();
    assert_eq!(state.policy.toleration_key, "sgx.intel.com/epc");
    assert_eq!(state.max_body_bytes, 65536);
}

#[test]
fn partial_config_uses_defaults() {
    let file = write_config("coordinator_addr = \"elsewhere:1\"\n");
    let config = match load_config(file.path()) {
        Ok(config) => config,
        Err(err) => panic!("partial config should parse: {err}"),
    };
    let defaults = WebhookConfig::default();

    assert_eq!(config.coordinator_addr, "elsewhere:1");
    assert_eq!(config.listen_addr, defaults.listen_addr);
    assert_eq!(config.max_body_bytes, defaults.max_body_bytes);
    assert_eq!(config.sgx_toleration_key, SGX_TOLERATION_KEY);
    assert!(config.tls.key_path.is_none());
}

#[test]
fn invalid_listen_addr_is_an_error() {
    let file = write_config("listen_addr = \"not an address\"\n");
    let err = load_config(file.path()).expect_err("address must not parse");
    assert!(err.to_string().contains("failed to parse config"));
}

#[test]
fn missing_file_is_an_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let err = load_config(&tmp.path().join("webhook.toml")).expect_err("file does not exist");
    assert!(err.to_string().contains("failed to read config"));
}
