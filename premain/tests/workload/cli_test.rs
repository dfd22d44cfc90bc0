//! Exit codes of the `marble-premain` binary.

use assert_cmd::Command;

fn premain() -> Command {
    Command::cargo_bin("marble-premain").expect("binary should be built")
}

#[test]
fn unprovisioned_marble_is_an_authentication_error() {
    for workload in ["serve", "client"] {
        premain().env_clear().arg(workload).assert().code(4);
    }
}

#[test]
fn undecodable_certificate_is_an_authentication_error() {
    premain()
        .env_clear()
        .env("EDG_MARBLE_CERT", "not pem")
        .env("EDG_ROOT_CA", "not pem")
        .env("EDG_MARBLE_PRIVATE_KEY", "not pem")
        .arg("client")
        .assert()
        .code(4);
}

#[test]
fn unknown_subcommand_is_rejected() {
    premain().arg("dance").assert().failure();
}
