//! Marble webhook CLI entry point.
//!
//! Provides `serve` for running the mutating admission webhook over TLS and
//! `preview` for printing the patch a pod manifest would receive.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1 as corev1;
use tokio::net::TcpListener;
use tracing::info;

use marblemesh::admission::router;
use marblemesh::config::{load_config, WebhookConfig};
use marblemesh::mutate::{apply_patch, build_patch, InjectionPolicy, PodSpec};
use marblemesh::{logging, tls};

/// Marble webhook: injects marble parameters into admitted pods.
#[derive(Parser)]
#[command(name = "marble-webhook", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Serve `/mutate` and `/mutate-no-sgx` over HTTPS.
    Serve {
        /// TOML config file. Missing fields fall back to defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Listen address, overrides the config file.
        #[arg(long)]
        listen: Option<SocketAddr>,
        /// Coordinator address injected into pods, overrides the config file.
        #[arg(long)]
        coordinator_addr: Option<String>,
        /// Serving certificate chain (PEM).
        #[arg(long, env = "WEBHOOK_CRT")]
        cert: Option<PathBuf>,
        /// Serving private key (PEM).
        #[arg(long, env = "WEBHOOK_KEY")]
        key: Option<PathBuf>,
        /// Write JSON logs to daily files in this directory instead of stdout.
        #[arg(long)]
        logs_dir: Option<PathBuf>,
    },
    /// Print the patch and the patched pod for a pod manifest (JSON).
    Preview {
        /// Path to the pod manifest.
        pod: PathBuf,
        /// Skip the SGX toleration, as `/mutate-no-sgx` does.
        #[arg(long)]
        no_sgx: bool,
        /// Coordinator address to inject.
        #[arg(long, default_value = "coordinator-mesh-api.marblerun:25554")]
        coordinator_addr: String,
        /// Namespace to assume when the manifest has none.
        #[arg(long)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            listen,
            coordinator_addr,
            cert,
            key,
            logs_dir,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => WebhookConfig::default(),
            };
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            if let Some(addr) = coordinator_addr {
                config.coordinator_addr = addr;
            }
            if cert.is_some() {
                config.tls.cert_path = cert;
            }
            if key.is_some() {
                config.tls.key_path = key;
            }
            handle_serve(config, logs_dir.as_deref()).await
        }
        Command::Preview {
            pod,
            no_sgx,
            coordinator_addr,
            namespace,
        } => {
            logging::init_cli();
            handle_preview(&pod, !no_sgx, coordinator_addr, namespace.as_deref())
        }
    }
}

/// Run the webhook until Ctrl-C or SIGTERM.
async fn handle_serve(config: WebhookConfig, logs_dir: Option<&Path>) -> anyhow::Result<()> {
    let _logging_guard = logging::init_production(logs_dir)?;

    let cert_path = config
        .tls
        .cert_path
        .as_deref()
        .context("no serving certificate configured (--cert or WEBHOOK_CRT)")?;
    let key_path = config
        .tls
        .key_path
        .as_deref()
        .context("no serving key configured (--key or WEBHOOK_KEY)")?;
    let tls_config = tls::server_config_from_files(cert_path, key_path)
        .context("failed to load serving certificate")?;

    let state = Arc::new(config.admission_state());
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    info!(
        addr = %config.listen_addr,
        coordinator = %state.policy.coordinator_addr,
        "marble webhook listening"
    );

    tls::serve(listener, tls_config, router(state), tls::shutdown_signal())
        .await
        .context("webhook server failed")?;

    info!("marble webhook stopped");
    Ok(())
}

/// Print the patch a pod would receive, then the pod with the patch applied.
fn handle_preview(
    path: &Path,
    inject_trust_toleration: bool,
    coordinator_addr: String,
    namespace: Option<&str>,
) -> anyhow::Result<()> {
    let raw = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut document: serde_json::Value = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let pod: corev1::Pod = serde_json::from_value(document.clone())
        .with_context(|| format!("{} is not a pod", path.display()))?;

    let spec = PodSpec::from_pod(&pod).with_default_namespace(namespace);
    let policy = InjectionPolicy::new(coordinator_addr);
    let operations = build_patch(&spec, &policy, inject_trust_toleration);
    info!(
        marble_type = spec.marble_type(),
        operations = operations.len(),
        "patch computed"
    );

    apply_patch(&mut document, &operations).context("patch does not apply to the manifest")?;

    println!("{}", serde_json::to_string_pretty(&operations)?);
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
