//! Marble premain entry point.
//!
//! Runs the bootstrap gate over the process environment and, once the
//! marble certificate verifies, releases either the mTLS server or the mTLS
//! client. The process exit code is the gate's exit status.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;

use marblemesh::bootstrap::{BootstrapGate, GateConfig, Workload, DEFAULT_EXPECTED_IDENTITY};
use marblemesh::logging;
use marblemesh::marble::{EnvSnapshot, MarbleParameters};
use premain::{MarbleClient, MarbleServer, DEFAULT_LISTEN_ADDR, DEFAULT_URL};

/// Marble premain: verify credentials, then run the workload.
#[derive(Parser)]
#[command(name = "marble-premain", version, about)]
struct Cli {
    /// Name the marble certificate must be valid for.
    #[arg(long, default_value = DEFAULT_EXPECTED_IDENTITY)]
    identity: String,

    /// Workload to release.
    #[command(subcommand)]
    command: Command,
}

/// Available workloads.
#[derive(Subcommand)]
enum Command {
    /// Serve an mTLS endpoint for other marbles.
    Serve {
        /// Listen address.
        #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
        listen: SocketAddr,
    },
    /// Call an mTLS endpoint once.
    Client {
        /// Target URL.
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_cli();

    let env = EnvSnapshot::from_process();
    let params = MarbleParameters::from_env(&env);
    info!(
        marble_type = params.marble_type.as_deref().unwrap_or("<unset>"),
        coordinator = params.coordinator_addr.as_deref().unwrap_or("<unset>"),
        dns_names = ?params.dns_names,
        "marble starting"
    );

    let mut workload: Box<dyn Workload> = match cli.command {
        Command::Serve { listen } => Box::new(MarbleServer::new(listen)),
        Command::Client { url } => Box::new(MarbleClient::new(url)),
    };

    let gate = BootstrapGate::new(GateConfig {
        expected_identity: cli.identity,
    });
    let status = gate.run(&env, workload.as_mut()).await;
    info!(?status, code = status.code(), "marble finished");
    ExitCode::from(status)
}
