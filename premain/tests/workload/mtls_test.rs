//! Server and client workloads released by the gate.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use marblemesh::bootstrap::{BootstrapGate, ExitStatus, GateConfig};
use premain::{MarbleClient, MarbleServer, WELCOME};

use super::pki::provisioned_env;

fn gate() -> BootstrapGate {
    BootstrapGate::new(GateConfig::default())
}

async fn local_listener() -> TcpListener {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("should bind an ephemeral port: {err}"),
    }
}

#[tokio::test]
async fn client_reaches_server_over_mutual_tls() {
    let env = provisioned_env();
    let listener = local_listener().await;
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(err) => panic!("listener should have an address: {err}"),
    };

    let (stop, stopped) = oneshot::channel::<()>();
    let server = match MarbleServer::from_listener(listener) {
        Ok(server) => server.with_shutdown(async {
            let _ = stopped.await;
        }),
        Err(err) => panic!("server should wrap the listener: {err}"),
    };
    let server_env = env.clone();
    let server_task = tokio::spawn(async move {
        let mut server = server;
        gate().run(&server_env, &mut server).await
    });

    let mut client = MarbleClient::new(format!("https://localhost:{port}/"));
    let status = tokio::time::timeout(Duration::from_secs(30), gate().run(&env, &mut client)).await;
    assert_eq!(status.ok(), Some(ExitStatus::Success));
    assert_eq!(client.body(), Some(WELCOME));

    let _ = stop.send(());
    match server_task.await {
        Ok(status) => assert_eq!(status, ExitStatus::Success),
        Err(err) => panic!("server task should not panic: {err}"),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_usage_error() {
    let env = provisioned_env();
    let port = {
        let listener = local_listener().await;
        match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(err) => panic!("listener should have an address: {err}"),
        }
    };

    let mut client = MarbleClient::new(format!("https://127.0.0.1:{port}/"));
    let status = gate().run(&env, &mut client).await;
    assert_eq!(status, ExitStatus::UsageError);
    assert!(client.body().is_none());
}

#[tokio::test]
async fn busy_listen_address_is_an_internal_error() {
    let env = provisioned_env();
    let taken = local_listener().await;
    let addr = match taken.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("listener should have an address: {err}"),
    };

    let mut server = MarbleServer::new(addr);
    assert_eq!(gate().run(&env, &mut server).await, ExitStatus::InternalError);
}

#[tokio::test]
async fn unprovisioned_server_never_binds() {
    let taken = local_listener().await;
    let addr = match taken.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("listener should have an address: {err}"),
    };
    drop(taken);

    let mut server = MarbleServer::new(addr);
    let status = gate()
        .run(&marblemesh::marble::EnvSnapshot::default(), &mut server)
        .await;
    assert_eq!(status, ExitStatus::AuthenticationError);
    assert!(TcpListener::bind(addr).await.is_ok());
}
