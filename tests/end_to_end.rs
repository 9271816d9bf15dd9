//! End-to-end coverage driving the storage engine, the mutual-TLS RPC
//! transport, and the client together, exercising the six scenarios a
//! unit test within one module can't reach on its own.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use vaultfs::client::RemoteSource;
use vaultfs::provider::{DataSourceSink, Provider};
use vaultfs::server::Manager;
use vaultfs::store::SledChunkStore;
use vaultfs::tls;

/// Writes a self-signed cert/key pair usable as both an end-entity
/// certificate and its own CA root, for loopback TLS tests.
fn write_identity(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
    let cert_path = dir.join(format!("{name}.crt"));
    let key_path = dir.join(format!("{name}.key"));
    std::fs::File::create(&cert_path).unwrap().write_all(cert.cert.pem().as_bytes()).unwrap();
    std::fs::File::create(&key_path).unwrap().write_all(cert.key_pair.serialize_pem().as_bytes()).unwrap();
    (cert_path, key_path)
}

struct Harness {
    _tmp: tempfile::TempDir,
    addr: String,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    server_task: tokio::task::JoinHandle<()>,
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl Harness {
    /// Brings up a real provider behind a real `Manager` on a loopback
    /// port, all parties sharing one self-signed identity as their own
    /// trusted root.
    async fn start() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let (cert_path, key_path) = write_identity(tmp.path(), "shared");

        let chunks = SledChunkStore::open(tmp.path().join("chunks.db")).unwrap();
        let provider: Arc<dyn DataSourceSink> = Arc::new(Provider::open(tmp.path(), chunks).await.unwrap());

        let server_tls = tls::server_config(&cert_path, &key_path, &cert_path).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let manager = Manager::new(listener, server_tls, provider);
        let shutdown = manager.shutdown_handle();
        let server_task = tokio::spawn(async move { manager.serve().await });

        Harness { _tmp: tmp, addr, shutdown, server_task, cert_path, key_path }
    }

    async fn client(&self) -> RemoteSource {
        let tls_config = tls::client_config(&self.cert_path, &self.key_path, &self.cert_path).unwrap();
        RemoteSource::open(&self.addr, "localhost", tls_config, Duration::from_secs(2), None).await.unwrap()
    }

    async fn stop(self) {
        self.shutdown.store(false, Ordering::Relaxed);
        let _ = self.server_task.await;
    }
}

#[tokio::test]
async fn fresh_store_round_trips_over_rpc() {
    let harness = Harness::start().await;
    let client = harness.client().await;

    let (entry_id, meta) = client.store("/greeting.txt", b"hello vault").await.unwrap();
    let (fetched_id, fetched_meta, bytes) = client.fetch("/greeting.txt").await.unwrap();

    assert_eq!(fetched_id, entry_id);
    assert_eq!(fetched_meta.size, meta.size);
    assert_eq!(bytes, b"hello vault");

    harness.stop().await;
}

#[tokio::test]
async fn overwrite_retires_old_entry_over_rpc() {
    let harness = Harness::start().await;
    let client = harness.client().await;

    let (old_id, old_meta) = client.store("/x", b"first").await.unwrap();
    let (new_id, _) = client.store("/x", b"second, longer").await.unwrap();

    assert_ne!(old_id, new_id);
    assert!(matches!(client.read_meta(old_id).await, Err(vaultfs::client::Error::NoEntity)));
    assert!(matches!(client.read_data(old_meta.locality).await, Err(vaultfs::client::Error::NoEntity)));

    let (_, _, data) = client.fetch("/x").await.unwrap();
    assert_eq!(data, b"second, longer");

    harness.stop().await;
}

#[tokio::test]
async fn directory_membership_is_visible_over_rpc() {
    let harness = Harness::start().await;
    let client = harness.client().await;

    client.mkdir("/docs").await.unwrap();
    client.store("/docs/readme", b"read me").await.unwrap();

    let entries = client.list("/docs").await.unwrap();
    let child = entries.iter().find(|e| e.name == "/docs/readme").expect("child listed");
    assert!(!child.is_dir);

    client.delete("/docs/readme").await.unwrap();
    let entries = client.list("/docs").await.unwrap();
    assert!(entries.iter().all(|e| e.name != "/docs/readme"));

    harness.stop().await;
}

/// Accepts and TLS-handshakes one connection, then holds it open without
/// ever reading or writing application data, standing in for a server
/// that stopped responding mid-call.
async fn spawn_unresponsive_peer(cert_path: PathBuf, key_path: PathBuf) -> String {
    let tls_config = tls::server_config(&cert_path, &key_path, &cert_path).unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(tls_config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            if let Ok(tls_stream) = acceptor.accept(socket).await {
                let (_read, _write) = tokio::io::split(tls_stream);
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        }
    });

    addr
}

#[tokio::test]
async fn rpc_call_times_out_against_an_unresponsive_peer() {
    let tmp = tempfile::tempdir().unwrap();
    let (cert_path, key_path) = write_identity(tmp.path(), "shared");

    let addr = spawn_unresponsive_peer(cert_path.clone(), key_path.clone()).await;

    let client_tls = tls::client_config(&cert_path, &key_path, &cert_path).unwrap();
    let client = RemoteSource::open(&addr, "localhost", client_tls, Duration::from_secs(2), None)
        .await
        .unwrap()
        .with_timeout(Duration::from_millis(200));

    let err = client.lookup("/anything").await.unwrap_err();
    assert!(matches!(err, vaultfs::client::Error::Timeout));
}

#[tokio::test]
async fn fifty_concurrent_calls_multiplex_over_one_connection() {
    let harness = Harness::start().await;
    let client = Arc::new(harness.client().await);

    for i in 0..50u32 {
        client.store(&format!("/f{i}"), format!("payload {i}").as_bytes()).await.unwrap();
    }

    let mut tasks = Vec::new();
    for i in 0..50u32 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { client.fetch(&format!("/f{i}")).await }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let (_, _, data) = task.await.unwrap().unwrap();
        assert_eq!(data, format!("payload {i}").as_bytes());
    }

    harness.stop().await;
}

#[tokio::test]
async fn tls_handshake_rejects_an_untrusted_client_certificate() {
    let tmp = tempfile::tempdir().unwrap();
    let (server_cert, server_key) = write_identity(tmp.path(), "server");
    let (client_cert, client_key) = write_identity(tmp.path(), "client");

    let chunks = SledChunkStore::open(tmp.path().join("chunks.db")).unwrap();
    let provider: Arc<dyn DataSourceSink> = Arc::new(Provider::open(tmp.path(), chunks).await.unwrap());

    let server_tls = tls::server_config(&server_cert, &server_key, &server_cert).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let manager = Manager::new(listener, server_tls, provider);
    let shutdown = manager.shutdown_handle();
    let server_task = tokio::spawn(async move { manager.serve().await });

    // the client trusts the server's root to validate the server cert,
    // but presents an identity the server's root does not trust.
    let client_tls = tls::client_config(&client_cert, &client_key, &server_cert).unwrap();
    let outcome = RemoteSource::open(&addr, "localhost", client_tls, Duration::from_secs(2), None).await;
    assert!(outcome.is_err());

    shutdown.store(false, Ordering::Relaxed);
    let _ = server_task.await;
}
