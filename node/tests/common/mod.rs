// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use commitlog::{Log, LogConfig};
use commitlog_node::network::LogClient;
use commitlog_node::replication::{Membership, Replicator};
use commitlog_node::server::{build_router, serve};
use commitlog_node::service::{Authorizer, LogService, ServiceConfig};
use commitlog_node::tls::{setup_server_tls, TlsConfig};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A CA plus server and client identities, written as PEM files.
pub struct Pki {
    pub dir: TempDir,
    pub ca_file: PathBuf,
}

impl Pki {
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.distinguished_name.push(DnType::CommonName, "commitlog-test-ca");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_key = KeyPair::generate().unwrap();
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let ca_file = dir.path().join("ca.pem");
        std::fs::write(&ca_file, ca.pem()).unwrap();

        let issue = |name: &str, sans: Vec<String>, usage: ExtendedKeyUsagePurpose| {
            let mut params = CertificateParams::new(sans).unwrap();
            params.distinguished_name.push(DnType::CommonName, name);
            params.extended_key_usages = vec![usage];
            let key = KeyPair::generate().unwrap();
            let cert = params.signed_by(&key, &ca, &ca_key).unwrap();
            std::fs::write(dir.path().join(format!("{}.pem", name)), cert.pem()).unwrap();
            std::fs::write(dir.path().join(format!("{}-key.pem", name)), key.serialize_pem()).unwrap();
        };

        issue(
            "server",
            vec!["localhost".to_string(), "127.0.0.1".to_string()],
            ExtendedKeyUsagePurpose::ServerAuth,
        );
        issue("root-client", vec![], ExtendedKeyUsagePurpose::ClientAuth);
        issue("nobody-client", vec![], ExtendedKeyUsagePurpose::ClientAuth);

        Self { dir, ca_file }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    pub fn server_config(&self) -> TlsConfig {
        TlsConfig {
            cert_file: Some(self.path("server.pem")),
            key_file: Some(self.path("server-key.pem")),
            ca_file: Some(self.ca_file.clone()),
            server_address: None,
        }
    }

    /// Client identity `name` (`root-client` or `nobody-client`).
    pub fn client_config(&self, name: &str) -> TlsConfig {
        TlsConfig {
            cert_file: Some(self.path(&format!("{}.pem", name))),
            key_file: Some(self.path(&format!("{}-key.pem", name))),
            ca_file: Some(self.ca_file.clone()),
            server_address: Some("localhost".to_string()),
        }
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(Arc::new(setup_server_tls(&self.server_config()).unwrap()))
    }
}

pub struct TestNode {
    pub addr: SocketAddr,
    pub log: Arc<Log>,
    pub replicator: Arc<Replicator>,
    shutdown: CancellationToken,
    _dir: TempDir,
}

impl TestNode {
    pub fn client(&self) -> LogClient {
        LogClient::new(&self.addr.to_string()).unwrap()
    }

    pub async fn tls_client(&self, tls: &TlsConfig) -> LogClient {
        LogClient::with_tls(&self.addr.to_string(), tls).await.unwrap()
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        let _ = self.replicator.close();
        self.shutdown.cancel();
    }
}

/// Start a node on an ephemeral port. With `tls`, the node serves mutual TLS
/// and its replicator dials with the given client identity.
pub async fn start_node(
    name: &str,
    authorizer: Arc<dyn Authorizer>,
    tls: Option<(TlsAcceptor, TlsConfig)>,
) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(Log::open(dir.path(), LogConfig::default()).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (acceptor, peer_tls) = match tls {
        Some((acceptor, peer_tls)) => (Some(acceptor), Some(peer_tls)),
        None => (None, None),
    };

    let local = LogClient::connect(&addr.to_string(), peer_tls.as_ref())
        .await
        .unwrap();
    let replicator = Arc::new(Replicator::new(local, peer_tls));
    let membership = Membership::new(name, addr.to_string(), replicator.clone());

    let service = LogService::with_poll_interval(
        ServiceConfig {
            commit_log: log.clone(),
            authorizer,
            get_serverer: Arc::new(membership),
        },
        TEST_POLL_INTERVAL,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(serve(listener, build_router(service), acceptor, shutdown.clone()));

    TestNode {
        addr,
        log,
        replicator,
        shutdown,
        _dir: dir,
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

pub fn read_values(log: &Log) -> Vec<Vec<u8>> {
    let len = log.len().unwrap();
    (0..len).map(|offset| log.read(offset).unwrap().value).collect()
}

pub fn write_policy(dir: &Path, policy: &str) -> PathBuf {
    let path = dir.join("policy.csv");
    std::fs::write(&path, policy).unwrap();
    path
}
