// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use commitlog::Record;
use commitlog_node::authorizer::AclAuthorizer;
use commitlog_node::errors::NodeError;
use commitlog_node::network::LogClient;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use common::{eventually, start_node, write_policy, Pki};

const POLICY: &str = "\
p, root-client, *, produce
p, root-client, *, consume
";

fn acl(pki: &Pki) -> Arc<AclAuthorizer> {
    let path = write_policy(pki.dir.path(), POLICY);
    Arc::new(AclAuthorizer::from_file(path).unwrap())
}

#[tokio::test]
async fn test_authorized_client_round_trip() {
    let pki = Pki::generate();
    let node = start_node(
        "node-a",
        acl(&pki),
        Some((pki.acceptor(), pki.client_config("root-client"))),
    )
    .await;

    let client = node.tls_client(&pki.client_config("root-client")).await;
    let offset = client.produce(Record::new("secret")).await.unwrap();
    assert_eq!(offset, 0);
    assert_eq!(client.consume(offset).await.unwrap().value, b"secret");
}

#[tokio::test]
async fn test_unauthorized_client_is_denied() {
    let pki = Pki::generate();
    let node = start_node(
        "node-a",
        acl(&pki),
        Some((pki.acceptor(), pki.client_config("root-client"))),
    )
    .await;

    let client = node.tls_client(&pki.client_config("nobody-client")).await;

    let err = client.produce(Record::new("nope")).await.unwrap_err();
    match err {
        NodeError::PermissionDenied(msg) => {
            assert_eq!(msg, "nobody-client not permitted to produce to *")
        }
        other => panic!("expected permission denied, got {:?}", other),
    }

    let err = client.consume(0).await.unwrap_err();
    assert!(matches!(err, NodeError::PermissionDenied(_)), "got {:?}", err);
    assert_eq!(node.log.len().unwrap(), 0);
}

#[tokio::test]
async fn test_unauthorized_stream_ends_with_denial() {
    let pki = Pki::generate();
    let node = start_node(
        "node-a",
        acl(&pki),
        Some((pki.acceptor(), pki.client_config("root-client"))),
    )
    .await;

    let client = node.tls_client(&pki.client_config("nobody-client")).await;
    let mut stream = Box::pin(client.consume_stream(0).await.unwrap());

    let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(item, Err(NodeError::PermissionDenied(_))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_plaintext_client_cannot_reach_tls_node() {
    let pki = Pki::generate();
    let node = start_node(
        "node-a",
        acl(&pki),
        Some((pki.acceptor(), pki.client_config("root-client"))),
    )
    .await;

    let client = LogClient::new(&node.addr.to_string()).unwrap();
    let err = client.produce(Record::new("plain")).await.unwrap_err();
    assert!(matches!(err, NodeError::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_replication_over_mtls() {
    let pki = Pki::generate();
    let leader = start_node(
        "node-a",
        acl(&pki),
        Some((pki.acceptor(), pki.client_config("root-client"))),
    )
    .await;
    let follower = start_node(
        "node-b",
        acl(&pki),
        Some((pki.acceptor(), pki.client_config("root-client"))),
    )
    .await;

    let client = leader.tls_client(&pki.client_config("root-client")).await;
    client.produce(Record::new("over tls")).await.unwrap();

    follower
        .replicator
        .join("node-a", &leader.addr.to_string())
        .unwrap();

    assert!(eventually(Duration::from_secs(5), || follower.log.len().unwrap() == 1).await);
    assert_eq!(follower.log.read(0).unwrap().value, b"over tls");
}
