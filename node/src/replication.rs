// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Peer replication.
//!
//! For every joined peer one background task tails the peer's log from
//! offset 0 and pushes each record into the local node through the regular
//! produce path (so it is authorized like any other client). Delivery is
//! at-least-once; nothing is deduplicated.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::Server;
use crate::errors::NodeError;
use crate::network::LogClient;
use crate::service::GetServerer;
use crate::tls::TlsConfig;

const RECORD_CHANNEL_CAPACITY: usize = 64;

struct PeerHandle {
    addr: String,
    leave: CancellationToken,
}

#[derive(Default)]
struct Peers {
    servers: HashMap<String, PeerHandle>,
    closed: bool,
}

pub struct Replicator {
    /// Client for this node's own service.
    local: LogClient,
    /// Client TLS settings used to dial peers.
    peer_tls: Option<TlsConfig>,
    close: CancellationToken,
    peers: Mutex<Peers>,
}

impl Replicator {
    pub fn new(local: LogClient, peer_tls: Option<TlsConfig>) -> Self {
        Self {
            local,
            peer_tls,
            close: CancellationToken::new(),
            peers: Mutex::new(Peers::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Peers>, NodeError> {
        self.peers
            .lock()
            .map_err(|_| NodeError::Internal("replicator lock poisoned".into()))
    }

    /// Start replicating from `name` at `addr`. No-op if already joined or
    /// closed. Must be called inside a Tokio runtime.
    pub fn join(&self, name: &str, addr: &str) -> Result<(), NodeError> {
        let mut peers = self.lock()?;
        if peers.closed || peers.servers.contains_key(name) {
            return Ok(());
        }

        let leave = CancellationToken::new();
        peers.servers.insert(
            name.to_string(),
            PeerHandle { addr: addr.to_string(), leave: leave.clone() },
        );
        metrics::gauge!("commitlog_replication_peers", peers.servers.len() as f64);
        tracing::info!(name, addr, "Replicator: joined peer");

        let task = TailTask {
            local: self.local.clone(),
            peer_tls: self.peer_tls.clone(),
            addr: addr.to_string(),
            leave,
            close: self.close.clone(),
        };
        tokio::spawn(task.run());
        Ok(())
    }

    /// Stop replicating from `name`. No-op if unknown.
    pub fn leave(&self, name: &str) -> Result<(), NodeError> {
        let mut peers = self.lock()?;
        if let Some(handle) = peers.servers.remove(name) {
            handle.leave.cancel();
            metrics::gauge!("commitlog_replication_peers", peers.servers.len() as f64);
            tracing::info!(name, addr = handle.addr.as_str(), "Replicator: left peer");
        }
        Ok(())
    }

    /// Stop every tailing task and refuse further joins. Idempotent.
    pub fn close(&self) -> Result<(), NodeError> {
        let mut peers = self.lock()?;
        if peers.closed {
            return Ok(());
        }
        peers.closed = true;
        self.close.cancel();
        tracing::info!("Replicator: closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Currently joined peers as `(name, addr)`, sorted by name.
    pub fn peers(&self) -> Result<Vec<(String, String)>, NodeError> {
        let peers = self.lock()?;
        let mut list: Vec<_> = peers
            .servers
            .iter()
            .map(|(name, h)| (name.clone(), h.addr.clone()))
            .collect();
        list.sort();
        Ok(list)
    }
}

/// Aborts the wrapped task when dropped, whichever way the owner exits.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct TailTask {
    local: LogClient,
    peer_tls: Option<TlsConfig>,
    addr: String,
    leave: CancellationToken,
    close: CancellationToken,
}

impl TailTask {
    async fn run(self) {
        let addr = self.addr.as_str();

        let peer = tokio::select! {
            _ = self.close.cancelled() => return,
            _ = self.leave.cancelled() => return,
            res = LogClient::connect(addr, self.peer_tls.as_ref()) => match res {
                Ok(client) => client,
                Err(e) => return log_error(&e, "failed to dial", addr),
            },
        };

        let stream = tokio::select! {
            _ = self.close.cancelled() => return,
            _ = self.leave.cancelled() => return,
            res = peer.consume_stream(0) => match res {
                Ok(stream) => stream,
                Err(e) => return log_error(&e, "failed to consume", addr),
            },
        };

        let (tx, mut records) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let recv_addr = self.addr.clone();
        let _receiver = AbortOnDrop(tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(record) => {
                        if tx.send(record).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => return log_error(&e, "failed to receive", &recv_addr),
                }
            }
            tracing::warn!(addr = recv_addr.as_str(), "Replicator: peer closed stream");
        }));

        loop {
            tokio::select! {
                biased;
                _ = self.close.cancelled() => return,
                _ = self.leave.cancelled() => return,
                record = records.recv() => {
                    let Some(record) = record else { return };
                    let produced = tokio::select! {
                        _ = self.close.cancelled() => return,
                        _ = self.leave.cancelled() => return,
                        res = self.local.produce(record) => res,
                    };
                    if let Err(e) = produced {
                        return log_error(&e, "failed to produce", addr);
                    }
                    metrics::increment_counter!("commitlog_records_replicated_total");
                }
            }
        }
    }
}

fn log_error(err: &NodeError, msg: &str, addr: &str) {
    tracing::error!(addr, error = %err, "Replicator: {}", msg);
}

/// Cluster membership as this node sees it: itself plus every joined peer.
pub struct Membership {
    local: Server,
    replicator: Arc<Replicator>,
}

impl Membership {
    pub fn new(id: impl Into<String>, rpc_addr: impl Into<String>, replicator: Arc<Replicator>) -> Self {
        Self {
            local: Server { id: id.into(), rpc_addr: rpc_addr.into(), is_leader: false },
            replicator,
        }
    }
}

impl GetServerer for Membership {
    fn get_servers(&self) -> Result<Vec<Server>, NodeError> {
        let mut servers = vec![self.local.clone()];
        servers.extend(self.replicator.peers()?.into_iter().map(|(id, rpc_addr)| Server {
            id,
            rpc_addr,
            is_leader: false,
        }));
        Ok(servers)
    }
}
