// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::Parser;
use commitlog::config::DEFAULT_MAX_RECORD_BYTES;
use commitlog::LogConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::service::DEFAULT_TAIL_POLL_INTERVAL;
use crate::tls::TlsConfig;

/// Command line of the node binary. Every flag can also come from a
/// `COMMITLOG_*` environment variable.
#[derive(Debug, Parser)]
#[command(name = "commitlog-node")]
#[command(about = "Replicated commit log node", long_about = None)]
pub struct NodeArgs {
    #[arg(long, env = "COMMITLOG_NODE_NAME", default_value = "node-0")]
    pub node_name: String,

    /// Directory holding the log's store file.
    #[arg(long, env = "COMMITLOG_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "COMMITLOG_BIND_ADDR", default_value = "127.0.0.1:8400")]
    pub bind_addr: SocketAddr,

    /// Address peers and the local replicator use to reach this node.
    /// Defaults to the bind address.
    #[arg(long, env = "COMMITLOG_ADVERTISE_ADDR")]
    pub advertise_addr: Option<String>,

    /// Peers to replicate from at startup, as `name=addr,name=addr`.
    #[arg(long, env = "COMMITLOG_START_JOIN", value_delimiter = ',', value_parser = parse_peer)]
    pub start_join: Vec<(String, String)>,

    /// Policy file for the ACL authorizer. Without one every subject is allowed.
    #[arg(long, env = "COMMITLOG_ACL_FILE")]
    pub acl_file: Option<PathBuf>,

    #[arg(long, env = "COMMITLOG_TAIL_POLL_MS", default_value_t = DEFAULT_TAIL_POLL_INTERVAL.as_millis() as u64)]
    pub tail_poll_ms: u64,

    #[arg(long, env = "COMMITLOG_MAX_RECORD_BYTES", default_value_t = DEFAULT_MAX_RECORD_BYTES)]
    pub max_record_bytes: u64,

    /// Server certificate (PEM).
    #[arg(long, env = "COMMITLOG_CERT_FILE", requires = "key_file")]
    pub cert_file: Option<PathBuf>,

    #[arg(long, env = "COMMITLOG_KEY_FILE", requires = "cert_file")]
    pub key_file: Option<PathBuf>,

    /// CA used to verify clients and peers.
    #[arg(long, env = "COMMITLOG_CA_FILE")]
    pub ca_file: Option<PathBuf>,

    /// Client certificate used when dialing peers and the local service.
    #[arg(long, env = "COMMITLOG_PEER_CERT_FILE", requires = "peer_key_file")]
    pub peer_cert_file: Option<PathBuf>,

    #[arg(long, env = "COMMITLOG_PEER_KEY_FILE", requires = "peer_cert_file")]
    pub peer_key_file: Option<PathBuf>,

    /// Name peer certificates must carry.
    #[arg(long, env = "COMMITLOG_SERVER_NAME")]
    pub server_name: Option<String>,
}

/// `name=addr`
fn parse_peer(entry: &str) -> Result<(String, String), String> {
    match entry.trim().split_once('=') {
        Some((name, addr)) if !name.trim().is_empty() && !addr.trim().is_empty() => {
            Ok((name.trim().to_string(), addr.trim().to_string()))
        }
        _ => Err(format!("expected name=addr, got `{}`", entry)),
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_name: String,
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub rpc_advertise_addr: Option<String>,
    pub start_join: Vec<(String, String)>,
    pub acl_policy_file: Option<PathBuf>,
    pub server_tls: Option<TlsConfig>,
    pub peer_tls: Option<TlsConfig>,
    pub tail_poll_interval: Duration,
    pub log: LogConfig,
}

impl From<NodeArgs> for NodeConfig {
    fn from(args: NodeArgs) -> Self {
        let server_tls = match (args.cert_file, args.key_file) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_file: Some(cert),
                key_file: Some(key),
                ca_file: args.ca_file.clone(),
                server_address: None,
            }),
            _ => None,
        };
        let peer_tls = match (args.peer_cert_file, args.peer_key_file) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_file: Some(cert),
                key_file: Some(key),
                ca_file: args.ca_file,
                server_address: args.server_name,
            }),
            _ => None,
        };

        Self {
            node_name: args.node_name,
            data_dir: args.data_dir,
            bind_addr: args.bind_addr,
            rpc_advertise_addr: args.advertise_addr,
            start_join: args.start_join,
            acl_policy_file: args.acl_file,
            server_tls,
            peer_tls,
            tail_poll_interval: Duration::from_millis(args.tail_poll_ms),
            log: LogConfig {
                max_record_bytes: args.max_record_bytes,
            },
        }
    }
}

impl NodeConfig {
    pub fn advertise_addr(&self) -> String {
        self.rpc_advertise_addr
            .clone()
            .unwrap_or_else(|| self.bind_addr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<NodeConfig, clap::Error> {
        let argv = std::iter::once("commitlog-node").chain(args.iter().copied());
        NodeArgs::try_parse_from(argv).map(NodeConfig::from)
    }

    #[test]
    fn test_defaults_without_flags() {
        let cfg = parse(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:8400".parse().unwrap());
        assert!(cfg.server_tls.is_none());
        assert!(cfg.start_join.is_empty());
        assert_eq!(cfg.tail_poll_interval, DEFAULT_TAIL_POLL_INTERVAL);
        assert_eq!(cfg.log, LogConfig::default());
        assert_eq!(cfg.advertise_addr(), "127.0.0.1:8400");
    }

    #[test]
    fn test_flag_overrides() {
        let cfg = parse(&[
            "--node-name", "node-a",
            "--bind-addr", "0.0.0.0:9000",
            "--start-join", "node-b=10.0.0.2:9000, node-c=10.0.0.3:9000",
            "--cert-file", "server.pem",
            "--key-file", "server-key.pem",
            "--ca-file", "ca.pem",
            "--peer-cert-file", "root-client.pem",
            "--peer-key-file", "root-client-key.pem",
            "--server-name", "localhost",
            "--tail-poll-ms", "250",
        ])
        .unwrap();

        assert_eq!(cfg.node_name, "node-a");
        assert_eq!(cfg.start_join.len(), 2);
        assert_eq!(cfg.start_join[1], ("node-c".to_string(), "10.0.0.3:9000".to_string()));
        assert_eq!(cfg.tail_poll_interval, Duration::from_millis(250));

        let server = cfg.server_tls.unwrap();
        assert_eq!(server.ca_file, Some(PathBuf::from("ca.pem")));
        assert!(server.server_address.is_none());
        let peer = cfg.peer_tls.unwrap();
        assert_eq!(peer.server_address.as_deref(), Some("localhost"));
    }

    #[test]
    fn test_invalid_values() {
        let err = parse(&["--bind-addr", "nowhere"]).unwrap_err();
        assert!(err.to_string().contains("--bind-addr"));

        assert!(parse(&["--start-join", "node-b"]).is_err());
        assert!(parse(&["--tail-poll-ms", "soon"]).is_err());
        // A certificate without its key is rejected up front.
        assert!(parse(&["--cert-file", "server.pem"]).is_err());
    }
}
