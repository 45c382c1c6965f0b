// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use commitlog::Log;
use commitlog_node::authorizer::{AclAuthorizer, AllowAll};
use clap::Parser;
use commitlog_node::config::{NodeArgs, NodeConfig};
use commitlog_node::network::LogClient;
use commitlog_node::replication::{Membership, Replicator};
use commitlog_node::server::{build_router, serve};
use commitlog_node::service::{Authorizer, LogService, ServiceConfig};
use commitlog_node::telemetry;
use commitlog_node::tls::setup_server_tls;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_telemetry()?;

    let cfg = NodeConfig::from(NodeArgs::parse());
    tracing::info!("Initializing commit log node with config: {:?}", cfg);

    let log = Arc::new(Log::open(&cfg.data_dir, cfg.log)?);
    if log.recovered_bytes() > 0 {
        tracing::warn!(
            "Truncated {} bytes of partial record from {:?}",
            log.recovered_bytes(),
            cfg.data_dir
        );
    }
    tracing::info!("Opened log with {} records", log.len()?);

    let authorizer: Arc<dyn Authorizer> = match &cfg.acl_policy_file {
        Some(path) => {
            let acl = AclAuthorizer::from_file(path)?;
            tracing::info!("Loaded {} ACL rules from {:?}", acl.len(), path);
            Arc::new(acl)
        }
        None => {
            tracing::warn!("No ACL policy configured; every subject is allowed");
            Arc::new(AllowAll)
        }
    };

    let acceptor = match &cfg.server_tls {
        Some(tls) => Some(TlsAcceptor::from(Arc::new(setup_server_tls(tls)?))),
        None => None,
    };

    let advertise = cfg.advertise_addr();
    let local = LogClient::connect(&advertise, cfg.peer_tls.as_ref()).await?;
    let replicator = Arc::new(Replicator::new(local, cfg.peer_tls.clone()));
    let membership = Membership::new(cfg.node_name.clone(), advertise, replicator.clone());

    let service = LogService::with_poll_interval(
        ServiceConfig {
            commit_log: log.clone(),
            authorizer,
            get_serverer: Arc::new(membership),
        },
        cfg.tail_poll_interval,
    );
    let app = build_router(service);

    let listener = TcpListener::bind(cfg.bind_addr).await?;
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve(listener, app, acceptor, shutdown.clone()));

    for (name, addr) in &cfg.start_join {
        replicator.join(name, addr)?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    replicator.close()?;
    shutdown.cancel();
    server.await??;
    log.close()?;
    Ok(())
}
