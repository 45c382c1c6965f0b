// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::{
    body::Body,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, Request, State},
    http::header::CONTENT_TYPE,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::StreamExt;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::api::*;
use crate::auth::{authenticate, PeerInfo, Subject, TlsInfo};
use crate::errors::NodeError;
use crate::ndjson;
use crate::service::LogService;

pub fn build_router(service: LogService) -> Router {
    Router::new()
        .route("/v1/produce", post(produce))
        .route("/v1/consume", get(consume))
        .route("/v1/produce/stream", post(produce_stream))
        .route("/v1/consume/stream", get(consume_stream))
        .route("/v1/servers", get(get_servers))
        // Observability
        .route("/metrics", get(metrics_handler))
        .layer(from_fn(authenticate))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn produce(
    State(service): State<LogService>,
    Extension(subject): Extension<Subject>,
    req: Result<Json<ProduceRequest>, JsonRejection>,
) -> Result<Json<ProduceResponse>, NodeError> {
    let Json(req) = req?;
    let offset = service.produce(subject.as_str(), req.record)?;
    Ok(Json(ProduceResponse { offset }))
}

async fn consume(
    State(service): State<LogService>,
    Extension(subject): Extension<Subject>,
    req: Result<Query<ConsumeRequest>, QueryRejection>,
) -> Result<Json<ConsumeResponse>, NodeError> {
    let Query(req) = req?;
    let record = service.consume(subject.as_str(), req.offset)?;
    Ok(Json(ConsumeResponse { record }))
}

async fn produce_stream(
    State(service): State<LogService>,
    Extension(subject): Extension<Subject>,
    body: Body,
) -> Response {
    let requests = ndjson::decode::<ProduceRequest, _, _>(body.into_data_stream());
    let rx = service.produce_stream(subject.0, requests);
    ndjson_response(ndjson::encode(rx))
}

async fn consume_stream(
    State(service): State<LogService>,
    Extension(subject): Extension<Subject>,
    req: Result<Query<ConsumeRequest>, QueryRejection>,
) -> Result<Response, NodeError> {
    let Query(req) = req?;
    let cancel = CancellationToken::new();
    let rx = service.consume_stream(subject.0, req.offset, cancel.clone());

    // The body is dropped when the client goes away; that cancels the tail.
    let guard = cancel.drop_guard();
    let items = ReceiverStream::new(rx).map(move |item| {
        let _ = &guard;
        item
    });
    Ok(ndjson_response(ndjson::encode_stream(items)))
}

async fn get_servers(
    State(service): State<LogService>,
) -> Result<Json<GetServersResponse>, NodeError> {
    let servers = service.get_servers()?;
    Ok(Json(GetServersResponse { servers }))
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}

fn ndjson_response(body: Body) -> Response {
    ([(CONTENT_TYPE, ndjson::CONTENT_TYPE)], body).into_response()
}

/// Accept connections until `shutdown` fires.
///
/// With an acceptor every connection must complete a TLS handshake; the
/// certificates the handshake verified become the connection's [`PeerInfo`].
pub async fn serve(
    listener: TcpListener,
    router: Router,
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    tracing::info!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let router = router.clone();
        let tls = tls.clone();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            let result = match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => {
                        let verified_chains = stream
                            .get_ref()
                            .1
                            .peer_certificates()
                            .map(|chain| vec![chain.to_vec()])
                            .unwrap_or_default();
                        let peer = PeerInfo {
                            remote_addr,
                            tls: Some(TlsInfo { verified_chains }),
                        };
                        serve_connection(stream, router, peer, shutdown).await
                    }
                    Err(e) => {
                        tracing::warn!(%remote_addr, "TLS handshake failed: {}", e);
                        return;
                    }
                },
                None => {
                    let peer = PeerInfo { remote_addr, tls: None };
                    serve_connection(stream, router, peer, shutdown).await
                }
            };

            if let Err(e) = result {
                tracing::debug!(%remote_addr, "Connection closed with error: {}", e);
            }
        });
    }
}

async fn serve_connection<IO>(
    io: IO,
    router: Router,
    peer: PeerInfo,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = router.map_request(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(peer.clone());
        req
    });

    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), TowerToHyperService::new(service));
    tokio::pin!(conn);

    tokio::select! {
        res = conn.as_mut() => res,
        _ = shutdown.cancelled() => Ok(()),
    }
}
