// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use bytes::Bytes;
use commitlog::Record;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use std::net::SocketAddr;

use crate::api::*;
use crate::errors::NodeError;
use crate::ndjson;
use crate::tls::{setup_client_tls, TlsConfig};

/// HTTP client for a node's log service.
#[derive(Debug, Clone)]
pub struct LogClient {
    base_url: String,
    client: Client,
}

impl LogClient {
    /// Plaintext client. `addr` is `host:port` or a full `http://` URL.
    pub fn new(addr: &str) -> Result<Self, NodeError> {
        let base_url = if addr.contains("://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr)
        };
        Ok(Self {
            base_url,
            client: Client::builder().build()?,
        })
    }

    /// Mutual-TLS client. The server certificate must match
    /// `tls.server_address` (or the host in `addr` if unset); the connection
    /// itself goes to `addr`.
    pub async fn with_tls(addr: &str, tls: &TlsConfig) -> Result<Self, NodeError> {
        let socket_addr = resolve(addr).await?;
        let server_name = match &tls.server_address {
            Some(name) => name.clone(),
            None => host_of(addr).to_string(),
        };

        let config = setup_client_tls(tls).map_err(|e| NodeError::Internal(e.to_string()))?;
        let client = Client::builder()
            .use_preconfigured_tls(config)
            .resolve(&server_name, socket_addr)
            .build()?;

        Ok(Self {
            base_url: format!("https://{}:{}", server_name, socket_addr.port()),
            client,
        })
    }

    /// Pick plaintext or TLS depending on whether a TLS config is given.
    pub async fn connect(addr: &str, tls: Option<&TlsConfig>) -> Result<Self, NodeError> {
        match tls {
            Some(tls) => Self::with_tls(addr, tls).await,
            None => Self::new(addr),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn produce(&self, record: Record) -> Result<u64, NodeError> {
        let url = format!("{}/v1/produce", self.base_url);
        let resp = self.client.post(&url).json(&ProduceRequest { record }).send().await?;
        let body: ProduceResponse = check(resp).await?.json().await?;
        Ok(body.offset)
    }

    pub async fn consume(&self, offset: u64) -> Result<Record, NodeError> {
        let url = format!("{}/v1/consume", self.base_url);
        let resp = self.client.get(&url).query(&ConsumeRequest { offset }).send().await?;
        let body: ConsumeResponse = check(resp).await?.json().await?;
        Ok(body.record)
    }

    /// Open a tailing stream starting at `offset`. The stream only ends when
    /// the server ends it or a frame carries an error.
    pub async fn consume_stream(
        &self,
        offset: u64,
    ) -> Result<impl Stream<Item = Result<Record, NodeError>> + Send + 'static, NodeError> {
        let url = format!("{}/v1/consume/stream", self.base_url);
        let resp = self.client.get(&url).query(&ConsumeRequest { offset }).send().await?;
        let resp = check(resp).await?;

        Ok(frames::<ConsumeResponse>(resp).map(|res| res.map(|r| r.record)))
    }

    /// Send records over one request and get an offset back per record.
    pub async fn produce_stream<S>(
        &self,
        records: S,
    ) -> Result<impl Stream<Item = Result<u64, NodeError>> + Send + 'static, NodeError>
    where
        S: Stream<Item = Record> + Send + 'static,
    {
        let lines = records.map(|record| {
            let mut line = serde_json::to_vec(&ProduceRequest { record })?;
            line.push(b'\n');
            Ok::<_, serde_json::Error>(Bytes::from(line))
        });

        let url = format!("{}/v1/produce/stream", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, ndjson::CONTENT_TYPE)
            .body(reqwest::Body::wrap_stream(lines))
            .send()
            .await?;
        let resp = check(resp).await?;

        Ok(frames::<ProduceResponse>(resp).map(|res| res.map(|r| r.offset)))
    }

    pub async fn get_servers(&self) -> Result<Vec<Server>, NodeError> {
        let url = format!("{}/v1/servers", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let body: GetServersResponse = check(resp).await?.json().await?;
        Ok(body.servers)
    }
}

/// Map non-2xx responses to the error the server reported.
async fn check(resp: Response) -> Result<Response, NodeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(NodeError::from_remote(status, body)),
        Err(_) => Err(NodeError::Network(format!("request failed: {} {}", status, text))),
    }
}

fn frames<T>(resp: Response) -> impl Stream<Item = Result<T, NodeError>> + Send + 'static
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    let status = resp.status();
    ndjson::decode::<StreamFrame<T>, _, _>(resp.bytes_stream()).map(move |frame| match frame? {
        StreamFrame::Data(data) => Ok(data),
        StreamFrame::Error(body) => Err(NodeError::from_remote(status, body)),
    })
}

fn host_of(addr: &str) -> &str {
    match addr.rsplit_once(':') {
        Some((host, _port)) => host.trim_start_matches('[').trim_end_matches(']'),
        None => addr,
    }
}

async fn resolve(addr: &str) -> Result<SocketAddr, NodeError> {
    tokio::net::lookup_host(addr)
        .await
        .map_err(|e| NodeError::Network(format!("failed to resolve {}: {}", addr, e)))?
        .next()
        .ok_or_else(|| NodeError::Network(format!("no address for {}", addr)))
}
