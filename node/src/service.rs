// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Log service: produce/consume semantics behind the HTTP surface.
//!
//! Every produce and consume is authorized before the commit log is touched.
//! The tailing consume treats "offset out of range" as "not there yet" and
//! waits for the next append instead of failing.

use commitlog::{LogError, Record};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::api::{ConsumeResponse, ProduceRequest, ProduceResponse, Server};
use crate::errors::NodeError;

pub const OBJECT_WILDCARD: &str = "*";
pub const PRODUCE_ACTION: &str = "produce";
pub const CONSUME_ACTION: &str = "consume";

pub const DEFAULT_TAIL_POLL_INTERVAL: Duration = Duration::from_secs(1);
const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Durable append/read by offset.
pub trait CommitLog: Send + Sync {
    fn append(&self, record: Record) -> Result<u64, LogError>;
    fn read(&self, offset: u64) -> Result<Record, LogError>;
}

impl CommitLog for commitlog::Log {
    fn append(&self, record: Record) -> Result<u64, LogError> {
        commitlog::Log::append(self, &record)
    }

    fn read(&self, offset: u64) -> Result<Record, LogError> {
        commitlog::Log::read(self, offset)
    }
}

pub trait Authorizer: Send + Sync {
    /// `Ok(())` if `subject` may perform `action` on `object`, otherwise
    /// `NodeError::PermissionDenied`.
    fn authorize(&self, subject: &str, object: &str, action: &str) -> Result<(), NodeError>;
}

/// Cluster member listing.
pub trait GetServerer: Send + Sync {
    fn get_servers(&self) -> Result<Vec<Server>, NodeError>;
}

/// Capabilities the service is built from. Fixed after construction.
#[derive(Clone)]
pub struct ServiceConfig {
    pub commit_log: Arc<dyn CommitLog>,
    pub authorizer: Arc<dyn Authorizer>,
    pub get_serverer: Arc<dyn GetServerer>,
}

#[derive(Clone)]
pub struct LogService {
    config: Arc<ServiceConfig>,
    /// Woken after every successful produce so tailing consumers retry at once.
    appended: Arc<Notify>,
    tail_poll_interval: Duration,
}

impl LogService {
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_poll_interval(config, DEFAULT_TAIL_POLL_INTERVAL)
    }

    /// `interval` bounds how long a tail waits before re-reading when no
    /// append went through this service (e.g. the log is shared).
    pub fn with_poll_interval(config: ServiceConfig, interval: Duration) -> Self {
        Self {
            config: Arc::new(config),
            appended: Arc::new(Notify::new()),
            tail_poll_interval: interval,
        }
    }

    fn authorize(&self, subject: &str, action: &str) -> Result<(), NodeError> {
        self.config
            .authorizer
            .authorize(subject, OBJECT_WILDCARD, action)
            .map_err(|e| {
                metrics::increment_counter!("commitlog_auth_denied_total");
                tracing::debug!(subject, action, "authorization denied: {}", e);
                e
            })
    }

    pub fn produce(&self, subject: &str, record: Record) -> Result<u64, NodeError> {
        self.authorize(subject, PRODUCE_ACTION)?;

        let offset = self.config.commit_log.append(record)?;
        self.appended.notify_waiters();
        metrics::increment_counter!("commitlog_records_produced_total");
        Ok(offset)
    }

    pub fn consume(&self, subject: &str, offset: u64) -> Result<Record, NodeError> {
        self.authorize(subject, CONSUME_ACTION)?;

        let record = self.config.commit_log.read(offset)?;
        metrics::increment_counter!("commitlog_records_consumed_total");
        Ok(record)
    }

    pub fn get_servers(&self) -> Result<Vec<Server>, NodeError> {
        self.config.get_serverer.get_servers()
    }

    /// Answer each inbound produce request with one response, in order.
    ///
    /// The first receive or produce error is sent as the last item; a
    /// dropped receiver ends the loop.
    pub fn produce_stream<S>(
        &self,
        subject: String,
        requests: S,
    ) -> mpsc::Receiver<Result<ProduceResponse, NodeError>>
    where
        S: Stream<Item = Result<ProduceRequest, NodeError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let service = self.clone();

        tokio::spawn(async move {
            let mut requests = Box::pin(requests);
            while let Some(req) = requests.next().await {
                let res = req.and_then(|req| service.produce(&subject, req.record));
                let failed = res.is_err();
                let res = res.map(|offset| ProduceResponse { offset });

                if tx.send(res).await.is_err() {
                    tracing::debug!("ProduceStream: client went away");
                    return;
                }
                if failed {
                    return;
                }
            }
        });

        rx
    }

    /// Tail the log from `offset`, forever.
    ///
    /// Stops when `cancel` fires, the receiver is dropped, or a read fails
    /// with anything other than "out of range" (that error is sent first).
    pub fn consume_stream(
        &self,
        subject: String,
        offset: u64,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Result<ConsumeResponse, NodeError>> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let service = self.clone();
        tokio::spawn(async move { service.tail(subject, offset, cancel, tx).await });
        rx
    }

    async fn tail(
        self,
        subject: String,
        mut offset: u64,
        cancel: CancellationToken,
        tx: mpsc::Sender<Result<ConsumeResponse, NodeError>>,
    ) {
        loop {
            if cancel.is_cancelled() || tx.is_closed() {
                return;
            }

            // Register before reading so an append between the read and the
            // wait still wakes us.
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            match self.consume(&subject, offset) {
                Ok(record) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = tx.send(Ok(ConsumeResponse { record })) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                    offset += 1;
                }
                Err(e) if e.is_out_of_range() => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tx.closed() => return,
                        _ = &mut appended => {}
                        _ = tokio::time::sleep(self.tail_poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("ConsumeStream: stopping at offset {}: {}", offset, e);
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
}
