// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Newline-delimited JSON framing for the streaming endpoints.

use axum::body::Body;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use crate::api::StreamFrame;
use crate::errors::NodeError;

/// Longest accepted line. A 1 MiB record is ~1.4 MiB once base64 encoded.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

pub const CONTENT_TYPE: &str = "application/x-ndjson";

/// Split a byte stream into lines and parse each non-empty line as `T`.
pub fn decode<T, S, E>(body: S) -> impl Stream<Item = Result<T, NodeError>> + Send
where
    T: DeserializeOwned,
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    let reader = StreamReader::new(
        body.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
    );

    FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES))
        .try_filter(|line| futures::future::ready(!line.trim().is_empty()))
        .map(|line| {
            let line = line.map_err(|e| match e {
                LinesCodecError::MaxLineLengthExceeded => {
                    NodeError::InvalidInput("stream line too long".into())
                }
                LinesCodecError::Io(e) => NodeError::Network(e.to_string()),
            })?;
            serde_json::from_str(&line)
                .map_err(|e| NodeError::InvalidInput(format!("malformed stream line: {}", e)))
        })
}

/// Turn a channel of results into an NDJSON response body of
/// [`StreamFrame`]s. An `Err` becomes the final error frame.
pub fn encode<T>(rx: mpsc::Receiver<Result<T, NodeError>>) -> Body
where
    T: Serialize + Send + 'static,
{
    encode_stream(ReceiverStream::new(rx))
}

pub fn encode_stream<T, S>(items: S) -> Body
where
    T: Serialize + Send + 'static,
    S: Stream<Item = Result<T, NodeError>> + Send + 'static,
{
    let lines = items.map(|item| {
        let frame = match item {
            Ok(data) => StreamFrame::Data(data),
            Err(e) => StreamFrame::Error(e.to_body()),
        };
        frame.to_line()
    });
    Body::from_stream(lines)
}
