// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use commitlog::Record;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProduceRequest {
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProduceResponse {
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeRequest {
    #[serde(default)]
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeResponse {
    pub record: Record,
}

/// A cluster member as reported by `GetServers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub rpc_addr: String,
    #[serde(default)]
    pub is_leader: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetServersResponse {
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    // Set for offset_out_of_range so clients can rebuild the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// One NDJSON line on a streaming endpoint. A stream ends after the first
/// `Error` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFrame<T> {
    Data(T),
    Error(ErrorBody),
}

impl<T: Serialize> StreamFrame<T> {
    /// Serialize as a single newline-terminated JSON line.
    pub fn to_line(&self) -> Result<bytes::Bytes, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(bytes::Bytes::from(line))
    }
}
