// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Width in bytes of the big-endian length prefix in front of every record.
pub const LEN_WIDTH: u64 = 8;

/// Default upper bound for a single record payload (1 MiB).
pub const DEFAULT_MAX_RECORD_BYTES: u64 = 1024 * 1024;

/// File name of the store inside a log directory.
pub const STORE_FILE_NAME: &str = "store";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    pub max_record_bytes: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}
