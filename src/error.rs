// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    /// Underlying file read/write/open failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No record exists at this offset (yet).
    #[error("offset out of range: {0}")]
    OffsetOutOfRange(u64),

    #[error("record of {size} bytes exceeds limit of {max} bytes")]
    RecordTooLarge { size: u64, max: u64 },

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

impl LogError {
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, LogError::OffsetOutOfRange(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for LogError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        LogError::Poisoned
    }
}

pub type Result<T> = core::result::Result<T, LogError>;
