// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! commitlog: a durable, append-only record log.
//!
//! [`store::Store`] owns the on-disk framing; [`log::Log`] maps logical
//! offsets onto store positions.

pub mod config;
pub mod error;
pub mod record;
pub mod store;
pub mod log;

pub use config::LogConfig;
pub use error::{LogError, Result};
pub use log::Log;
pub use record::Record;
pub use store::Store;
