// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Offset-addressed log on top of a [`Store`].
//!
//! The store only knows byte positions. `Log` keeps an in-memory index from
//! logical offset (0, 1, 2, ...) to store position and rebuilds it by scanning
//! the store frames on open.

use byteorder::{BigEndian, ByteOrder};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::{LogConfig, LEN_WIDTH, STORE_FILE_NAME};
use crate::error::{LogError, Result};
use crate::record::Record;
use crate::store::Store;

pub struct Log {
    dir: PathBuf,
    config: LogConfig,
    store: Store,
    /// Position of every record, indexed by offset. Held across store appends
    /// so offsets and positions are assigned in the same order.
    positions: Mutex<Vec<u64>>,
    recovered_bytes: u64,
}

impl Log {
    /// Open (or create) the log stored in `dir`.
    pub fn open<P: AsRef<Path>>(dir: P, config: LogConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(STORE_FILE_NAME);

        let mut store = Store::open(&path)?;
        let (positions, valid_len) = scan(&store)?;
        let size = store.size()?;

        let mut recovered_bytes = 0;
        if valid_len < size {
            // Partial frame at the tail from an interrupted append.
            recovered_bytes = size - valid_len;
            tracing::warn!(
                "Log: truncating {} trailing bytes of incomplete record in {:?}",
                recovered_bytes,
                path
            );
            store.close()?;
            OpenOptions::new().write(true).open(&path)?.set_len(valid_len)?;
            store = Store::open(&path)?;
        }

        tracing::info!("Log opened at {:?} with {} records", dir, positions.len());

        Ok(Self {
            dir,
            config,
            store,
            positions: Mutex::new(positions),
            recovered_bytes,
        })
    }

    /// Append a record and return its offset. The record's own offset field
    /// is ignored.
    pub fn append(&self, record: &Record) -> Result<u64> {
        let size = record.value.len() as u64;
        if size > self.config.max_record_bytes {
            return Err(LogError::RecordTooLarge {
                size,
                max: self.config.max_record_bytes,
            });
        }

        let mut positions = self.positions.lock()?;
        let (_, position) = self.store.append(&record.value)?;
        let offset = positions.len() as u64;
        positions.push(position);
        Ok(offset)
    }

    pub fn read(&self, offset: u64) -> Result<Record> {
        let position = {
            let positions = self.positions.lock()?;
            usize::try_from(offset)
                .ok()
                .and_then(|i| positions.get(i).copied())
                .ok_or(LogError::OffsetOutOfRange(offset))?
        };

        let value = self.store.read(position)?;
        Ok(Record { value, offset })
    }

    pub fn lowest_offset(&self) -> u64 {
        0
    }

    /// Offset of the newest record, `None` while empty.
    pub fn highest_offset(&self) -> Result<Option<u64>> {
        let len = self.len()?;
        Ok(len.checked_sub(1))
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.positions.lock()?.len() as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Bytes dropped from the tail on open because the last record was incomplete.
    pub fn recovered_bytes(&self) -> u64 {
        self.recovered_bytes
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

/// Walk the frames from byte 0. Returns the start position of every complete
/// record and the byte length covered by them.
fn scan(store: &Store) -> Result<(Vec<u64>, u64)> {
    let size = store.size()?;
    let mut positions = Vec::new();
    let mut position = 0u64;
    let mut header = [0u8; LEN_WIDTH as usize];

    while position + LEN_WIDTH <= size {
        let n = store.read_at(&mut header, position)?;
        if n < header.len() {
            break;
        }
        let len = BigEndian::read_u64(&header);
        let end = match (position + LEN_WIDTH).checked_add(len) {
            Some(end) if end <= size => end,
            _ => break,
        };
        positions.push(position);
        position = end;
    }

    Ok((positions, position))
}
