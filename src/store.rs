// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-Only Record Store
//!
//! A single file of length-prefixed records:
//! ```text
//! [len: u64 BE][payload][len: u64 BE][payload]...
//! ```
//! No header, no footer, no checksums. Records are addressed by the byte
//! position of their length prefix.
//!
//! Appends go through a `BufWriter`; every read flushes first so it observes
//! all prior appends. One mutex serializes every operation.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::config::LEN_WIDTH;
use crate::error::Result;

struct StoreInner {
    /// `None` once the store has been closed.
    buf: Option<BufWriter<File>>,
    size: u64,
}

impl StoreInner {
    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.buf
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "store is closed"))
    }

    /// Flush buffered appends and hand back the file for positional reads.
    fn flushed_file(&mut self) -> io::Result<&File> {
        let buf = self.writer()?;
        buf.flush()?;
        Ok(buf.get_ref())
    }
}

pub struct Store {
    inner: Mutex<StoreInner>,
}

impl Store {
    /// Wrap an already opened file. Its current length becomes `size`.
    pub fn new(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            inner: Mutex::new(StoreInner {
                buf: Some(BufWriter::new(file)),
                size,
            }),
        })
    }

    /// Open or create a store file at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Self::new(file)
    }

    /// Append a payload. Returns `(bytes_written, position)` where `position`
    /// is where the length prefix starts.
    ///
    /// The bytes may still sit in the write buffer when this returns.
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock()?;
        let position = inner.size;

        let buf = inner.writer()?;
        buf.write_u64::<BigEndian>(payload.len() as u64)?;
        buf.write_all(payload)?;

        let written = LEN_WIDTH + payload.len() as u64;
        inner.size += written;
        Ok((written, position))
    }

    /// Read the record whose length prefix starts at `position`.
    pub fn read(&self, position: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock()?;
        let size = inner.size;
        let file = inner.flushed_file()?;

        let mut header = [0u8; LEN_WIDTH as usize];
        read_exact_at(file, &mut header, position)?;
        let len = BigEndian::read_u64(&header);

        // Reject lengths that point past the end before allocating for them.
        let end = position
            .checked_add(LEN_WIDTH)
            .and_then(|p| p.checked_add(len));
        match end {
            Some(end) if end <= size => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("record at {} of {} bytes runs past end of store ({})", position, len, size),
                )
                .into())
            }
        }

        let mut payload = vec![0u8; len as usize];
        read_exact_at(file, &mut payload, position + LEN_WIDTH)?;
        Ok(payload)
    }

    /// Raw positional read, independent of record framing.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut inner = self.inner.lock()?;
        let file = inner.flushed_file()?;
        Ok(read_at(file, buf, offset)?)
    }

    /// Bytes appended so far, buffered or not.
    pub fn size(&self) -> Result<u64> {
        Ok(self.inner.lock()?.size)
    }

    /// Flush, sync and release the file. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        if let Some(mut buf) = inner.buf.take() {
            buf.flush()?;
            buf.get_ref().sync_all()?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match read_at(file, buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
