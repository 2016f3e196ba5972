use bzip2::{Decompress, Status};
use std::io::{ErrorKind, Read};
use tracing::{debug, warn};

use crate::ingest::decoder::LineSource;
use crate::{Result, SyncLensError};

/// Size of the compressed chunks read from the source
const CHUNK_SIZE: usize = 8 * 1024;

/// Line splitter over an incremental bzip2 decompressor.
///
/// Compressed input is read in fixed-size chunks and fed to the decompressor;
/// output accumulates in `pending` and complete lines are split off as soon as a
/// terminator shows up. Concatenated bzip2 streams are decoded back to back.
pub(crate) struct Bzip2Lines<'a, R> {
    source: &'a mut R,
    decompress: Decompress,
    pending: Vec<u8>,
    /// Start of the not-yet-yielded part of `pending`
    cursor: usize,
    chunk: Box<[u8]>,
    stream_end: bool,
    source_done: bool,
    total_in: u64,
    truncated_reported: bool,
}

impl<'a, R: Read> Bzip2Lines<'a, R> {
    pub(crate) fn new(source: &'a mut R) -> Self {
        Self {
            source,
            decompress: Decompress::new(false),
            pending: Vec::with_capacity(CHUNK_SIZE),
            cursor: 0,
            chunk: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            stream_end: false,
            source_done: false,
            total_in: 0,
            truncated_reported: false,
        }
    }

    /// Split off the next complete line from the pending buffer
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let unread = &self.pending[self.cursor..];
        let pos = memchr::memchr(b'\n', unread)?;
        let line = unread[..=pos].to_vec();
        self.cursor += pos + 1;
        Some(line)
    }

    /// Drop already-yielded bytes so the buffer does not grow with the payload
    fn compact(&mut self) {
        if self.cursor > 0 {
            self.pending.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    fn read_chunk(&mut self) -> Result<usize> {
        loop {
            match self.source.read(&mut self.chunk) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SyncLensError::Io(e)),
            }
        }
    }

    /// Run one compressed chunk through the decompressor
    fn feed(&mut self, len: usize) -> Result<()> {
        let mut offset = 0;
        loop {
            if self.stream_end {
                if offset == len {
                    return Ok(());
                }
                debug!("bzip2 stream ended with more input, starting next stream");
                self.decompress = Decompress::new(false);
                self.stream_end = false;
            }

            self.pending.reserve(CHUNK_SIZE);
            let spare = self.pending.capacity() - self.pending.len();
            let in_before = self.decompress.total_in();
            let out_before = self.decompress.total_out();

            let status = self
                .decompress
                .decompress_vec(&self.chunk[offset..len], &mut self.pending)
                .map_err(|e| SyncLensError::CorruptArchive(format!("bzip2: {e}")))?;

            let consumed = (self.decompress.total_in() - in_before) as usize;
            let produced = (self.decompress.total_out() - out_before) as usize;
            offset += consumed;

            if matches!(status, Status::StreamEnd) {
                self.stream_end = true;
                continue;
            }
            // Output space left over means the decompressor has nothing buffered
            if offset == len && produced < spare {
                return Ok(());
            }
            if consumed == 0 && produced == 0 {
                return Err(SyncLensError::CorruptArchive(
                    "bzip2: decompressor made no progress".to_string(),
                ));
            }
        }
    }
}

impl<R: Read> LineSource for Bzip2Lines<'_, R> {
    fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            if self.source_done {
                if self.cursor < self.pending.len() {
                    let rest = self.pending.split_off(self.cursor);
                    self.pending.clear();
                    self.cursor = 0;
                    return Ok(Some(rest));
                }
                if !self.stream_end && self.total_in > 0 && !self.truncated_reported {
                    self.truncated_reported = true;
                    warn!("bzip2 input ended before the end-of-stream marker");
                    return Err(SyncLensError::TruncatedStream(
                        "bzip2: input ended before end of stream".to_string(),
                    ));
                }
                return Ok(None);
            }

            self.compact();
            let n = self.read_chunk()?;
            if n == 0 {
                self.source_done = true;
                continue;
            }
            self.total_in += n as u64;
            self.feed(n)?;
        }
    }
}
