use std::io::{self, BufReader, ErrorKind, Read};
use tar::Header;
use tracing::{debug, info, warn};

use crate::ingest::decoder::{LineSource, read_line};
use crate::{Result, SyncLensError};

const BLOCK_SIZE: u64 = 512;

/// Byte range of the checksum field inside a ustar header
const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// Regular member currently being read
struct CurrentMember {
    name: String,
    remaining: u64,
    padding: u64,
}

/// Lines of every regular file in a tar stream, concatenated in member order.
///
/// Headers are parsed straight off the decompressed stream; member bodies are
/// read through a length-limited view so a single forward pass covers the whole
/// archive. Regular and contiguous files are read; directories, links, sparse files and
/// metadata members (PAX, GNU long names) are skipped.
pub(crate) struct TarLines<D> {
    reader: BufReader<D>,
    context: &'static str,
    current: Option<CurrentMember>,
    finished: bool,
    members: usize,
    deferred: Option<SyncLensError>,
}

impl<D: Read> TarLines<D> {
    pub(crate) fn new(decoder: D, context: &'static str) -> Self {
        Self {
            reader: BufReader::new(decoder),
            context,
            current: None,
            finished: false,
            members: 0,
            deferred: None,
        }
    }

    /// Read the next 512-byte header block; `None` at a clean end of stream
    fn read_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE as usize]>> {
        let mut block = [0u8; BLOCK_SIZE as usize];
        let mut filled = 0;
        while filled < block.len() {
            match self.reader.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SyncLensError::from_decode_io(e, self.context)),
            }
        }
        match filled {
            0 => Ok(None),
            n if n < block.len() => Err(SyncLensError::TruncatedStream(format!(
                "{}: stream ended inside a member header",
                self.context
            ))),
            _ => Ok(Some(block)),
        }
    }

    /// Discard `len` bytes of the decompressed stream
    fn skip(&mut self, len: u64) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.reader).take(len), &mut io::sink())
            .map_err(|e| SyncLensError::from_decode_io(e, self.context))?;
        if skipped < len {
            return Err(SyncLensError::TruncatedStream(format!(
                "{}: stream ended inside a member",
                self.context
            )));
        }
        Ok(())
    }

    /// Advance to the next regular member; false once the archive is done
    fn open_next(&mut self) -> Result<bool> {
        loop {
            let Some(block) = self.read_block()? else {
                debug!("{} stream ended without trailer blocks", self.context);
                return Ok(false);
            };
            if block.iter().all(|&b| b == 0) {
                return Ok(false);
            }

            verify_checksum(&block, self.context)?;
            let header = Header::from_byte_slice(&block);
            let size = header
                .entry_size()
                .map_err(|e| SyncLensError::CorruptArchive(format!("{}: {e}", self.context)))?;
            let padding = padding_for(size);
            let name = header
                .path()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "<unreadable name>".to_string());
            let span = size.checked_add(padding).ok_or_else(|| {
                SyncLensError::CorruptArchive(format!(
                    "{}: member {} declares an impossible size of {} bytes",
                    self.context, name, size
                ))
            })?;

            let entry_type = header.entry_type();
            if !(entry_type.is_file() || entry_type.is_contiguous()) {
                if entry_type.is_gnu_sparse() {
                    warn!("Skipping sparse TAR member {} ({} bytes of data dropped)", name, size);
                } else {
                    debug!("Skipping non-regular TAR member {} ({:?})", name, entry_type);
                }
                self.skip(span)?;
                continue;
            }

            self.members += 1;
            info!("Processing file from TAR: {}", name);
            self.current = Some(CurrentMember { name, remaining: size, padding });
            return Ok(true);
        }
    }
}

impl<D: Read> LineSource for TarLines<D> {
    fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            if let Some(member) = self.current.as_mut() {
                if member.remaining > 0 {
                    let mut body = (&mut self.reader).take(member.remaining);
                    match read_line(&mut body, self.context, &mut self.deferred)? {
                        Some(line) => {
                            member.remaining -= line.len() as u64;
                            return Ok(Some(line));
                        }
                        None => {
                            return Err(SyncLensError::TruncatedStream(format!(
                                "{}: stream ended inside member {}",
                                self.context, member.name
                            )));
                        }
                    }
                }
                let padding = member.padding;
                self.current = None;
                self.skip(padding)?;
            }

            if !self.open_next()? {
                info!("TAR archive contained {} file(s)", self.members);
                self.finished = true;
            }
        }
    }
}

/// Bytes of zero padding that follow a member body of `size` bytes
fn padding_for(size: u64) -> u64 {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}

fn verify_checksum(block: &[u8; BLOCK_SIZE as usize], context: &str) -> Result<()> {
    let stored = std::str::from_utf8(&block[CHECKSUM_RANGE])
        .ok()
        .map(|s| s.trim_matches(|c: char| c == '\0' || c == ' '))
        .and_then(|s| u32::from_str_radix(s, 8).ok())
        .ok_or_else(|| SyncLensError::CorruptArchive(format!("{context}: unreadable header checksum")))?;

    let computed: u32 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM_RANGE.contains(&i) { u32::from(b' ') } else { u32::from(b) })
        .sum();

    if stored != computed {
        return Err(SyncLensError::CorruptArchive(format!(
            "{context}: header checksum mismatch (stored {stored}, computed {computed})"
        )));
    }
    Ok(())
}
