use flate2::read::MultiGzDecoder;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use tracing::{debug, info};

use crate::ingest::bzip2_lines::Bzip2Lines;
use crate::ingest::format::CompressionKind;
use crate::ingest::tar_lines::TarLines;
use crate::ingest::zip_lines::ZipLines;
use crate::{Result, SyncLensError};

/// A producer of decoded lines for one compression family
pub(crate) trait LineSource {
    /// Next line including its terminator, `Ok(None)` once the source is drained
    fn next_line(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Read one line from `reader`.
///
/// When the read fails after some bytes of the line were already produced, those
/// bytes are returned as a line and the failure is parked in `deferred` so the
/// next call reports it. Partial data is never dropped.
pub(crate) fn read_line<B: BufRead>(
    reader: &mut B,
    context: &str,
    deferred: &mut Option<SyncLensError>,
) -> Result<Option<Vec<u8>>> {
    if let Some(err) = deferred.take() {
        return Err(err);
    }

    let mut line = Vec::new();
    match reader.read_until(b'\n', &mut line) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(line)),
        Err(e) => {
            let err = SyncLensError::from_decode_io(e, context);
            if line.is_empty() {
                Err(err)
            } else {
                *deferred = Some(err);
                Ok(Some(line))
            }
        }
    }
}

/// Lines of a single (possibly compressed) stream
struct StreamLines<B> {
    reader: B,
    context: &'static str,
    deferred: Option<SyncLensError>,
}

impl<B: BufRead> StreamLines<B> {
    fn new(reader: B, context: &'static str) -> Self {
        Self { reader, context, deferred: None }
    }
}

impl<B: BufRead> LineSource for StreamLines<B> {
    fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        read_line(&mut self.reader, self.context, &mut self.deferred)
    }
}

enum SequenceState<'a> {
    Active(Box<dyn LineSource + 'a>),
    Exhausted,
}

/// Lazy, single-pass sequence of decoded lines.
///
/// The sequence borrows the byte source it decodes; it never closes it. Once it
/// returns `None` or an error it is exhausted and yields nothing more. Decoding
/// the same source again means calling [`decode`] again.
pub struct LineSequence<'a> {
    state: SequenceState<'a>,
    kind: CompressionKind,
    lines: u64,
    bytes: u64,
}

impl<'a> LineSequence<'a> {
    fn new(source: Box<dyn LineSource + 'a>, kind: CompressionKind) -> Self {
        Self {
            state: SequenceState::Active(source),
            kind,
            lines: 0,
            bytes: 0,
        }
    }

    pub fn kind(&self) -> CompressionKind {
        self.kind
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, SequenceState::Exhausted)
    }

    /// Number of lines yielded so far
    pub fn lines_yielded(&self) -> u64 {
        self.lines
    }

    /// Number of decompressed bytes yielded so far
    pub fn bytes_yielded(&self) -> u64 {
        self.bytes
    }
}

impl Iterator for LineSequence<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let SequenceState::Active(source) = &mut self.state else {
            return None;
        };

        match source.next_line() {
            Ok(Some(line)) => {
                self.lines += 1;
                self.bytes += line.len() as u64;
                Some(Ok(line))
            }
            Ok(None) => {
                debug!("{} stream exhausted after {} lines ({} bytes)", self.kind, self.lines, self.bytes);
                self.state = SequenceState::Exhausted;
                None
            }
            Err(e) => {
                self.state = SequenceState::Exhausted;
                Some(Err(e))
            }
        }
    }
}

/// Decode `source` as `kind` into a lazy line sequence.
///
/// The source is rewound to position zero first. Container errors that can be
/// detected up front (an unreadable zip central directory) fail here; everything
/// else surfaces through the sequence as `CorruptArchive` or `TruncatedStream`.
pub fn decode<'a, R>(source: &'a mut R, kind: CompressionKind) -> Result<LineSequence<'a>>
where
    R: Read + Seek + 'a,
{
    source.seek(SeekFrom::Start(0))?;
    info!("Decoding {} stream", kind);

    let lines: Box<dyn LineSource + 'a> = match kind {
        CompressionKind::None => Box::new(StreamLines::new(BufReader::new(source), "plain")),
        CompressionKind::Gzip => {
            Box::new(StreamLines::new(BufReader::new(MultiGzDecoder::new(source)), "gzip"))
        }
        CompressionKind::Bzip2 => Box::new(Bzip2Lines::new(source)),
        CompressionKind::Zip => Box::new(ZipLines::open(source)?),
        CompressionKind::TarGzip => Box::new(TarLines::new(MultiGzDecoder::new(source), "tar+gzip")),
        CompressionKind::TarBzip2 => {
            Box::new(TarLines::new(bzip2::read::MultiBzDecoder::new(source), "tar+bzip2"))
        }
    };

    Ok(LineSequence::new(lines, kind))
}
