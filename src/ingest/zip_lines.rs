use crc32fast::Hasher;
use flate2::read::DeflateDecoder;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Take};
use tracing::{debug, info};
use zip::{CompressionMethod, ZipArchive};

use crate::ingest::decoder::{LineSource, read_line};
use crate::{Result, SyncLensError};

#[derive(Debug, Clone, Copy)]
enum EntryCodec {
    Stored,
    Deflated,
}

/// Where a member's data lives in the archive, taken from the central directory
#[derive(Debug, Clone)]
struct EntryPlan {
    name: String,
    data_start: u64,
    compressed_size: u64,
    crc32: u32,
    codec: EntryCodec,
}

/// Body of the member currently being read; owns the borrowed source until the member ends
enum EntryBody<'a, R> {
    Stored(Take<&'a mut R>),
    Deflated(DeflateDecoder<Take<&'a mut R>>),
}

impl<'a, R: Read> EntryBody<'a, R> {
    fn into_source(self) -> &'a mut R {
        match self {
            EntryBody::Stored(take) => take.into_inner(),
            EntryBody::Deflated(decoder) => decoder.into_inner().into_inner(),
        }
    }
}

impl<R: Read> Read for EntryBody<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryBody::Stored(take) => take.read(buf),
            EntryBody::Deflated(decoder) => decoder.read(buf),
        }
    }
}

/// Member body that checksums the decompressed bytes as they are read
struct CheckedBody<'a, R> {
    body: EntryBody<'a, R>,
    hasher: Hasher,
    name: String,
    expected_crc: u32,
}

impl<R: Read> Read for CheckedBody<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.body.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Lines of every file member of a zip archive, concatenated in central directory order.
///
/// The central directory is read once up front to plan the members; each member is
/// then decoded directly from the source, so no member is ever buffered whole.
pub(crate) struct ZipLines<'a, R> {
    idle: Option<&'a mut R>,
    current: Option<BufReader<CheckedBody<'a, R>>>,
    plan: std::vec::IntoIter<EntryPlan>,
    deferred: Option<SyncLensError>,
}

impl<'a, R: Read + Seek> ZipLines<'a, R> {
    pub(crate) fn open(source: &'a mut R) -> Result<Self> {
        let plan = plan_entries(&mut *source)?;
        Ok(Self {
            idle: Some(source),
            current: None,
            plan: plan.into_iter(),
            deferred: None,
        })
    }

    /// Position the source at the next member and start decoding it
    fn open_next(&mut self) -> Result<bool> {
        let Some(entry) = self.plan.next() else {
            return Ok(false);
        };
        let Some(source) = self.idle.take() else {
            return Ok(false);
        };

        info!("Processing file from ZIP: {}", entry.name);
        source.seek(SeekFrom::Start(entry.data_start))?;
        let body = source.take(entry.compressed_size);
        let body = match entry.codec {
            EntryCodec::Stored => EntryBody::Stored(body),
            EntryCodec::Deflated => EntryBody::Deflated(DeflateDecoder::new(body)),
        };
        self.current = Some(BufReader::new(CheckedBody {
            body,
            hasher: Hasher::new(),
            name: entry.name,
            expected_crc: entry.crc32,
        }));
        Ok(true)
    }

    /// Hand the source back from the finished member and verify its checksum
    fn close_current(&mut self) -> Result<()> {
        let Some(reader) = self.current.take() else {
            return Ok(());
        };
        let CheckedBody { body, hasher, name, expected_crc } = reader.into_inner();
        self.idle = Some(body.into_source());

        let actual = hasher.finalize();
        if actual != expected_crc {
            return Err(SyncLensError::CorruptArchive(format!(
                "zip entry {name}: CRC mismatch (expected {expected_crc:08x}, computed {actual:08x})"
            )));
        }
        Ok(())
    }
}

impl<R: Read + Seek> LineSource for ZipLines<'_, R> {
    fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match read_line(reader, "zip", &mut self.deferred)? {
                    Some(line) => return Ok(Some(line)),
                    None => self.close_current()?,
                }
            }
            if !self.open_next()? {
                return Ok(None);
            }
        }
    }
}

fn plan_entries<R: Read + Seek>(source: R) -> Result<Vec<EntryPlan>> {
    let mut archive = ZipArchive::new(source)
        .map_err(|e| SyncLensError::CorruptArchive(format!("zip: {e}")))?;

    let mut plan = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| SyncLensError::CorruptArchive(format!("zip entry {index}: {e}")))?;

        if entry.is_dir() {
            debug!("Skipping directory entry {}", entry.name());
            continue;
        }

        let codec = match entry.compression() {
            CompressionMethod::Stored => EntryCodec::Stored,
            CompressionMethod::Deflated => EntryCodec::Deflated,
            other => {
                return Err(SyncLensError::CorruptArchive(format!(
                    "zip entry {} uses unsupported compression method {other:?}",
                    entry.name()
                )));
            }
        };

        plan.push(EntryPlan {
            name: entry.name().to_string(),
            data_start: entry.data_start(),
            compressed_size: entry.compressed_size(),
            crc32: entry.crc32(),
            codec,
        });
    }

    let names: Vec<&str> = plan.iter().map(|e| e.name.as_str()).collect();
    info!("ZIP archive contains {} file(s): {:?}", plan.len(), names);
    Ok(plan)
}
