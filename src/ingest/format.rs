use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::{Result, SyncLensError};

/// Container/codec combination of an uploaded log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionKind {
    /// Plain, uncompressed lines
    None,
    Gzip,
    Bzip2,
    Zip,
    TarGzip,
    TarBzip2,
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionKind::None => "none",
            CompressionKind::Gzip => "gzip",
            CompressionKind::Bzip2 => "bzip2",
            CompressionKind::Zip => "zip",
            CompressionKind::TarGzip => "tar+gzip",
            CompressionKind::TarBzip2 => "tar+bzip2",
        };
        f.write_str(name)
    }
}

const GZIP_CONTENT_TYPES: &[&str] = &["application/gzip", "application/x-gzip"];
const ZIP_CONTENT_TYPES: &[&str] = &["application/zip", "application/x-zip-compressed"];
const BZIP2_CONTENT_TYPES: &[&str] = &["application/x-bzip2"];
const TAR_CONTENT_TYPES: &[&str] = &["application/x-tar"];
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";
const PLAIN_CONTENT_TYPES: &[&str] = &["application/x-ndjson", "application/json", "text/plain"];

/// Suffixes whose meaning does not depend on the declared content type
const COMPOUND_SUFFIXES: &[(&str, CompressionKind)] = &[
    (".tar.gz", CompressionKind::TarGzip),
    (".tgz", CompressionKind::TarGzip),
    (".tar.bz2", CompressionKind::TarBzip2),
];

const SIMPLE_SUFFIXES: &[(&str, CompressionKind)] = &[
    (".gz", CompressionKind::Gzip),
    (".zip", CompressionKind::Zip),
    (".bz2", CompressionKind::Bzip2),
];

/// Lower-cased content type without parameters ("application/gzip; charset=binary" -> "application/gzip")
fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// File extension of `filename`, treating `.tar.gz`, `.tgz` and `.tar.bz2` as a single extension
pub fn file_extension(filename: &str) -> String {
    let lower = filename.to_ascii_lowercase();
    for (suffix, _) in COMPOUND_SUFFIXES {
        if lower.ends_with(suffix) {
            return (*suffix).to_string();
        }
    }
    Path::new(&lower)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

fn compound_kind(filename: &str) -> Option<CompressionKind> {
    let lower = filename.to_ascii_lowercase();
    COMPOUND_SUFFIXES
        .iter()
        .find(|(suffix, _)| lower.ends_with(suffix))
        .map(|(_, kind)| *kind)
}

fn simple_kind(filename: &str) -> Option<CompressionKind> {
    let lower = filename.to_ascii_lowercase();
    SIMPLE_SUFFIXES
        .iter()
        .find(|(suffix, _)| lower.ends_with(suffix))
        .map(|(_, kind)| *kind)
}

/// Map a filename and declared content type to a compression kind.
///
/// Compound tar suffixes win over the content type, because browsers and proxies
/// report tar archives inconsistently. Known archive content types decide the
/// single-file cases. The generic binary content type falls back to the simple
/// suffix (`.gz`, `.zip`, `.bz2`).
pub fn detect(filename: &str, declared_content_type: &str) -> Result<CompressionKind> {
    let content_type = normalize_content_type(declared_content_type);

    if let Some(kind) = compound_kind(filename) {
        debug!("Detected {} from compound suffix of {}", kind, filename);
        return Ok(kind);
    }

    let kind = if GZIP_CONTENT_TYPES.contains(&content_type.as_str()) {
        CompressionKind::Gzip
    } else if ZIP_CONTENT_TYPES.contains(&content_type.as_str()) {
        CompressionKind::Zip
    } else if BZIP2_CONTENT_TYPES.contains(&content_type.as_str()) {
        CompressionKind::Bzip2
    } else if TAR_CONTENT_TYPES.contains(&content_type.as_str()) {
        // Plain x-tar is almost always a gzipped tarball with an unhelpful name
        CompressionKind::TarGzip
    } else if PLAIN_CONTENT_TYPES.contains(&content_type.as_str()) {
        CompressionKind::None
    } else if content_type == BINARY_CONTENT_TYPE {
        simple_kind(filename)
            .ok_or_else(|| SyncLensError::UnknownFormat(file_extension(filename)))?
    } else {
        return Err(SyncLensError::UnsupportedContentType(declared_content_type.to_string()));
    };

    debug!("Detected {} for {} ({})", kind, filename, content_type);
    Ok(kind)
}

/// Whether uploads with this content type go through decompression at all
pub fn is_compressed_content_type(content_type: &str) -> bool {
    let content_type = normalize_content_type(content_type);
    let ct = content_type.as_str();
    GZIP_CONTENT_TYPES.contains(&ct)
        || ZIP_CONTENT_TYPES.contains(&ct)
        || BZIP2_CONTENT_TYPES.contains(&ct)
        || TAR_CONTENT_TYPES.contains(&ct)
        || ct == BINARY_CONTENT_TYPE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_suffix_wins() {
        assert_eq!(detect("report.tar.gz", "application/octet-stream").unwrap(), CompressionKind::TarGzip);
        assert_eq!(detect("report.tar.gz", "application/gzip").unwrap(), CompressionKind::TarGzip);
        assert_eq!(detect("report.TGZ", "application/zip").unwrap(), CompressionKind::TarGzip);
        assert_eq!(detect("logs.tar.bz2", "application/x-bzip2").unwrap(), CompressionKind::TarBzip2);
        assert_eq!(detect("logs.tar.bz2", "text/html").unwrap(), CompressionKind::TarBzip2);
    }

    #[test]
    fn test_content_type_decides_single_file() {
        assert_eq!(detect("mongosync.log.gz", "application/x-gzip").unwrap(), CompressionKind::Gzip);
        // The content type wins over a misleading simple suffix
        assert_eq!(detect("mongosync.zip", "application/gzip").unwrap(), CompressionKind::Gzip);
        assert_eq!(detect("logs", "application/x-zip-compressed").unwrap(), CompressionKind::Zip);
        assert_eq!(detect("logs", "application/x-bzip2").unwrap(), CompressionKind::Bzip2);
        assert_eq!(detect("logs.tar", "application/x-tar").unwrap(), CompressionKind::TarGzip);
        assert_eq!(detect("logs.gz", "Application/GZIP; charset=binary").unwrap(), CompressionKind::Gzip);
    }

    #[test]
    fn test_octet_stream_falls_back_to_suffix() {
        assert_eq!(detect("a.gz", "application/octet-stream").unwrap(), CompressionKind::Gzip);
        assert_eq!(detect("a.ZIP", "application/octet-stream").unwrap(), CompressionKind::Zip);
        assert_eq!(detect("a.bz2", "application/octet-stream").unwrap(), CompressionKind::Bzip2);

        match detect("data.bin", "application/octet-stream") {
            Err(SyncLensError::UnknownFormat(ext)) => assert_eq!(ext, ".bin"),
            other => panic!("expected UnknownFormat, got {other:?}"),
        }
        assert!(matches!(detect("noext", "application/octet-stream"), Err(SyncLensError::UnknownFormat(_))));
    }

    #[test]
    fn test_plain_and_unsupported() {
        assert_eq!(detect("mongosync.log", "application/x-ndjson").unwrap(), CompressionKind::None);
        assert!(matches!(detect("a.gz", "image/png"), Err(SyncLensError::UnsupportedContentType(_))));
        assert!(matches!(detect("", ""), Err(SyncLensError::UnsupportedContentType(_))));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("a.TAR.GZ"), ".tar.gz");
        assert_eq!(file_extension("a.tgz"), ".tgz");
        assert_eq!(file_extension("mongosync.log"), ".log");
        assert_eq!(file_extension("a.b.gz"), ".gz");
        assert_eq!(file_extension("README"), "");
    }

    #[test]
    fn test_is_compressed_content_type() {
        assert!(is_compressed_content_type("application/gzip"));
        assert!(is_compressed_content_type("application/octet-stream"));
        assert!(!is_compressed_content_type("application/x-ndjson"));
    }
}
