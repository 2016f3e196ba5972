pub mod cache;
pub mod config;
pub mod ingest;
pub mod session;

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncLensError {
    #[error("Cannot determine compression format for file with extension: {0}")]
    UnknownFormat(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Truncated stream: {0}")]
    TruncatedStream(String),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SyncLensError>;

impl SyncLensError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            SyncLensError::UnknownFormat(_) => "UNKNOWN_FORMAT",
            SyncLensError::UnsupportedContentType(_) => "UNSUPPORTED_CONTENT_TYPE",
            SyncLensError::CorruptArchive(_) => "CORRUPT_ARCHIVE",
            SyncLensError::TruncatedStream(_) => "TRUNCATED_STREAM",
            SyncLensError::InvalidConnectionString(_) => "INVALID_CONNECTION_STRING",
            SyncLensError::ConnectFailed(_) => "CONNECT_FAILED",
            SyncLensError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            SyncLensError::InvalidConfig(_) => "INVALID_CONFIG",
            SyncLensError::Io(_) => "IO_ERROR",
        }
    }

    /// Message suitable for showing to the person who submitted the upload or credentials
    pub fn user_message(&self) -> String {
        match self {
            SyncLensError::UnknownFormat(_) | SyncLensError::UnsupportedContentType(_) => format!(
                "{self}. Supported formats: .log, .json, .out, .gz, .zip, .bz2, .tar.gz, .tgz, .tar.bz2"
            ),
            SyncLensError::CorruptArchive(_) | SyncLensError::TruncatedStream(_) => {
                format!("The uploaded file could not be decompressed ({self}). No records were imported.")
            }
            SyncLensError::InvalidConnectionString(_) => {
                format!("{self}. Please check the connection string and try again.")
            }
            SyncLensError::ConnectFailed(_) => {
                format!("{self}. Please verify the cluster is reachable and the credentials are correct.")
            }
            SyncLensError::PayloadTooLarge { limit, .. } => {
                format!("File too large. Maximum size is {:.1} GB.", *limit as f64 / (1024.0 * 1024.0 * 1024.0))
            }
            SyncLensError::InvalidConfig(_) | SyncLensError::Io(_) => self.to_string(),
        }
    }

    /// Classify an I/O failure raised while decoding a compressed stream
    pub(crate) fn from_decode_io(err: io::Error, context: &str) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                SyncLensError::TruncatedStream(format!("{context}: {err}"))
            }
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                SyncLensError::CorruptArchive(format!("{context}: {err}"))
            }
            _ => SyncLensError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_io_classification() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            SyncLensError::from_decode_io(eof, "gzip"),
            SyncLensError::TruncatedStream(_)
        ));

        let bad = io::Error::new(io::ErrorKind::InvalidInput, "corrupt deflate stream");
        assert!(matches!(
            SyncLensError::from_decode_io(bad, "gzip"),
            SyncLensError::CorruptArchive(_)
        ));

        let other = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            SyncLensError::from_decode_io(other, "gzip"),
            SyncLensError::Io(_)
        ));
    }

    #[test]
    fn test_error_codes_and_messages() {
        let err = SyncLensError::PayloadTooLarge { size: 20, limit: 10 * 1024 * 1024 * 1024 };
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");
        assert_eq!(err.user_message(), "File too large. Maximum size is 10.0 GB.");

        let err = SyncLensError::UnknownFormat(".bin".to_string());
        assert_eq!(err.code(), "UNKNOWN_FORMAT");
        assert!(err.user_message().contains(".tar.bz2"));
    }
}
