use tracing::warn;

use crate::ingest::format::{CompressionKind, detect, file_extension};
use crate::{Result, SyncLensError};

/// Extensions accepted at the upload boundary
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".log", ".json", ".out", ".gz", ".zip", ".bz2", ".tar.gz", ".tgz", ".tar.bz2",
];

/// Checks applied to an upload before any byte of it is decoded
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_size: u64,
}

impl UploadPolicy {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    /// Validate size and name, then work out how the upload must be decoded
    pub fn check(&self, filename: Option<&str>, content_type: &str, size: u64) -> Result<CompressionKind> {
        if size > self.max_file_size {
            warn!("Rejected upload of {} bytes (limit {})", size, self.max_file_size);
            return Err(SyncLensError::PayloadTooLarge { size, limit: self.max_file_size });
        }

        let filename = filename.unwrap_or_default();
        if !filename.is_empty() {
            let ext = file_extension(filename);
            if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
                warn!("Rejected upload {} with extension {:?}", filename, ext);
                return Err(SyncLensError::UnsupportedContentType(format!(
                    "{content_type} (file extension {ext:?} is not accepted)"
                )));
            }
        }

        detect(filename, content_type)
    }
}
