// Module for turning uploaded log archives into line streams
pub mod format;
pub mod decoder;
pub mod upload;
mod bzip2_lines;
mod tar_lines;
mod zip_lines;

pub use format::{CompressionKind, detect, is_compressed_content_type};
pub use decoder::{LineSequence, decode};
pub use upload::UploadPolicy;
