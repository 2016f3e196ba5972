use std::io::{Cursor, Write};

use bzip2::write::BzEncoder;
use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, EntryType, Header};
use zip::write::SimpleFileOptions;

/// Log lines shaped like the progress records the parser consumes
#[allow(dead_code)]
pub const SAMPLE_LOG: &[u8] = b"{\"time\":\"2024-05-01T10:00:00Z\",\"message\":\"Replication progress\",\"phase\":\"collection copy\"}\n\
{\"time\":\"2024-05-01T10:00:10Z\",\"message\":\"Replication progress\",\"phase\":\"change event application\"}\n\
{\"time\":\"2024-05-01T10:00:20Z\",\"message\":\"Operation duration stats\",\"lagTimeSeconds\":3}";

/// Split `data` into lines the way the decoder does: terminators kept, last line may lack one
#[allow(dead_code)]
pub fn expected_lines(data: &[u8]) -> Vec<Vec<u8>> {
    data.split_inclusive(|&b| b == b'\n').map(<[u8]>::to_vec).collect()
}

#[allow(dead_code)]
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[allow(dead_code)]
pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Zip archive with the given (name, contents) members; names ending in '/' become directories
#[allow(dead_code)]
pub fn zip(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in members {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Uncompressed tar with the given (name, contents) members; names ending in '/' become directories
#[allow(dead_code)]
pub fn tar(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (name, data) in members {
        let mut header = Header::new_gnu();
        if name.ends_with('/') {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
        } else {
            header.set_mode(0o644);
        }
        header.set_size(data.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, *name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}
