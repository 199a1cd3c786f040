use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

use crate::error::Result;
use crate::output::OutputSet;

pub const ARCHIVE_MIME: &str = "application/zip";

/// `<stem>_split_files.zip`
pub fn archive_file_name(stem: &str) -> String {
    format!("{stem}_split_files.zip")
}

/// Pack every output file at the root of a deflate ZIP, in output order.
pub fn build_archive(outputs: &OutputSet) -> Result<Vec<u8>> {
    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    for file in outputs {
        zip.start_file(file.file_name.as_str(), options)?;
        zip.write_all(&file.bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}
