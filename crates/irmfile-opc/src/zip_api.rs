use std::io::{Cursor, Read, Write};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::OpcError;

/// Entry-level access to an OPC (ZIP) container.
///
/// Distinguishes "the input is not a ZIP" from "the archive lacks the entry";
/// callers rely on the split to classify documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipApi;

impl ZipApi {
    pub fn new() -> Self {
        Self
    }

    /// Extract one entry by exact name.
    pub fn get_entry(&self, bytes: &[u8], path: &str) -> Result<Vec<u8>, OpcError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut file = match archive.by_name(path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(OpcError::EntryNotFound {
                    path: path.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Rewrite the archive with `path` replaced by (or appended as)
    /// `content`. Every other entry is copied raw, preserving names, order,
    /// and compressed bytes.
    pub fn set_entry(&self, bytes: &[u8], path: &str, content: &[u8]) -> Result<Vec<u8>, OpcError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut replaced = false;
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            if entry.name() == path {
                drop(entry);
                writer.start_file(path, options)?;
                writer.write_all(content)?;
                replaced = true;
            } else {
                writer.raw_copy_file(entry)?;
            }
        }
        if !replaced {
            writer.start_file(path, options)?;
            writer.write_all(content)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}
