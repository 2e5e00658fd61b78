use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpcError {
    /// The archive is valid but does not contain the requested entry.
    #[error("zip entry not found: {path}")]
    EntryNotFound { path: String },
    /// The input is not a readable ZIP archive.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The custom-properties part is not well-formed XML.
    #[error("corrupt custom-properties xml: {0}")]
    CorruptXml(#[from] quick_xml::Error),
    #[error("corrupt custom-properties xml: {context}")]
    InvalidDocument { context: &'static str },
}
