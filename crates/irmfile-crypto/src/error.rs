use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The underlying cipher rejected the operation.
    #[error("cipher failure: {context}")]
    CipherFailure { context: &'static str },
    /// The backing store accepted fewer bytes than requested. The stream must
    /// be discarded; the cached block may no longer match the store.
    #[error("backing store wrote {written} of {requested} bytes at offset {offset}")]
    ShortWrite {
        requested: usize,
        written: usize,
        offset: u64,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated publishing license while reading {context}")]
    TruncatedLicense { context: &'static str },
    #[error("invalid publishing license: {context}")]
    InvalidLicense { context: &'static str },
    #[error("operation cancelled")]
    Cancelled,
}
