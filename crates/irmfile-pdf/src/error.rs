use irmfile_crypto::{AcquisitionStatus, CryptoError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    /// The input or output stream is unusable; raised before any crypto
    /// state is allocated.
    #[error("stream invalid")]
    StreamInvalid,
    #[error("file is already protected")]
    AlreadyProtected,
    /// The wrapper tuple (type, subtype, payload size) did not validate.
    #[error("not a valid rights-protected file")]
    NotValidFile,
    #[error("corrupt file: {context}")]
    CorruptFile { context: &'static str },
    #[error("cannot acquire the user policy ({status:?})")]
    CannotAcquirePolicy { status: AcquisitionStatus },
    #[error("only the owner has the right to unprotect the document")]
    RightsError,
    #[error("invalid argument: {context}")]
    InvalidArgument { context: &'static str },
    #[error("operation cancelled")]
    OperationCancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Crypto(CryptoError),
}

impl From<CryptoError> for PdfError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Cancelled => PdfError::OperationCancelled,
            other => PdfError::Crypto(other),
        }
    }
}
