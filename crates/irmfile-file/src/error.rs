use irmfile_crypto::CryptoError;
use irmfile_opc::OpcError;
use irmfile_pdf::PdfError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Opc(#[from] OpcError),
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("invalid argument: {context}")]
    InvalidArgument { context: &'static str },
}
