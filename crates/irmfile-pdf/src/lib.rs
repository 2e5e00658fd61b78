//! PDF rights protection: the IRM unencrypted wrapper and the per-object
//! crypto/security handlers driven by a PDF object model.
//!
//! Protect wraps the encrypted inner document (produced object-by-object
//! through [`CryptoHandler`]) in an outer plaintext PDF built by
//! [`WrapperCreator`]; unprotect validates the wrapper with [`WrapperDoc`],
//! gates on the owner right via [`SecurityHandler`], and reassembles the
//! plaintext. The object model itself is an external collaborator reached
//! through the traits in [`object_model`].

mod crypto_handler;
mod error;
pub mod object_model;
mod protector;
mod security_handler;
mod wrapper;

pub use crypto_handler::{CryptoHandler, MIN_RAW_SIZE};
pub use error::PdfError;
pub use object_model::{
    ensure_module_initialized, PdfCryptoHandler, PdfObjectModel, PdfSecurityHandler,
};
pub use protector::PdfProtector;
pub use security_handler::SecurityHandler;
pub use wrapper::{
    WrapperCreator, WrapperDoc, WrapperType, PDF_PROTECTOR_FILTER_NAME,
    PDF_PROTECTOR_WRAPPER_DES, PDF_PROTECTOR_WRAPPER_FILENAME, PDF_PROTECTOR_WRAPPER_SUBTYPE,
    PDF_PROTECTOR_WRAPPER_VERSION,
};
