//! Seam to the PDF object model.
//!
//! Traversing and reserializing PDF indirect objects is the job of an
//! external object-model library; this module defines the interfaces it
//! drives during custom-filter encryption. The handlers in this crate
//! implement the two handler traits; hosts supply a [`PdfObjectModel`].

use std::sync::Once;

use crate::error::PdfError;

static MODULE_INIT: Once = Once::new();

/// One-time process-wide initialization.
///
/// Wrapper and protector entry points call this lazily; hosts embedding an
/// object-model library that needs eager setup may call it at startup.
pub fn ensure_module_initialized() {
    MODULE_INIT.call_once(|| {
        log::debug!("pdf module initialized");
    });
}

/// Per-object encrypt/decrypt callbacks invoked while the object model walks
/// a document.
///
/// One-shot calls carry a whole object; the progressive calls stream large
/// objects. For a single object the progressive sequence is strictly
/// `progressive_encrypt_start` then one or more `progressive_encrypt_content`
/// then `progressive_encrypt_finish`; the handler may be reused for the next
/// object afterwards.
pub trait PdfCryptoHandler {
    /// Size of the buffer `decrypt_finish` may emit for `src_size` bytes of
    /// ciphertext.
    fn decrypt_get_size(&self, src_size: u32) -> u32;
    fn decrypt_start(&mut self, obj_num: u32, gen_num: u32) -> Result<(), PdfError>;
    fn decrypt_stream(&mut self, src: &[u8]) -> Result<(), PdfError>;
    fn decrypt_finish(&mut self, dest: &mut Vec<u8>) -> Result<(), PdfError>;

    /// Upper bound for the ciphertext of a `src_size`-byte object.
    fn encrypt_get_size(&self, obj_num: u32, version: u32, src_size: u32) -> u32;
    fn encrypt_content(
        &mut self,
        obj_num: u32,
        version: u32,
        src: &[u8],
        dest: &mut Vec<u8>,
    ) -> Result<(), PdfError>;

    /// Returns `false` when the object is too small for the progressive
    /// path; the object model falls back to `encrypt_content`.
    fn progressive_encrypt_start(
        &mut self,
        obj_num: u32,
        version: u32,
        raw_size: u32,
    ) -> Result<bool, PdfError>;
    fn progressive_encrypt_content(
        &mut self,
        obj_num: u32,
        version: u32,
        src: &[u8],
    ) -> Result<(), PdfError>;
    fn progressive_encrypt_finish(&mut self, dest: &mut Vec<u8>) -> Result<(), PdfError>;
}

/// Rights gate consulted by the object model before it decrypts anything.
pub trait PdfSecurityHandler {
    /// Called with the publishing license found in the document's encryption
    /// dictionary. Fails unless the current user may unprotect.
    fn on_init(&mut self, publishing_license: &[u8]) -> Result<(), PdfError>;

    /// The crypto handler bound to the policy acquired by `on_init`.
    fn crypto_handler(&mut self) -> Result<&mut dyn PdfCryptoHandler, PdfError>;
}

/// External PDF object model: walks objects, delegating byte transformation
/// to the handlers.
pub trait PdfObjectModel {
    /// Reserialize `input` with every object's bytes passed through
    /// `handler`, naming `filter_name` and embedding `publishing_license` in
    /// the encryption dictionary.
    fn create_custom_encrypted_file(
        &mut self,
        input: &[u8],
        filter_name: &str,
        publishing_license: &[u8],
        handler: &mut dyn PdfCryptoHandler,
        output: &mut Vec<u8>,
    ) -> Result<(), PdfError>;

    /// Reverse of `create_custom_encrypted_file`: initializes `security`
    /// with the embedded license, then reassembles the plaintext document.
    fn unprotect_custom_encrypted_file(
        &mut self,
        input: &[u8],
        filter_name: &str,
        security: &mut dyn PdfSecurityHandler,
        output: &mut Vec<u8>,
    ) -> Result<(), PdfError>;
}
