use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// The AES block size; every ciphertext this crate produces is padded to it.
pub const AES_BLOCK_LEN: usize = 16;

/// Cipher configuration carried by a [`CryptoProvider`].
///
/// The CBC variants are named for the protected-stream block they operate on;
/// ECB keeps the native AES block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Aes128Ecb,
    Aes128Cbc512,
    Aes128Cbc4k,
}

impl CipherMode {
    pub fn block_size(self) -> usize {
        match self {
            CipherMode::Aes128Ecb => AES_BLOCK_LEN,
            CipherMode::Aes128Cbc512 => 512,
            CipherMode::Aes128Cbc4k => 4096,
        }
    }

    /// ECB is kept only for compatibility with documents protected by older
    /// clients.
    pub fn uses_deprecated_algorithms(self) -> bool {
        matches!(self, CipherMode::Aes128Ecb)
    }
}

/// Symmetric block crypto bound to one content key.
///
/// `encrypt_block`/`decrypt_block` operate on one protected-stream block; the
/// CBC modes derive a per-block IV from the salt and the block number, so
/// blocks can be processed independently and in any order.
#[derive(Clone)]
pub struct CryptoProvider {
    mode: CipherMode,
    key: Zeroizing<[u8; 16]>,
    iv_salt: [u8; 16],
}

impl CryptoProvider {
    pub fn new(mode: CipherMode, key: [u8; 16], iv_salt: [u8; 16]) -> Self {
        Self {
            mode,
            key: Zeroizing::new(key),
            iv_salt,
        }
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    pub fn block_size(&self) -> usize {
        self.mode.block_size()
    }

    pub(crate) fn key_bytes(&self) -> &[u8; 16] {
        &self.key
    }

    pub(crate) fn iv_salt(&self) -> &[u8; 16] {
        &self.iv_salt
    }

    fn derive_block_iv(&self, block_number: u64) -> [u8; 16] {
        let mut hasher = Sha256::new();
        hasher.update(self.iv_salt);
        hasher.update(block_number.to_le_bytes());
        let digest = hasher.finalize();
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&digest[..16]);
        iv
    }

    /// Encrypt one protected-stream block in place. `buf` must be a multiple
    /// of [`AES_BLOCK_LEN`].
    pub fn encrypt_block(&self, block_number: u64, buf: &mut [u8]) -> Result<(), CryptoError> {
        if buf.len() % AES_BLOCK_LEN != 0 {
            return Err(CryptoError::CipherFailure {
                context: "plaintext length not a multiple of the AES block",
            });
        }
        if buf.is_empty() {
            return Ok(());
        }
        match self.mode {
            CipherMode::Aes128Ecb => {
                let cipher = Aes128::new_from_slice(self.key.as_slice()).map_err(|_| {
                    CryptoError::CipherFailure {
                        context: "invalid AES key",
                    }
                })?;
                for block in buf.chunks_mut(AES_BLOCK_LEN) {
                    cipher.encrypt_block(GenericArray::from_mut_slice(block));
                }
            }
            CipherMode::Aes128Cbc512 | CipherMode::Aes128Cbc4k => {
                let iv = self.derive_block_iv(block_number);
                let len = buf.len();
                let enc = Encryptor::<Aes128>::new_from_slices(self.key.as_slice(), &iv)
                    .map_err(|_| CryptoError::CipherFailure {
                        context: "invalid AES-CBC key/iv",
                    })?;
                enc.encrypt_padded_mut::<NoPadding>(buf, len).map_err(|_| {
                    CryptoError::CipherFailure {
                        context: "AES-CBC encrypt failed",
                    }
                })?;
            }
        }
        Ok(())
    }

    /// Decrypt one protected-stream block in place. `buf` must be a multiple
    /// of [`AES_BLOCK_LEN`].
    pub fn decrypt_block(&self, block_number: u64, buf: &mut [u8]) -> Result<(), CryptoError> {
        if buf.len() % AES_BLOCK_LEN != 0 {
            return Err(CryptoError::CipherFailure {
                context: "ciphertext length not a multiple of the AES block",
            });
        }
        if buf.is_empty() {
            return Ok(());
        }
        match self.mode {
            CipherMode::Aes128Ecb => {
                let cipher = Aes128::new_from_slice(self.key.as_slice()).map_err(|_| {
                    CryptoError::CipherFailure {
                        context: "invalid AES key",
                    }
                })?;
                for block in buf.chunks_mut(AES_BLOCK_LEN) {
                    cipher.decrypt_block(GenericArray::from_mut_slice(block));
                }
            }
            CipherMode::Aes128Cbc512 | CipherMode::Aes128Cbc4k => {
                let iv = self.derive_block_iv(block_number);
                let dec = Decryptor::<Aes128>::new_from_slices(self.key.as_slice(), &iv)
                    .map_err(|_| CryptoError::CipherFailure {
                        context: "invalid AES-CBC key/iv",
                    })?;
                dec.decrypt_padded_mut::<NoPadding>(buf).map_err(|_| {
                    CryptoError::CipherFailure {
                        context: "AES-CBC decrypt failed",
                    }
                })?;
            }
        }
        Ok(())
    }
}
