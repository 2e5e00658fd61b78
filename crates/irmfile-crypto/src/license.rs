//! Binary layout of the publishing license issued by the local policy
//! service.
//!
//! The license is opaque to every other component; protectors embed and
//! extract it verbatim. Layout (all integers little-endian):
//!
//! ```text
//! magic[8] version:u16 mode:u8 flags:u8 key[16] iv_salt[16]
//! owner_len:u16 owner[owner_len]
//! ```

use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::provider::CipherMode;

const LICENSE_MAGIC: [u8; 8] = *b"IRMFLIC\0";
const LICENSE_VERSION: u16 = 1;

const FLAG_ALLOW_AUDITED_EXTRACTION: u8 = 0x01;

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], CryptoError> {
        let end = self.pos.saturating_add(n);
        if end > self.bytes.len() {
            return Err(CryptoError::TruncatedLicense { context });
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self, context: &'static str) -> Result<u8, CryptoError> {
        Ok(self.take(1, context)?[0])
    }

    fn read_u16_le(&mut self, context: &'static str) -> Result<u16, CryptoError> {
        let b = self.take(2, context)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }
}

/// Decoded form of the local publishing license.
#[derive(Debug)]
pub struct PublishingLicense {
    pub mode: CipherMode,
    pub allow_audited_extraction: bool,
    pub key: Zeroizing<[u8; 16]>,
    pub iv_salt: [u8; 16],
    pub owner: String,
}

impl PublishingLicense {
    pub fn parse(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut r = Reader::new(bytes);

        if r.take(8, "magic")? != LICENSE_MAGIC {
            return Err(CryptoError::InvalidLicense {
                context: "bad magic",
            });
        }
        let version = r.read_u16_le("version")?;
        if version != LICENSE_VERSION {
            return Err(CryptoError::InvalidLicense {
                context: "unsupported version",
            });
        }
        let mode = match r.read_u8("mode")? {
            0 => CipherMode::Aes128Ecb,
            1 => CipherMode::Aes128Cbc512,
            2 => CipherMode::Aes128Cbc4k,
            _ => {
                return Err(CryptoError::InvalidLicense {
                    context: "unknown cipher mode",
                })
            }
        };
        let flags = r.read_u8("flags")?;

        let mut key = Zeroizing::new([0u8; 16]);
        key.copy_from_slice(r.take(16, "content key")?);
        let mut iv_salt = [0u8; 16];
        iv_salt.copy_from_slice(r.take(16, "iv salt")?);

        let owner_len = r.read_u16_le("owner length")? as usize;
        let owner_bytes = r.take(owner_len, "owner")?;
        let owner = std::str::from_utf8(owner_bytes)
            .map_err(|_| CryptoError::InvalidLicense {
                context: "owner is not UTF-8",
            })?
            .to_string();

        Ok(Self {
            mode,
            allow_audited_extraction: flags & FLAG_ALLOW_AUDITED_EXTRACTION != 0,
            key,
            iv_salt,
            owner,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let owner = self.owner.as_bytes();
        let mut out = Vec::with_capacity(8 + 2 + 2 + 32 + 2 + owner.len());
        out.extend_from_slice(&LICENSE_MAGIC);
        out.extend_from_slice(&LICENSE_VERSION.to_le_bytes());
        out.push(match self.mode {
            CipherMode::Aes128Ecb => 0,
            CipherMode::Aes128Cbc512 => 1,
            CipherMode::Aes128Cbc4k => 2,
        });
        let mut flags = 0u8;
        if self.allow_audited_extraction {
            flags |= FLAG_ALLOW_AUDITED_EXTRACTION;
        }
        out.push(flags);
        out.extend_from_slice(self.key.as_slice());
        out.extend_from_slice(&self.iv_salt);
        out.extend_from_slice(&(owner.len() as u16).to_le_bytes());
        out.extend_from_slice(owner);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PublishingLicense {
        PublishingLicense {
            mode: CipherMode::Aes128Cbc4k,
            allow_audited_extraction: true,
            key: Zeroizing::new([0x11; 16]),
            iv_salt: [0x22; 16],
            owner: "alice@contoso.com".to_string(),
        }
    }

    #[test]
    fn roundtrip() {
        let bytes = sample().to_bytes();
        let parsed = PublishingLicense::parse(&bytes).expect("parse");
        assert_eq!(parsed.mode, CipherMode::Aes128Cbc4k);
        assert!(parsed.allow_audited_extraction);
        assert_eq!(parsed.key.as_slice(), &[0x11; 16]);
        assert_eq!(parsed.iv_salt, [0x22; 16]);
        assert_eq!(parsed.owner, "alice@contoso.com");
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[0] ^= 0xFF;
        let err = PublishingLicense::parse(&bytes).expect_err("bad magic");
        assert!(matches!(err, CryptoError::InvalidLicense { .. }));
    }

    #[test]
    fn truncation_names_the_field() {
        let bytes = sample().to_bytes();
        let err = PublishingLicense::parse(&bytes[..20]).expect_err("truncated");
        match err {
            CryptoError::TruncatedLicense { context } => assert_eq!(context, "content key"),
            other => panic!("expected TruncatedLicense, got {other:?}"),
        }
    }
}
