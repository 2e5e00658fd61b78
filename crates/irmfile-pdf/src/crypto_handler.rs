use std::sync::Arc;

use irmfile_crypto::{BlockStream, CancelFlag, MemoryStore, UserPolicy, AES_BLOCK_LEN};

use crate::error::PdfError;
use crate::object_model::PdfCryptoHandler;

/// Objects at or below this raw size take the one-shot path; the object
/// model is told to fall back when `progressive_encrypt_start` declines.
pub const MIN_RAW_SIZE: u32 = 4096;

/// Ciphertext slices are pumped through the protected stream in chunks of
/// this size (a multiple of the AES block).
const PUMP_CHUNK: usize = 4096;

const LENGTH_PREFIX: usize = 4;

enum HandlerState {
    Idle,
    Accumulating {
        obj_num: u32,
        buf: Vec<u8>,
    },
    ProgressiveStarted {
        obj_num: u32,
        raw_size: u32,
    },
    ProgressiveStreaming {
        obj_num: u32,
        store: MemoryStore,
        stream: BlockStream<MemoryStore>,
        written: u64,
    },
}

/// Per-object crypto adapter driven by the PDF object model.
///
/// Every per-object ciphertext is framed as a 4-byte big-endian plaintext
/// length followed by cipher output padded to the AES block. The handler is
/// created once per protect/unprotect and reused across objects; per-object
/// state lives in a tagged variant so out-of-order calls cannot observe a
/// half-built buffer.
pub struct CryptoHandler {
    policy: Arc<UserPolicy>,
    cancel: CancelFlag,
    state: HandlerState,
}

impl CryptoHandler {
    pub fn new(policy: Arc<UserPolicy>, cancel: CancelFlag) -> Self {
        Self {
            policy,
            cancel,
            state: HandlerState::Idle,
        }
    }

    fn new_protected_stream(&self, store: MemoryStore, content_size: u64) -> BlockStream<MemoryStore> {
        BlockStream::new(
            self.policy.crypto_provider().clone(),
            store,
            0,
            content_size,
        )
    }

    /// Write `data` into the stream at `offset` in pump-sized slices.
    fn pump_in(
        &self,
        stream: &mut BlockStream<MemoryStore>,
        data: &[u8],
        mut offset: u64,
    ) -> Result<u64, PdfError> {
        for chunk in data.chunks(PUMP_CHUNK) {
            stream.write(chunk, offset)?;
            offset += chunk.len() as u64;
        }
        Ok(offset)
    }

    /// Read the stream's full plaintext view in pump-sized slices.
    fn pump_out(&self, stream: &mut BlockStream<MemoryStore>) -> Result<Vec<u8>, PdfError> {
        let total = stream.size() as usize;
        let mut out = vec![0u8; total];
        let mut done = 0usize;
        while done < total {
            let n = stream.read(&mut out[done..], done as u64)?;
            if n == 0 {
                return Err(PdfError::CorruptFile {
                    context: "protected stream ended early",
                });
            }
            done += n;
        }
        Ok(out)
    }
}

impl PdfCryptoHandler for CryptoHandler {
    fn decrypt_get_size(&self, src_size: u32) -> u32 {
        src_size
    }

    fn decrypt_start(&mut self, obj_num: u32, _gen_num: u32) -> Result<(), PdfError> {
        self.cancel.check()?;
        if !matches!(self.state, HandlerState::Idle) {
            return Err(PdfError::InvalidArgument {
                context: "decrypt_start while another object is in flight",
            });
        }
        self.state = HandlerState::Accumulating {
            obj_num,
            buf: Vec::new(),
        };
        Ok(())
    }

    fn decrypt_stream(&mut self, src: &[u8]) -> Result<(), PdfError> {
        match &mut self.state {
            HandlerState::Accumulating { buf, .. } => {
                buf.extend_from_slice(src);
                Ok(())
            }
            _ => Err(PdfError::InvalidArgument {
                context: "decrypt_stream before decrypt_start",
            }),
        }
    }

    fn decrypt_finish(&mut self, dest: &mut Vec<u8>) -> Result<(), PdfError> {
        let state = std::mem::replace(&mut self.state, HandlerState::Idle);
        let HandlerState::Accumulating { obj_num, buf } = state else {
            return Err(PdfError::InvalidArgument {
                context: "decrypt_finish before decrypt_start",
            });
        };
        if buf.is_empty() {
            return Ok(());
        }
        log::debug!("decrypting object {obj_num} ({} ciphertext bytes)", buf.len());

        let count = buf.len() as u64;
        let store = MemoryStore::with_bytes(buf);
        let mut stream = self.new_protected_stream(store, count);
        let plaintext = self.pump_out(&mut stream)?;

        if plaintext.len() < LENGTH_PREFIX {
            return Err(PdfError::CorruptFile {
                context: "object ciphertext shorter than its length prefix",
            });
        }
        let declared =
            u32::from_be_bytes([plaintext[0], plaintext[1], plaintext[2], plaintext[3]]) as usize;
        if LENGTH_PREFIX + declared > plaintext.len() {
            return Err(PdfError::CorruptFile {
                context: "object length prefix exceeds ciphertext",
            });
        }
        dest.extend_from_slice(&plaintext[LENGTH_PREFIX..LENGTH_PREFIX + declared]);
        Ok(())
    }

    fn encrypt_get_size(&self, _obj_num: u32, _version: u32, src_size: u32) -> u32 {
        let mut encrypted = src_size + LENGTH_PREFIX as u32;
        encrypted += AES_BLOCK_LEN as u32 - encrypted % AES_BLOCK_LEN as u32;
        encrypted
    }

    fn encrypt_content(
        &mut self,
        _obj_num: u32,
        _version: u32,
        src: &[u8],
        dest: &mut Vec<u8>,
    ) -> Result<(), PdfError> {
        self.cancel.check()?;
        if !matches!(self.state, HandlerState::Idle) {
            return Err(PdfError::InvalidArgument {
                context: "encrypt_content while another object is in flight",
            });
        }

        let mut prefixed = Vec::with_capacity(LENGTH_PREFIX + src.len());
        prefixed.extend_from_slice(&(src.len() as u32).to_be_bytes());
        prefixed.extend_from_slice(src);

        let store = MemoryStore::new();
        let mut stream = self.new_protected_stream(store.clone(), 0);
        self.pump_in(&mut stream, &prefixed, 0)?;
        self.cancel.check()?;
        stream.flush()?;

        dest.extend_from_slice(&store.to_bytes());
        Ok(())
    }

    fn progressive_encrypt_start(
        &mut self,
        obj_num: u32,
        _version: u32,
        raw_size: u32,
    ) -> Result<bool, PdfError> {
        self.cancel.check()?;
        if !matches!(self.state, HandlerState::Idle) {
            return Err(PdfError::InvalidArgument {
                context: "progressive_encrypt_start while another object is in flight",
            });
        }
        if raw_size <= MIN_RAW_SIZE {
            return Ok(false);
        }
        self.state = HandlerState::ProgressiveStarted { obj_num, raw_size };
        Ok(true)
    }

    fn progressive_encrypt_content(
        &mut self,
        obj_num: u32,
        _version: u32,
        src: &[u8],
    ) -> Result<(), PdfError> {
        let state = std::mem::replace(&mut self.state, HandlerState::Idle);
        match state {
            HandlerState::ProgressiveStarted {
                obj_num: started, ..
            }
            | HandlerState::ProgressiveStreaming {
                obj_num: started, ..
            } if started != obj_num => Err(PdfError::InvalidArgument {
                context: "progressive_encrypt_content for a different object",
            }),
            HandlerState::ProgressiveStarted { raw_size, .. } => {
                // First chunk: allocate the pending stream and frame the
                // object with its total raw size.
                let store = MemoryStore::new();
                let mut stream = self.new_protected_stream(store.clone(), 0);
                let mut written = self.pump_in(&mut stream, &raw_size.to_be_bytes(), 0)?;
                written = self.pump_in(&mut stream, src, written)?;
                self.state = HandlerState::ProgressiveStreaming {
                    obj_num,
                    store,
                    stream,
                    written,
                };
                Ok(())
            }
            HandlerState::ProgressiveStreaming {
                obj_num,
                store,
                mut stream,
                written,
            } => {
                let written = self.pump_in(&mut stream, src, written)?;
                self.state = HandlerState::ProgressiveStreaming {
                    obj_num,
                    store,
                    stream,
                    written,
                };
                Ok(())
            }
            HandlerState::Idle | HandlerState::Accumulating { .. } => {
                Err(PdfError::InvalidArgument {
                    context: "progressive_encrypt_content before progressive_encrypt_start",
                })
            }
        }
    }

    fn progressive_encrypt_finish(&mut self, dest: &mut Vec<u8>) -> Result<(), PdfError> {
        let state = std::mem::replace(&mut self.state, HandlerState::Idle);
        let HandlerState::ProgressiveStreaming {
            store, mut stream, ..
        } = state
        else {
            return Err(PdfError::InvalidArgument {
                context: "progressive_encrypt_finish before progressive_encrypt_content",
            });
        };
        self.cancel.check()?;
        stream.flush()?;
        dest.extend_from_slice(&store.to_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irmfile_crypto::CipherMode;

    fn test_policy(mode: CipherMode) -> Arc<UserPolicy> {
        use irmfile_crypto::{
            LocalPolicyService, PolicyService, UserContext, UserPolicyCreationOptions,
        };
        let service = LocalPolicyService::new();
        let options = UserPolicyCreationOptions {
            prefer_deprecated_algorithms: matches!(mode, CipherMode::Aes128Ecb),
            ..Default::default()
        };
        service
            .create_from_template(
                "general",
                &UserContext::new("owner@contoso.com"),
                options,
                &Default::default(),
                &CancelFlag::new(),
            )
            .expect("policy")
    }

    fn handler(mode: CipherMode) -> CryptoHandler {
        CryptoHandler::new(test_policy(mode), CancelFlag::new())
    }

    fn decrypt_one_shot(h: &mut CryptoHandler, obj: u32, ciphertext: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        h.decrypt_start(obj, 0).expect("start");
        for chunk in ciphertext.chunks(1000) {
            h.decrypt_stream(chunk).expect("stream");
        }
        h.decrypt_finish(&mut out).expect("finish");
        out
    }

    #[test]
    fn encrypt_get_size_adds_prefix_and_padding() {
        let h = handler(CipherMode::Aes128Cbc4k);
        // 12 + 4 = 16 aligned: still gains a full padding block.
        assert_eq!(h.encrypt_get_size(1, 0, 12), 32);
        assert_eq!(h.encrypt_get_size(1, 0, 0), 16);
        assert_eq!(h.encrypt_get_size(1, 0, 100), 112);
    }

    #[test]
    fn one_shot_roundtrip() {
        let mut h = handler(CipherMode::Aes128Cbc4k);
        let plain = b"BT /F1 24 Tf 72 712 Td (Hello) Tj ET".to_vec();

        let mut ciphertext = Vec::new();
        h.encrypt_content(7, 0, &plain, &mut ciphertext).expect("encrypt");
        assert_eq!(ciphertext.len() % AES_BLOCK_LEN, 0);
        assert!(ciphertext.len() >= plain.len() + LENGTH_PREFIX);

        assert_eq!(decrypt_one_shot(&mut h, 7, &ciphertext), plain);
    }

    #[test]
    fn one_shot_roundtrip_ecb() {
        let mut h = handler(CipherMode::Aes128Ecb);
        let plain = vec![0xD1u8; 4097];

        let mut ciphertext = Vec::new();
        h.encrypt_content(2, 0, &plain, &mut ciphertext).expect("encrypt");
        assert_eq!(decrypt_one_shot(&mut h, 2, &ciphertext), plain);
    }

    #[test]
    fn ciphertext_prefix_is_big_endian_plaintext_length() {
        let mut h = handler(CipherMode::Aes128Cbc4k);
        let plain = vec![0x55u8; 300];
        let mut ciphertext = Vec::new();
        h.encrypt_content(1, 0, &plain, &mut ciphertext).expect("encrypt");

        // Decrypt the raw stream outside the handler to inspect the frame.
        let store = MemoryStore::with_bytes(ciphertext.clone());
        let mut stream = BlockStream::new(
            h.policy.crypto_provider().clone(),
            store,
            0,
            ciphertext.len() as u64,
        );
        let mut head = [0u8; 4];
        let n = stream.read(&mut head, 0).expect("read");
        assert_eq!(n, 4);
        assert_eq!(u32::from_be_bytes(head), 300);
    }

    #[test]
    fn progressive_declines_small_objects() {
        let mut h = handler(CipherMode::Aes128Cbc4k);
        assert!(!h.progressive_encrypt_start(1, 0, MIN_RAW_SIZE).expect("start"));
        assert!(!h.progressive_encrypt_start(1, 0, 16).expect("start"));
        assert!(h.progressive_encrypt_start(1, 0, MIN_RAW_SIZE + 1).expect("start"));
    }

    #[test]
    fn progressive_roundtrip_multi_chunk() {
        let mut h = handler(CipherMode::Aes128Cbc4k);
        let plain: Vec<u8> = (0..20_000).map(|i| (i % 253) as u8).collect();

        assert!(h
            .progressive_encrypt_start(9, 0, plain.len() as u32)
            .expect("start"));
        let mut ciphertext = Vec::new();
        for chunk in plain.chunks(6000) {
            h.progressive_encrypt_content(9, 0, chunk).expect("content");
        }
        h.progressive_encrypt_finish(&mut ciphertext).expect("finish");
        assert_eq!(ciphertext.len() % AES_BLOCK_LEN, 0);

        assert_eq!(decrypt_one_shot(&mut h, 9, &ciphertext), plain);
    }

    #[test]
    fn handler_is_reusable_across_objects() {
        let mut h = handler(CipherMode::Aes128Cbc4k);
        for (obj, len) in [(1u32, 10usize), (2, 5000), (3, 0)] {
            let plain = vec![obj as u8; len];
            let mut ciphertext = Vec::new();
            h.encrypt_content(obj, 0, &plain, &mut ciphertext).expect("encrypt");
            assert_eq!(decrypt_one_shot(&mut h, obj, &ciphertext), plain);
        }
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let mut h = handler(CipherMode::Aes128Cbc4k);
        assert!(matches!(
            h.decrypt_stream(b"x"),
            Err(PdfError::InvalidArgument { .. })
        ));
        assert!(matches!(
            h.progressive_encrypt_content(1, 0, b"x"),
            Err(PdfError::InvalidArgument { .. })
        ));
        assert!(matches!(
            h.progressive_encrypt_finish(&mut Vec::new()),
            Err(PdfError::InvalidArgument { .. })
        ));

        h.decrypt_start(1, 0).expect("start");
        assert!(matches!(
            h.decrypt_start(2, 0),
            Err(PdfError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn failed_finish_returns_to_idle() {
        let mut h = handler(CipherMode::Aes128Cbc4k);
        // Two bytes cannot hold a length prefix; the finish fails but must
        // not wedge the handler.
        h.decrypt_start(1, 0).expect("start");
        h.decrypt_stream(&[0u8; 2]).expect("stream");
        let err = h.decrypt_finish(&mut Vec::new()).expect_err("bad frame");
        assert!(matches!(err, PdfError::CorruptFile { .. }));
        h.decrypt_start(2, 0).expect("handler reusable after finish");
    }

    #[test]
    fn empty_decrypt_finish_emits_nothing() {
        let mut h = handler(CipherMode::Aes128Cbc4k);
        let mut out = Vec::new();
        h.decrypt_start(4, 0).expect("start");
        h.decrypt_finish(&mut out).expect("finish");
        assert!(out.is_empty());
    }

    #[test]
    fn cancellation_stops_new_objects() {
        let cancel = CancelFlag::new();
        let mut h = CryptoHandler::new(test_policy(CipherMode::Aes128Cbc4k), cancel.clone());
        cancel.cancel();
        let err = h
            .encrypt_content(1, 0, b"data", &mut Vec::new())
            .expect_err("cancelled");
        assert!(matches!(err, PdfError::OperationCancelled));
        assert!(matches!(
            h.decrypt_start(1, 0),
            Err(PdfError::OperationCancelled)
        ));
    }
}
