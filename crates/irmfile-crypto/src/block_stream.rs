use std::sync::{Arc, RwLock};

use crate::error::CryptoError;
use crate::provider::{CryptoProvider, AES_BLOCK_LEN};

#[inline]
fn padded_aes_len(len: usize) -> usize {
    let rem = len % AES_BLOCK_LEN;
    if rem == 0 {
        len
    } else {
        len + (AES_BLOCK_LEN - rem)
    }
}

/// Byte-addressable store holding the ciphertext side of a [`BlockStream`].
///
/// Handles are values; cloning a store type must yield a handle onto the same
/// underlying bytes so independent stream cursors can coexist.
pub trait BackingStore {
    /// Read up to `buf.len()` bytes at `offset`; short reads past the end are
    /// not an error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, CryptoError>;
    /// Write `buf` at `offset`, zero-filling any gap, and return the number
    /// of bytes accepted.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize, CryptoError>;
    fn len(&self) -> u64;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Growable in-memory backing store shared between handles.
#[derive(Clone, Default)]
pub struct MemoryStore {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Copy the current contents out of the store.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.read().expect("memory store poisoned").clone()
    }
}

impl BackingStore for MemoryStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, CryptoError> {
        let bytes = self.bytes.read().expect("memory store poisoned");
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize, CryptoError> {
        let mut bytes = self.bytes.write().expect("memory store poisoned");
        let start = usize::try_from(offset).map_err(|_| CryptoError::ShortWrite {
            requested: buf.len(),
            written: 0,
            offset,
        })?;
        let end = start + buf.len();
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn len(&self) -> u64 {
        self.bytes.read().expect("memory store poisoned").len() as u64
    }
}

struct CachedBlock {
    index: u64,
    /// Plaintext of the block, truncated to the bytes logically present.
    data: Vec<u8>,
    dirty: bool,
}

/// A seekable plaintext view layered over an encrypted backing store.
///
/// Offsets passed to [`read`](Self::read)/[`write`](Self::write) are in
/// plaintext space; the stream maps them onto ciphertext blocks of
/// `stream_block_size` bytes starting at `content_start`, decrypting and
/// re-encrypting whole blocks as needed. One block is cached per handle, so
/// sequential partial writes cost a single cipher pass per block.
///
/// Callers serialize operations on a single handle; the stream itself does
/// not lock. [`clone_handle`](Self::clone_handle) yields an independent
/// cursor over the same store.
pub struct BlockStream<S: BackingStore> {
    provider: CryptoProvider,
    store: S,
    content_start: u64,
    content_size: u64,
    block_size: u64,
    cache: Option<CachedBlock>,
}

impl<S: BackingStore> BlockStream<S> {
    /// `content_size` is the logical size of the stream: the plaintext size
    /// when writing, or the ciphertext extent when layering over an existing
    /// protected region.
    pub fn new(provider: CryptoProvider, store: S, content_start: u64, content_size: u64) -> Self {
        // 512 only for the CBC-512 provider; ECB and CBC-4K both stream in
        // 4096-byte blocks.
        let block_size = if provider.block_size() == 512 { 512 } else { 4096 };
        Self {
            provider,
            store,
            content_start,
            content_size,
            block_size,
            cache: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.content_size
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Plaintext bytes logically present in block `index`.
    fn plain_len_in_block(&self, index: u64) -> usize {
        let start = index * self.block_size;
        if start >= self.content_size {
            return 0;
        }
        (self.content_size - start).min(self.block_size) as usize
    }

    fn evict_cache(&mut self) -> Result<(), CryptoError> {
        let Some(cache) = self.cache.as_mut() else {
            return Ok(());
        };
        if !cache.dirty {
            return Ok(());
        }
        let mut buf = cache.data.clone();
        buf.resize(padded_aes_len(buf.len()), 0);
        self.provider.encrypt_block(cache.index, &mut buf)?;
        let offset = self.content_start + cache.index * self.block_size;
        let written = self.store.write_at(offset, &buf)?;
        if written != buf.len() {
            return Err(CryptoError::ShortWrite {
                requested: buf.len(),
                written,
                offset,
            });
        }
        cache.dirty = false;
        Ok(())
    }

    /// Load block `index` into the cache, evicting the previous block first.
    fn load_block(&mut self, index: u64) -> Result<(), CryptoError> {
        if matches!(&self.cache, Some(c) if c.index == index) {
            return Ok(());
        }
        self.evict_cache()?;

        let plain_len = self.plain_len_in_block(index);
        let mut buf = vec![0u8; padded_aes_len(plain_len)];
        let offset = self.content_start + index * self.block_size;
        let got = self.store.read_at(offset, &mut buf)?;
        if got == 0 {
            // Hole in the store: the block has never been written.
            buf.clear();
        } else {
            // Only whole cipher blocks that were actually read are usable.
            buf.truncate(got - got % AES_BLOCK_LEN);
            self.provider.decrypt_block(index, &mut buf)?;
            buf.truncate(plain_len.min(buf.len()));
        }
        self.cache = Some(CachedBlock {
            index,
            data: buf,
            dirty: false,
        });
        Ok(())
    }

    /// Read up to `buf.len()` plaintext bytes at `offset`. Reads past the end
    /// of the stream return a short count, never an error.
    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, CryptoError> {
        if offset >= self.content_size || buf.is_empty() {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.content_size - offset) as usize;
        let mut done = 0usize;
        while done < want {
            let pos = offset + done as u64;
            let index = pos / self.block_size;
            let within = (pos % self.block_size) as usize;
            self.load_block(index)?;
            let cache = self.cache.as_ref().expect("block just loaded");
            if within >= cache.data.len() {
                break;
            }
            let n = (want - done).min(cache.data.len() - within);
            buf[done..done + n].copy_from_slice(&cache.data[within..within + n]);
            done += n;
        }
        Ok(done)
    }

    /// Write `buf` at plaintext `offset`, extending the stream as needed.
    pub fn write(&mut self, buf: &[u8], offset: u64) -> Result<(), CryptoError> {
        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset + done as u64;
            let index = pos / self.block_size;
            let within = (pos % self.block_size) as usize;
            let n = (buf.len() - done).min(self.block_size as usize - within);
            self.load_block(index)?;
            let cache = self.cache.as_mut().expect("block just loaded");
            if cache.data.len() < within + n {
                cache.data.resize(within + n, 0);
            }
            cache.data[within..within + n].copy_from_slice(&buf[done..done + n]);
            cache.dirty = true;
            done += n;
        }
        self.content_size = self.content_size.max(offset + buf.len() as u64);
        Ok(())
    }

    /// Push any cached partial block through the cipher to the store.
    pub fn flush(&mut self) -> Result<(), CryptoError> {
        self.evict_cache()
    }

    /// A second cursor over the same backing store. The clone starts with a
    /// cold cache; flush this handle first if it holds dirty data.
    pub fn clone_handle(&self) -> BlockStream<S>
    where
        S: Clone,
    {
        BlockStream {
            provider: self.provider.clone(),
            store: self.store.clone(),
            content_start: self.content_start,
            content_size: self.content_size,
            block_size: self.block_size,
            cache: None,
        }
    }
}
