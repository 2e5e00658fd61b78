//! Block-based protected streams and the policy model shared by the irmfile
//! protectors.
//!
//! This crate supplies:
//! - [`CryptoProvider`] — AES-128 block crypto in ECB (compatibility) and
//!   CBC-with-derived-IV modes
//! - [`BlockStream`] — a plaintext-addressed, block-aligned view over an
//!   encrypted backing store, with read-modify-write on partial blocks
//! - the policy seam ([`PolicyService`], [`UserPolicy`]) plus a
//!   self-contained [`LocalPolicyService`] issuer
//! - [`CancelFlag`] for cooperative cancellation
//!
//! Streams are synchronous; callers own any parallelism. The provider is
//! `Clone` and policies are shared via `Arc`, so independent objects can be
//! processed concurrently as long as each uses its own stream handle.

mod block_stream;
mod cancel;
mod error;
mod license;
mod policy;
mod provider;

pub use block_stream::{BackingStore, BlockStream, MemoryStore};
pub use cancel::CancelFlag;
pub use error::CryptoError;
pub use license::PublishingLicense;
pub use policy::{
    AcquisitionStatus, CryptoOptions, LocalPolicyService, PolicyAcquisition,
    PolicyAcquisitionOptions, PolicyDescriptor, PolicyService, ProtectOptions, ResponseCacheFlags,
    UnprotectOptions, UserContext, UserPolicy, UserPolicyCreationOptions,
};
pub use provider::{CipherMode, CryptoProvider, AES_BLOCK_LEN};
