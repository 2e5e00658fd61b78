use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CryptoError;

/// Cooperative cancellation flag shared between a caller and a running
/// protect/unprotect operation.
///
/// Operations check the flag at the start of each object and at stream
/// flushes; once observed, outstanding work is abandoned.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    /// Returns `Err(CryptoError::Cancelled)` once the flag is set.
    pub fn check(&self) -> Result<(), CryptoError> {
        if self.is_cancelled() {
            Err(CryptoError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_the_same_flag() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(flag.check().is_ok());
        other.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(CryptoError::Cancelled)));
    }
}
