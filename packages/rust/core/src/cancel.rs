//! Cooperative cancellation for long-running lead operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use leadforge_shared::{LeadForgeError, Result};

/// Cloneable cancellation flag, checked before each external request.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once [`CancelFlag::cancel`] has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LeadForgeError::Cancelled)
        } else {
            Ok(())
        }
    }
}
