//! Re-entrancy guard shared by every value-moving vault entry point.
//!
//! Operations are already serialized across threads by the vault's
//! operation lock, which is re-entrant so that a strategy callback on the
//! same thread does not deadlock. The guard is what turns that same-thread
//! re-entry into an error.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{VaultError, VaultResult};

/// Single-flag guard. At most one [`GuardToken`] exists at a time.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: AtomicBool,
}

impl ReentrancyGuard {
    /// Creates an idle guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an operation as in flight.
    ///
    /// # Errors
    ///
    /// [`VaultError::ReentrantCall`] if another operation holds the guard.
    pub fn enter(&self) -> VaultResult<GuardToken<'_>> {
        self.entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| VaultError::ReentrantCall)?;
        Ok(GuardToken { guard: self })
    }

    /// `true` while an operation is in flight.
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Releases the guard on drop, including on early return and unwinding.
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.entered.store(false, Ordering::Release);
    }
}
