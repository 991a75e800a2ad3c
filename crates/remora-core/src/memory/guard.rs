//! # Protection Guard
//!
//! RAII guard that changes the page protection of a range and puts the
//! previous protection back when it goes out of scope.
//!
//! The snapshot lives inside the guard, so every safe operation carries its
//! own copy and two guards never share state. It holds one entry per run of
//! pages, and each run is put back to its own protection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use remora_core::memory::ProtectionGuard;
//! use remora_core::types::Address;
//! use remora_core::ProcessContext;
//!
//! let ctx = ProcessContext::current();
//! let address = Address::from(0x1000);
//! {
//!     let _guard = ProtectionGuard::unprotect(&ctx, address, 16)?;
//!     // range is readable, writable and executable here
//! }
//! // previous protection restored
//! # Ok::<(), std::io::Error>(())
//! ```

use std::io;

use tracing::{debug, warn};

use super::ProcessMemory;
use crate::types::{Address, Protection, ProtectionRegion};

/// Guard that restores a range's protection when dropped
///
/// Dropping restores on a best-effort basis and logs a failure. Call
/// [`ProtectionGuard::restore`] to observe the outcome instead.
pub struct ProtectionGuard<'a, M: ProcessMemory + ?Sized>
{
    memory: &'a M,
    previous: Vec<ProtectionRegion>,
    active: bool,
}

impl<'a, M: ProcessMemory + ?Sized> ProtectionGuard<'a, M>
{
    /// Make the range readable, writable and executable until the guard is dropped.
    ///
    /// ## Errors
    ///
    /// The OS error from querying or changing the protection. Nothing needs to
    /// be restored in that case.
    pub fn unprotect(memory: &'a M, address: Address, len: usize) -> io::Result<Self>
    {
        Self::with_protection(memory, address, len, Protection::read_write_execute())
    }

    /// Apply an arbitrary protection for the lifetime of the guard.
    ///
    /// A zero-length range is left untouched.
    pub fn with_protection(memory: &'a M, address: Address, len: usize, protection: Protection) -> io::Result<Self>
    {
        if len == 0 {
            return Ok(Self {
                memory,
                previous: Vec::new(),
                active: false,
            });
        }

        let previous = memory.protect(address, len, protection)?;
        debug!(%address, len, runs = previous.len(), requested = %protection, "Changed page protection");

        Ok(Self {
            memory,
            previous,
            active: true,
        })
    }

    /// Runs of protection the range had before the guard was created
    pub fn previous(&self) -> &[ProtectionRegion]
    {
        &self.previous
    }

    /// Restore the previous protection now and report the outcome.
    ///
    /// After calling this, dropping the guard is a no-op.
    pub fn restore(mut self) -> io::Result<()>
    {
        self.active = false;
        self.apply_previous()
    }

    /// Put every run back, carrying on past failures. Reports the first one.
    fn apply_previous(&self) -> io::Result<()>
    {
        let mut first_error = None;
        for run in &self.previous {
            match self.memory.protect(run.address, run.len, run.protection) {
                Ok(_) => debug!(address = %run.address, len = run.len, restored = %run.protection, "Restored page protection"),
                Err(err) => {
                    warn!(address = %run.address, len = run.len, error = %err, "Failed to restore page protection");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<M: ProcessMemory + ?Sized> Drop for ProtectionGuard<'_, M>
{
    fn drop(&mut self)
    {
        if self.active {
            // Best effort restore; failures are logged per run
            let _ = self.apply_previous();
        }
    }
}
