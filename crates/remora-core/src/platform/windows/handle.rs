//! Owned Win32 handles.

use ::windows::Win32::Foundation::{CloseHandle, HANDLE};
use tracing::warn;

/// A process or thread handle closed on drop
///
/// Pseudo handles from `GetCurrentProcess`/`GetCurrentThread` are wrapped
/// with [`OwnedHandle::borrowed`] and never closed.
pub(crate) struct OwnedHandle
{
    raw: HANDLE,
    owned: bool,
}

// SAFETY: kernel handles are process-wide and usable from any thread
unsafe impl Send for OwnedHandle {}
// SAFETY: every call made through the handle is a thread-safe Win32 API
unsafe impl Sync for OwnedHandle {}

impl OwnedHandle
{
    /// Take ownership of a handle returned by an `Open*`/`Create*` call
    pub(crate) fn new(raw: HANDLE) -> Self
    {
        Self { raw, owned: true }
    }

    /// Wrap a pseudo handle that must not be closed
    pub(crate) fn borrowed(raw: HANDLE) -> Self
    {
        Self { raw, owned: false }
    }

    pub(crate) fn raw(&self) -> HANDLE
    {
        self.raw
    }
}

impl Drop for OwnedHandle
{
    fn drop(&mut self)
    {
        if self.owned && !self.raw.is_invalid() {
            // SAFETY: we own the handle and close it exactly once
            if let Err(err) = unsafe { CloseHandle(self.raw) } {
                warn!(error = %err, "CloseHandle failed");
            }
        }
    }
}
