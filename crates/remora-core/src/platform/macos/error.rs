//! # Mach Errors
//!
//! Mach APIs return `kern_return_t` codes. [`MachError`] names the ones
//! callers can act on.

use std::io;

use mach2::kern_return;
use thiserror::Error;

/// Mach kernel API error
///
/// - `KERN_INVALID_ADDRESS` (1): address not mapped in the task
/// - `KERN_PROTECTION_FAILURE` (2): access blocked by protection or policy
/// - `KERN_INVALID_ARGUMENT` (4): bad pid, port or range
/// - `KERN_FAILURE` (5): general failure, usually a missing process
///
/// ## References
///
/// - [kern_return_t documentation](https://developer.apple.com/documentation/kernel/kern_return_t)
#[derive(Error, Debug)]
pub enum MachError
{
    /// `KERN_INVALID_ADDRESS`
    #[error("KERN_INVALID_ADDRESS: address is not mapped")]
    InvalidAddress,

    /// `KERN_PROTECTION_FAILURE`
    ///
    /// `task_for_pid()` on a foreign task needs root or the
    /// `com.apple.security.cs.debugger` entitlement.
    #[error("KERN_PROTECTION_FAILURE: permission denied")]
    ProtectionFailure,

    /// `KERN_INVALID_ARGUMENT`
    #[error("KERN_INVALID_ARGUMENT: invalid pid or argument")]
    InvalidArgument,

    /// `KERN_FAILURE`
    #[error("KERN_FAILURE: process not found")]
    ProcessNotFound,

    /// Any other code, preserved for lookup
    #[error("unknown Mach error: {0}")]
    Unknown(i32),
}

impl From<kern_return::kern_return_t> for MachError
{
    fn from(code: kern_return::kern_return_t) -> Self
    {
        match code {
            kern_return::KERN_INVALID_ADDRESS => MachError::InvalidAddress,
            kern_return::KERN_PROTECTION_FAILURE => MachError::ProtectionFailure,
            kern_return::KERN_INVALID_ARGUMENT => MachError::InvalidArgument,
            kern_return::KERN_FAILURE => MachError::ProcessNotFound,
            _ => MachError::Unknown(code),
        }
    }
}

impl From<MachError> for io::Error
{
    fn from(err: MachError) -> Self
    {
        let kind = match err {
            MachError::InvalidAddress => io::ErrorKind::NotFound,
            MachError::ProtectionFailure => io::ErrorKind::PermissionDenied,
            MachError::InvalidArgument => io::ErrorKind::InvalidInput,
            MachError::ProcessNotFound | MachError::Unknown(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Turn a `kern_return_t` into a `Result`
pub(crate) fn check(code: kern_return::kern_return_t) -> Result<(), MachError>
{
    if code == kern_return::KERN_SUCCESS {
        Ok(())
    } else {
        Err(MachError::from(code))
    }
}
