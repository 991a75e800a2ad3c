//! # Error Types
//!
//! Error handling for process and memory operations.
//!
//! We use `thiserror` to generate the `Error` trait implementations and
//! messages. Every variant that stems from an operating system call carries
//! the OS-reported cause as a [`std::io::Error`], so callers can inspect
//! `raw_os_error()` or `kind()` without depending on platform crates.
//!
//! A pattern that is not found is **not** an error. See
//! [`find_pattern`](crate::pattern::find_pattern), which returns `Ok(None)`.

use std::io;

use thiserror::Error;

use crate::types::{Address, ProcessId};

/// Main error type for Remora operations
///
/// ## Error Categories
///
/// 1. **Process errors**: `LaunchFailed`, `ProcessNotFound`, `AccessDenied`, `ResumeFailed`
/// 2. **Memory errors**: `AllocationFailed`, `ReadFailed`, `WriteFailed`, `ProtectionRestoreFailed`
/// 3. **Usage errors**: `SizeMismatch`, `MaskLengthMismatch`, `InvalidArgument`
/// 4. **Platform errors**: `MachError` (macOS-specific), `Io`
#[derive(Error, Debug)]
pub enum RemoraError
{
    /// The operating system refused to create the process
    ///
    /// No partial context is ever returned alongside this error. The `path`
    /// is the executable that was attempted.
    #[error("Failed to launch '{path}': {source}")]
    LaunchFailed
    {
        /// Executable path handed to the OS
        path: String,
        /// OS-reported cause
        #[source]
        source: io::Error,
    },

    /// No live process matches the given id or name
    ///
    /// This happens when:
    /// - The PID was never valid, or the process already exited
    /// - No running process has the requested image name
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    /// The process exists but the OS denied the requested access rights
    ///
    /// - **Linux**: `ptrace` access mode checks (Yama `ptrace_scope`, different uid)
    /// - **Windows**: `OpenProcess(PROCESS_ALL_ACCESS)` refused, usually a protected or elevated target
    /// - **macOS**: `task_for_pid()` needs sudo or the debugger entitlement
    #[error("Access denied to process {pid}: {source}")]
    AccessDenied
    {
        /// Target process
        pid: ProcessId,
        /// OS-reported cause
        #[source]
        source: io::Error,
    },

    /// Reserving or committing memory in the target failed
    #[error("Failed to allocate {len} bytes{}", display_cause(.source.as_ref()))]
    AllocationFailed
    {
        /// Requested length
        len: usize,
        /// OS-reported cause, when there was one
        #[source]
        source: Option<io::Error>,
    },

    /// Copying bytes out of the target failed or transferred fewer bytes than requested
    #[error("Failed to read {len} bytes at {address}{}", display_cause(.source.as_ref()))]
    ReadFailed
    {
        /// Start of the requested range
        address: Address,
        /// Requested length
        len: usize,
        /// OS-reported cause, when there was one
        #[source]
        source: Option<io::Error>,
    },

    /// Copying bytes into the target failed or transferred fewer bytes than requested
    #[error("Failed to write {len} bytes at {address}{}", display_cause(.source.as_ref()))]
    WriteFailed
    {
        /// Start of the requested range
        address: Address,
        /// Requested length
        len: usize,
        /// OS-reported cause, when there was one
        #[source]
        source: Option<io::Error>,
    },

    /// A safe operation succeeded but the previous page protection could not be put back
    ///
    /// The range is left readable, writable and executable.
    #[error("Failed to restore page protection of {len} bytes at {address}: {source}")]
    ProtectionRestoreFailed
    {
        /// Start of the guarded range
        address: Address,
        /// Length of the guarded range
        len: usize,
        /// OS-reported cause
        #[source]
        source: io::Error,
    },

    /// A byte buffer does not have the width of the type it is decoded into
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch
    {
        /// Width of the target type
        expected: usize,
        /// Length of the supplied buffer
        actual: usize,
    },

    /// A pattern and its mask have different lengths
    ///
    /// Raised before any scanning work begins.
    #[error("Mask length mismatch: pattern has {pattern} bytes, mask has {mask} characters")]
    MaskLengthMismatch
    {
        /// Number of pattern bytes
        pattern: usize,
        /// Number of mask characters
        mask: usize,
    },

    /// Invalid argument passed to an operation
    ///
    /// Examples:
    /// - A mask character other than `x` or `?`
    /// - Resuming a context that was attached rather than launched
    /// - In-process access through a context for another process
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to resume a launched process
    #[error("Failed to resume process: {0}")]
    ResumeFailed(String),

    /// macOS-specific Mach API error
    #[cfg(target_os = "macos")]
    #[error("Mach error: {0}")]
    MachError(#[from] crate::platform::macos::MachError),

    /// Generic I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn display_cause(source: Option<&io::Error>) -> String
{
    source.map(|err| format!(": {err}")).unwrap_or_default()
}

/// Flat classification of [`RemoraError`]
///
/// Lets callers branch on the failure category without destructuring
/// the variant payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{
    /// See [`RemoraError::LaunchFailed`]
    LaunchFailed,
    /// See [`RemoraError::ProcessNotFound`]
    ProcessNotFound,
    /// See [`RemoraError::AccessDenied`]
    AccessDenied,
    /// See [`RemoraError::AllocationFailed`]
    AllocationFailed,
    /// See [`RemoraError::ReadFailed`]
    ReadFailed,
    /// See [`RemoraError::WriteFailed`]
    WriteFailed,
    /// See [`RemoraError::ProtectionRestoreFailed`]
    ProtectionRestoreFailed,
    /// See [`RemoraError::SizeMismatch`]
    SizeMismatch,
    /// See [`RemoraError::MaskLengthMismatch`]
    MaskLengthMismatch,
    /// See [`RemoraError::InvalidArgument`]
    InvalidArgument,
    /// See [`RemoraError::ResumeFailed`]
    ResumeFailed,
    /// Platform or generic I/O failure
    Other,
}

impl RemoraError
{
    /// Classify this error
    pub fn kind(&self) -> ErrorKind
    {
        match self {
            RemoraError::LaunchFailed { .. } => ErrorKind::LaunchFailed,
            RemoraError::ProcessNotFound(_) => ErrorKind::ProcessNotFound,
            RemoraError::AccessDenied { .. } => ErrorKind::AccessDenied,
            RemoraError::AllocationFailed { .. } => ErrorKind::AllocationFailed,
            RemoraError::ReadFailed { .. } => ErrorKind::ReadFailed,
            RemoraError::WriteFailed { .. } => ErrorKind::WriteFailed,
            RemoraError::ProtectionRestoreFailed { .. } => ErrorKind::ProtectionRestoreFailed,
            RemoraError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            RemoraError::MaskLengthMismatch { .. } => ErrorKind::MaskLengthMismatch,
            RemoraError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RemoraError::ResumeFailed(_) => ErrorKind::ResumeFailed,
            #[cfg(target_os = "macos")]
            RemoraError::MachError(_) => ErrorKind::Other,
            RemoraError::Io(_) => ErrorKind::Other,
        }
    }
}

/// Result type alias for Remora operations
///
/// ## Example
///
/// ```rust
/// use remora_core::error::Result;
/// use remora_core::marshal;
///
/// fn decode(bytes: &[u8]) -> Result<u32>
/// {
///     marshal::from_bytes::<u32>(bytes)
/// }
///
/// assert_eq!(decode(&[1, 0, 0, 0]).unwrap(), 1);
/// assert!(decode(&[1, 0]).is_err());
/// ```
pub type Result<T> = std::result::Result<T, RemoraError>;
