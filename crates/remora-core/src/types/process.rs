//! Process and thread identity types.

use std::fmt;

/// Process identifier (PID)
///
/// Opaque integer the operating system assigns to each running process. It is
/// valid for as long as the process lives and may be reused afterwards.
///
/// ## Example
///
/// ```rust
/// use remora_core::types::ProcessId;
///
/// let pid = ProcessId::from(4242);
/// assert_eq!(u32::from(pid), 4242);
/// assert_eq!(pid.to_string(), "4242");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// Identifier of the calling process
    pub fn current() -> Self
    {
        ProcessId(std::process::id())
    }
}

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier
///
/// The exact representation is platform-specific:
///
/// - **Linux**: kernel thread id (TID); the main thread's TID equals the PID
/// - **Windows**: thread id from `CreateProcessW` or the Toolhelp snapshot
/// - **macOS**: Mach thread port (`thread_act_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Get the raw `u64` representation of the thread identifier
    ///
    /// ```rust
    /// use remora_core::types::ThreadId;
    ///
    /// let thread = ThreadId::from(12345);
    /// assert_eq!(thread.raw(), 12345);
    /// ```
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// How a [`ProcessContext`](crate::ProcessContext) came to exist
///
/// ## State Transitions
///
/// - `Launched`: the process starts with its main thread suspended and stays
///   that way until [`ProcessContext::resume`](crate::ProcessContext::resume) is called
/// - `Attached`: the target was already running; no suspension guarantee is made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreationMode
{
    /// Created by this context in a suspended state
    Launched,
    /// Opened by id or name (including the current process)
    Attached,
}

impl fmt::Display for CreationMode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            CreationMode::Launched => write!(f, "launched"),
            CreationMode::Attached => write!(f, "attached"),
        }
    }
}
