//! # Process Context
//!
//! [`ProcessContext`] owns the identity and OS handles of one target process
//! and its primary thread.
//!
//! A context is created in one of two modes:
//!
//! - **Launched** ([`ProcessContext::launch`]): the process is created with its
//!   main thread suspended before the first instruction. Nothing runs until
//!   [`ProcessContext::resume`] is called.
//! - **Attached** ([`ProcessContext::attach_by_id`], [`ProcessContext::attach_by_name`],
//!   [`ProcessContext::current`]): handles are opened on a running process.
//!   No suspension is implied.
//!
//! Dropping a context releases its handles. It never terminates the target.
//! On Linux and macOS a launched child that has already exited is reaped on
//! drop; one that exits later must be waited for by the caller.
//!
//! ## Example
//!
//! ```rust,no_run
//! use remora_core::{memory, ProcessContext};
//!
//! let mut ctx = ProcessContext::launch("/usr/games/game", ["--windowed"])?;
//! let base = memory::allocate(&ctx, 64)?;
//! memory::write_bytes(&ctx, base, b"patched")?;
//! ctx.resume()?;
//! # Ok::<(), remora_core::RemoraError>(())
//! ```

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{RemoraError, Result};
use crate::memory::ProcessMemory;
use crate::platform::{self, NativeProcess};
use crate::types::{Address, CreationMode, ProcessId, Protection, ProtectionRegion, ThreadId};

/// Handles to a target process and its primary thread
pub struct ProcessContext
{
    inner: NativeProcess,
    mode: CreationMode,
    suspended: bool,
}

/// Resolve `path` against the working directory without touching the filesystem
fn absolute(path: &Path) -> Result<PathBuf>
{
    if path.as_os_str().is_empty() {
        return Err(RemoraError::InvalidArgument("program path cannot be empty".to_string()));
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| RemoraError::LaunchFailed {
        path: path.display().to_string(),
        source,
    })?;
    Ok(cwd.join(path))
}

impl ProcessContext
{
    /// Launch `path` with `args`, suspended before its first instruction
    ///
    /// The working directory of the new process is the directory holding the
    /// executable. The caller decides when it runs by calling [`resume`](Self::resume).
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument` for an empty path
    /// - `LaunchFailed` with the attempted path when the OS refuses to create the process
    pub fn launch<P, I, S>(path: P, args: I) -> Result<Self>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let path = absolute(path.as_ref())?;
        let args: Vec<OsString> = args.into_iter().map(|arg| arg.as_ref().to_os_string()).collect();

        info!(path = %path.display(), ?args, "Launching suspended process");
        let inner = NativeProcess::launch(&path, &args)?;

        Ok(Self {
            inner,
            mode: CreationMode::Launched,
            suspended: true,
        })
    }

    /// Attach to a running process by id
    ///
    /// ## Errors
    ///
    /// - `ProcessNotFound` if `pid` is not a live process
    /// - `AccessDenied` if the OS refuses the requested access rights
    pub fn attach_by_id(pid: ProcessId) -> Result<Self>
    {
        Ok(Self {
            inner: NativeProcess::open(pid)?,
            mode: CreationMode::Attached,
            suspended: false,
        })
    }

    /// Attach to the first process whose executable is called `name`
    ///
    /// When several processes match, the first one in enumeration order wins.
    /// Use [`attach_by_id`](Self::attach_by_id) to pick a specific one.
    ///
    /// ## Errors
    ///
    /// Same as [`attach_by_id`](Self::attach_by_id); `ProcessNotFound` also
    /// covers "no process has that name".
    pub fn attach_by_name(name: &str) -> Result<Self>
    {
        if name.is_empty() {
            return Err(RemoraError::InvalidArgument("process name cannot be empty".to_string()));
        }

        let pid = platform::find_process_by_name(name)?
            .ok_or_else(|| RemoraError::ProcessNotFound(format!("no process named '{name}'")))?;
        debug!(name, %pid, "Resolved process name");
        Self::attach_by_id(pid)
    }

    /// Context for the calling process
    ///
    /// Same identity as [`attach_by_id`](Self::attach_by_id) with the own pid,
    /// whichever thread calls it.
    pub fn current() -> Self
    {
        Self {
            inner: NativeProcess::current(),
            mode: CreationMode::Attached,
            suspended: false,
        }
    }

    /// Let a launched process run
    ///
    /// Calling this again after a successful resume does nothing. On Linux it
    /// must be called from the thread that launched the process.
    ///
    /// On Linux and macOS the process stays a child of the caller. Dropping
    /// the context reaps it only if it has already exited, so a long-lived
    /// host should `waitpid` children that outlive their context.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument` for an attached context
    /// - `ResumeFailed` if the OS call fails
    pub fn resume(&mut self) -> Result<()>
    {
        if self.mode == CreationMode::Attached {
            return Err(RemoraError::InvalidArgument(
                "only launched processes can be resumed".to_string(),
            ));
        }
        if !self.suspended {
            return Ok(());
        }

        self.inner.resume()?;
        self.suspended = false;
        info!(pid = %self.process_id(), "Resumed process");
        Ok(())
    }

    pub fn process_id(&self) -> ProcessId
    {
        self.inner.pid()
    }

    /// The primary thread: the main thread for launched processes, the first
    /// enumerated thread otherwise, including for [`current`](Self::current)
    pub fn thread_id(&self) -> ThreadId
    {
        self.inner.thread_id()
    }

    pub fn creation_mode(&self) -> CreationMode
    {
        self.mode
    }

    /// Whether the target is the calling process
    pub fn is_current(&self) -> bool
    {
        self.process_id() == ProcessId::current()
    }

    /// Whether a launched process is still waiting for [`resume`](Self::resume)
    pub fn is_suspended(&self) -> bool
    {
        self.suspended
    }
}

impl ProcessMemory for ProcessContext
{
    fn process_id(&self) -> ProcessId
    {
        self.inner.pid()
    }

    fn allocate(&self, len: usize, protection: Protection) -> io::Result<Address>
    {
        self.inner.allocate(len, protection)
    }

    fn release(&self, address: Address) -> io::Result<()>
    {
        self.inner.release(address)
    }

    fn read_into(&self, address: Address, buf: &mut [u8]) -> io::Result<usize>
    {
        self.inner.read(address, buf)
    }

    fn write_from(&self, address: Address, data: &[u8]) -> io::Result<usize>
    {
        self.inner.write(address, data)
    }

    fn protection_map(&self, address: Address, len: usize) -> io::Result<Vec<ProtectionRegion>>
    {
        self.inner.protection_map(address, len)
    }

    fn protect(&self, address: Address, len: usize, protection: Protection) -> io::Result<Vec<ProtectionRegion>>
    {
        self.inner.protect(address, len, protection)
    }
}

impl fmt::Debug for ProcessContext
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ProcessContext")
            .field("process_id", &self.process_id())
            .field("thread_id", &self.thread_id())
            .field("creation_mode", &self.mode)
            .field("suspended", &self.suspended)
            .finish()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_current_context()
    {
        let ctx = ProcessContext::current();
        assert_eq!(ctx.process_id(), ProcessId::current());
        assert_eq!(ctx.creation_mode(), CreationMode::Attached);
        assert!(ctx.is_current());
        assert!(!ctx.is_suspended());
    }

    #[test]
    fn test_current_thread_does_not_depend_on_caller()
    {
        let here = ProcessContext::current().thread_id();
        let there = std::thread::spawn(|| ProcessContext::current().thread_id()).join().unwrap();
        assert_eq!(here, there);
    }

    #[test]
    fn test_resume_attached_is_rejected()
    {
        let mut ctx = ProcessContext::current();
        assert!(matches!(ctx.resume(), Err(RemoraError::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_inputs_are_rejected()
    {
        assert!(matches!(
            ProcessContext::launch("", Vec::<String>::new()),
            Err(RemoraError::InvalidArgument(_))
        ));
        assert!(matches!(ProcessContext::attach_by_name(""), Err(RemoraError::InvalidArgument(_))));
    }

    #[test]
    fn test_relative_path_is_anchored_at_cwd()
    {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("bin/game")).unwrap(), cwd.join("bin/game"));
        #[cfg(unix)]
        assert_eq!(absolute(Path::new("/opt/game")).unwrap(), PathBuf::from("/opt/game"));
    }
}
