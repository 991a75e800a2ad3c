//! # Linux Backend
//!
//! Process control and memory access through procfs, `ptrace` and the
//! memory-management syscalls.
//!
//! ## How each primitive maps
//!
//! | Primitive | Implementation |
//! |---|---|
//! | launch suspended | `PTRACE_TRACEME` + exec stop (see [`launch`]) |
//! | attach | open `/proc/<pid>/mem` read-write (ptrace access check) |
//! | read / write | positional I/O on `/proc/<pid>/mem`, falling back to `process_vm_readv`/`writev` |
//! | protection query | `/proc/<pid>/maps` |
//! | protection change | `mprotect` (calling process only) |
//! | allocate / free | `mmap` / `munmap` (calling process only) |
//!
//! Writes through `/proc/<pid>/mem` ignore page protection, so changing the
//! protection of a foreign process is not needed for safe operations and is
//! reported as a no-op that returns the current protection.
//!
//! Allocating in a foreign process would require injecting a syscall into it
//! and is refused with `ErrorKind::Unsupported`.

pub mod launch;
pub mod procfs;

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Error, ErrorKind};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::{RemoraError, Result};
use crate::memory::clip_regions;
use crate::platform::page::aligned_range;
use crate::platform::reap_if_exited;
use crate::types::{Address, ProcessId, Protection, ProtectionRegion, ThreadId};

/// OS handles for one target process on Linux
pub(crate) struct NativeProcess
{
    pid: ProcessId,
    thread: ThreadId,
    /// `/proc/<pid>/mem`; `None` only if procfs was unavailable for the calling process
    mem: Option<File>,
    /// Base address to length of regions mapped through this context
    allocations: Mutex<HashMap<u64, usize>>,
    /// Our own child, to be reaped once it exits
    launched: bool,
}

fn open_mem(pid: ProcessId) -> io::Result<File>
{
    OpenOptions::new().read(true).write(true).open(procfs::proc_dir(pid).join("mem"))
}

fn classify_open_error(pid: ProcessId, err: Error) -> RemoraError
{
    match err.kind() {
        ErrorKind::NotFound => RemoraError::ProcessNotFound(format!("pid {pid}")),
        _ => RemoraError::AccessDenied { pid, source: err },
    }
}

impl NativeProcess
{
    pub(crate) fn launch(path: &Path, args: &[OsString]) -> Result<Self>
    {
        let pid = launch::spawn_suspended(path, args).map_err(|source| RemoraError::LaunchFailed {
            path: path.display().to_string(),
            source,
        })?;

        let mem = match open_mem(pid) {
            Ok(file) => file,
            Err(source) => {
                // Don't leave a stopped orphan behind
                // SAFETY: pid is our own child
                unsafe {
                    libc::kill(pid.0 as libc::pid_t, libc::SIGKILL);
                }
                return Err(RemoraError::LaunchFailed {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        info!(%pid, path = %path.display(), "Launched suspended process");
        Ok(Self {
            pid,
            // The main thread's tid is the pid
            thread: ThreadId(u64::from(pid.0)),
            mem: Some(mem),
            allocations: Mutex::new(HashMap::new()),
            launched: true,
        })
    }

    pub(crate) fn open(pid: ProcessId) -> Result<Self>
    {
        if !procfs::proc_dir(pid).exists() {
            return Err(RemoraError::ProcessNotFound(format!("pid {pid}")));
        }

        let thread = procfs::first_thread(pid).map_err(|err| classify_open_error(pid, err))?;
        let mem = open_mem(pid).map_err(|err| classify_open_error(pid, err))?;

        info!(%pid, %thread, "Attached to process");
        Ok(Self {
            pid,
            thread,
            mem: Some(mem),
            allocations: Mutex::new(HashMap::new()),
            launched: false,
        })
    }

    pub(crate) fn current() -> Self
    {
        let pid = ProcessId::current();
        // Our own task directory is always readable; the main thread's tid is the pid
        let thread = procfs::first_thread(pid).unwrap_or(ThreadId(u64::from(pid.0)));
        let mem = match open_mem(pid) {
            Ok(file) => Some(file),
            Err(err) => {
                debug!(error = %err, "procfs unavailable, using process_vm_readv/writev");
                None
            }
        };

        Self {
            pid,
            thread,
            mem,
            allocations: Mutex::new(HashMap::new()),
            launched: false,
        }
    }

    pub(crate) fn pid(&self) -> ProcessId
    {
        self.pid
    }

    pub(crate) fn thread_id(&self) -> ThreadId
    {
        self.thread
    }

    pub(crate) fn resume(&mut self) -> Result<()>
    {
        launch::detach(self.pid).map_err(|err| RemoraError::ResumeFailed(format!("PTRACE_DETACH failed: {err}")))
    }

    fn is_self(&self) -> bool
    {
        self.pid == ProcessId::current()
    }

    pub(crate) fn allocate(&self, len: usize, protection: Protection) -> io::Result<Address>
    {
        if !self.is_self() {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "allocating in another process is not supported on Linux",
            ));
        }

        // SAFETY: anonymous private mapping at a kernel-chosen address
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                protection.raw() as libc::c_int,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::last_os_error());
        }

        let address = Address::from_ptr(ptr);
        self.allocations
            .lock()
            .map_err(|_| Error::other("allocation table poisoned"))?
            .insert(address.value(), len);
        Ok(address)
    }

    pub(crate) fn release(&self, address: Address) -> io::Result<()>
    {
        let mut allocations = self.allocations.lock().map_err(|_| Error::other("allocation table poisoned"))?;
        let len = allocations
            .get(&address.value())
            .copied()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("{address} was not allocated by this context")))?;

        // SAFETY: the range was returned by mmap with exactly this length
        if unsafe { libc::munmap(address.as_mut_ptr(), len) } != 0 {
            return Err(Error::last_os_error());
        }
        allocations.remove(&address.value());
        Ok(())
    }

    pub(crate) fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize>
    {
        match &self.mem {
            Some(file) => read_at_full(file, address.value(), buf),
            None => process_vm_read(self.pid, address, buf),
        }
    }

    pub(crate) fn write(&self, address: Address, data: &[u8]) -> io::Result<usize>
    {
        match &self.mem {
            Some(file) => write_at_full(file, address.value(), data),
            None => process_vm_write(self.pid, address, data),
        }
    }

    pub(crate) fn protection_map(&self, address: Address, len: usize) -> io::Result<Vec<ProtectionRegion>>
    {
        let maps = procfs::read_maps(self.pid)?;
        clip_regions(address, len, maps.iter().map(procfs::MapsEntry::region))
    }

    pub(crate) fn protect(&self, address: Address, len: usize, protection: Protection) -> io::Result<Vec<ProtectionRegion>>
    {
        let previous = self.protection_map(address, len)?;
        if !self.is_self() {
            debug!(pid = %self.pid, %address, "Leaving foreign page protection unchanged, /proc/<pid>/mem ignores it");
            return Ok(previous);
        }

        let (start, aligned_len) = aligned_range(address.value(), len);
        // SAFETY: mprotect validates the range itself and fails with ENOMEM for unmapped pages
        let result = unsafe {
            libc::mprotect(
                Address::from(start).as_mut_ptr(),
                aligned_len,
                protection.raw() as libc::c_int,
            )
        };
        if result != 0 {
            return Err(Error::last_os_error());
        }
        Ok(previous)
    }
}

impl Drop for NativeProcess
{
    fn drop(&mut self)
    {
        if self.launched && reap_if_exited(self.pid) {
            debug!(pid = %self.pid, "Reaped exited child");
        }
    }
}

fn read_at_full(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize>
{
    let mut total = 0usize;
    while total < buf.len() {
        match file.read_at(&mut buf[total..], offset.wrapping_add(total as u64)) {
            Ok(0) => break,
            Ok(read) => total += read,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) if total == 0 => return Err(err),
            Err(_) => break,
        }
    }
    Ok(total)
}

fn write_at_full(file: &File, offset: u64, data: &[u8]) -> io::Result<usize>
{
    let mut total = 0usize;
    while total < data.len() {
        match file.write_at(&data[total..], offset.wrapping_add(total as u64)) {
            Ok(0) => break,
            Ok(written) => total += written,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) if total == 0 => return Err(err),
            Err(_) => break,
        }
    }
    Ok(total)
}

fn process_vm_read(pid: ProcessId, address: Address, buf: &mut [u8]) -> io::Result<usize>
{
    let local = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };
    let remote = libc::iovec {
        iov_base: address.as_mut_ptr(),
        iov_len: buf.len(),
    };
    // SAFETY: the local iovec covers `buf`; the kernel validates the remote one
    let result = unsafe { libc::process_vm_readv(pid.0 as libc::pid_t, &local, 1, &remote, 1, 0) };
    usize::try_from(result).map_err(|_| Error::last_os_error())
}

fn process_vm_write(pid: ProcessId, address: Address, data: &[u8]) -> io::Result<usize>
{
    let local = libc::iovec {
        iov_base: data.as_ptr().cast_mut().cast(),
        iov_len: data.len(),
    };
    let remote = libc::iovec {
        iov_base: address.as_mut_ptr(),
        iov_len: data.len(),
    };
    // SAFETY: the local iovec covers `data` and is only read; the kernel validates the remote one
    let result = unsafe { libc::process_vm_writev(pid.0 as libc::pid_t, &local, 1, &remote, 1, 0) };
    usize::try_from(result).map_err(|_| Error::last_os_error())
}

/// First process, by ascending pid, whose image is called `name`
pub(crate) fn find_process_by_name(name: &str) -> Result<Option<ProcessId>>
{
    Ok(procfs::list_pids()?
        .into_iter()
        .find(|pid| procfs::process_matches(*pid, name)))
}
