//! # macOS Backend
//!
//! Process control and memory access through Mach task ports.
//!
//! | Primitive | API |
//! |---|---|
//! | launch suspended | `posix_spawn` + `POSIX_SPAWN_START_SUSPENDED` (see [`launch`]) |
//! | resume | `task_resume()` |
//! | attach | `task_for_pid()` + `task_threads()` |
//! | allocate / free | `mach_vm_allocate()` / `mach_vm_deallocate()` |
//! | read / write | `mach_vm_read_overwrite()` / `mach_vm_write()` |
//! | protection | `mach_vm_region()` / `mach_vm_protect()` |
//!
//! We mix `mach2` for the maintained bindings, `libc` for type definitions
//! and our own [`ffi`] declarations for restricted functions.
//!
//! ## Permissions
//!
//! `task_for_pid()` on any task other than our own needs root or the
//! `com.apple.security.cs.debugger` entitlement.

pub mod error;
pub mod ffi;
pub mod launch;

use std::cmp::min;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::{self, Error, ErrorKind};
use std::path::Path;
use std::sync::Mutex;

use libc::{c_int, mach_msg_type_number_t, mach_port_t, thread_act_t, vm_address_t};
use mach2::kern_return::{self, KERN_SUCCESS};
use mach2::task::{task_resume, task_threads};
use mach2::traps::mach_task_self;
use mach2::vm::{mach_vm_allocate, mach_vm_deallocate, mach_vm_protect, mach_vm_read_overwrite, mach_vm_region, mach_vm_write};
use mach2::vm_region::{vm_region_basic_info_data_64_t, vm_region_info_t, VM_REGION_BASIC_INFO_64, VM_REGION_BASIC_INFO_COUNT_64};
use mach2::vm_statistics::VM_FLAGS_ANYWHERE;
use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t};
use tracing::{debug, info, warn};

pub use self::error::MachError;
use crate::error::{RemoraError, Result};
use crate::memory::clip_regions;
use crate::platform::page::aligned_range;
use crate::platform::reap_if_exited;
use crate::types::{Address, ProcessId, Protection, ProtectionRegion, ThreadId};

/// Largest single `mach_vm_read_overwrite()` request
const MAX_VM_READ_CHUNK: usize = 16 * 1024 * 1024;

/// Task and thread ports for one target process on macOS
pub(crate) struct NativeProcess
{
    pid: ProcessId,
    task: mach_port_t,
    thread: thread_act_t,
    /// Our own task port is never deallocated
    owns_task: bool,
    /// False for the calling thread's port name, which holds no extra reference
    owns_thread: bool,
    /// Base address to length of regions allocated through this context
    allocations: Mutex<HashMap<u64, usize>>,
    /// Our own child, to be reaped once it exits
    launched: bool,
}

fn kern_io(code: kern_return::kern_return_t) -> io::Result<()>
{
    error::check(code).map_err(io::Error::from)
}

/// Free the array `task_threads()` allocated in our address space
fn deallocate_threads_array(threads: *mut thread_act_t, count: mach_msg_type_number_t)
{
    if threads.is_null() || count == 0 {
        return;
    }
    let size = (count as usize) * std::mem::size_of::<thread_act_t>();
    // SAFETY: the array was allocated by the kernel in our task
    unsafe {
        let _ = mach_vm_deallocate(mach_task_self(), threads as vm_address_t as mach_vm_address_t, size as mach_vm_size_t);
    }
}

/// First thread port of `task`, releasing the rest
fn first_thread(task: mach_port_t) -> Result<thread_act_t>
{
    // SAFETY: out-pointers are valid; the returned array is released before leaving
    unsafe {
        let mut threads: *mut thread_act_t = std::ptr::null_mut();
        let mut thread_count: mach_msg_type_number_t = 0;
        let result = task_threads(task, &mut threads, &mut thread_count);
        if result != KERN_SUCCESS || thread_count == 0 {
            deallocate_threads_array(threads, thread_count);
            return Err(RemoraError::MachError(MachError::from(result)));
        }

        let slice = std::slice::from_raw_parts(threads, thread_count as usize);
        let first = slice[0];
        for extra in &slice[1..] {
            let _ = ffi::mach_port_deallocate(mach_task_self(), *extra);
        }
        deallocate_threads_array(threads, thread_count);
        Ok(first)
    }
}

fn task_for(pid: ProcessId) -> Result<mach_port_t>
{
    let mut task: mach_port_t = 0;
    // SAFETY: task is a valid out-pointer
    let result = unsafe { ffi::task_for_pid(mach_task_self(), pid.0 as c_int, &mut task) };
    if result == KERN_SUCCESS {
        return Ok(task);
    }

    // task_for_pid() reports missing permission as KERN_FAILURE too
    // SAFETY: signal 0 only checks for existence
    let exists = unsafe { libc::kill(pid.0 as libc::pid_t, 0) } == 0
        || Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    if !exists {
        return Err(RemoraError::ProcessNotFound(format!("pid {pid}")));
    }
    Err(RemoraError::AccessDenied {
        pid,
        source: MachError::from(result).into(),
    })
}

impl NativeProcess
{
    pub(crate) fn launch(path: &Path, args: &[OsString]) -> Result<Self>
    {
        let pid = launch::spawn_suspended(path, args).map_err(|source| RemoraError::LaunchFailed {
            path: path.display().to_string(),
            source,
        })?;

        match Self::open(pid) {
            Ok(mut process) => {
                process.launched = true;
                info!(%pid, path = %path.display(), "Launched suspended process");
                Ok(process)
            }
            Err(err) => {
                // Don't leave a suspended orphan behind
                // SAFETY: pid is our own child
                unsafe {
                    libc::kill(pid.0 as libc::pid_t, libc::SIGKILL);
                }
                Err(RemoraError::LaunchFailed {
                    path: path.display().to_string(),
                    source: Error::new(ErrorKind::PermissionDenied, err.to_string()),
                })
            }
        }
    }

    pub(crate) fn open(pid: ProcessId) -> Result<Self>
    {
        let task = task_for(pid)?;
        let thread = match first_thread(task) {
            Ok(thread) => thread,
            Err(err) => {
                // SAFETY: we own the task port
                unsafe {
                    let _ = ffi::mach_port_deallocate(mach_task_self(), task);
                }
                return Err(err);
            }
        };

        info!(%pid, task, thread, "Attached to process");
        Ok(Self {
            pid,
            task,
            thread,
            owns_task: true,
            owns_thread: true,
            allocations: Mutex::new(HashMap::new()),
            launched: false,
        })
    }

    pub(crate) fn current() -> Self
    {
        // SAFETY: returns the caller's own task port name
        let task = unsafe { mach_task_self() };

        // The primary thread is the first one task_threads() lists, as for attach
        let (thread, owns_thread) = match first_thread(task) {
            Ok(thread) => (thread, true),
            Err(err) => {
                debug!(error = %err, "task_threads() failed, using the calling thread");
                // SAFETY: only returns the port name of the calling thread
                (unsafe { libc::pthread_mach_thread_np(libc::pthread_self()) }, false)
            }
        };

        Self {
            pid: ProcessId::current(),
            task,
            thread,
            owns_task: false,
            owns_thread,
            allocations: Mutex::new(HashMap::new()),
            launched: false,
        }
    }

    pub(crate) fn pid(&self) -> ProcessId
    {
        self.pid
    }

    /// The thread's port name in our IPC space
    pub(crate) fn thread_id(&self) -> ThreadId
    {
        ThreadId(u64::from(self.thread))
    }

    pub(crate) fn resume(&mut self) -> Result<()>
    {
        // SAFETY: the task port is valid for the lifetime of self
        let result = unsafe { task_resume(self.task) };
        if result != KERN_SUCCESS {
            return Err(RemoraError::ResumeFailed(format!("task_resume() failed: {}", MachError::from(result))));
        }
        debug!(pid = %self.pid, "Resumed task");
        Ok(())
    }

    pub(crate) fn allocate(&self, len: usize, protection: Protection) -> io::Result<Address>
    {
        let mut address: mach_vm_address_t = 0;
        // SAFETY: the kernel picks the address
        unsafe {
            kern_io(mach_vm_allocate(self.task, &mut address, len as mach_vm_size_t, VM_FLAGS_ANYWHERE))?;
        }

        // New pages are read/write; apply the requested protection
        // SAFETY: range was just allocated
        let result = unsafe { mach_vm_protect(self.task, address, len as mach_vm_size_t, 0, protection.raw() as c_int) };
        if let Err(err) = kern_io(result) {
            // SAFETY: same range as above
            unsafe {
                let _ = mach_vm_deallocate(self.task, address, len as mach_vm_size_t);
            }
            return Err(err);
        }

        self.allocations
            .lock()
            .map_err(|_| Error::other("allocation table poisoned"))?
            .insert(address, len);
        Ok(Address::from(address))
    }

    pub(crate) fn release(&self, address: Address) -> io::Result<()>
    {
        let mut allocations = self.allocations.lock().map_err(|_| Error::other("allocation table poisoned"))?;
        let len = allocations
            .get(&address.value())
            .copied()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("{address} was not allocated by this context")))?;

        // SAFETY: range was returned by mach_vm_allocate with this length
        kern_io(unsafe { mach_vm_deallocate(self.task, address.value(), len as mach_vm_size_t) })?;
        allocations.remove(&address.value());
        Ok(())
    }

    pub(crate) fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize>
    {
        let mut total = 0usize;
        let mut cursor = address.value();

        while total < buf.len() {
            let chunk_len = min(MAX_VM_READ_CHUNK, buf.len() - total);
            let mut actual: mach_vm_size_t = 0;
            // SAFETY: destination covers chunk_len bytes of buf
            let result = unsafe {
                mach_vm_read_overwrite(
                    self.task,
                    cursor,
                    chunk_len as mach_vm_size_t,
                    buf[total..].as_mut_ptr() as mach_vm_address_t,
                    &mut actual,
                )
            };
            if result != KERN_SUCCESS {
                if total == 0 {
                    return Err(MachError::from(result).into());
                }
                break;
            }
            if actual == 0 {
                break;
            }
            total += actual as usize;
            cursor += actual;
        }

        Ok(total)
    }

    pub(crate) fn write(&self, address: Address, data: &[u8]) -> io::Result<usize>
    {
        // SAFETY: data is valid for data.len() bytes and only read by the kernel
        kern_io(unsafe {
            mach_vm_write(
                self.task,
                address.value(),
                data.as_ptr() as usize,
                data.len() as mach_msg_type_number_t,
            )
        })?;
        Ok(data.len())
    }

    /// The region at or above `address`, as `mach_vm_region` reports it
    fn region_from(&self, address: mach_vm_address_t) -> io::Result<ProtectionRegion>
    {
        let mut region = address;
        let mut size: mach_vm_size_t = 0;
        let mut info = vm_region_basic_info_data_64_t::default();
        let mut count = VM_REGION_BASIC_INFO_COUNT_64;
        let mut object_name: mach_port_t = 0;

        // SAFETY: all out-pointers are valid; info matches the requested flavor
        kern_io(unsafe {
            mach_vm_region(
                self.task,
                &mut region,
                &mut size,
                VM_REGION_BASIC_INFO_64,
                &mut info as *mut _ as vm_region_info_t,
                &mut count,
                &mut object_name,
            )
        })?;

        Ok(ProtectionRegion::new(
            Address::from(region),
            size as usize,
            Protection::from_raw(info.protection as u32),
        ))
    }

    pub(crate) fn protection_map(&self, address: Address, len: usize) -> io::Result<Vec<ProtectionRegion>>
    {
        let end = address.value().saturating_add(len.max(1) as u64);
        let mut cursor = address.value();
        let mut regions = Vec::new();

        while cursor < end {
            let region = self.region_from(cursor)?;
            // mach_vm_region moves forward to the next region when cursor is unmapped
            if region.address.value() > cursor {
                return Err(Error::new(ErrorKind::NotFound, format!("{} is not mapped", Address::from(cursor))));
            }
            let region_end = region.end().value();
            regions.push(region);
            if region_end <= cursor {
                break;
            }
            cursor = region_end;
        }

        clip_regions(address, len, regions)
    }

    pub(crate) fn protect(&self, address: Address, len: usize, protection: Protection) -> io::Result<Vec<ProtectionRegion>>
    {
        let previous = self.protection_map(address, len)?;
        let (start, aligned_len) = aligned_range(address.value(), len);
        // SAFETY: mach_vm_protect validates the range
        kern_io(unsafe { mach_vm_protect(self.task, start, aligned_len as mach_vm_size_t, 0, protection.raw() as c_int) })?;
        Ok(previous)
    }
}

impl Drop for NativeProcess
{
    fn drop(&mut self)
    {
        // SAFETY: owned ports came from task_for_pid()/task_threads() and are released once
        unsafe {
            if self.owns_thread {
                let result = ffi::mach_port_deallocate(mach_task_self(), self.thread);
                if result != KERN_SUCCESS {
                    warn!(thread = self.thread, result, "Failed to release thread port");
                }
            }
            if self.owns_task {
                let result = ffi::mach_port_deallocate(mach_task_self(), self.task);
                if result != KERN_SUCCESS {
                    warn!(task = self.task, result, "Failed to release task port");
                }
            }
        }

        if self.launched && reap_if_exited(self.pid) {
            debug!(pid = %self.pid, "Reaped exited child");
        }
    }
}

/// First process, by ascending pid, whose name is `name`
pub(crate) fn find_process_by_name(name: &str) -> Result<Option<ProcessId>>
{
    use libproc::libproc::proc_pid::{listpids, ProcType};

    let mut pids = listpids(ProcType::ProcAllPIDS).map_err(Error::other)?;
    pids.sort_unstable();

    Ok(pids
        .into_iter()
        .filter(|pid| *pid != 0)
        .find(|pid| {
            let pid = *pid as i32;
            libproc::libproc::proc_pid::name(pid).is_ok_and(|found| found == name)
                || libproc::libproc::proc_pid::pidpath(pid)
                    .ok()
                    .and_then(|path| Path::new(&path).file_name().map(|file| file == name))
                    .unwrap_or(false)
        })
        .map(ProcessId))
}
