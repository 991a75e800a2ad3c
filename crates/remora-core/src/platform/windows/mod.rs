//! # Windows Backend
//!
//! Process control and memory access through the Win32 API.
//!
//! | Primitive | API |
//! |---|---|
//! | launch suspended | `CreateProcessW` with `CREATE_SUSPENDED` |
//! | resume | `ResumeThread` on the primary thread |
//! | attach | `OpenProcess(PROCESS_ALL_ACCESS)` + `OpenThread(THREAD_ALL_ACCESS)` |
//! | enumerate | `CreateToolhelp32Snapshot` + `Process32FirstW`/`Thread32First` |
//! | allocate / free | `VirtualAllocEx(MEM_COMMIT | MEM_RESERVE)` / `VirtualFreeEx(MEM_RELEASE)` |
//! | read / write | `ReadProcessMemory` / `WriteProcessMemory` |
//! | protection | `VirtualQueryEx` / `VirtualProtectEx` |
//!
//! ## References
//!
//! - [CreateProcessW](https://learn.microsoft.com/en-us/windows/win32/api/processthreadsapi/nf-processthreadsapi-createprocessw)
//! - [VirtualProtectEx](https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-virtualprotectex)

mod handle;

use std::ffi::{c_void, OsStr, OsString};
use std::io::{self, Error, ErrorKind};
use std::mem::size_of;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use ::windows::core::{PCWSTR, PWSTR};
use ::windows::Win32::Foundation::E_INVALIDARG;
use ::windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use ::windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, Thread32First, Thread32Next, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use ::windows::Win32::System::Memory::{
    VirtualAllocEx, VirtualFreeEx, VirtualProtectEx, VirtualQueryEx, MEMORY_BASIC_INFORMATION, MEM_COMMIT,
    MEM_RELEASE, MEM_RESERVE, PAGE_PROTECTION_FLAGS,
};
use ::windows::Win32::System::Threading::{
    CreateProcessW, GetCurrentProcess, GetCurrentThread, GetCurrentThreadId, OpenProcess, OpenThread, ResumeThread,
    CREATE_SUSPENDED, PROCESS_ALL_ACCESS, PROCESS_INFORMATION, STARTUPINFOW, THREAD_ALL_ACCESS,
};
use handle::OwnedHandle;
use tracing::{debug, info};

use crate::error::{RemoraError, Result};
use crate::memory::clip_regions;
use crate::types::{Address, ProcessId, Protection, ProtectionRegion, ThreadId};

/// OS handles for one target process on Windows
pub(crate) struct NativeProcess
{
    pid: ProcessId,
    thread: ThreadId,
    process: OwnedHandle,
    thread_handle: OwnedHandle,
}

/// Convert a `windows` crate error into the Win32 error it wraps
fn os_error(err: &::windows::core::Error) -> Error
{
    let code = err.code().0;
    // HRESULT_FROM_WIN32 keeps the Win32 code in the low word
    if (code as u32) & 0xFFFF_0000 == 0x8007_0000 {
        Error::from_raw_os_error(code & 0xFFFF)
    } else {
        Error::other(err.to_string())
    }
}

fn wide(value: &OsStr) -> Vec<u16>
{
    value.encode_wide().chain(std::iter::once(0)).collect()
}

/// Quote one argument the way `CommandLineToArgvW` parses it back
fn push_quoted(cmdline: &mut Vec<u16>, arg: &OsStr)
{
    let units: Vec<u16> = arg.encode_wide().collect();
    let needs_quotes = units.is_empty()
        || units
            .iter()
            .any(|&u| u == u16::from(b' ') || u == u16::from(b'\t') || u == u16::from(b'"'));
    if !needs_quotes {
        cmdline.extend_from_slice(&units);
        return;
    }

    cmdline.push(u16::from(b'"'));
    let mut backslashes = 0usize;
    for &unit in &units {
        if unit == u16::from(b'\\') {
            backslashes += 1;
            continue;
        }
        if unit == u16::from(b'"') {
            cmdline.extend(std::iter::repeat(u16::from(b'\\')).take(backslashes * 2 + 1));
        } else {
            cmdline.extend(std::iter::repeat(u16::from(b'\\')).take(backslashes));
        }
        backslashes = 0;
        cmdline.push(unit);
    }
    cmdline.extend(std::iter::repeat(u16::from(b'\\')).take(backslashes * 2));
    cmdline.push(u16::from(b'"'));
}

fn build_command_line(path: &Path, args: &[OsString]) -> Vec<u16>
{
    let mut cmdline = Vec::new();
    push_quoted(&mut cmdline, path.as_os_str());
    for arg in args {
        cmdline.push(u16::from(b' '));
        push_quoted(&mut cmdline, arg);
    }
    cmdline.push(0);
    cmdline
}

fn first_thread_of(pid: ProcessId) -> io::Result<Option<u32>>
{
    // SAFETY: snapshot handle is owned and closed by OwnedHandle; entry sizes are set before each call
    unsafe {
        let snapshot = OwnedHandle::new(CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0).map_err(|e| os_error(&e))?);
        let mut entry = THREADENTRY32 {
            dwSize: size_of::<THREADENTRY32>() as u32,
            ..Default::default()
        };

        if Thread32First(snapshot.raw(), &mut entry).is_err() {
            return Ok(None);
        }
        loop {
            if entry.th32OwnerProcessID == pid.0 {
                return Ok(Some(entry.th32ThreadID));
            }
            entry.dwSize = size_of::<THREADENTRY32>() as u32;
            if Thread32Next(snapshot.raw(), &mut entry).is_err() {
                return Ok(None);
            }
        }
    }
}

fn exe_name(entry: &PROCESSENTRY32W) -> String
{
    let len = entry.szExeFile.iter().position(|&c| c == 0).unwrap_or(entry.szExeFile.len());
    String::from_utf16_lossy(&entry.szExeFile[..len])
}

fn name_matches(exe: &str, name: &str) -> bool
{
    exe.eq_ignore_ascii_case(name)
        || exe
            .len()
            .checked_sub(4)
            .filter(|stem| exe.is_char_boundary(*stem))
            .map_or(false, |stem| exe[stem..].eq_ignore_ascii_case(".exe") && exe[..stem].eq_ignore_ascii_case(name))
}

/// First snapshot entry whose executable name is `name`
///
/// Case-insensitive; the `.exe` suffix is optional.
pub(crate) fn find_process_by_name(name: &str) -> Result<Option<ProcessId>>
{
    // SAFETY: see first_thread_of
    unsafe {
        let snapshot = OwnedHandle::new(CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).map_err(|e| os_error(&e))?);
        let mut entry = PROCESSENTRY32W {
            dwSize: size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        if Process32FirstW(snapshot.raw(), &mut entry).is_err() {
            return Ok(None);
        }
        loop {
            if name_matches(&exe_name(&entry), name) {
                return Ok(Some(ProcessId(entry.th32ProcessID)));
            }
            entry.dwSize = size_of::<PROCESSENTRY32W>() as u32;
            if Process32NextW(snapshot.raw(), &mut entry).is_err() {
                return Ok(None);
            }
        }
    }
}

impl NativeProcess
{
    pub(crate) fn launch(path: &Path, args: &[OsString]) -> Result<Self>
    {
        let launch_failed = |source: Error| RemoraError::LaunchFailed {
            path: path.display().to_string(),
            source,
        };

        let application = wide(path.as_os_str());
        let mut cmdline = build_command_line(path, args);
        let working_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| wide(dir.as_os_str()));

        let startup_info = STARTUPINFOW {
            cb: size_of::<STARTUPINFOW>() as u32,
            ..Default::default()
        };
        let mut process_info = PROCESS_INFORMATION::default();

        // SAFETY: every pointer refers to a NUL-terminated buffer that outlives the call
        unsafe {
            CreateProcessW(
                PCWSTR(application.as_ptr()),
                PWSTR(cmdline.as_mut_ptr()),
                None,
                None,
                false,
                CREATE_SUSPENDED,
                None,
                working_dir.as_ref().map_or(PCWSTR::null(), |dir| PCWSTR(dir.as_ptr())),
                &startup_info,
                &mut process_info,
            )
        }
        .map_err(|e| launch_failed(os_error(&e)))?;

        info!(pid = process_info.dwProcessId, path = %path.display(), "Launched suspended process");
        Ok(Self {
            pid: ProcessId(process_info.dwProcessId),
            thread: ThreadId(u64::from(process_info.dwThreadId)),
            process: OwnedHandle::new(process_info.hProcess),
            thread_handle: OwnedHandle::new(process_info.hThread),
        })
    }

    pub(crate) fn open(pid: ProcessId) -> Result<Self>
    {
        // SAFETY: OpenProcess takes no pointers
        let process = unsafe { OpenProcess(PROCESS_ALL_ACCESS, false, pid.0) }.map_err(|e| {
            if e.code() == E_INVALIDARG {
                RemoraError::ProcessNotFound(format!("pid {pid}"))
            } else {
                RemoraError::AccessDenied {
                    pid,
                    source: os_error(&e),
                }
            }
        })?;
        let process = OwnedHandle::new(process);

        let tid = first_thread_of(pid)
            .map_err(|source| RemoraError::AccessDenied { pid, source })?
            .ok_or_else(|| RemoraError::ProcessNotFound(format!("pid {pid} has no threads")))?;

        // SAFETY: OpenThread takes no pointers
        let thread_handle = unsafe { OpenThread(THREAD_ALL_ACCESS, false, tid) }.map_err(|e| RemoraError::AccessDenied {
            pid,
            source: os_error(&e),
        })?;

        info!(%pid, tid, "Attached to process");
        Ok(Self {
            pid,
            thread: ThreadId(u64::from(tid)),
            process,
            thread_handle: OwnedHandle::new(thread_handle),
        })
    }

    pub(crate) fn current() -> Self
    {
        let pid = ProcessId::current();
        // SAFETY: the pseudo handle getter has no preconditions
        let process = unsafe { OwnedHandle::borrowed(GetCurrentProcess()) };

        // The primary thread is the first one the snapshot lists, as for attach
        let primary = first_thread_of(pid).ok().flatten().and_then(|tid| {
            // SAFETY: OpenThread takes no pointers
            unsafe { OpenThread(THREAD_ALL_ACCESS, false, tid) }
                .ok()
                .map(|handle| (tid, OwnedHandle::new(handle)))
        });

        let (tid, thread_handle) = match primary {
            Some(primary) => primary,
            None => {
                debug!("Thread snapshot unavailable, using the calling thread");
                // SAFETY: pseudo handle getters have no preconditions
                unsafe { (GetCurrentThreadId(), OwnedHandle::borrowed(GetCurrentThread())) }
            }
        };

        Self {
            pid,
            thread: ThreadId(u64::from(tid)),
            process,
            thread_handle,
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
        // SAFETY: the thread handle is valid for the lifetime of self
        let previous_count = unsafe { ResumeThread(self.thread_handle.raw()) };
        if previous_count == u32::MAX {
            return Err(RemoraError::ResumeFailed(format!(
                "ResumeThread failed: {}",
                Error::last_os_error()
            )));
        }
        debug!(pid = %self.pid, previous_count, "Resumed primary thread");
        Ok(())
    }

    pub(crate) fn allocate(&self, len: usize, protection: Protection) -> io::Result<Address>
    {
        // SAFETY: the kernel picks the address; no local memory is touched
        let ptr = unsafe {
            VirtualAllocEx(
                self.process.raw(),
                None,
                len,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_PROTECTION_FLAGS(protection.raw()),
            )
        };
        if ptr.is_null() {
            return Err(Error::last_os_error());
        }
        Ok(Address::from_ptr(ptr))
    }

    pub(crate) fn release(&self, address: Address) -> io::Result<()>
    {
        // SAFETY: VirtualFreeEx validates the address against the target's allocations
        unsafe { VirtualFreeEx(self.process.raw(), address.as_mut_ptr::<c_void>(), 0, MEM_RELEASE) }
            .map_err(|e| os_error(&e))
    }

    pub(crate) fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize>
    {
        let mut read = 0usize;
        // SAFETY: buf is valid for buf.len() bytes
        let result = unsafe {
            ReadProcessMemory(
                self.process.raw(),
                address.as_ptr::<c_void>(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                Some(&mut read),
            )
        };
        match result {
            Ok(()) => Ok(read),
            // ERROR_PARTIAL_COPY still reports what made it across
            Err(_) if read > 0 => Ok(read),
            Err(e) => Err(os_error(&e)),
        }
    }

    pub(crate) fn write(&self, address: Address, data: &[u8]) -> io::Result<usize>
    {
        let mut written = 0usize;
        // SAFETY: data is valid for data.len() bytes
        let result = unsafe {
            WriteProcessMemory(
                self.process.raw(),
                address.as_ptr::<c_void>(),
                data.as_ptr().cast(),
                data.len(),
                Some(&mut written),
            )
        };
        match result {
            Ok(()) => Ok(written),
            Err(_) if written > 0 => Ok(written),
            Err(e) => Err(os_error(&e)),
        }
    }

    fn query(&self, address: Address) -> io::Result<MEMORY_BASIC_INFORMATION>
    {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        // SAFETY: info is a valid out-buffer of the size passed
        let written = unsafe {
            VirtualQueryEx(
                self.process.raw(),
                Some(address.as_ptr::<c_void>()),
                &mut info,
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            return Err(Error::last_os_error());
        }
        Ok(info)
    }

    pub(crate) fn protection_map(&self, address: Address, len: usize) -> io::Result<Vec<ProtectionRegion>>
    {
        let end = address.value().saturating_add(len.max(1) as u64);
        let mut cursor = address.value();
        let mut regions = Vec::new();

        while cursor < end {
            let info = self.query(Address::from(cursor))?;
            if info.State != MEM_COMMIT {
                return Err(Error::new(ErrorKind::NotFound, format!("{} is not committed", Address::from(cursor))));
            }
            let base = info.BaseAddress as usize as u64;
            let region_end = base.saturating_add(info.RegionSize as u64);
            regions.push(ProtectionRegion::new(
                Address::from(base),
                info.RegionSize,
                Protection::from_raw(info.Protect.0),
            ));
            if region_end <= cursor {
                break;
            }
            cursor = region_end;
        }

        clip_regions(address, len, regions)
    }

    fn protect_run(&self, address: Address, len: usize, protection: Protection) -> io::Result<()>
    {
        let mut previous = PAGE_PROTECTION_FLAGS(0);
        // SAFETY: previous is a valid out-pointer
        unsafe {
            VirtualProtectEx(
                self.process.raw(),
                address.as_ptr::<c_void>(),
                len,
                PAGE_PROTECTION_FLAGS(protection.raw()),
                &mut previous,
            )
        }
        .map_err(|e| os_error(&e))
    }

    /// Protect run by run, since `VirtualProtectEx` refuses ranges that span allocations
    pub(crate) fn protect(&self, address: Address, len: usize, protection: Protection) -> io::Result<Vec<ProtectionRegion>>
    {
        let previous = self.protection_map(address, len)?;
        for (done, run) in previous.iter().enumerate() {
            if let Err(err) = self.protect_run(run.address, run.len, protection) {
                // Undo the runs already changed
                for changed in &previous[..done] {
                    let _ = self.protect_run(changed.address, changed.len, changed.protection);
                }
                return Err(err);
            }
        }
        Ok(previous)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn utf16(value: &str) -> Vec<u16>
    {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }

    #[test]
    fn test_command_line_quoting()
    {
        let cmdline = build_command_line(
            Path::new(r"C:\Program Files\game.exe"),
            &[OsString::from("-windowed"), OsString::from("say \"hi\""), OsString::from(r"dir\")],
        );
        assert_eq!(cmdline, utf16(r#""C:\Program Files\game.exe" -windowed "say \"hi\"" dir\"#));
    }

    #[test]
    fn test_name_matching()
    {
        assert!(name_matches("Game.exe", "game.exe"));
        assert!(name_matches("Game.exe", "game"));
        assert!(!name_matches("Game.exe", "gam"));
        assert!(!name_matches("exe", "e"));
    }
}
