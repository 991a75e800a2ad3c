//! # Platform-Specific Implementations
//!
//! Each platform has its own submodule built on that platform's native APIs:
//!
//! - **Linux**: `ptrace`, `/proc/<pid>/mem`, `/proc/<pid>/maps`, `mmap`/`mprotect`
//!   - See: [proc(5) man page](https://man7.org/linux/man-pages/man5/proc.5.html)
//! - **Windows**: `CreateProcessW`, `OpenProcess`, Toolhelp snapshots, `VirtualAllocEx` and friends
//!   - See: [Memory Management Functions](https://learn.microsoft.com/en-us/windows/win32/memory/memory-management-functions)
//! - **macOS**: Mach APIs (`task_for_pid`, `mach_vm_*`) and `posix_spawn`
//!   - See: [Apple Mach Kernel Programming](https://developer.apple.com/library/archive/documentation/Darwin/Conceptual/KernelProgramming/Mach/Mach.html)
//!
//! Every backend exposes the same crate-private `NativeProcess` type, which
//! owns the OS handles of one target and releases them on drop.
//! [`ProcessContext`](crate::ProcessContext) wraps it.

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux::{find_process_by_name, NativeProcess};

#[cfg(windows)]
pub mod windows;
#[cfg(windows)]
pub(crate) use self::windows::{find_process_by_name, NativeProcess};

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "macos")]
pub(crate) use macos::{find_process_by_name, NativeProcess};

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
compile_error!("remora-core supports Linux, macOS and Windows targets only");

/// Collect the exit status of a launched child that has already exited
///
/// Returns whether a status was collected. A child that is still running is
/// left alone; it becomes a zombie when it exits unless its parent waits for it.
#[cfg(unix)]
pub(crate) fn reap_if_exited(pid: crate::types::ProcessId) -> bool
{
    let mut status: libc::c_int = 0;
    // SAFETY: status is a valid out-pointer; WNOHANG never blocks
    let result = unsafe { libc::waitpid(pid.0 as libc::pid_t, &mut status, libc::WNOHANG) };
    result == pid.0 as libc::pid_t && (libc::WIFEXITED(status) || libc::WIFSIGNALED(status))
}

#[cfg(unix)]
pub(crate) mod page
{
    use once_cell::sync::Lazy;

    pub(crate) static SYSTEM_PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
        // SAFETY: sysconf has no preconditions
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).ok().filter(|size| *size > 0).unwrap_or(4096)
    });

    /// Expand `[address, address + len)` to whole pages.
    pub(crate) fn aligned_range(address: u64, len: usize) -> (u64, usize)
    {
        let page = *SYSTEM_PAGE_SIZE as u64;
        let start = address & !(page - 1);
        let end = address.saturating_add(len.max(1) as u64);
        let aligned_end = end.saturating_add(page - 1) & !(page - 1);
        (start, (aligned_end - start) as usize)
    }

    #[cfg(test)]
    mod tests
    {
        use super::*;

        #[test]
        fn test_aligned_range_covers_request()
        {
            let page = *SYSTEM_PAGE_SIZE as u64;
            let (start, len) = aligned_range(page + 10, 4);
            assert_eq!(start, page);
            assert_eq!(len as u64, page);

            let (start, len) = aligned_range(page - 2, 4);
            assert_eq!(start, 0);
            assert_eq!(len as u64, page * 2);
        }
    }
}
