//! # Mach and libc FFI Declarations
//!
//! Functions that neither `mach2` nor `libc` expose. `task_for_pid` is left
//! out of the standard bindings because it needs special permissions; the
//! spawn helpers are Apple extensions.
//!
//! ## References
//!
//! - [Apple Mach Kernel Programming](https://developer.apple.com/library/archive/documentation/Darwin/Conceptual/KernelProgramming/Mach/Mach.html)
//! - [posix_spawn(2) man page](https://developer.apple.com/library/archive/documentation/System/Conceptual/ManPages_iPhoneOS/man2/posix_spawn.2.html)

use libc::{c_char, c_int, c_short, mach_port_t, pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};
use mach2::kern_return::kern_return_t;

#[link(name = "c", kind = "dylib")]
extern "C" {
    /// Get the task port of `pid`
    pub fn task_for_pid(target_task: mach_port_t, pid: c_int, task: *mut mach_port_t) -> kern_return_t;

    pub fn mach_port_deallocate(target_task: mach_port_t, name: mach_port_t) -> kern_return_t;
}

#[link(name = "c", kind = "dylib")]
extern "C" {
    pub fn posix_spawn(
        pid: *mut pid_t,
        path: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> c_int;

    pub fn posix_spawnattr_init(attrp: *mut posix_spawnattr_t) -> c_int;

    pub fn posix_spawnattr_destroy(attrp: *mut posix_spawnattr_t) -> c_int;

    pub fn posix_spawnattr_setflags(attrp: *mut posix_spawnattr_t, flags: c_short) -> c_int;

    /// Change directory in the child before exec (macOS 10.15+)
    pub fn posix_spawn_file_actions_addchdir_np(
        file_actions: *mut posix_spawn_file_actions_t,
        path: *const c_char,
    ) -> c_int;

    /// Pointer to the calling process's `environ`
    pub fn _NSGetEnviron() -> *mut *const *const c_char;
}

pub mod spawn_flags
{
    use libc::c_short;

    /// Create the task suspended; it runs after `task_resume()`
    pub const POSIX_SPAWN_START_SUSPENDED: c_short = 0x0080;
}
