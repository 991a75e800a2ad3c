//! # Linux Process Launch
//!
//! Launching a process stopped at its first instruction.
//!
//! The child calls `ptrace(PTRACE_TRACEME)` between `fork` and `exec`. The
//! kernel then stops it with `SIGTRAP` as soon as `execve` completes, before
//! any instruction of the new image runs. Releasing it is a
//! `ptrace(PTRACE_DETACH)`.
//!
//! ## ptrace and threads
//!
//! The tracer is the *thread* that spawned the child. `PTRACE_DETACH` (and so
//! [`ProcessContext::resume`](crate::ProcessContext::resume)) must be called
//! from that same thread.
//!
//! ## References
//!
//! - [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - [waitpid(2) man page](https://man7.org/linux/man-pages/man2/waitpid.2.html)

use std::ffi::OsString;
use std::io::{self, Error};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;
use std::ptr;

use tracing::{debug, trace};

use crate::types::ProcessId;

/// Spawn `path` stopped before its first instruction
///
/// The working directory of the child is the directory holding the executable.
pub(crate) fn spawn_suspended(path: &Path, args: &[OsString]) -> io::Result<ProcessId>
{
    let mut command = Command::new(path);
    command.args(args);
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        command.current_dir(dir);
    }

    // SAFETY: the closure runs between fork and exec and only issues the
    // async-signal-safe ptrace syscall.
    unsafe {
        command.pre_exec(|| {
            if libc::ptrace(libc::PTRACE_TRACEME, 0, ptr::null_mut::<libc::c_void>(), ptr::null_mut::<libc::c_void>()) == -1 {
                return Err(Error::last_os_error());
            }
            Ok(())
        });
    }

    trace!("Spawning {} with PTRACE_TRACEME", path.display());
    let mut child = command.spawn()?;
    let pid = child.id();

    match wait_for_exec_stop(pid) {
        Ok(()) => {
            debug!(pid, "Child stopped at exec");
            Ok(ProcessId(pid))
        }
        Err(err) => {
            // Best effort cleanup of a child we can't hand out
            let _ = child.kill();
            let _ = child.wait();
            Err(err)
        }
    }
}

fn wait_for_exec_stop(pid: u32) -> io::Result<()>
{
    let raw_pid = pid as libc::pid_t;
    let mut status: libc::c_int = 0;
    loop {
        // SAFETY: status is a valid out-pointer
        let result = unsafe { libc::waitpid(raw_pid, &mut status, 0) };
        if result == -1 {
            let err = Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        break;
    }

    if libc::WIFSTOPPED(status) && libc::WSTOPSIG(status) == libc::SIGTRAP {
        return Ok(());
    }
    if libc::WIFEXITED(status) {
        return Err(Error::other(format!(
            "process exited with status {} before reaching its entry point",
            libc::WEXITSTATUS(status)
        )));
    }
    Err(Error::other(format!("unexpected wait status 0x{status:x} after exec")))
}

/// Let a stopped, traced child run
pub(crate) fn detach(pid: ProcessId) -> io::Result<()>
{
    // SAFETY: PTRACE_DETACH takes no pointers; the data argument is the signal to deliver (none)
    let result = unsafe {
        libc::ptrace(
            libc::PTRACE_DETACH,
            pid.0 as libc::pid_t,
            ptr::null_mut::<libc::c_void>(),
            ptr::null_mut::<libc::c_void>(),
        )
    };
    if result == -1 {
        return Err(Error::last_os_error());
    }
    Ok(())
}
