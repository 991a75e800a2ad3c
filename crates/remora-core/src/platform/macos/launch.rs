//! # macOS Process Launch
//!
//! `posix_spawn` with `POSIX_SPAWN_START_SUSPENDED` creates the task with its
//! threads suspended before the first user instruction. `task_resume()` on the
//! task port lets it run.

use std::ffi::{CString, OsString};
use std::io::{self, Error, ErrorKind};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use tracing::{debug, trace};

use crate::platform::macos::ffi;
use crate::types::ProcessId;

fn c_string(bytes: &[u8]) -> io::Result<CString>
{
    CString::new(bytes).map_err(|e| Error::new(ErrorKind::InvalidInput, e))
}

/// Owns spawn attributes and file actions until the call returns
struct SpawnConfig
{
    attr: libc::posix_spawnattr_t,
    file_actions: libc::posix_spawn_file_actions_t,
    file_actions_initialized: bool,
}

impl SpawnConfig
{
    fn new() -> io::Result<Self>
    {
        // SAFETY: both structures are opaque pointers initialised by the init calls below
        unsafe {
            let mut config = Self {
                attr: std::mem::zeroed(),
                file_actions: std::mem::zeroed(),
                file_actions_initialized: false,
            };

            let result = ffi::posix_spawnattr_init(&mut config.attr);
            if result != 0 {
                return Err(Error::from_raw_os_error(result));
            }

            let result = ffi::posix_spawnattr_setflags(&mut config.attr, ffi::spawn_flags::POSIX_SPAWN_START_SUSPENDED);
            if result != 0 {
                return Err(Error::from_raw_os_error(result));
            }

            let result = libc::posix_spawn_file_actions_init(&mut config.file_actions);
            if result != 0 {
                return Err(Error::from_raw_os_error(result));
            }
            config.file_actions_initialized = true;

            Ok(config)
        }
    }

    fn chdir(&mut self, dir: &CString) -> io::Result<()>
    {
        // SAFETY: file_actions is initialised and dir is NUL-terminated
        let result = unsafe { ffi::posix_spawn_file_actions_addchdir_np(&mut self.file_actions, dir.as_ptr()) };
        if result != 0 {
            return Err(Error::from_raw_os_error(result));
        }
        Ok(())
    }
}

impl Drop for SpawnConfig
{
    fn drop(&mut self)
    {
        // SAFETY: attr was initialised in new(); file_actions only when flagged
        unsafe {
            if self.file_actions_initialized {
                let _ = libc::posix_spawn_file_actions_destroy(&mut self.file_actions);
            }
            let _ = ffi::posix_spawnattr_destroy(&mut self.attr);
        }
    }
}

/// Spawn `path` with its task suspended
///
/// The working directory of the child is the directory holding the executable.
pub(crate) fn spawn_suspended(path: &Path, args: &[OsString]) -> io::Result<ProcessId>
{
    let program = c_string(path.as_os_str().as_bytes())?;
    let mut arg_cstrs = vec![program.clone()];
    for arg in args {
        arg_cstrs.push(c_string(arg.as_bytes())?);
    }
    let mut argv: Vec<*const libc::c_char> = arg_cstrs.iter().map(|s| s.as_ptr()).collect();
    argv.push(ptr::null());

    let mut config = SpawnConfig::new()?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        config.chdir(&c_string(dir.as_os_str().as_bytes())?)?;
    }

    trace!("Calling posix_spawn for {}", path.display());
    let mut pid: libc::pid_t = 0;
    // SAFETY: argv is NULL-terminated and every pointer outlives the call
    let result = unsafe {
        ffi::posix_spawn(
            &mut pid,
            program.as_ptr(),
            &config.file_actions,
            &config.attr,
            argv.as_ptr(),
            *ffi::_NSGetEnviron(),
        )
    };
    if result != 0 {
        return Err(Error::from_raw_os_error(result));
    }

    debug!(pid, "Spawned suspended task");
    Ok(ProcessId(pid as u32))
}
