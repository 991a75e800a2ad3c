//! # procfs Queries
//!
//! Process enumeration, thread listing and memory map parsing through `/proc`.
//!
//! - `/proc/<pid>/comm` and `/proc/<pid>/exe`: process name lookup
//! - `/proc/<pid>/task`: thread ids
//! - `/proc/<pid>/maps`: mapped regions and their permissions
//!
//! See: [proc(5) man page](https://man7.org/linux/man-pages/man5/proc.5.html)

use std::fs;
use std::io::{self, Error, ErrorKind};
use std::path::PathBuf;

use crate::types::{Address, ProcessId, Protection, ProtectionRegion, ThreadId};

pub(crate) fn proc_dir(pid: ProcessId) -> PathBuf
{
    PathBuf::from(format!("/proc/{}", pid.0))
}

fn numeric_entries(dir: PathBuf) -> io::Result<Vec<u32>>
{
    let mut ids: Vec<u32> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().and_then(|name| name.parse().ok()))
        .collect();
    ids.sort_unstable();
    Ok(ids)
}

/// Every live pid, ascending
pub(crate) fn list_pids() -> io::Result<Vec<ProcessId>>
{
    Ok(numeric_entries(PathBuf::from("/proc"))?.into_iter().map(ProcessId).collect())
}

/// The process's main thread, or its lowest tid if the main thread already exited
pub(crate) fn first_thread(pid: ProcessId) -> io::Result<ThreadId>
{
    let tids = numeric_entries(proc_dir(pid).join("task"))?;
    let tid = if tids.contains(&pid.0) {
        Some(pid.0)
    } else {
        tids.first().copied()
    };
    tid.map(|tid| ThreadId(u64::from(tid)))
        .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("process {pid} has no threads")))
}

/// Whether `pid` runs an image called `name`
///
/// Matches the kernel's `comm` (truncated to 15 bytes) or the file name of
/// the executable. Processes we may not inspect simply don't match.
pub(crate) fn process_matches(pid: ProcessId, name: &str) -> bool
{
    let dir = proc_dir(pid);
    if let Ok(comm) = fs::read_to_string(dir.join("comm")) {
        if comm.trim_end_matches('\n') == name {
            return true;
        }
    }

    fs::read_link(dir.join("exe"))
        .ok()
        .and_then(|exe| exe.file_name().map(|file| file == name))
        .unwrap_or(false)
}

/// A mapped region from `/proc/<pid>/maps`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MapsEntry
{
    pub start: u64,
    pub end: u64,
    pub protection: Protection,
}

impl MapsEntry
{
    pub fn region(&self) -> ProtectionRegion
    {
        ProtectionRegion::new(Address::from(self.start), (self.end - self.start) as usize, self.protection)
    }
}

/// Parse one line of `/proc/<pid>/maps`
///
/// `7f1c2a000000-7f1c2a021000 rw-p 00000000 00:00 0    [heap]`
pub(crate) fn parse_maps_line(line: &str) -> Option<MapsEntry>
{
    let mut fields = line.split_whitespace();
    let (start, end) = fields.next()?.split_once('-')?;
    let perms = fields.next()?.as_bytes();
    if perms.len() < 3 {
        return None;
    }

    Some(MapsEntry {
        start: u64::from_str_radix(start, 16).ok()?,
        end: u64::from_str_radix(end, 16).ok()?,
        protection: Protection::from_flags(perms[0] == b'r', perms[1] == b'w', perms[2] == b'x'),
    })
}

/// Every mapping of `pid`, in address order
pub(crate) fn read_maps(pid: ProcessId) -> io::Result<Vec<MapsEntry>>
{
    let maps = fs::read_to_string(proc_dir(pid).join("maps"))?;
    Ok(maps.lines().filter_map(parse_maps_line).collect())
}


#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_maps_line()
    {
        let entry = parse_maps_line("7f1c2a000000-7f1c2a021000 r-xp 00000000 08:01 131 /usr/lib/libc.so.6").unwrap();
        assert_eq!(entry.start, 0x7f1c_2a00_0000);
        assert_eq!(entry.end, 0x7f1c_2a02_1000);
        assert_eq!(entry.protection, Protection::read_execute());

        let anon = parse_maps_line("55d0c8e4b000-55d0c8e6c000 rw-p 00000000 00:00 0").unwrap();
        assert_eq!(anon.protection, Protection::read_write());

        assert!(parse_maps_line("garbage").is_none());
    }

    #[test]
    fn test_own_process_is_listed()
    {
        let own = ProcessId::current();
        assert!(list_pids().unwrap().contains(&own));
        assert_eq!(first_thread(own).unwrap(), ThreadId(u64::from(own.0)));
    }

    #[test]
    fn test_stack_variable_is_mapped_read_write()
    {
        let local = 0u64;
        let address = &local as *const u64 as u64;
        let maps = read_maps(ProcessId::current()).unwrap();
        assert!(maps.windows(2).all(|pair| pair[0].start < pair[1].start));

        let entry = maps.iter().find(|entry| entry.start <= address && address < entry.end).unwrap();
        assert!(entry.protection.is_readable() && entry.protection.is_writable());
        assert_eq!(entry.region().end(), Address::from(entry.end));
    }
}
