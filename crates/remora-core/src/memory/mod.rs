//! # Memory Access
//!
//! Allocate, free, read, write and scan memory of a target process.
//!
//! Every operation takes anything implementing [`ProcessMemory`], normally a
//! [`ProcessContext`](crate::ProcessContext). Operations are synchronous and
//! never retry.
//!
//! ## Variants
//!
//! - **External** (`read`, `write_bytes`, ...): cross the process boundary
//!   through the OS copy primitive. A short transfer is a failure.
//! - **Internal** (`read_internal`, ...): direct pointer copies for when the
//!   target *is* the calling process. These are `unsafe`.
//! - **Safe** (`read_safe`, `write_bytes_safe`, ...): set the range to
//!   read/write/execute, copy, then put every run of pages back to the
//!   protection it had. The restore runs on every exit path, including a
//!   failed copy.
//!
//! ## Concurrency
//!
//! Nothing here takes a lock. Two safe operations racing on overlapping pages
//! can each restore a protection value the other one set, so callers sharing a
//! context across threads must serialize those calls themselves.
//!
//! ## Example
//!
//! ```rust,no_run
//! use remora_core::{memory, ProcessContext};
//!
//! let ctx = ProcessContext::attach_by_name("game")?;
//! let base = memory::allocate(&ctx, 4096)?;
//! memory::write(&ctx, base, 1337u32)?;
//! assert_eq!(memory::read::<u32>(&ctx, base)?, 1337);
//! assert!(memory::free(&ctx, base));
//! # Ok::<(), remora_core::RemoraError>(())
//! ```

mod guard;

use std::cmp::min;
use std::io;

pub use guard::ProtectionGuard;
use tracing::{debug, trace};

use crate::error::{RemoraError, Result};
use crate::marshal::{self, Marshal};
use crate::pattern::Pattern;
use crate::types::{Address, ProcessId, Protection, ProtectionRegion};

/// Bytes read per step when scanning a live region
pub const SCAN_CHUNK: usize = 64 * 1024;

/// Cross-process memory primitives of a target
///
/// This is the seam between the accessor functions in this module and the
/// operating system. [`ProcessContext`](crate::ProcessContext) implements it
/// with native calls; tests implement it over an in-memory buffer.
pub trait ProcessMemory
{
    /// Target process id
    fn process_id(&self) -> ProcessId;

    /// Whether the target is the calling process
    fn is_current(&self) -> bool
    {
        self.process_id() == ProcessId::current()
    }

    /// Reserve and commit `len` bytes with the given protection.
    fn allocate(&self, len: usize, protection: Protection) -> io::Result<Address>;

    /// Release a region previously returned by [`ProcessMemory::allocate`].
    fn release(&self, address: Address) -> io::Result<()>;

    /// Copy bytes out of the target, returning how many were transferred.
    fn read_into(&self, address: Address, buf: &mut [u8]) -> io::Result<usize>;

    /// Copy bytes into the target, returning how many were transferred.
    fn write_from(&self, address: Address, data: &[u8]) -> io::Result<usize>;

    /// Protection of every run of pages overlapping `[address, address + len)`
    ///
    /// Runs come in address order, are clipped to the requested range and
    /// cover it without gaps. See [`clip_regions`] for building them from
    /// native region lists.
    fn protection_map(&self, address: Address, len: usize) -> io::Result<Vec<ProtectionRegion>>;

    /// Current protection of the page containing `address`.
    fn protection(&self, address: Address, len: usize) -> io::Result<Protection>
    {
        self.protection_map(address, len)?
            .first()
            .map(|region| region.protection)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{address} is not mapped")))
    }

    /// Change the protection of a range, returning the runs it had before.
    fn protect(&self, address: Address, len: usize, protection: Protection) -> io::Result<Vec<ProtectionRegion>>;
}

/// Clip native regions to `[address, address + len)` and merge equal neighbours
///
/// `regions` must be in ascending address order. A zero `len` is treated as
/// one byte, so the page holding `address` is always described.
///
/// ## Errors
///
/// `NotFound` if part of the range is not covered by any region.
pub fn clip_regions<I>(address: Address, len: usize, regions: I) -> io::Result<Vec<ProtectionRegion>>
where
    I: IntoIterator<Item = ProtectionRegion>,
{
    let end = address.value().saturating_add(len.max(1) as u64);
    let mut cursor = address.value();
    let mut runs: Vec<ProtectionRegion> = Vec::new();

    for region in regions {
        let region_start = region.address.value();
        let region_end = region.end().value();
        if region_end <= cursor {
            continue;
        }
        if region_start > cursor || cursor >= end {
            break;
        }

        let run_end = region_end.min(end);
        let run_len = (run_end - cursor) as usize;
        let merged = match runs.last_mut() {
            Some(last) if last.protection == region.protection => {
                last.len += run_len;
                true
            }
            _ => false,
        };
        if !merged {
            runs.push(ProtectionRegion::new(Address::from(cursor), run_len, region.protection));
        }
        cursor = run_end;
    }

    if cursor < end {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not mapped", Address::from(cursor)),
        ));
    }
    Ok(runs)
}

/// Reserve and commit `len` bytes of read/write/execute memory in the target
///
/// ## Errors
///
/// `AllocationFailed` if `len` is zero, the OS refuses, or it hands back a null address.
pub fn allocate(ctx: &(impl ProcessMemory + ?Sized), len: usize) -> Result<Address>
{
    if len == 0 {
        return Err(RemoraError::AllocationFailed { len, source: None });
    }

    match ctx.allocate(len, Protection::read_write_execute()) {
        Ok(address) if address.is_null() => Err(RemoraError::AllocationFailed { len, source: None }),
        Ok(address) => {
            debug!(pid = %ctx.process_id(), %address, len, "Allocated memory");
            Ok(address)
        }
        Err(source) => Err(RemoraError::AllocationFailed {
            len,
            source: Some(source),
        }),
    }
}

/// Release a region returned by [`allocate`]
///
/// Returns whether the OS confirmed the release. An address that was never
/// allocated yields `false` and changes nothing.
pub fn free(ctx: &(impl ProcessMemory + ?Sized), address: Address) -> bool
{
    match ctx.release(address) {
        Ok(()) => {
            debug!(pid = %ctx.process_id(), %address, "Released memory");
            true
        }
        Err(err) => {
            debug!(pid = %ctx.process_id(), %address, error = %err, "Release refused");
            false
        }
    }
}

/// Current protection of the page containing `address`
///
/// ## Errors
///
/// `Io` if the address is not mapped.
pub fn protection_at(ctx: &(impl ProcessMemory + ?Sized), address: Address, len: usize) -> Result<Protection>
{
    Ok(ctx.protection(address, len)?)
}

/// Protection of every run of pages in `[address, address + len)`
///
/// ## Errors
///
/// `Io` if part of the range is not mapped.
pub fn protection_map(ctx: &(impl ProcessMemory + ?Sized), address: Address, len: usize) -> Result<Vec<ProtectionRegion>>
{
    Ok(ctx.protection_map(address, len)?)
}

fn read_into_exact(ctx: &(impl ProcessMemory + ?Sized), address: Address, buf: &mut [u8]) -> Result<()>
{
    let len = buf.len();
    match ctx.read_into(address, buf) {
        Ok(read) if read == len => {
            trace!(%address, len, "Read memory");
            Ok(())
        }
        Ok(read) => Err(RemoraError::ReadFailed {
            address,
            len,
            source: Some(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("transferred {read} of {len} bytes"),
            )),
        }),
        Err(source) => Err(RemoraError::ReadFailed {
            address,
            len,
            source: Some(source),
        }),
    }
}

fn write_from_exact(ctx: &(impl ProcessMemory + ?Sized), address: Address, data: &[u8]) -> Result<()>
{
    let len = data.len();
    match ctx.write_from(address, data) {
        Ok(written) if written == len => {
            trace!(%address, len, "Wrote memory");
            Ok(())
        }
        Ok(written) => Err(RemoraError::WriteFailed {
            address,
            len,
            source: Some(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("transferred {written} of {len} bytes"),
            )),
        }),
        Err(source) => Err(RemoraError::WriteFailed {
            address,
            len,
            source: Some(source),
        }),
    }
}

/// Read `len` bytes from the target
///
/// ## Errors
///
/// `ReadFailed` if the copy fails or transfers fewer than `len` bytes.
pub fn read_bytes(ctx: &(impl ProcessMemory + ?Sized), address: Address, len: usize) -> Result<Vec<u8>>
{
    let mut buf = vec![0u8; len];
    if len > 0 {
        read_into_exact(ctx, address, &mut buf)?;
    }
    Ok(buf)
}

/// Read a value of type `T` from the target
///
/// ## Errors
///
/// `ReadFailed` if fewer than `T::SIZE` bytes could be copied.
pub fn read<T: Marshal>(ctx: &(impl ProcessMemory + ?Sized), address: Address) -> Result<T>
{
    marshal::from_bytes(&read_bytes(ctx, address, T::SIZE)?)
}

/// Write bytes into the target
///
/// Succeeds only if every byte was transferred.
///
/// ## Errors
///
/// `WriteFailed` if the copy fails or is short.
pub fn write_bytes(ctx: &(impl ProcessMemory + ?Sized), address: Address, data: &[u8]) -> Result<()>
{
    if data.is_empty() {
        return Ok(());
    }
    write_from_exact(ctx, address, data)
}

/// Write a value of type `T` into the target
pub fn write<T: Marshal>(ctx: &(impl ProcessMemory + ?Sized), address: Address, value: T) -> Result<()>
{
    write_bytes(ctx, address, &marshal::to_bytes(value))
}

/// Run `op` with the range made read/write/execute, restoring afterwards.
///
/// A failure from `op` wins over a restore failure; the restore is attempted
/// either way. `on_unprotect_error` builds the error when the protection
/// cannot be changed in the first place.
fn with_unprotected<M, R, F>(
    ctx: &M,
    address: Address,
    len: usize,
    on_unprotect_error: fn(Address, usize, io::Error) -> RemoraError,
    op: F,
) -> Result<R>
where
    M: ProcessMemory + ?Sized,
    F: FnOnce() -> Result<R>,
{
    let guard = ProtectionGuard::unprotect(ctx, address, len).map_err(|e| on_unprotect_error(address, len, e))?;
    let outcome = op();
    let restored = guard.restore();

    match (outcome, restored) {
        (Err(err), Err(restore_err)) => {
            tracing::warn!(%address, len, error = %restore_err, "Failed to restore page protection after failed copy");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
        (Ok(_), Err(source)) => Err(RemoraError::ProtectionRestoreFailed { address, len, source }),
        (Ok(value), Ok(())) => Ok(value),
    }
}

fn read_protect_error(address: Address, len: usize, source: io::Error) -> RemoraError
{
    RemoraError::ReadFailed {
        address,
        len,
        source: Some(source),
    }
}

fn write_protect_error(address: Address, len: usize, source: io::Error) -> RemoraError
{
    RemoraError::WriteFailed {
        address,
        len,
        source: Some(source),
    }
}

/// [`read_bytes`] with the range temporarily made read/write/execute
///
/// ## Errors
///
/// - `ReadFailed` if the protection can't be changed or the copy fails
/// - `ProtectionRestoreFailed` if the copy succeeded but the old protection couldn't be put back
pub fn read_bytes_safe(ctx: &(impl ProcessMemory + ?Sized), address: Address, len: usize) -> Result<Vec<u8>>
{
    if len == 0 {
        return Ok(Vec::new());
    }
    with_unprotected(ctx, address, len, read_protect_error, || read_bytes(ctx, address, len))
}

/// [`read`] with the range temporarily made read/write/execute
pub fn read_safe<T: Marshal>(ctx: &(impl ProcessMemory + ?Sized), address: Address) -> Result<T>
{
    marshal::from_bytes(&read_bytes_safe(ctx, address, T::SIZE)?)
}

/// [`write_bytes`] with the range temporarily made read/write/execute
///
/// ## Errors
///
/// - `WriteFailed` if the protection can't be changed or the copy fails
/// - `ProtectionRestoreFailed` if the copy succeeded but the old protection couldn't be put back
pub fn write_bytes_safe(ctx: &(impl ProcessMemory + ?Sized), address: Address, data: &[u8]) -> Result<()>
{
    if data.is_empty() {
        return Ok(());
    }
    with_unprotected(ctx, address, data.len(), write_protect_error, || {
        write_bytes(ctx, address, data)
    })
}

/// [`write`] with the range temporarily made read/write/execute
pub fn write_safe<T: Marshal>(ctx: &(impl ProcessMemory + ?Sized), address: Address, value: T) -> Result<()>
{
    write_bytes_safe(ctx, address, &marshal::to_bytes(value))
}

fn ensure_internal(ctx: &(impl ProcessMemory + ?Sized)) -> Result<()>
{
    if ctx.is_current() {
        Ok(())
    } else {
        Err(RemoraError::InvalidArgument(format!(
            "in-process access needs the current process, context targets pid {}",
            ctx.process_id()
        )))
    }
}

/// Read `len` bytes by direct copy from the calling process's address space
///
/// ## Safety
///
/// `address..address + len` must be mapped and readable in the calling
/// process for the duration of the call.
///
/// ## Errors
///
/// - `InvalidArgument` if `ctx` is not the calling process
/// - `ReadFailed` for a null address
pub unsafe fn read_bytes_internal(ctx: &(impl ProcessMemory + ?Sized), address: Address, len: usize) -> Result<Vec<u8>>
{
    ensure_internal(ctx)?;
    if len == 0 {
        return Ok(Vec::new());
    }
    if address.is_null() {
        return Err(RemoraError::ReadFailed {
            address,
            len,
            source: None,
        });
    }

    let mut buf = vec![0u8; len];
    std::ptr::copy_nonoverlapping(address.as_ptr::<u8>(), buf.as_mut_ptr(), len);
    trace!(%address, len, "Read memory in-process");
    Ok(buf)
}

/// Read a `T` by direct copy from the calling process's address space
///
/// ## Safety
///
/// See [`read_bytes_internal`].
pub unsafe fn read_internal<T: Marshal>(ctx: &(impl ProcessMemory + ?Sized), address: Address) -> Result<T>
{
    marshal::from_bytes(&read_bytes_internal(ctx, address, T::SIZE)?)
}

/// Write bytes by direct copy into the calling process's address space
///
/// ## Safety
///
/// `address..address + data.len()` must be mapped and writable in the calling
/// process, and nothing else may be reading or writing it concurrently.
///
/// ## Errors
///
/// - `InvalidArgument` if `ctx` is not the calling process
/// - `WriteFailed` for a null address
pub unsafe fn write_bytes_internal(ctx: &(impl ProcessMemory + ?Sized), address: Address, data: &[u8]) -> Result<()>
{
    ensure_internal(ctx)?;
    if data.is_empty() {
        return Ok(());
    }
    if address.is_null() {
        return Err(RemoraError::WriteFailed {
            address,
            len: data.len(),
            source: None,
        });
    }

    std::ptr::copy_nonoverlapping(data.as_ptr(), address.as_mut_ptr::<u8>(), data.len());
    trace!(%address, len = data.len(), "Wrote memory in-process");
    Ok(())
}

/// Write a `T` by direct copy into the calling process's address space
///
/// ## Safety
///
/// See [`write_bytes_internal`].
pub unsafe fn write_internal<T: Marshal>(ctx: &(impl ProcessMemory + ?Sized), address: Address, value: T) -> Result<()>
{
    write_bytes_internal(ctx, address, &marshal::to_bytes(value))
}

/// [`read_bytes_internal`] with the range temporarily made read/write/execute
///
/// ## Safety
///
/// The range must be mapped in the calling process. Readability is supplied
/// by the protection change.
pub unsafe fn read_bytes_safe_internal(ctx: &(impl ProcessMemory + ?Sized), address: Address, len: usize) -> Result<Vec<u8>>
{
    ensure_internal(ctx)?;
    if len == 0 {
        return Ok(Vec::new());
    }
    with_unprotected(ctx, address, len, read_protect_error, || unsafe {
        read_bytes_internal(ctx, address, len)
    })
}

/// [`read_internal`] with the range temporarily made read/write/execute
///
/// ## Safety
///
/// See [`read_bytes_safe_internal`].
pub unsafe fn read_safe_internal<T: Marshal>(ctx: &(impl ProcessMemory + ?Sized), address: Address) -> Result<T>
{
    marshal::from_bytes(&read_bytes_safe_internal(ctx, address, T::SIZE)?)
}

/// [`write_bytes_internal`] with the range temporarily made read/write/execute
///
/// ## Safety
///
/// The range must be mapped in the calling process and not concurrently
/// accessed. Writability is supplied by the protection change.
pub unsafe fn write_bytes_safe_internal(ctx: &(impl ProcessMemory + ?Sized), address: Address, data: &[u8]) -> Result<()>
{
    ensure_internal(ctx)?;
    if data.is_empty() {
        return Ok(());
    }
    with_unprotected(ctx, address, data.len(), write_protect_error, || unsafe {
        write_bytes_internal(ctx, address, data)
    })
}

/// [`write_internal`] with the range temporarily made read/write/execute
///
/// ## Safety
///
/// See [`write_bytes_safe_internal`].
pub unsafe fn write_safe_internal<T: Marshal>(ctx: &(impl ProcessMemory + ?Sized), address: Address, value: T) -> Result<()>
{
    write_bytes_safe_internal(ctx, address, &marshal::to_bytes(value))
}

/// Search a live region of the target for a pattern
///
/// Reads `len` bytes starting at `base` in chunks of [`SCAN_CHUNK`], with
/// consecutive chunks overlapping by `pattern.len() - 1` bytes so matches
/// straddling a chunk boundary are found. First-match semantics are the same
/// as [`Pattern::find_in`].
///
/// ## Returns
///
/// The absolute address of the first match, or `None`.
///
/// ## Errors
///
/// `ReadFailed` if any chunk of the region cannot be read.
pub fn scan(ctx: &(impl ProcessMemory + ?Sized), base: Address, len: usize, pattern: &Pattern) -> Result<Option<Address>>
{
    if pattern.is_empty() {
        return Ok(Some(base));
    }

    let chunk_size = SCAN_CHUNK.max(pattern.len());
    let mut scanned = 0usize;
    while scanned < len {
        let chunk_len = min(chunk_size, len - scanned);
        let chunk = read_bytes(ctx, base.offset(scanned), chunk_len)?;

        if let Some(pos) = pattern.find_in(&chunk) {
            return Ok(Some(base.offset(scanned + pos)));
        }

        if scanned + chunk_len >= len {
            break;
        }

        // Overlap by pattern length to catch boundary matches
        scanned += chunk_len - (pattern.len() - 1);
    }

    Ok(None)
}
