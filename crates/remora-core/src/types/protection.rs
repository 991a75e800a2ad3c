//! Page protection flags.
//!
//! A [`Protection`] wraps the platform's native protection value unchanged, so
//! a snapshot taken before a safe operation can be handed back to the OS
//! verbatim when it is restored.
//!
//! - **Linux/macOS**: `PROT_*` / `VM_PROT_*` bits (read = 1, write = 2, execute = 4)
//! - **Windows**: one `PAGE_*` constant, optionally combined with modifiers such as `PAGE_GUARD`

use std::fmt;

use super::Address;

#[cfg(not(windows))]
mod native
{
    pub const NONE: u32 = 0;
    pub const READ: u32 = 0x1;
    pub const WRITE: u32 = 0x2;
    pub const EXECUTE: u32 = 0x4;

    pub const fn compose(read: bool, write: bool, execute: bool) -> u32
    {
        (if read { READ } else { 0 }) | (if write { WRITE } else { 0 }) | (if execute { EXECUTE } else { 0 })
    }

    pub const fn decompose(raw: u32) -> (bool, bool, bool)
    {
        (raw & READ != 0, raw & WRITE != 0, raw & EXECUTE != 0)
    }
}

#[cfg(windows)]
mod native
{
    pub const NONE: u32 = 0x01; // PAGE_NOACCESS
    const READONLY: u32 = 0x02;
    const READWRITE: u32 = 0x04;
    const WRITECOPY: u32 = 0x08;
    const EXECUTE: u32 = 0x10;
    const EXECUTE_READ: u32 = 0x20;
    const EXECUTE_READWRITE: u32 = 0x40;
    const EXECUTE_WRITECOPY: u32 = 0x80;
    // PAGE_GUARD | PAGE_NOCACHE | PAGE_WRITECOMBINE
    const MODIFIERS: u32 = 0x700;

    pub const fn compose(read: bool, write: bool, execute: bool) -> u32
    {
        match (read || write, write, execute) {
            (_, true, true) => EXECUTE_READWRITE,
            (_, true, false) => READWRITE,
            (true, false, true) => EXECUTE_READ,
            (true, false, false) => READONLY,
            (false, false, true) => EXECUTE,
            (false, false, false) => NONE,
        }
    }

    pub const fn decompose(raw: u32) -> (bool, bool, bool)
    {
        match raw & !MODIFIERS {
            READONLY => (true, false, false),
            READWRITE | WRITECOPY => (true, true, false),
            EXECUTE => (false, false, true),
            EXECUTE_READ => (true, false, true),
            EXECUTE_READWRITE | EXECUTE_WRITECOPY => (true, true, true),
            _ => (false, false, false),
        }
    }
}

/// Native page protection value of a memory range
///
/// ## Example
///
/// ```rust
/// use remora_core::types::Protection;
///
/// let rwx = Protection::read_write_execute();
/// assert!(rwx.is_readable() && rwx.is_writable() && rwx.is_executable());
/// assert_eq!(rwx.to_string(), "rwx");
/// assert_eq!(Protection::read_only().to_string(), "r--");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protection(u32);

impl Protection
{
    /// Wrap a native protection value exactly as the OS reported it
    pub const fn from_raw(raw: u32) -> Self
    {
        Protection(raw)
    }

    /// The native value, suitable for handing back to the OS
    pub const fn raw(self) -> u32
    {
        self.0
    }

    /// Build the native value for a combination of access rights
    pub const fn from_flags(read: bool, write: bool, execute: bool) -> Self
    {
        Protection(native::compose(read, write, execute))
    }

    /// No access at all
    pub const fn none() -> Self
    {
        Protection(native::NONE)
    }

    /// Read-only
    pub const fn read_only() -> Self
    {
        Self::from_flags(true, false, false)
    }

    /// Read and write
    pub const fn read_write() -> Self
    {
        Self::from_flags(true, true, false)
    }

    /// Read and execute
    pub const fn read_execute() -> Self
    {
        Self::from_flags(true, false, true)
    }

    /// Read, write and execute; what allocations and safe operations use
    pub const fn read_write_execute() -> Self
    {
        Self::from_flags(true, true, true)
    }

    /// Whether the range can be read
    pub const fn is_readable(self) -> bool
    {
        native::decompose(self.0).0
    }

    /// Whether the range can be written
    pub const fn is_writable(self) -> bool
    {
        native::decompose(self.0).1
    }

    /// Whether the range can be executed
    pub const fn is_executable(self) -> bool
    {
        native::decompose(self.0).2
    }
}

impl fmt::Display for Protection
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let (read, write, execute) = native::decompose(self.0);
        write!(
            f,
            "{}{}{}",
            if read { 'r' } else { '-' },
            if write { 'w' } else { '-' },
            if execute { 'x' } else { '-' }
        )
    }
}

/// Protection of one contiguous run of pages
///
/// A range that spans pages with different protections is described by
/// several runs in address order. The runs of a snapshot are what a safe
/// operation puts back, each one to its own protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtectionRegion
{
    pub address: Address,
    pub len: usize,
    pub protection: Protection,
}

impl ProtectionRegion
{
    pub const fn new(address: Address, len: usize, protection: Protection) -> Self
    {
        Self {
            address,
            len,
            protection,
        }
    }

    /// First address past the run
    pub fn end(&self) -> Address
    {
        self.address.saturating_add(self.len as u64)
    }
}

impl fmt::Display for ProtectionRegion
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}-{} {}", self.address, self.end(), self.protection)
    }
}
