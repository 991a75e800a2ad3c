//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address in a target process
///
/// Wraps a `u64` so addresses can't be mixed up with lengths, offsets or
/// other integers. Pattern scans return offsets (`usize`) that callers add to
/// a known base `Address` before issuing the next memory call.
///
/// ## Example
///
/// ```rust
/// use remora_core::types::Address;
///
/// let base = Address::from(0x1000);
/// let hit = base + 0x24; // offset returned by a pattern scan
/// assert_eq!(hit.value(), 0x1024);
/// assert_eq!(hit.to_string(), "0x0000000000001024");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    ///
    /// Never returned by a successful allocation.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value, usable in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Build an address from a pointer in the current address space.
    pub fn from_ptr<T>(ptr: *const T) -> Self
    {
        Address(ptr as usize as u64)
    }

    /// Reinterpret this address as a pointer in the current address space.
    ///
    /// Only meaningful when the address was obtained from the calling process.
    pub fn as_ptr<T>(self) -> *const T
    {
        self.0 as usize as *const T
    }

    /// Mutable counterpart of [`Address::as_ptr`].
    pub fn as_mut_ptr<T>(self) -> *mut T
    {
        self.0 as usize as *mut T
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use remora_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Advance by a buffer offset, such as one returned by a pattern scan.
    pub fn offset(self, offset: usize) -> Self
    {
        Address(self.0.wrapping_add(offset as u64))
    }

    /// Add an offset to this address, saturating at the maximum value
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<Address> for Address
{
    type Output = u64;

    fn sub(self, rhs: Address) -> Self::Output
    {
        self.0.wrapping_sub(rhs.0)
    }
}
