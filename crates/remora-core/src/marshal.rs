//! # Type Marshaling
//!
//! Conversion between fixed-size value types and their raw byte
//! representation. This is the only place raw bytes become typed values.
//!
//! ## Policy
//!
//! - **Little-endian** for every multi-byte scalar, independent of the host
//! - **No padding**: only types whose byte image is fully defined implement [`Marshal`]
//! - **Exact width**: decoding demands exactly [`Marshal::SIZE`] bytes
//!
//! The set of marshalable types is closed and resolved at compile time:
//! integers of every width, `f32`, `f64`, `bool`, and fixed-size arrays of any
//! of these.
//!
//! ## Example
//!
//! ```rust
//! use remora_core::marshal::{from_bytes, to_bytes};
//!
//! let bytes = to_bytes(0x1122_3344u32);
//! assert_eq!(bytes, [0x44, 0x33, 0x22, 0x11]);
//! assert_eq!(from_bytes::<u32>(&bytes).unwrap(), 0x1122_3344);
//! assert!(from_bytes::<u64>(&bytes).is_err());
//! ```

use crate::error::{RemoraError, Result};

mod sealed
{
    pub trait Sealed {}
}

/// A fixed-size value with a defined byte image
///
/// Sealed: only the types listed in the module docs implement it.
///
/// ```rust,compile_fail
/// use remora_core::Marshal;
///
/// #[derive(Clone, Copy)]
/// struct Packet(u8);
///
/// impl Marshal for Packet
/// {
///     const SIZE: usize = 1;
///
///     fn write_to(&self, out: &mut [u8])
///     {
///         out[0] = self.0;
///     }
///
///     fn read_from(bytes: &[u8]) -> Self
///     {
///         Packet(bytes[0])
///     }
/// }
/// ```
pub trait Marshal: Copy + sealed::Sealed
{
    /// Width of the byte image
    const SIZE: usize;

    /// Encode into `out`, which is exactly `SIZE` bytes long
    fn write_to(&self, out: &mut [u8]);

    /// Decode from `bytes`, which is exactly `SIZE` bytes long
    fn read_from(bytes: &[u8]) -> Self;
}

macro_rules! impl_marshal_le {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Marshal for $ty
            {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn write_to(&self, out: &mut [u8])
                {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                fn read_from(bytes: &[u8]) -> Self
                {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_marshal_le!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

impl sealed::Sealed for bool {}

impl Marshal for bool
{
    const SIZE: usize = 1;

    fn write_to(&self, out: &mut [u8])
    {
        out[0] = u8::from(*self);
    }

    /// Any non-zero byte reads as `true`
    fn read_from(bytes: &[u8]) -> Self
    {
        bytes[0] != 0
    }
}

impl<T: Marshal, const N: usize> sealed::Sealed for [T; N] {}

impl<T: Marshal, const N: usize> Marshal for [T; N]
{
    const SIZE: usize = T::SIZE * N;

    fn write_to(&self, out: &mut [u8])
    {
        for (value, chunk) in self.iter().zip(out.chunks_exact_mut(T::SIZE.max(1))) {
            value.write_to(chunk);
        }
    }

    fn read_from(bytes: &[u8]) -> Self
    {
        std::array::from_fn(|i| T::read_from(&bytes[i * T::SIZE..(i + 1) * T::SIZE]))
    }
}

/// Encode a value into a freshly allocated buffer of `T::SIZE` bytes
pub fn to_bytes<T: Marshal>(value: T) -> Vec<u8>
{
    let mut out = vec![0u8; T::SIZE];
    value.write_to(&mut out);
    out
}

/// Decode a value from exactly `T::SIZE` bytes
///
/// ## Errors
///
/// `SizeMismatch` if `bytes.len() != T::SIZE`.
pub fn from_bytes<T: Marshal>(bytes: &[u8]) -> Result<T>
{
    if bytes.len() != T::SIZE {
        return Err(RemoraError::SizeMismatch {
            expected: T::SIZE,
            actual: bytes.len(),
        });
    }
    Ok(T::read_from(bytes))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_sizes_match_memory_layout()
    {
        assert_eq!(<u8 as Marshal>::SIZE, 1);
        assert_eq!(<i16 as Marshal>::SIZE, 2);
        assert_eq!(<f32 as Marshal>::SIZE, 4);
        assert_eq!(<u128 as Marshal>::SIZE, 16);
        assert_eq!(<usize as Marshal>::SIZE, std::mem::size_of::<usize>());
        assert_eq!(<[u16; 3] as Marshal>::SIZE, 6);
    }

    #[test]
    fn test_array_is_element_wise_little_endian()
    {
        let bytes = to_bytes([0x0102u16, 0x0304u16]);
        assert_eq!(bytes, [0x02, 0x01, 0x04, 0x03]);
        assert_eq!(from_bytes::<[u16; 2]>(&bytes).unwrap(), [0x0102, 0x0304]);
    }

    #[test]
    fn test_zero_length_array()
    {
        assert!(to_bytes::<[u32; 0]>([]).is_empty());
        assert_eq!(from_bytes::<[u32; 0]>(&[]).unwrap(), []);
    }
}
