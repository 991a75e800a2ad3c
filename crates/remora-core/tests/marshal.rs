//! Tests for value marshaling

use remora_core::error::RemoraError;
use remora_core::marshal::{from_bytes, to_bytes, Marshal};

#[test]
fn test_integers_are_little_endian()
{
    assert_eq!(to_bytes(0x0102u16), vec![0x02, 0x01]);
    assert_eq!(to_bytes(-2i32), vec![0xFE, 0xFF, 0xFF, 0xFF]);
    assert_eq!(from_bytes::<u64>(&[1, 0, 0, 0, 0, 0, 0, 0x80]).unwrap(), 0x8000_0000_0000_0001);
}

#[test]
fn test_floats_round_trip()
{
    assert_eq!(from_bytes::<f32>(&to_bytes(3.5f32)).unwrap(), 3.5);
    assert_eq!(from_bytes::<f64>(&to_bytes(-0.125f64)).unwrap(), -0.125);
    assert_eq!(to_bytes(1.0f32), vec![0x00, 0x00, 0x80, 0x3F]);
}

#[test]
fn test_bool()
{
    assert_eq!(to_bytes(true), vec![1]);
    assert!(!from_bytes::<bool>(&[0]).unwrap());
    assert!(from_bytes::<bool>(&[0x7F]).unwrap());
}

#[test]
fn test_arrays()
{
    assert_eq!(<[u32; 3] as Marshal>::SIZE, 12);
    let bytes = to_bytes([1u16, 0x0203, 0xFFFF]);
    assert_eq!(bytes, vec![1, 0, 3, 2, 0xFF, 0xFF]);
    assert_eq!(from_bytes::<[u16; 3]>(&bytes).unwrap(), [1, 0x0203, 0xFFFF]);

    let nested = [[1u8, 2], [3, 4]];
    assert_eq!(from_bytes::<[[u8; 2]; 2]>(&to_bytes(nested)).unwrap(), nested);
}

#[test]
fn test_size_mismatch()
{
    let err = from_bytes::<u32>(&[1, 2, 3]).unwrap_err();
    assert!(matches!(err, RemoraError::SizeMismatch { expected: 4, actual: 3 }));

    let err = from_bytes::<u16>(&[1, 2, 3]).unwrap_err();
    assert!(matches!(err, RemoraError::SizeMismatch { expected: 2, actual: 3 }));
}
