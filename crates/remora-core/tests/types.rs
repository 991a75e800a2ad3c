//! Tests for core types

use remora_core::types::{Address, CreationMode, ProcessId, Protection, ThreadId};

#[test]
fn test_address_creation()
{
    let addr = Address::from(0x1000u64);
    assert_eq!(addr.value(), 0x1000);
    assert_eq!(Address::new(0x1000), addr);
    assert_eq!(u64::from(addr), 0x1000);
}

#[test]
fn test_address_null()
{
    assert!(Address::ZERO.is_null());
    assert!(!Address::from(1u64).is_null());
}

#[test]
fn test_address_display()
{
    let addr = Address::from(0x7fff_0000u64);
    assert_eq!(format!("{}", addr), "0x000000007fff0000");
    assert_eq!(format!("{:x}", addr), "7fff0000");
}

#[test]
fn test_address_arithmetic()
{
    let base = Address::from(0x1000u64);
    assert_eq!(base + 0x20, Address::from(0x1020u64));
    assert_eq!(base.offset(0x20), Address::from(0x1020u64));
    assert_eq!(Address::from(0x1020u64) - base, 0x20);
    assert_eq!(Address::from(u64::MAX).checked_add(1), None);
    assert_eq!(Address::from(u64::MAX).saturating_add(10), Address::from(u64::MAX));
}

#[test]
fn test_address_pointer_round_trip()
{
    let value = 7u32;
    let addr = Address::from_ptr(&value as *const u32);
    assert!(!addr.is_null());
    assert_eq!(addr.as_ptr::<u32>(), &value as *const u32);
}

#[test]
fn test_process_id()
{
    let pid = ProcessId::from(1234);
    assert_eq!(pid.0, 1234);
    assert_eq!(u32::from(pid), 1234);
    assert_eq!(format!("{}", pid), "1234");
    assert_eq!(ProcessId::current().0, std::process::id());
}

#[test]
fn test_thread_id()
{
    let tid = ThreadId::from(77u64);
    assert_eq!(tid.raw(), 77);
    assert_eq!(format!("{}", tid), "77");
}

#[test]
fn test_creation_mode_display()
{
    assert_eq!(CreationMode::Launched.to_string(), "launched");
    assert_eq!(CreationMode::Attached.to_string(), "attached");
}

#[test]
fn test_protection_presets()
{
    assert!(!Protection::none().is_readable());
    assert!(Protection::read_only().is_readable());
    assert!(!Protection::read_only().is_writable());
    assert!(Protection::read_write().is_writable());
    assert!(!Protection::read_write().is_executable());
    assert!(Protection::read_execute().is_executable());

    let rwx = Protection::read_write_execute();
    assert!(rwx.is_readable() && rwx.is_writable() && rwx.is_executable());
    assert_eq!(rwx.to_string(), "rwx");
}

#[test]
fn test_protection_raw_round_trip()
{
    let protection = Protection::read_execute();
    assert_eq!(Protection::from_raw(protection.raw()), protection);
    assert_eq!(Protection::from_flags(true, false, true), protection);
}
