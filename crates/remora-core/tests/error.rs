//! Tests for error handling

use std::error::Error;
use std::io;

use remora_core::error::{ErrorKind, RemoraError, Result};
#[cfg(target_os = "macos")]
use remora_core::platform::macos::error::MachError;
#[cfg(target_os = "macos")]
use mach2::kern_return;
use remora_core::types::{Address, ProcessId};

#[cfg(target_os = "macos")]
#[test]
fn test_mach_error_protection_failure()
{
    let error = MachError::ProtectionFailure;
    let message = format!("{}", error);
    assert!(message.contains("permission denied"));
}

#[cfg(target_os = "macos")]
#[test]
fn test_mach_error_from_code()
{
    assert!(matches!(MachError::from(kern_return::KERN_INVALID_ADDRESS), MachError::InvalidAddress));
    assert!(matches!(MachError::from(kern_return::KERN_FAILURE), MachError::ProcessNotFound));
    assert!(matches!(MachError::from(4242), MachError::Unknown(4242)));
}

#[cfg(target_os = "macos")]
#[test]
fn test_mach_error_into_remora_error()
{
    let error: RemoraError = MachError::Unknown(999).into();
    assert!(format!("{}", error).contains("999"));
    assert_eq!(error.kind(), ErrorKind::Other);
}

#[test]
fn test_launch_failed_names_path()
{
    let error = RemoraError::LaunchFailed {
        path: "/opt/game/game.bin".to_string(),
        source: io::Error::from(io::ErrorKind::NotFound),
    };
    let message = format!("{}", error);
    assert!(message.starts_with("Failed to launch '/opt/game/game.bin'"));
    assert_eq!(error.kind(), ErrorKind::LaunchFailed);
    assert!(error.source().is_some());
}

#[test]
fn test_process_not_found()
{
    let error = RemoraError::ProcessNotFound("12345".to_string());
    assert_eq!(format!("{}", error), "Process not found: 12345");
    assert_eq!(error.kind(), ErrorKind::ProcessNotFound);
}

#[test]
fn test_access_denied_keeps_os_code()
{
    let error = RemoraError::AccessDenied {
        pid: ProcessId(1),
        source: io::Error::from_raw_os_error(libc::EPERM),
    };
    assert!(format!("{}", error).starts_with("Access denied to process 1"));
    match &error {
        RemoraError::AccessDenied { source, .. } => assert_eq!(source.raw_os_error(), Some(libc::EPERM)),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_allocation_failed_with_and_without_cause()
{
    let bare = RemoraError::AllocationFailed { len: 0, source: None };
    assert_eq!(format!("{}", bare), "Failed to allocate 0 bytes");
    assert!(bare.source().is_none());

    let caused = RemoraError::AllocationFailed {
        len: 4096,
        source: Some(io::Error::new(io::ErrorKind::OutOfMemory, "no space")),
    };
    assert_eq!(format!("{}", caused), "Failed to allocate 4096 bytes: no space");
    assert!(caused.source().is_some());
}

#[test]
fn test_read_and_write_failed_show_address()
{
    let read = RemoraError::ReadFailed {
        address: Address::from(0x1000u64),
        len: 8,
        source: None,
    };
    assert_eq!(format!("{}", read), "Failed to read 8 bytes at 0x0000000000001000");
    assert_eq!(read.kind(), ErrorKind::ReadFailed);

    let write = RemoraError::WriteFailed {
        address: Address::from(0x2000u64),
        len: 2,
        source: Some(io::Error::new(io::ErrorKind::PermissionDenied, "read-only")),
    };
    assert_eq!(format!("{}", write), "Failed to write 2 bytes at 0x0000000000002000: read-only");
    assert_eq!(write.kind(), ErrorKind::WriteFailed);
}

#[test]
fn test_usage_errors()
{
    let size = RemoraError::SizeMismatch { expected: 4, actual: 3 };
    assert_eq!(format!("{}", size), "Size mismatch: expected 4 bytes, got 3");
    assert_eq!(size.kind(), ErrorKind::SizeMismatch);

    let mask = RemoraError::MaskLengthMismatch { pattern: 3, mask: 2 };
    assert_eq!(
        format!("{}", mask),
        "Mask length mismatch: pattern has 3 bytes, mask has 2 characters"
    );
    assert_eq!(mask.kind(), ErrorKind::MaskLengthMismatch);

    let invalid = RemoraError::InvalidArgument("bad mask".to_string());
    assert_eq!(format!("{}", invalid), "Invalid argument: bad mask");
    assert_eq!(invalid.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_io_error_conversion()
{
    fn os_call() -> io::Result<()>
    {
        Err(io::Error::other("boom"))
    }

    fn fails() -> Result<()>
    {
        os_call()?;
        Ok(())
    }

    let error = fails().unwrap_err();
    assert!(matches!(error, RemoraError::Io(_)));
    assert_eq!(error.kind(), ErrorKind::Other);
    assert_eq!(format!("{}", error), "IO error: boom");
}

#[test]
fn test_result_type()
{
    fn returns_ok() -> Result<u32>
    {
        Ok(42)
    }

    fn returns_err() -> Result<u32>
    {
        Err(RemoraError::ResumeFailed("thread gone".to_string()))
    }

    assert_eq!(returns_ok().unwrap(), 42);
    let err = returns_err().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResumeFailed);
    assert_eq!(format!("{}", err), "Failed to resume process: thread gone");
}
