//! Tests for the memory accessor against an in-memory target
//!
//! `PagedMemory` enforces per-page protection the way the OS would, so the
//! safe variants can be checked on every platform, including copies that fail
//! halfway and restores the "OS" refuses.

use std::cell::{Cell, RefCell};
use std::io;

use remora_core::error::{ErrorKind, RemoraError};
use remora_core::memory::{self, ProcessMemory, ProtectionGuard};
use remora_core::pattern::Pattern;
use remora_core::types::{Address, ProcessId, Protection, ProtectionRegion};

const BASE: u64 = 0x4000_0000;
const PAGE: usize = 0x100;
const PAGES: usize = 8;

struct PagedMemory
{
    bytes: RefCell<Vec<u8>>,
    pages: RefCell<Vec<Protection>>,
    allocations: RefCell<Vec<Address>>,
    next_allocation: Cell<usize>,
    fail_copy: Cell<bool>,
    fail_restore: Cell<bool>,
}

impl PagedMemory
{
    fn new(protection: Protection) -> Self
    {
        Self {
            bytes: RefCell::new(vec![0u8; PAGE * PAGES]),
            pages: RefCell::new(vec![protection; PAGES]),
            allocations: RefCell::new(Vec::new()),
            next_allocation: Cell::new(0),
            fail_copy: Cell::new(false),
            fail_restore: Cell::new(false),
        }
    }

    fn at(page: usize) -> Address
    {
        Address::from(BASE + (page * PAGE) as u64)
    }

    fn set_page(&self, page: usize, protection: Protection)
    {
        self.pages.borrow_mut()[page] = protection;
    }

    fn page_protection(&self, page: usize) -> Protection
    {
        self.pages.borrow()[page]
    }

    /// Offset into `bytes` and the number of bytes available from there
    fn span(&self, address: Address, len: usize) -> io::Result<(usize, usize)>
    {
        let offset = address
            .value()
            .checked_sub(BASE)
            .map(|offset| offset as usize)
            .filter(|offset| *offset < PAGE * PAGES)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unmapped"))?;
        Ok((offset, len.min(PAGE * PAGES - offset)))
    }

    fn check_pages(&self, offset: usize, len: usize, allowed: fn(Protection) -> bool) -> io::Result<()>
    {
        let pages = self.pages.borrow();
        let last = (offset + len.max(1) - 1) / PAGE;
        if (offset / PAGE..=last).all(|page| allowed(pages[page])) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "page protection"))
        }
    }
}

impl ProcessMemory for PagedMemory
{
    fn process_id(&self) -> ProcessId
    {
        ProcessId(u32::MAX)
    }

    fn allocate(&self, len: usize, _protection: Protection) -> io::Result<Address>
    {
        let offset = self.next_allocation.get();
        if offset + len > PAGE * PAGES {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "fake space exhausted"));
        }
        self.next_allocation.set(offset + len.div_ceil(PAGE) * PAGE);
        let address = Address::from(BASE + offset as u64);
        self.allocations.borrow_mut().push(address);
        Ok(address)
    }

    fn release(&self, address: Address) -> io::Result<()>
    {
        let mut allocations = self.allocations.borrow_mut();
        match allocations.iter().position(|a| *a == address) {
            Some(index) => {
                allocations.remove(index);
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "not allocated")),
        }
    }

    fn read_into(&self, address: Address, buf: &mut [u8]) -> io::Result<usize>
    {
        if self.fail_copy.get() {
            return Err(io::Error::other("copy failed"));
        }
        let (offset, available) = self.span(address, buf.len())?;
        self.check_pages(offset, available, Protection::is_readable)?;
        buf[..available].copy_from_slice(&self.bytes.borrow()[offset..offset + available]);
        Ok(available)
    }

    fn write_from(&self, address: Address, data: &[u8]) -> io::Result<usize>
    {
        if self.fail_copy.get() {
            return Err(io::Error::other("copy failed"));
        }
        let (offset, available) = self.span(address, data.len())?;
        self.check_pages(offset, available, Protection::is_writable)?;
        self.bytes.borrow_mut()[offset..offset + available].copy_from_slice(&data[..available]);
        Ok(available)
    }

    fn protection_map(&self, address: Address, len: usize) -> io::Result<Vec<ProtectionRegion>>
    {
        let pages: Vec<ProtectionRegion> = self
            .pages
            .borrow()
            .iter()
            .enumerate()
            .map(|(page, protection)| ProtectionRegion::new(PagedMemory::at(page), PAGE, *protection))
            .collect();
        memory::clip_regions(address, len, pages)
    }

    fn protect(&self, address: Address, len: usize, protection: Protection) -> io::Result<Vec<ProtectionRegion>>
    {
        if self.fail_restore.get() && protection != Protection::read_write_execute() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "restore refused"));
        }
        let previous = self.protection_map(address, len)?;
        let (offset, available) = self.span(address, len)?;
        let last = (offset + available.max(1) - 1) / PAGE;
        for page in offset / PAGE..=last {
            self.pages.borrow_mut()[page] = protection;
        }
        Ok(previous)
    }
}

#[test]
fn test_typed_round_trip()
{
    let target = PagedMemory::new(Protection::read_write());
    let address = PagedMemory::at(1);

    memory::write(&target, address, 0xDEAD_BEEF_CAFE_F00Du64).unwrap();
    assert_eq!(memory::read::<u64>(&target, address).unwrap(), 0xDEAD_BEEF_CAFE_F00D);

    memory::write(&target, address + 8, -1.5f32).unwrap();
    assert_eq!(memory::read::<f32>(&target, address + 8).unwrap(), -1.5);

    memory::write(&target, address + 16, [1u16, 2, 3, 4]).unwrap();
    assert_eq!(memory::read::<[u16; 4]>(&target, address + 16).unwrap(), [1, 2, 3, 4]);
    assert_eq!(
        memory::read_bytes(&target, address + 16, 4).unwrap(),
        vec![1, 0, 2, 0]
    );
}

#[test]
fn test_plain_write_to_read_only_page_fails()
{
    let target = PagedMemory::new(Protection::read_only());
    let err = memory::write_bytes(&target, PagedMemory::at(0), &[0x90]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteFailed);
}

#[test]
fn test_safe_write_restores_protection()
{
    let target = PagedMemory::new(Protection::read_only());
    let address = PagedMemory::at(2) + 0x10;

    memory::write_bytes_safe(&target, address, &[0x90, 0x90, 0xC3]).unwrap();

    assert_eq!(target.page_protection(2), Protection::read_only());
    assert_eq!(memory::read_bytes(&target, address, 3).unwrap(), vec![0x90, 0x90, 0xC3]);
}

#[test]
fn test_safe_write_across_pages_keeps_each_protection()
{
    let target = PagedMemory::new(Protection::read_write());
    target.set_page(2, Protection::read_only());
    target.set_page(3, Protection::read_execute());
    let address = PagedMemory::at(2) + (PAGE as u64 - 2);

    memory::write_bytes_safe(&target, address, &[1, 2, 3, 4]).unwrap();

    assert_eq!(target.page_protection(2), Protection::read_only());
    assert_eq!(target.page_protection(3), Protection::read_execute());
    assert_eq!(target.page_protection(4), Protection::read_write());
    assert_eq!(memory::read_bytes(&target, address, 4).unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn test_failed_copy_across_pages_keeps_each_protection()
{
    let target = PagedMemory::new(Protection::read_write());
    target.set_page(4, Protection::read_only());
    target.set_page(5, Protection::none());
    target.set_page(6, Protection::read_execute());
    target.fail_copy.set(true);

    let err = memory::read_bytes_safe(&target, PagedMemory::at(4) + 8, 2 * PAGE).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ReadFailed);
    assert_eq!(target.page_protection(4), Protection::read_only());
    assert_eq!(target.page_protection(5), Protection::none());
    assert_eq!(target.page_protection(6), Protection::read_execute());
}

#[test]
fn test_protection_map_splits_runs()
{
    let target = PagedMemory::new(Protection::read_only());
    target.set_page(3, Protection::read_execute());

    let runs = memory::protection_map(&target, PagedMemory::at(1) + 8, 3 * PAGE - 8).unwrap();
    assert_eq!(
        runs,
        vec![
            ProtectionRegion::new(PagedMemory::at(1) + 8, 2 * PAGE - 8, Protection::read_only()),
            ProtectionRegion::new(PagedMemory::at(3), PAGE, Protection::read_execute()),
        ]
    );
    assert_eq!(memory::protection_at(&target, PagedMemory::at(3), 1).unwrap(), Protection::read_execute());

    let past_end = PagedMemory::at(PAGES - 1) + (PAGE as u64 - 4);
    assert!(memory::protection_map(&target, past_end, 8).is_err());
}

#[test]
fn test_safe_read_of_unreadable_page()
{
    let target = PagedMemory::new(Protection::read_write());
    target.set_page(3, Protection::none());
    target.bytes.borrow_mut()[3 * PAGE] = 0x42;

    assert_eq!(
        memory::read_bytes(&target, PagedMemory::at(3), 1).unwrap_err().kind(),
        ErrorKind::ReadFailed
    );
    assert_eq!(memory::read_safe::<u8>(&target, PagedMemory::at(3)).unwrap(), 0x42);
    assert_eq!(target.page_protection(3), Protection::none());
}

#[test]
fn test_protection_restored_when_copy_fails()
{
    let target = PagedMemory::new(Protection::read_execute());
    target.fail_copy.set(true);

    let before = memory::protection_at(&target, PagedMemory::at(4), 8).unwrap();
    let err = memory::write_safe(&target, PagedMemory::at(4), 1u64).unwrap_err();
    let after = memory::protection_at(&target, PagedMemory::at(4), 8).unwrap();

    assert_eq!(err.kind(), ErrorKind::WriteFailed);
    assert_eq!(before, after);

    let err = memory::read_bytes_safe(&target, PagedMemory::at(4), 8).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadFailed);
    assert_eq!(target.page_protection(4), Protection::read_execute());
}

#[test]
fn test_restore_failure_is_reported()
{
    let target = PagedMemory::new(Protection::read_only());
    target.fail_restore.set(true);

    let err = memory::write_bytes_safe(&target, PagedMemory::at(1), &[1, 2]).unwrap_err();
    assert!(matches!(err, RemoraError::ProtectionRestoreFailed { len: 2, .. }));
    assert_eq!(err.kind(), ErrorKind::ProtectionRestoreFailed);
}

#[test]
fn test_copy_error_wins_over_restore_error()
{
    let target = PagedMemory::new(Protection::read_only());
    target.fail_restore.set(true);
    target.fail_copy.set(true);

    let err = memory::read_bytes_safe(&target, PagedMemory::at(1), 4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadFailed);
}

#[test]
fn test_short_transfer_is_a_failure()
{
    let target = PagedMemory::new(Protection::read_write());
    let last = PagedMemory::at(PAGES - 1) + (PAGE as u64 - 2);

    assert_eq!(memory::read::<u32>(&target, last).unwrap_err().kind(), ErrorKind::ReadFailed);
    assert_eq!(
        memory::write(&target, last, 0u32).unwrap_err().kind(),
        ErrorKind::WriteFailed
    );
}

#[test]
fn test_allocation_lifecycle()
{
    let target = PagedMemory::new(Protection::read_write());

    let first = memory::allocate(&target, 0x80).unwrap();
    let second = memory::allocate(&target, 0x180).unwrap();
    assert_ne!(first, second);

    assert!(memory::free(&target, first));
    assert!(!memory::free(&target, first));
    assert!(!memory::free(&target, Address::from(0xDEAD_0000u64)));
    assert!(memory::free(&target, second));
}

#[test]
fn test_zero_length_allocation_fails()
{
    let target = PagedMemory::new(Protection::read_write());
    let err = memory::allocate(&target, 0).unwrap_err();
    assert!(matches!(err, RemoraError::AllocationFailed { len: 0, source: None }));
}

#[test]
fn test_exhausted_allocation_carries_cause()
{
    let target = PagedMemory::new(Protection::read_write());
    let err = memory::allocate(&target, PAGE * PAGES + 1).unwrap_err();
    match err {
        RemoraError::AllocationFailed { source: Some(source), .. } => {
            assert_eq!(source.kind(), io::ErrorKind::OutOfMemory);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_guard_restores_on_drop()
{
    let target = PagedMemory::new(Protection::read_only());
    {
        let guard = ProtectionGuard::unprotect(&target, PagedMemory::at(5), 4).unwrap();
        assert_eq!(
            guard.previous(),
            &[ProtectionRegion::new(PagedMemory::at(5), 4, Protection::read_only())]
        );
        assert_eq!(target.page_protection(5), Protection::read_write_execute());
    }
    assert_eq!(target.page_protection(5), Protection::read_only());

    let guard = ProtectionGuard::with_protection(&target, PagedMemory::at(5), 4, Protection::read_write()).unwrap();
    assert_eq!(target.page_protection(5), Protection::read_write());
    guard.restore().unwrap();
    assert_eq!(target.page_protection(5), Protection::read_only());
}

#[test]
fn test_concurrent_guards_keep_their_own_snapshot()
{
    let target = PagedMemory::new(Protection::read_only());
    target.set_page(6, Protection::read_execute());

    let a = ProtectionGuard::unprotect(&target, PagedMemory::at(5), 1).unwrap();
    let b = ProtectionGuard::unprotect(&target, PagedMemory::at(6), 1).unwrap();
    drop(a);
    drop(b);

    assert_eq!(target.page_protection(5), Protection::read_only());
    assert_eq!(target.page_protection(6), Protection::read_execute());
}

#[test]
fn test_scan_live_region()
{
    let target = PagedMemory::new(Protection::read_write());
    let needle = [0x48, 0x8B, 0x05, 0x11, 0x22, 0x33, 0x44];
    memory::write_bytes(&target, PagedMemory::at(3) + 0x40, &needle).unwrap();

    let pattern = Pattern::from_signature("48 8B 05 ?? ?? ?? 44").unwrap();
    let found = memory::scan(&target, PagedMemory::at(0), PAGE * PAGES, &pattern).unwrap();
    assert_eq!(found, Some(PagedMemory::at(3) + 0x40));

    let missing = Pattern::from_signature("48 8B 06").unwrap();
    assert_eq!(memory::scan(&target, PagedMemory::at(0), PAGE * PAGES, &missing).unwrap(), None);
}

#[test]
fn test_internal_access_needs_current_process()
{
    let target = PagedMemory::new(Protection::read_write());
    let local = 5u32;
    let address = Address::from_ptr(&local as *const u32);

    // SAFETY: the context check fails before any copy
    let err = unsafe { memory::read_internal::<u32>(&target, address) }.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    // SAFETY: as above
    let err = unsafe { memory::write_bytes_safe_internal(&target, address, &[1]) }.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}
