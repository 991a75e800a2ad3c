//! # remora-core
//!
//! Process handles, cross-process memory primitives and pattern scanning for
//! Remora.
//!
//! This crate is the substrate a mod loader patches a running image with:
//!
//! - [`ProcessContext`]: launch a process suspended, or attach by id or name
//! - [`memory`]: allocate, free, read and write target memory, with "safe"
//!   variants that lift page protection for one call and always restore it
//! - [`pattern`]: wildcard byte-pattern search over plain buffers
//! - [`marshal`]: fixed-size values to and from little-endian bytes
//!
//! It does not disassemble, debug or inject code. It moves bytes and finds
//! them.
//!
//! ## Platform Support
//!
//! - **Linux**: `ptrace` for suspended launch, procfs for memory and protection
//! - **Windows**: Win32 process, Toolhelp and virtual memory APIs
//! - **macOS**: Mach task ports and `posix_spawn`
//!
//! ## Why unsafe code is needed
//!
//! Every platform primitive here is an FFI call into the kernel, and the
//! in-process memory variants copy through raw pointers. The unsafe calls are
//! wrapped in safe functions except where the caller has to vouch for an
//! address (`memory::*_internal`).

#![allow(unsafe_code)] // Required for low-level system APIs (ptrace, Win32, Mach)

pub mod error;
pub mod marshal;
pub mod memory;
pub mod pattern;
pub mod platform;
pub mod prelude;
pub mod process;
pub mod types;

pub use error::{ErrorKind, RemoraError, Result};
pub use marshal::Marshal;
pub use memory::{ProcessMemory, ProtectionGuard};
pub use pattern::{find_pattern, Pattern};
pub use process::ProcessContext;
pub use types::{Address, CreationMode, ProcessId, Protection, ProtectionRegion, ThreadId};
