//! # Types
//!
//! Platform-agnostic types used throughout the crate.
//!
//! These types abstract away platform-specific details, allowing the rest of
//! the crate to talk about "process ID" and "page protection" without knowing
//! whether we're on Linux, Windows, or macOS.

pub mod address;
pub mod process;
pub mod protection;

// Re-export all public types
pub use address::Address;
pub use process::{CreationMode, ProcessId, ThreadId};
pub use protection::{Protection, ProtectionRegion};
