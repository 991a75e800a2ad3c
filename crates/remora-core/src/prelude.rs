//! Common module for library exports

pub use crate::error::{ErrorKind, RemoraError, Result};
pub use crate::marshal::Marshal;
pub use crate::memory::{self, ProcessMemory, ProtectionGuard};
pub use crate::pattern::{find_pattern, Pattern};
pub use crate::process::ProcessContext;
pub use crate::types::{Address, CreationMode, ProcessId, Protection, ProtectionRegion, ThreadId};
