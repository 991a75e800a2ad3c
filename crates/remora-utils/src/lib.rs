//! # Remora Utilities
//!
//! Shared utilities for the Remora workspace, mainly logging built on
//! `tracing`.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFile, LogFormat, LogGuard, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
