//! Logging and diagnostics

mod logging;

pub use logging::{init_logging, init_logging_default, LogConfig, LogGuard};
