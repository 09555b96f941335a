//! Process-wide plumbing for the binary

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogOutput, LOG_ENV};
