//! dynbridge - call native functions chosen at run time
//!
//! The bridge itself lives in `dynbridge-runtime`; this crate adds the
//! command line, configuration file handling and log subscriber setup.

pub mod frontend;
pub mod infrastructure;

pub use dynbridge_runtime as runtime;
pub use frontend::{cli_main, Cli, CliError, Config, ConfigError};
pub use infrastructure::{init_logging, LogConfig, LogFormat, LogOutput};
