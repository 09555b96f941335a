//! Frontend components
//!
//! Command-line parsing and the `dynbridge.toml` configuration file.

pub mod cli;
pub mod config;

pub use cli::{main as cli_main, Cli, CliError, Command};
pub use config::{Config, ConfigError};
