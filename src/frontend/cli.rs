//! `dynbridge` command line
//!
//! Thin shell over the runtime bridge: every subcommand builds a [`Bridge`]
//! from the loaded config and runs one boundary operation.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use dynbridge_runtime::interop::abi::{ConventionSupport, TargetAbi};
use dynbridge_runtime::interop::errno::os;
use dynbridge_runtime::interop::types::{ArgKind, SignatureError};
use dynbridge_runtime::{Bridge, CallDescriptor, Convention, FfiError, ReturnType, Signature, Value};

use super::config::{Config, ConfigError};
use crate::infrastructure::logging::init_logging;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ffi(#[from] FfiError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("symbol '{symbol}' not found in {library}")]
    SymbolNotFound { library: String, symbol: String },

    #[error("signature '{signature}' takes {expected} arguments, but {got} were given")]
    ArgumentCount { signature: String, expected: usize, got: usize },

    #[error("cannot read '{text}' as {expected}")]
    BadValue { text: String, expected: &'static str },

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Parser)]
#[command(name = "dynbridge")]
#[command(version)]
#[command(about = "Load shared libraries and call native functions by signature", long_about = None)]
pub struct Cli {
    /// Config file (default: nearest dynbridge.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output; repeat for more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Call a function in a shared library
    Call {
        /// Library path or name ("" for the running program)
        library: String,

        symbol: String,

        /// C return type, e.g. int, double, char*, uint64_t, void
        #[arg(short, long, default_value = "int")]
        returns: ReturnType,

        /// One code per argument: i l x p f d s
        #[arg(short, long, default_value = "")]
        signature: String,

        /// Callee-cleanup convention
        #[arg(long)]
        stdcall: bool,

        #[arg(long)]
        json: bool,

        /// Arguments; integers accept 0x hex, `null` passes no value
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the address of a symbol, or #f
    Lookup {
        library: String,

        symbol: String,

        #[arg(long)]
        json: bool,
    },

    /// Decode a packed call descriptor
    Describe {
        /// Decimal or 0x-prefixed descriptor
        #[arg(allow_hyphen_values = true)]
        descriptor: String,

        #[arg(long)]
        json: bool,
    },
}

/// Entry point used by the binary
pub fn main() -> Result<(), CliError> {
    run(Cli::parse())
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover()?,
    };
    let _guard = init_logging(config.logging.to_log_config(cli.verbose)?);
    debug!(command = ?cli.command, "dynbridge starting");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&cli.command, &config, &mut out)
}

/// Run one subcommand, writing its report to `out`
pub fn execute(command: &Command, config: &Config, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Call { library, symbol, returns, signature, stdcall, json, args } => {
            let convention = if *stdcall { Convention::CalleeCleanup } else { Convention::Default };
            let request = CallRequest {
                library,
                symbol,
                descriptor: CallDescriptor::new(*returns, convention),
                signature,
                args,
            };
            let report = call(config, &request)?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                writeln!(out, "{}", report.display)?;
                writeln!(out, "errno: {}", report.errno)?;
                if let Some(code) = report.last_error {
                    writeln!(out, "last-error: {}", code)?;
                }
            }
        }
        Command::Lookup { library, symbol, json } => {
            let address = lookup(config, library, symbol)?;
            if *json {
                let report = LookupReport { library, symbol, address };
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                match address {
                    Some(address) => writeln!(out, "{:#x}", address)?,
                    None => writeln!(out, "#f")?,
                }
            }
        }
        Command::Describe { descriptor, json } => {
            let packed = parse_integer(descriptor)
                .and_then(|n| i64::try_from(n).ok())
                .ok_or_else(|| CliError::BadValue { text: descriptor.clone(), expected: "fixnum" })?;
            let report = describe(packed);
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                writeln!(out, "returns: {}", report.returns.as_deref().unwrap_or("invalid"))?;
                writeln!(out, "convention: {}", report.convention.as_deref().unwrap_or("invalid"))?;
                writeln!(out, "supported on {}: {}", report.target, if report.supported { "yes" } else { "no" })?;
            }
        }
    }
    Ok(())
}

/// Bridge with the configured search paths and preloaded libraries
pub fn bridge_for(config: &Config) -> Result<Bridge, CliError> {
    let mut bridge = Bridge::with_search_paths(config.loader.search_paths.iter().cloned());
    for library in &config.loader.preload {
        let handle = bridge.open_library(library)?;
        info!(library = %library, handle, "preloaded");
    }
    Ok(bridge)
}

pub struct CallRequest<'a> {
    pub library: &'a str,
    pub symbol: &'a str,
    pub descriptor: CallDescriptor,
    pub signature: &'a str,
    pub args: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct CallReport {
    pub library: String,
    pub symbol: String,
    pub returns: String,
    pub signature: String,
    pub result: serde_json::Value,
    /// `result` as the host interpreter would print it
    #[serde(skip)]
    pub display: String,
    pub errno: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<u32>,
}

#[derive(Debug, Serialize)]
struct LookupReport<'a> {
    library: &'a str,
    symbol: &'a str,
    address: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DescribeReport {
    pub descriptor: i64,
    pub returns: Option<String>,
    pub convention: Option<String>,
    pub target: &'static str,
    /// Both fields decode and the convention is usable on this target
    pub supported: bool,
}

pub fn call(config: &Config, request: &CallRequest<'_>) -> Result<CallReport, CliError> {
    let signature: Signature = request.signature.parse()?;
    if signature.len() != request.args.len() {
        return Err(CliError::ArgumentCount {
            signature: request.signature.to_string(),
            expected: signature.len(),
            got: request.args.len(),
        });
    }
    let values = signature
        .iter()
        .zip(request.args)
        .map(|(kind, text)| parse_value(kind, text))
        .collect::<Result<Vec<_>, _>>()?;

    let mut bridge = bridge_for(config)?;
    let handle = bridge.open_library(request.library)?;
    let address = bridge
        .symbol(handle, request.symbol)?
        .ok_or_else(|| CliError::SymbolNotFound {
            library: request.library.to_string(),
            symbol: request.symbol.to_string(),
        })?;

    // Safety: whoever runs the command vouches for the signature.
    let result = unsafe { bridge.call(request.descriptor, address, request.symbol, &signature, &values)? };
    let state = bridge.error_state();

    Ok(CallReport {
        library: request.library.to_string(),
        symbol: request.symbol.to_string(),
        returns: request
            .descriptor
            .return_type()
            .map(|ty| ty.name().to_string())
            .unwrap_or_default(),
        signature: signature.to_string(),
        result: value_to_json(&result),
        display: result.to_string(),
        errno: state.errno,
        last_error: os::HAS_LAST_ERROR.then_some(state.last_error),
    })
}

pub fn lookup(config: &Config, library: &str, symbol: &str) -> Result<Option<usize>, CliError> {
    let mut bridge = bridge_for(config)?;
    let handle = bridge.open_library(library)?;
    Ok(bridge.symbol(handle, symbol)?)
}

pub fn describe(packed: i64) -> DescribeReport {
    let descriptor = CallDescriptor::decode(packed);
    let target = TargetAbi::current();
    let returns = descriptor.return_type();
    let convention = descriptor.convention();
    let supported = returns.is_some()
        && convention.map_or(false, |c| target.convention_support(c) != ConventionSupport::Unsupported);
    DescribeReport {
        descriptor: packed,
        returns: returns.map(|ty| ty.name().to_string()),
        convention: convention.map(|c| c.name().to_string()),
        target: target.name(),
        supported,
    }
}

/// Decimal or `0x` hex, with an optional sign
pub fn parse_integer(text: &str) -> Option<i128> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None if digits.bytes().all(|b| b.is_ascii_digit()) => digits.parse::<i128>().ok()?,
        None => return None,
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Read one command-line argument as the managed value for `kind`
pub fn parse_value(kind: ArgKind, text: &str) -> Result<Value, CliError> {
    if text == "null" {
        return Ok(Value::Null);
    }
    let bad = || CliError::BadValue { text: text.to_string(), expected: kind.expected() };
    match kind {
        ArgKind::Int | ArgKind::IntPtr | ArgKind::Int64 | ArgKind::Pointer => {
            parse_integer(text).map(Value::Integer).ok_or_else(bad)
        }
        ArgKind::Float | ArgKind::Double => text.trim().parse::<f64>().map(Value::Flonum).map_err(|_| bad()),
        ArgKind::String => Ok(Value::string(text)),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Unspecified | Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(n) => i64::try_from(*n)
            .map(Json::from)
            .or_else(|_| u64::try_from(*n).map(Json::from))
            .unwrap_or_else(|_| Json::String(n.to_string())),
        Value::Flonum(x) => serde_json::Number::from_f64(*x).map_or(Json::Null, Json::Number),
        Value::String(s) | Value::Symbol(s) => Json::String(s.clone()),
        Value::Bytevector(bytes) => Json::from(bytes.clone()),
        other => Json::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_forms() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("-17"), Some(-17));
        assert_eq!(parse_integer("+8"), Some(8));
        assert_eq!(parse_integer("0x1F"), Some(31));
        assert_eq!(parse_integer("-0X10"), Some(-16));
        assert_eq!(parse_integer("18446744073709551615"), Some(u64::MAX as i128));
        assert_eq!(parse_integer(""), None);
        assert_eq!(parse_integer("0x"), None);
        assert_eq!(parse_integer("12ab"), None);
        assert_eq!(parse_integer("--1"), None);
    }

    #[test]
    fn test_parse_value_by_kind() {
        assert_eq!(parse_value(ArgKind::Int, "0x7f").unwrap(), Value::int(127));
        assert_eq!(parse_value(ArgKind::Double, "2.5").unwrap(), Value::Flonum(2.5));
        assert_eq!(parse_value(ArgKind::Float, "-1").unwrap(), Value::Flonum(-1.0));
        assert_eq!(parse_value(ArgKind::String, "0x10").unwrap(), Value::string("0x10"));
        assert_eq!(parse_value(ArgKind::Pointer, "null").unwrap(), Value::Null);
        assert_eq!(parse_value(ArgKind::String, "null").unwrap(), Value::Null);

        let err = parse_value(ArgKind::Int64, "lots").unwrap_err();
        assert!(matches!(err, CliError::BadValue { ref text, .. } if text == "lots"));
        assert!(parse_value(ArgKind::Double, "pi").is_err());
    }

    #[test]
    fn test_describe_decodes_fields() {
        let report = describe(CallDescriptor::new(ReturnType::Double, Convention::Default).encode());
        assert_eq!(report.returns.as_deref(), Some("double"));
        assert_eq!(report.convention.as_deref(), Some("cdecl"));
        assert!(report.supported);

        let report = describe(0x0214);
        assert_eq!(report.returns, None);
        assert_eq!(report.convention, None);
        assert!(!report.supported);
    }

    #[test]
    fn test_value_to_json() {
        use serde_json::json;
        assert_eq!(value_to_json(&Value::int(-3)), json!(-3));
        assert_eq!(value_to_json(&Value::from(u64::MAX)), json!(u64::MAX));
        assert_eq!(value_to_json(&Value::Integer(i128::MAX)), json!(i128::MAX.to_string()));
        assert_eq!(value_to_json(&Value::Flonum(0.5)), json!(0.5));
        assert_eq!(value_to_json(&Value::Null), json!(null));
        assert_eq!(value_to_json(&Value::string("hi")), json!("hi"));
        assert_eq!(value_to_json(&Value::Bytevector(vec![99, 0xe9])), json!([99, 233]));
        assert_eq!(value_to_json(&Value::Bool(true)), json!(true));
    }

    #[test]
    fn test_argument_count_checked_before_loading() {
        let args = vec!["1".to_string()];
        let request = CallRequest {
            library: "/nonexistent/library.so",
            symbol: "f",
            descriptor: CallDescriptor::new(ReturnType::Int, Convention::Default),
            signature: "ii",
            args: &args,
        };
        let err = call(&Config::default(), &request).unwrap_err();
        assert!(matches!(err, CliError::ArgumentCount { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_cli_parses_call() {
        let cli = Cli::try_parse_from([
            "dynbridge", "-vv", "call", "libm.so.6", "pow", "--returns", "double", "-s", "dd", "2", "-10",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Call { returns, signature, args, stdcall, .. } => {
                assert_eq!(returns, ReturnType::Double);
                assert_eq!(signature, "dd");
                assert_eq!(args, vec!["2".to_string(), "-10".to_string()]);
                assert!(!stdcall);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_return_type() {
        assert!(Cli::try_parse_from(["dynbridge", "call", "lib", "f", "--returns", "long double"]).is_err());
    }

    #[test]
    fn test_lookup_output() {
        let mut out = Vec::new();
        let command = Command::Lookup {
            library: String::new(),
            symbol: "dynbridge_no_such_symbol".to_string(),
            json: false,
        };
        execute(&command, &Config::default(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "#f\n");
    }
}
