//! Boundary operations exposed to managed code
//!
//! `Bridge` is the per-execution-context FFI state: its own error-state
//! copy, loaded libraries and live trampolines. Each operation exists twice:
//! - a typed Rust method (`open_library`, `symbol`, `call`, ...)
//! - an argv-style subr in `SUBRS` that checks managed arguments the way the
//!   host interpreter reports violations and then calls the typed method
//!
//! Native calls trust the caller's descriptor and signature. A wrong
//! description is undefined behaviour in the callee, exactly as in C.

use std::ffi::c_void;
use std::path::PathBuf;

use super::call;
use super::callback::TrampolineTable;
use super::errno::{os, ErrorState};
use super::frame::{ArgError, ArgFrame};
use super::library::{LibraryTable, LoadError, SymbolError};
use super::types::{CallDescriptor, Signature, SignatureError, MAX_ARGC};
use crate::error::{FfiError, FfiResult};
use crate::logging::log_ffi_error;
use crate::objects::{Procedure, Value};

/// Signature of a boundary operation
pub type Subr = fn(&mut Bridge, &[Value]) -> FfiResult<Value>;

/// Every boundary operation, by the name managed code binds it to
pub static SUBRS: &[(&str, Subr)] = &[
    ("load-library", subr_load_library),
    ("lookup-symbol", subr_lookup_symbol),
    ("call-native", subr_call_native),
    ("error-code", subr_error_code),
    ("platform-last-error", subr_platform_last_error),
    ("platform-error->string", subr_platform_error_string),
    ("make-trampoline", subr_make_trampoline),
    ("release-trampoline", subr_release_trampoline),
];

/// Position of the first native argument in a `call-native` argv
const CALL_NATIVE_FIXED: usize = 4;

#[derive(Debug, Default)]
pub struct Bridge {
    errors: ErrorState,
    libraries: LibraryTable,
    trampolines: TrampolineTable,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bridge whose loader also looks in `paths`
    pub fn with_search_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            libraries: LibraryTable::with_search_paths(paths),
            ..Self::default()
        }
    }

    /// Run the boundary operation named `name`
    pub fn apply(&mut self, name: &str, args: &[Value]) -> FfiResult<Value> {
        let subr = lookup_subr(name)
            .ok_or_else(|| FfiError::procedure(name, "no such boundary operation"))?;
        subr(self, args).map_err(|err| {
            log_ffi_error(name, &err);
            err
        })
    }

    // ------------------------------------------------------------------
    // Typed API
    // ------------------------------------------------------------------

    /// Load a shared library; the empty string names the running program
    pub fn open_library(&mut self, path: &str) -> FfiResult<usize> {
        self.libraries.open(path).map_err(|err| load_error("load-library", err))
    }

    /// Address of `name` in the library behind `handle`
    pub fn symbol(&self, handle: usize, name: &str) -> FfiResult<Option<usize>> {
        self.libraries
            .lookup(handle, name)
            .map_err(|err| symbol_error("lookup-symbol", err))
    }

    /// Call the native function at `address`
    ///
    /// Checks happen in this order, all before native code runs: return
    /// type and convention, argument count, signature length, then each
    /// argument. Errors for individual arguments are attributed to `name`.
    ///
    /// # Safety
    /// `address` must be a function matching `descriptor` and `signature`.
    pub unsafe fn call(
        &mut self,
        descriptor: CallDescriptor,
        address: usize,
        name: &str,
        signature: &Signature,
        args: &[Value],
    ) -> FfiResult<Value> {
        self.call_at(descriptor, address, name, signature, args, 0)
    }

    unsafe fn call_at(
        &mut self,
        descriptor: CallDescriptor,
        address: usize,
        name: &str,
        signature: &Signature,
        args: &[Value],
        first_position: usize,
    ) -> FfiResult<Value> {
        let (return_type, convention) = call::resolve_descriptor(descriptor)?;
        let stub = call::select_stub(convention, return_type.width())?;
        let frame = ArgFrame::build(signature, args)
            .map_err(|err| arg_error(name, err, args, first_position))?;
        Ok(call::invoke_with(
            stub,
            address as *const c_void,
            name,
            return_type,
            &frame,
            &mut self.errors,
        ))
    }

    /// Snapshot of this context's error state
    #[inline]
    pub fn error_state(&self) -> ErrorState {
        self.errors
    }

    /// Set the saved `errno`; the live thread value is untouched
    #[inline]
    pub fn set_error_code(&mut self, code: i32) {
        self.errors.errno = code;
    }

    /// Set the saved last-error value; the live thread value is untouched
    #[inline]
    pub fn set_last_error(&mut self, code: u32) {
        self.errors.last_error = code;
    }

    #[inline]
    pub fn trampolines(&self) -> &TrampolineTable {
        &self.trampolines
    }

    /// Create a native entry point that calls `procedure`
    pub fn make_trampoline(&self, argc: usize, float_argc: usize, procedure: Procedure) -> FfiResult<usize> {
        self.trampolines.create(argc, float_argc, procedure)
    }

    pub fn release_trampoline(&self, address: usize) -> bool {
        self.trampolines.release(address)
    }
}

pub fn lookup_subr(name: &str) -> Option<Subr> {
    SUBRS.iter().find(|(n, _)| *n == name).map(|(_, subr)| *subr)
}

fn load_error(who: &str, err: LoadError) -> FfiError {
    match err {
        LoadError::InvalidName(name) => FfiError::invalid_argument(who, "library name contains a NUL byte,", name, Some(0)),
        LoadError::Failed { path, reason } => FfiError::invalid_argument(who, reason, format!("{:?}", path), None),
    }
}

fn symbol_error(who: &str, err: SymbolError) -> FfiError {
    match err {
        SymbolError::UnknownHandle(handle) => {
            FfiError::invalid_argument(who, "no library is loaded with handle", handle, Some(0))
        }
        SymbolError::InvalidName(name) => {
            FfiError::invalid_argument(who, "symbol name contains a NUL byte,", format!("{:?}", name), Some(1))
        }
    }
}

fn arg_error(name: &str, err: ArgError, args: &[Value], first_position: usize) -> FfiError {
    match err {
        ArgError::TooManyArguments { got } => {
            FfiError::invalid_argument("call-native", "too many arguments,", got, None)
        }
        ArgError::SignatureMismatch { expected, got } => FfiError::invalid_argument(
            "call-native",
            format!("signature describes {} arguments, but got", expected),
            got,
            Some(3),
        ),
        ArgError::WrongType { index, expected } | ArgError::OutOfRange { index, expected } => {
            FfiError::wrong_type(name, first_position + index, expected, &args[index])
        }
    }
}

// ----------------------------------------------------------------------
// Argument checks
// ----------------------------------------------------------------------

fn check_argc(who: &str, args: &[Value], min: usize, max: Option<usize>) -> FfiResult<()> {
    let got = args.len();
    if got < min || max.map_or(false, |max| got > max) {
        return Err(FfiError::wrong_arg_count(who, min, max, got));
    }
    Ok(())
}

/// Exact positive integer that fits a native address
fn address_arg(who: &str, args: &[Value], position: usize, expected: &str) -> FfiResult<usize> {
    match &args[position] {
        Value::Integer(n) if *n > 0 => usize::try_from(*n).map_err(|_| {
            FfiError::invalid_argument(who, "value out of bound,", n, Some(position))
        }),
        other => Err(FfiError::wrong_type(who, position, expected, other)),
    }
}

fn count_arg(who: &str, args: &[Value], position: usize) -> FfiResult<usize> {
    match &args[position] {
        Value::Integer(n) if *n >= 0 => usize::try_from(*n).map_err(|_| {
            FfiError::invalid_argument(who, "value out of range,", n, Some(position))
        }),
        other => Err(FfiError::wrong_type(who, position, "exact non-negative integer", other)),
    }
}

fn exact_integer_arg(who: &str, args: &[Value], position: usize) -> FfiResult<i128> {
    args[position]
        .as_integer()
        .ok_or_else(|| FfiError::wrong_type(who, position, "exact integer", &args[position]))
}

// ----------------------------------------------------------------------
// Subrs
// ----------------------------------------------------------------------

fn subr_load_library(bridge: &mut Bridge, args: &[Value]) -> FfiResult<Value> {
    const WHO: &str = "load-library";
    check_argc(WHO, args, 1, Some(1))?;
    match &args[0] {
        Value::String(path) => bridge.open_library(path).map(Value::from),
        other => Err(FfiError::wrong_type(WHO, 0, "string", other)),
    }
}

fn subr_lookup_symbol(bridge: &mut Bridge, args: &[Value]) -> FfiResult<Value> {
    const WHO: &str = "lookup-symbol";
    check_argc(WHO, args, 2, Some(2))?;
    let handle = address_arg(WHO, args, 0, "shared object handle")?;
    let name = args[1]
        .as_str()
        .ok_or_else(|| FfiError::wrong_type(WHO, 1, "string or symbol", &args[1]))?;
    Ok(match bridge.symbol(handle, name)? {
        Some(address) => Value::from(address),
        None => Value::Bool(false),
    })
}

fn subr_call_native(bridge: &mut Bridge, args: &[Value]) -> FfiResult<Value> {
    const WHO: &str = "call-native";
    check_argc(WHO, args, CALL_NATIVE_FIXED, None)?;

    let descriptor = args[0]
        .as_integer()
        .and_then(|n| i64::try_from(n).ok())
        .ok_or_else(|| FfiError::wrong_type(WHO, 0, "fixnum", &args[0]))?;
    let address = address_arg(WHO, args, 1, "c function address")?;
    let name = match &args[2] {
        Value::Symbol(name) => name.as_str(),
        other => return Err(FfiError::wrong_type(WHO, 2, "symbol", other)),
    };
    let signature = match &args[3] {
        Value::String(sig) => sig,
        other => return Err(FfiError::wrong_type(WHO, 3, "string", other)),
    };

    let native_args = &args[CALL_NATIVE_FIXED..];
    if native_args.len() > MAX_ARGC {
        return Err(FfiError::invalid_argument(WHO, "too many arguments,", args.len(), None));
    }
    let signature: Signature = signature
        .parse()
        .map_err(|err: SignatureError| {
            FfiError::invalid_argument(WHO, format!("{},", err), format!("{:?}", signature), Some(3))
        })?;

    // Safety: managed code vouches for the description of `address`.
    unsafe {
        bridge.call_at(
            CallDescriptor::decode(descriptor),
            address,
            name,
            &signature,
            native_args,
            CALL_NATIVE_FIXED,
        )
    }
}

fn subr_error_code(bridge: &mut Bridge, args: &[Value]) -> FfiResult<Value> {
    const WHO: &str = "error-code";
    check_argc(WHO, args, 0, Some(1))?;
    if args.is_empty() {
        return Ok(Value::from(bridge.error_state().errno));
    }
    let n = exact_integer_arg(WHO, args, 0)?;
    let code = i32::try_from(n)
        .map_err(|_| FfiError::invalid_argument(WHO, "value out of range,", n, Some(0)))?;
    bridge.set_error_code(code);
    Ok(Value::Unspecified)
}

fn subr_platform_last_error(bridge: &mut Bridge, args: &[Value]) -> FfiResult<Value> {
    const WHO: &str = "platform-last-error";
    if !os::HAS_LAST_ERROR {
        return Err(FfiError::unsupported(WHO));
    }
    check_argc(WHO, args, 0, Some(1))?;
    if args.is_empty() {
        return Ok(Value::from(bridge.error_state().last_error));
    }
    let n = exact_integer_arg(WHO, args, 0)?;
    // Negative values are 32-bit error codes written in signed form
    let code = if n >= 0 {
        u32::try_from(n).ok()
    } else {
        i32::try_from(n).ok().map(|v| v as u32)
    };
    let code = code.ok_or_else(|| FfiError::invalid_argument(WHO, "value out of range,", n, Some(0)))?;
    bridge.set_last_error(code);
    Ok(Value::Unspecified)
}

fn subr_platform_error_string(_bridge: &mut Bridge, args: &[Value]) -> FfiResult<Value> {
    const WHO: &str = "platform-error->string";
    if !os::HAS_LAST_ERROR {
        return Err(FfiError::unsupported(WHO));
    }
    check_argc(WHO, args, 1, Some(1))?;
    let n = exact_integer_arg(WHO, args, 0)?;
    let code = u32::try_from(n)
        .map_err(|_| FfiError::invalid_argument(WHO, "value out of range,", n, Some(0)))?;
    Ok(Value::String(os::format_message(code).unwrap_or_default()))
}

fn subr_make_trampoline(bridge: &mut Bridge, args: &[Value]) -> FfiResult<Value> {
    const WHO: &str = "make-trampoline";
    check_argc(WHO, args, 3, Some(3))?;
    let argc = count_arg(WHO, args, 0)?;
    let float_argc = count_arg(WHO, args, 1)?;
    let procedure = args[2]
        .as_procedure()
        .ok_or_else(|| FfiError::wrong_type(WHO, 2, "procedure", &args[2]))?;
    bridge
        .make_trampoline(argc, float_argc, procedure.clone())
        .map(Value::from)
}

fn subr_release_trampoline(bridge: &mut Bridge, args: &[Value]) -> FfiResult<Value> {
    const WHO: &str = "release-trampoline";
    check_argc(WHO, args, 1, Some(1))?;
    let address = address_arg(WHO, args, 0, "trampoline address")?;
    Ok(Value::Bool(bridge.release_trampoline(address)))
}
