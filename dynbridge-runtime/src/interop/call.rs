//! Dynamic function calling
//!
//! Resolves a call descriptor against the current target, picks the stub
//! for (convention, return width) and runs it inside an error-state bracket.

use std::ffi::c_void;

use super::abi::{ConventionSupport, TargetAbi};
use super::errno::{ErrnoBracket, ErrorState};
use super::frame::ArgFrame;
use super::marshal;
use super::stub::{CallStub, DEFAULT_STUBS, STDCALL_STUBS};
use super::types::{CallDescriptor, Convention, ReturnType, ReturnWidth};
use crate::error::{FfiError, FfiResult};
use crate::logging::{log_ffi_call, log_ffi_return};
use crate::objects::Value;

const WHO: &str = "call-native";

/// Split a descriptor into its return type and convention, rejecting
/// unknown tags before any native code runs
pub fn resolve_descriptor(descriptor: CallDescriptor) -> FfiResult<(ReturnType, Convention)> {
    let encoded = descriptor.encode();
    let return_type = descriptor.return_type().ok_or_else(|| {
        FfiError::invalid_argument(WHO, "invalid c function return type,", encoded, Some(0))
    })?;
    let convention = descriptor.convention().ok_or_else(|| {
        FfiError::invalid_argument(WHO, "invalid calling convention,", encoded, Some(0))
    })?;
    Ok((return_type, convention))
}

/// Stub for (convention, width) on the current target
pub fn select_stub(convention: Convention, width: ReturnWidth) -> FfiResult<&'static dyn CallStub> {
    select_stub_for(TargetAbi::current(), convention, width)
}

/// Stub for (convention, width) on `abi`
///
/// Callee-cleanup is honoured natively on 32-bit x86 Windows and by the
/// default stubs on 64-bit Windows, where the two conventions are one.
/// Everywhere else it is an error.
pub fn select_stub_for(
    abi: TargetAbi,
    convention: Convention,
    width: ReturnWidth,
) -> FfiResult<&'static dyn CallStub> {
    let table = match (convention, abi.convention_support(convention)) {
        (_, ConventionSupport::Unsupported) => {
            return Err(FfiError::invalid_argument(
                WHO,
                format!("calling convention not supported on {},", abi.name()),
                convention.name(),
                Some(0),
            ))
        }
        (Convention::CalleeCleanup, ConventionSupport::Native) => &STDCALL_STUBS,
        _ => &DEFAULT_STUBS,
    };
    Ok(&table[width.index()])
}

/// Call `entry` through an explicit stub
///
/// # Safety
/// `entry` must be a native function whose parameter list matches `frame`,
/// whose return type is compatible with `return_type` and which follows
/// the convention `stub` was built for.
pub unsafe fn invoke_with(
    stub: &dyn CallStub,
    entry: *const c_void,
    name: &str,
    return_type: ReturnType,
    frame: &ArgFrame,
    state: &mut ErrorState,
) -> Value {
    debug_assert_eq!(stub.width(), return_type.width());
    log_ffi_call(name, frame.len(), frame.float_count());

    let raw = {
        let _bracket = ErrnoBracket::enter(state);
        stub.invoke(entry, frame)
    };

    let value = marshal::from_native(return_type, raw);
    log_ffi_return(name, &value, state.errno);
    value
}
