//! Logging - structured tracing events for the bridge
//!
//! Design: the runtime only emits `tracing` events; installing a subscriber
//! is left to the embedding program (see the root crate's
//! `infrastructure::logging`). Every event carries an `event` field so
//! output can be filtered by kind.

use tracing::{debug, error, info, trace, warn};

use crate::error::FfiError;
use crate::objects::Value;

/// Log a native call about to be made
#[inline]
pub fn log_ffi_call(function: &str, arg_count: usize, float_slots: usize) {
    debug!(
        event = "ffi_call",
        function = function,
        args = arg_count,
        float_slots = float_slots,
        "native function called"
    );
}

/// Log a native call's result
#[inline]
pub fn log_ffi_return(function: &str, result: &Value, errno: i32) {
    trace!(
        event = "ffi_return",
        function = function,
        result = %result,
        errno = errno,
        "native function returned"
    );
}

/// Log a failed boundary operation
pub fn log_ffi_error(who: &str, error: &FfiError) {
    debug!(
        event = "ffi_error",
        who = who,
        error = %error,
        "boundary operation failed"
    );
}

pub fn log_library_loaded(path: &str, handle: usize) {
    info!(
        event = "library_loaded",
        path = path,
        handle = handle,
        "shared library loaded"
    );
}

pub fn log_library_failed(path: &str, reason: &str) {
    warn!(
        event = "library_failed",
        path = path,
        reason = reason,
        "shared library could not be loaded"
    );
}

pub fn log_symbol_lookup(handle: usize, name: &str, address: Option<usize>) {
    trace!(
        event = "symbol_lookup",
        handle = handle,
        symbol = name,
        address = ?address,
        "symbol resolved"
    );
}

pub fn log_trampoline_created(address: usize, argc: usize, float_argc: usize, procedure: &str) {
    debug!(
        event = "trampoline_created",
        address = address,
        argc = argc,
        float_argc = float_argc,
        procedure = procedure,
        "callback trampoline created"
    );
}

pub fn log_trampoline_released(address: usize) {
    debug!(
        event = "trampoline_released",
        address = address,
        "callback trampoline released"
    );
}

/// Log a managed procedure failure inside a callback; the native caller sees 0
pub fn log_callback_error(procedure: &str, message: &str) {
    error!(
        event = "callback_error",
        procedure = procedure,
        error = message,
        "callback procedure failed, returning 0 to native caller"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            debug!(
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}
