//! Reverse trampolines: native entry points that call managed procedures
//!
//! A trampoline's native signature is `(argc - float_argc)` pointer-width
//! integers followed by `float_argc` doubles, returning a pointer-width
//! integer. Trampolines are owned by a `TrampolineTable` and live until they
//! are released or the table is dropped.

use std::collections::HashMap;
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::panic::{self, AssertUnwindSafe};

use libffi::low;
use libffi::middle::{Cif, Closure, Type};
use parking_lot::Mutex;

use super::types::MAX_ARGC;
use crate::error::{FfiError, FfiResult};
use crate::logging::{log_callback_error, log_trampoline_created, log_trampoline_released};
use crate::objects::{Procedure, Value};

const WHO: &str = "make-trampoline";

/// What a trampoline calls, and how to read its raw arguments
struct Binding {
    procedure: Procedure,
    argc: usize,
    float_argc: usize,
}

impl Binding {
    #[inline]
    fn int_argc(&self) -> usize {
        self.argc - self.float_argc
    }

    /// Read raw native arguments into managed values
    ///
    /// # Safety
    /// `args` must hold `argc` pointers laid out as this binding's signature.
    unsafe fn arguments(&self, args: *const *const c_void) -> Vec<Value> {
        let ints = self.int_argc();
        (0..self.argc)
            .map(|i| {
                let slot = *args.add(i);
                if i < ints {
                    Value::Integer(*(slot as *const isize) as i128)
                } else {
                    Value::Flonum(*(slot as *const f64))
                }
            })
            .collect()
    }
}

/// Convert a procedure's result to the trampoline's native return value
pub fn native_result(value: &Value) -> isize {
    match value {
        Value::Integer(n) => *n as isize,
        Value::Bool(b) => *b as isize,
        Value::Flonum(x) => *x as isize,
        _ => 0,
    }
}

unsafe extern "C" fn trampoline_entry(
    _cif: &low::ffi_cif,
    result: &mut isize,
    args: *const *const c_void,
    binding: &Binding,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let values = binding.arguments(args);
        binding.procedure.call(&values)
    }));

    *result = match outcome {
        Ok(Ok(value)) => native_result(&value),
        Ok(Err(err)) => {
            log_callback_error(binding.procedure.name(), &err.to_string());
            0
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            log_callback_error(binding.procedure.name(), &message);
            0
        }
    };
}

/// A live native entry point bound to a procedure
pub struct Trampoline {
    closure: ManuallyDrop<Closure<'static>>,
    binding: *mut Binding,
    address: usize,
}

// The binding is only read through shared references, and Procedure is
// Send + Sync.
unsafe impl Send for Trampoline {}
unsafe impl Sync for Trampoline {}

impl Trampoline {
    fn new(argc: usize, float_argc: usize, procedure: Procedure) -> Self {
        let int_argc = argc - float_argc;
        let mut params: Vec<Type> = Vec::with_capacity(argc);
        params.extend(std::iter::repeat_with(Type::isize).take(int_argc));
        params.extend(std::iter::repeat_with(Type::f64).take(float_argc));
        let cif = Cif::new(params, Type::isize());

        let binding = Box::into_raw(Box::new(Binding {
            procedure,
            argc,
            float_argc,
        }));
        // The closure must not outlive the binding; Drop releases it first.
        let closure = Closure::new(cif, trampoline_entry, unsafe { &*binding });
        let address = *closure.code_ptr() as usize;

        Self {
            closure: ManuallyDrop::new(closure),
            binding,
            address,
        }
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }
}

impl Drop for Trampoline {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.closure);
            drop(Box::from_raw(self.binding));
        }
    }
}

/// Check `make-trampoline` arguments
pub fn validate(argc: usize, float_argc: usize, procedure: &Procedure) -> FfiResult<()> {
    if argc > MAX_ARGC {
        return Err(FfiError::invalid_argument(WHO, "too many arguments,", argc, Some(0)));
    }
    if float_argc > argc {
        return Err(FfiError::invalid_argument(
            WHO,
            "float argument count exceeds argument count,",
            float_argc,
            Some(1),
        ));
    }
    if let Some(arity) = procedure.arity() {
        if arity != argc {
            return Err(FfiError::invalid_argument(
                WHO,
                format!("procedure {} expects {} arguments, not", procedure.name(), arity),
                argc,
                Some(2),
            ));
        }
    }
    Ok(())
}

/// Owner of every trampoline created through one bridge
#[derive(Default)]
pub struct TrampolineTable {
    live: Mutex<HashMap<usize, Trampoline>>,
}

impl TrampolineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a trampoline and return its native entry address
    pub fn create(&self, argc: usize, float_argc: usize, procedure: Procedure) -> FfiResult<usize> {
        validate(argc, float_argc, &procedure)?;
        let name = procedure.name().to_string();
        let trampoline = Trampoline::new(argc, float_argc, procedure);
        let address = trampoline.address();
        self.live.lock().insert(address, trampoline);
        log_trampoline_created(address, argc, float_argc, &name);
        Ok(address)
    }

    /// Free the trampoline at `address`; false if none is live there
    pub fn release(&self, address: usize) -> bool {
        let removed = self.live.lock().remove(&address);
        match removed {
            Some(trampoline) => {
                drop(trampoline);
                log_trampoline_released(address);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, address: usize) -> bool {
        self.live.lock().contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }
}

impl std::fmt::Debug for TrampolineTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrampolineTable")
            .field("live", &self.len())
            .finish()
    }
}
