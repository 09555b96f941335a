//! Native call stubs
//!
//! A stub knows how to transfer an `ArgFrame` into registers and stack for
//! one (convention, return width) pair and to collect the raw result. The
//! libffi-backed `FfiStub` covers every supported target.

use std::ffi::c_void;

use libffi::middle::{Arg, Cif, CodePtr, Type};
use libffi::raw;

use super::frame::{ArgFrame, Slot};
use super::marshal::RawResult;
use super::types::ReturnWidth;

/// Capability to invoke a native entry point with a prepared frame
pub trait CallStub: Send + Sync {
    /// # Safety
    /// `entry` must be a function whose parameters match `frame`'s slots
    /// and whose convention and return width match this stub.
    unsafe fn invoke(&self, entry: *const c_void, frame: &ArgFrame) -> RawResult;

    fn width(&self) -> ReturnWidth;
}

/// Machine-level calling convention used to prepare the libffi call interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubAbi {
    Default,
    /// `FFI_STDCALL`, only present on 32-bit x86 Windows
    Stdcall,
}

/// Stub implemented with a libffi call interface built per frame
#[derive(Debug, Clone, Copy)]
pub struct FfiStub {
    abi: StubAbi,
    width: ReturnWidth,
}

impl FfiStub {
    pub const fn new(abi: StubAbi, width: ReturnWidth) -> Self {
        Self { abi, width }
    }

    fn cif(&self, frame: &ArgFrame) -> Cif {
        let result = match self.width {
            ReturnWidth::IntPtr => Type::isize(),
            ReturnWidth::Int64 => Type::i64(),
            ReturnWidth::Float => Type::f32(),
            ReturnWidth::Double => Type::f64(),
        };
        let mut cif = Cif::new(frame.slots().iter().map(slot_type), result);
        if self.abi == StubAbi::Stdcall {
            set_stdcall(&mut cif);
        }
        cif
    }
}

#[cfg(all(target_arch = "x86", windows))]
fn set_stdcall(cif: &mut Cif) {
    cif.set_abi(raw::ffi_abi_FFI_STDCALL);
}

// Stdcall stubs are never selected on other targets
#[cfg(not(all(target_arch = "x86", windows)))]
fn set_stdcall(cif: &mut Cif) {
    cif.set_abi(raw::ffi_abi_FFI_DEFAULT_ABI);
}

fn slot_type(slot: &Slot) -> Type {
    match slot {
        Slot::Int(_) => Type::i32(),
        Slot::IntPtr(_) => Type::isize(),
        Slot::Int64(_) => Type::i64(),
        Slot::Pointer(_) => Type::pointer(),
        Slot::Float(_) => Type::f32(),
        Slot::Double(_) => Type::f64(),
    }
}

fn slot_arg(slot: &Slot) -> Arg {
    match slot {
        Slot::Int(v) => Arg::new(v),
        Slot::IntPtr(v) => Arg::new(v),
        Slot::Int64(v) => Arg::new(v),
        Slot::Pointer(v) => Arg::new(v),
        Slot::Float(v) => Arg::new(v),
        Slot::Double(v) => Arg::new(v),
    }
}

impl CallStub for FfiStub {
    unsafe fn invoke(&self, entry: *const c_void, frame: &ArgFrame) -> RawResult {
        let cif = self.cif(frame);
        let args: Vec<Arg> = frame.slots().iter().map(slot_arg).collect();
        let code = CodePtr(entry as *mut c_void);

        match self.width {
            ReturnWidth::IntPtr => RawResult::IntPtr(cif.call::<isize>(code, &args)),
            ReturnWidth::Int64 => RawResult::Int64(cif.call::<i64>(code, &args)),
            ReturnWidth::Float => RawResult::Float(cif.call::<f32>(code, &args)),
            ReturnWidth::Double => RawResult::Double(cif.call::<f64>(code, &args)),
        }
    }

    #[inline]
    fn width(&self) -> ReturnWidth {
        self.width
    }
}

/// Default-convention stubs, indexed by `ReturnWidth::index`
pub static DEFAULT_STUBS: [FfiStub; 4] = [
    FfiStub::new(StubAbi::Default, ReturnWidth::IntPtr),
    FfiStub::new(StubAbi::Default, ReturnWidth::Int64),
    FfiStub::new(StubAbi::Default, ReturnWidth::Float),
    FfiStub::new(StubAbi::Default, ReturnWidth::Double),
];

/// Callee-cleanup stubs, indexed by `ReturnWidth::index`
pub static STDCALL_STUBS: [FfiStub; 4] = [
    FfiStub::new(StubAbi::Stdcall, ReturnWidth::IntPtr),
    FfiStub::new(StubAbi::Stdcall, ReturnWidth::Int64),
    FfiStub::new(StubAbi::Stdcall, ReturnWidth::Float),
    FfiStub::new(StubAbi::Stdcall, ReturnWidth::Double),
];
