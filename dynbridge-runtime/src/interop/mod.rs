//! Interoperability - call native functions chosen at run time
//!
//! Design: every call is described at run time by a packed descriptor and a
//! signature string; nothing is compiled ahead of time for a given function.
//!
//! Architecture:
//! - `types.rs` - descriptors, return types, signatures
//! - `abi.rs` - target argument layout and convention support
//! - `marshal.rs` - managed value ↔ native scalar conversions
//! - `frame.rs` - signature + values → argument frame
//! - `errno.rs` - errno / last-error bracket around native calls
//! - `stub.rs` - libffi-backed native call stubs
//! - `call.rs` - dispatch by (convention, return width)
//! - `callback.rs` - reverse trampolines into managed procedures
//! - `library.rs` - dynamic library loading (libloading)
//! - `bridge.rs` - the boundary operations managed code calls

pub mod abi;
pub mod bridge;
pub mod call;
pub mod callback;
pub mod errno;
pub mod frame;
pub mod library;
pub mod marshal;
pub mod stub;
pub mod types;

pub use abi::{ConventionSupport, RegisterAllocator, TargetAbi};
pub use bridge::{lookup_subr, Bridge, Subr, SUBRS};
pub use callback::{Trampoline, TrampolineTable};
pub use errno::{ErrnoBracket, ErrorState};
pub use frame::{ArgError, ArgFrame, Slot};
pub use library::{Library, LibraryTable, LoadError, SymbolError};
pub use marshal::{from_native, to_native, RawResult};
pub use stub::{CallStub, FfiStub};
pub use types::{ArgKind, CallDescriptor, Convention, ReturnType, ReturnWidth, Signature, MAX_ARGC};
