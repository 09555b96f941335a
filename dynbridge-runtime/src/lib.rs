//! dynbridge runtime - dynamic foreign-function bridge
//!
//! Lets an interpreter load shared libraries, resolve symbols, call native
//! functions whose signature is only known at run time, and hand native code
//! callable entry points that run managed procedures.

pub mod error;
pub mod interop;
pub mod logging;
pub mod objects;

pub use error::{FfiError, FfiResult};
pub use interop::{Bridge, CallDescriptor, Convention, ReturnType, Signature};
pub use objects::{Procedure, Value};
