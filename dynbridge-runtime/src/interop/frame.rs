//! Argument frame construction
//!
//! Turns a signature plus managed values into native slots. The frame owns
//! every buffer its slots point into, so it must outlive the call.

use std::ffi::CString;

use smallvec::SmallVec;

use super::abi::{Placement, RegisterAllocator, TargetAbi};
use super::marshal::{self, ConvertError};
use super::types::{Signature, MAX_ARGC};
use crate::objects::Value;

/// One native argument value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    Int(i32),
    IntPtr(isize),
    Int64(i64),
    Pointer(usize),
    Float(f32),
    Double(f64),
}

impl Slot {
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float(_) | Self::Double(_))
    }
}

/// Frame construction failures, reported before any native code runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    TooManyArguments { got: usize },
    SignatureMismatch { expected: usize, got: usize },
    WrongType { index: usize, expected: &'static str },
    OutOfRange { index: usize, expected: &'static str },
}

/// Inline capacity covering typical arities
type Slots = SmallVec<[Slot; 8]>;

#[derive(Debug, Default)]
pub struct ArgFrame {
    slots: Slots,
    float_count: usize,
    gp_count: usize,
    stack_count: usize,
    buffers: Vec<CString>,
}

impl ArgFrame {
    /// Build a frame for the current target
    pub fn build(signature: &Signature, args: &[Value]) -> Result<Self, ArgError> {
        Self::build_for(TargetAbi::current(), signature, args)
    }

    /// Build a frame, classifying slots under `abi`
    pub fn build_for(abi: TargetAbi, signature: &Signature, args: &[Value]) -> Result<Self, ArgError> {
        if args.len() > MAX_ARGC {
            return Err(ArgError::TooManyArguments { got: args.len() });
        }
        if signature.len() != args.len() {
            return Err(ArgError::SignatureMismatch {
                expected: signature.len(),
                got: args.len(),
            });
        }

        let mut frame = ArgFrame::default();
        let mut allocator = RegisterAllocator::new(abi);

        for (index, (kind, value)) in signature.iter().zip(args).enumerate() {
            let marshaled = marshal::to_native(value, kind).map_err(|e| match e {
                ConvertError::WrongType => ArgError::WrongType {
                    index,
                    expected: kind.expected(),
                },
                ConvertError::OutOfRange => ArgError::OutOfRange {
                    index,
                    expected: kind.expected(),
                },
            })?;

            match allocator.place(kind.is_float()) {
                Placement::FpRegister => frame.float_count += 1,
                Placement::GpRegister => frame.gp_count += 1,
                Placement::Stack => frame.stack_count += 1,
            }
            frame.slots.push(marshaled.slot);
            if let Some(buffer) = marshaled.buffer {
                frame.buffers.push(buffer);
            }
        }

        Ok(frame)
    }

    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots delivered in floating-point registers
    #[inline]
    pub fn float_count(&self) -> usize {
        self.float_count
    }

    /// Slots delivered in general-purpose registers
    #[inline]
    pub fn gp_count(&self) -> usize {
        self.gp_count
    }

    /// Slots that overflow to the stack
    #[inline]
    pub fn stack_count(&self) -> usize {
        self.stack_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(s: &str) -> Signature {
        s.parse().unwrap()
    }

    #[test]
    fn test_too_many_checked_before_length() {
        let args = vec![Value::int(1); MAX_ARGC + 1];
        let err = ArgFrame::build(&sig("i"), &args).unwrap_err();
        assert_eq!(err, ArgError::TooManyArguments { got: MAX_ARGC + 1 });
    }

    #[test]
    fn test_length_mismatch() {
        let err = ArgFrame::build(&sig("ii"), &[Value::int(1)]).unwrap_err();
        assert_eq!(err, ArgError::SignatureMismatch { expected: 2, got: 1 });
    }

    #[test]
    fn test_first_failure_reports_index() {
        let args = [Value::int(1), Value::string("x"), Value::Bool(true)];
        let err = ArgFrame::build(&sig("iid"), &args).unwrap_err();
        assert!(matches!(err, ArgError::WrongType { index: 1, .. }));
    }

    #[test]
    fn test_counts_under_sysv() {
        let args = [
            Value::int(1),
            Value::Flonum(2.0),
            Value::string("s"),
            Value::Flonum(3.0),
        ];
        let frame = ArgFrame::build_for(TargetAbi::SysV, &sig("idsf"), &args).unwrap();
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.float_count(), 2);
        assert_eq!(frame.gp_count(), 2);
        assert_eq!(frame.stack_count(), 0);
        assert_eq!(frame.buffers.len(), 1);
    }

    #[test]
    fn test_flat_abi_counts_everything_on_stack() {
        let frame = ArgFrame::build_for(TargetAbi::X86, &sig("id"), &[Value::int(1), Value::Flonum(1.0)]).unwrap();
        assert_eq!(frame.stack_count(), 2);
        assert_eq!(frame.float_count(), 0);
    }

    #[test]
    fn test_empty_frame() {
        let frame = ArgFrame::build(&Signature::default(), &[]).unwrap();
        assert!(frame.is_empty());
    }
}
