//! Type marshaling - managed values ↔ native scalars
//!
//! Design: scalars convert by value with explicit range checks; strings are
//! copied into NUL-terminated buffers that the caller keeps alive for the
//! duration of the call.

use std::ffi::{c_char, CStr, CString};

use super::frame::Slot;
use super::types::{ArgKind, ReturnType};
use crate::objects::Value;

/// Why a value could not be converted for a given `ArgKind`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertError {
    /// The value has the wrong object type
    WrongType,
    /// Right object type, but it does not fit the native type
    OutOfRange,
}

/// Result of converting one argument
#[derive(Debug)]
pub struct Marshaled {
    pub slot: Slot,
    /// Backing storage for `String` arguments, which `slot` points into
    pub buffer: Option<CString>,
}

impl Marshaled {
    #[inline]
    fn scalar(slot: Slot) -> Self {
        Self { slot, buffer: None }
    }
}

/// Convert one managed value to the native representation of `kind`
pub fn to_native(value: &Value, kind: ArgKind) -> Result<Marshaled, ConvertError> {
    match kind {
        ArgKind::Int => {
            let n = integer(value)?;
            if n < i32::MIN as i128 || n > u32::MAX as i128 {
                return Err(ConvertError::OutOfRange);
            }
            // Unsigned values above i32::MAX keep their bit pattern
            Ok(Marshaled::scalar(Slot::Int(n as u32 as i32)))
        }
        ArgKind::IntPtr => {
            let n = integer(value)?;
            if n < isize::MIN as i128 || n > usize::MAX as i128 {
                return Err(ConvertError::OutOfRange);
            }
            Ok(Marshaled::scalar(Slot::IntPtr(n as usize as isize)))
        }
        ArgKind::Int64 => {
            let n = integer(value)?;
            if n < i64::MIN as i128 || n > u64::MAX as i128 {
                return Err(ConvertError::OutOfRange);
            }
            Ok(Marshaled::scalar(Slot::Int64(n as u64 as i64)))
        }
        ArgKind::Pointer => match value {
            Value::Null => Ok(Marshaled::scalar(Slot::Pointer(0))),
            Value::Integer(n) => usize::try_from(*n)
                .map(|addr| Marshaled::scalar(Slot::Pointer(addr)))
                .map_err(|_| ConvertError::OutOfRange),
            _ => Err(ConvertError::WrongType),
        },
        ArgKind::Float => {
            let x = value.as_flonum().ok_or(ConvertError::WrongType)?;
            Ok(Marshaled::scalar(Slot::Float(x as f32)))
        }
        ArgKind::Double => {
            let x = value.as_flonum().ok_or(ConvertError::WrongType)?;
            Ok(Marshaled::scalar(Slot::Double(x)))
        }
        ArgKind::String => {
            let bytes: &[u8] = match value {
                Value::Null => return Ok(Marshaled::scalar(Slot::Pointer(0))),
                Value::String(s) => s.as_bytes(),
                Value::Bytevector(b) => b,
                _ => return Err(ConvertError::WrongType),
            };
            let buffer = CString::new(bytes).map_err(|_| ConvertError::WrongType)?;
            Ok(Marshaled {
                slot: Slot::Pointer(buffer.as_ptr() as usize),
                buffer: Some(buffer),
            })
        }
    }
}

#[inline]
fn integer(value: &Value) -> Result<i128, ConvertError> {
    value.as_integer().ok_or(ConvertError::WrongType)
}

/// Raw value returned by a native stub, one variant per `ReturnWidth`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawResult {
    IntPtr(isize),
    Int64(i64),
    Float(f32),
    Double(f64),
}

impl RawResult {
    /// Integer bits of an integer-class result, zero for float results
    #[inline]
    pub fn integer_bits(self) -> u64 {
        match self {
            Self::IntPtr(n) => n as usize as u64,
            Self::Int64(n) => n as u64,
            Self::Float(_) | Self::Double(_) => 0,
        }
    }
}

/// Interpret a raw native result as the declared return type
///
/// # Safety
/// For `ReturnType::String`, a nonzero result must point to a readable
/// NUL-terminated byte sequence.
pub unsafe fn from_native(ty: ReturnType, raw: RawResult) -> Value {
    let bits = raw.integer_bits();
    match ty {
        ReturnType::Void => Value::Unspecified,
        ReturnType::Bool => Value::Bool(bits as usize != 0),
        ReturnType::Short | ReturnType::Int16 => Value::Integer(bits as i16 as i128),
        ReturnType::UShort | ReturnType::UInt16 => Value::Integer(bits as u16 as i128),
        ReturnType::Int | ReturnType::Int32 => Value::Integer(bits as i32 as i128),
        ReturnType::UInt | ReturnType::UInt32 => Value::Integer(bits as u32 as i128),
        ReturnType::Int8 => Value::Integer(bits as i8 as i128),
        ReturnType::UInt8 => Value::Integer(bits as u8 as i128),
        ReturnType::Int64 => Value::Integer(bits as i64 as i128),
        ReturnType::UInt64 => Value::Integer(bits as i128),
        ReturnType::IntPtr => Value::Integer(bits as usize as isize as i128),
        ReturnType::UIntPtr | ReturnType::SizeT => Value::Integer(bits as usize as i128),
        ReturnType::Float => match raw {
            RawResult::Float(x) => Value::Flonum(x as f64),
            RawResult::Double(x) => Value::Flonum(x),
            _ => Value::Flonum(0.0),
        },
        ReturnType::Double => match raw {
            RawResult::Double(x) => Value::Flonum(x),
            RawResult::Float(x) => Value::Flonum(x as f64),
            _ => Value::Flonum(0.0),
        },
        ReturnType::String => {
            let ptr = bits as usize as *const c_char;
            if ptr.is_null() {
                Value::Null
            } else {
                // Bytes that are not UTF-8 come back untouched as a bytevector
                let bytes = CStr::from_ptr(ptr).to_bytes();
                match std::str::from_utf8(bytes) {
                    Ok(text) => Value::String(text.to_string()),
                    Err(_) => Value::Bytevector(bytes.to_vec()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interop::types::ReturnWidth;
    use proptest::prelude::*;

    #[test]
    fn test_int_accepts_unsigned_range() {
        let m = to_native(&Value::from(u32::MAX), ArgKind::Int).unwrap();
        assert_eq!(m.slot, Slot::Int(-1));
        assert_eq!(
            to_native(&Value::int(u32::MAX as i128 + 1), ArgKind::Int).unwrap_err(),
            ConvertError::OutOfRange
        );
        assert_eq!(
            to_native(&Value::Flonum(1.0), ArgKind::Int).unwrap_err(),
            ConvertError::WrongType
        );
    }

    #[test]
    fn test_pointer_and_null() {
        assert_eq!(to_native(&Value::Null, ArgKind::Pointer).unwrap().slot, Slot::Pointer(0));
        assert_eq!(
            to_native(&Value::int(-1), ArgKind::Pointer).unwrap_err(),
            ConvertError::OutOfRange
        );
        assert_eq!(to_native(&Value::Null, ArgKind::String).unwrap().slot, Slot::Pointer(0));
    }

    #[test]
    fn test_string_buffer_backs_slot() {
        let m = to_native(&Value::string("abc"), ArgKind::String).unwrap();
        let buffer = m.buffer.as_ref().unwrap();
        assert_eq!(m.slot, Slot::Pointer(buffer.as_ptr() as usize));
        assert_eq!(buffer.as_bytes(), b"abc");

        let interior = Value::Bytevector(vec![b'a', 0, b'b']);
        assert_eq!(to_native(&interior, ArgKind::String).unwrap_err(), ConvertError::WrongType);
    }

    #[test]
    fn test_null_string_return_is_sentinel() {
        let v = unsafe { from_native(ReturnType::String, RawResult::IntPtr(0)) };
        assert_eq!(v, Value::Null);

        let text = CString::new("hello").unwrap();
        let v = unsafe { from_native(ReturnType::String, RawResult::IntPtr(text.as_ptr() as isize)) };
        assert_eq!(v, Value::string("hello"));
    }

    #[test]
    fn test_non_utf8_string_return_keeps_bytes() {
        let latin1 = CString::new(vec![b'c', b'a', b'f', 0xe9]).unwrap();
        let v = unsafe { from_native(ReturnType::String, RawResult::IntPtr(latin1.as_ptr() as isize)) };
        assert_eq!(v, Value::Bytevector(vec![b'c', b'a', b'f', 0xe9]));
    }

    #[test]
    fn test_narrow_returns_reinterpret() {
        let raw = RawResult::IntPtr(0x1ff);
        assert_eq!(unsafe { from_native(ReturnType::Int8, raw) }, Value::int(-1));
        assert_eq!(unsafe { from_native(ReturnType::UInt8, raw) }, Value::int(255));
        assert_eq!(unsafe { from_native(ReturnType::Bool, raw) }, Value::Bool(true));
        assert_eq!(unsafe { from_native(ReturnType::Void, raw) }, Value::Unspecified);
        assert_eq!(
            unsafe { from_native(ReturnType::UInt64, RawResult::Int64(-1)) },
            Value::from(u64::MAX)
        );
    }

    /// Argument kind carrying the same native bits as a scalar return
    fn argument_for(ty: ReturnType) -> Option<ArgKind> {
        match ty {
            ReturnType::Void | ReturnType::String => None,
            ReturnType::Float => Some(ArgKind::Float),
            ReturnType::Double => Some(ArgKind::Double),
            ReturnType::Int64 | ReturnType::UInt64 => Some(ArgKind::Int64),
            ReturnType::IntPtr | ReturnType::UIntPtr | ReturnType::SizeT => Some(ArgKind::IntPtr),
            _ => Some(ArgKind::Int),
        }
    }

    fn slot_bits(slot: Slot) -> RawResult {
        match slot {
            Slot::Int(n) => RawResult::IntPtr(n as isize),
            Slot::IntPtr(n) => RawResult::IntPtr(n),
            Slot::Pointer(n) => RawResult::IntPtr(n as isize),
            Slot::Int64(n) => RawResult::Int64(n),
            Slot::Float(x) => RawResult::Float(x),
            Slot::Double(x) => RawResult::Double(x),
        }
    }

    proptest! {
        #[test]
        fn prop_integer_returns_feed_back_as_arguments(bits in any::<u64>(), tag in 1u8..0x14) {
            let ty = ReturnType::from_tag(tag).unwrap();
            prop_assume!(!matches!(ty, ReturnType::String | ReturnType::Float | ReturnType::Double));
            let raw = match ty.width() {
                ReturnWidth::Int64 => RawResult::Int64(bits as i64),
                _ => RawResult::IntPtr(bits as usize as isize),
            };
            let value = unsafe { from_native(ty, raw) };
            if ty == ReturnType::Bool {
                prop_assert!(matches!(value, Value::Bool(_)));
                return Ok(());
            }
            let kind = argument_for(ty).unwrap();
            let m = to_native(&value, kind).unwrap();
            let again = unsafe { from_native(ty, slot_bits(m.slot)) };
            prop_assert_eq!(again, value);
        }

        #[test]
        fn prop_double_round_trip(x in any::<f64>().prop_filter("nan", |x| !x.is_nan())) {
            let m = to_native(&Value::Flonum(x), ArgKind::Double).unwrap();
            let back = unsafe { from_native(ReturnType::Double, slot_bits(m.slot)) };
            prop_assert_eq!(back, Value::Flonum(x));
        }
    }
}
