//! Type definitions for dynamic native calls
//!
//! A call is described by two runtime-supplied pieces:
//! - a packed descriptor integer: return-type tag in bits 0-7, calling
//!   convention tag in bits 8-15
//! - a signature string with one character per native argument

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Hard limit on native arguments per call (and per trampoline)
pub const MAX_ARGC: usize = 32;

const RETURN_TAG_MASK: i64 = 0x00ff;
const CONVENTION_TAG_MASK: i64 = 0xff00;
const CONVENTION_SHIFT: u32 = 8;

/// Declared native return type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReturnType {
    Void = 0x00,
    Bool = 0x01,
    Short = 0x02,
    Int = 0x03,
    IntPtr = 0x04,
    UShort = 0x05,
    UInt = 0x06,
    UIntPtr = 0x07,
    Float = 0x08,
    Double = 0x09,
    String = 0x0a,
    SizeT = 0x0b,
    Int8 = 0x0c,
    UInt8 = 0x0d,
    Int16 = 0x0e,
    UInt16 = 0x0f,
    Int32 = 0x10,
    UInt32 = 0x11,
    Int64 = 0x12,
    UInt64 = 0x13,
}

impl ReturnType {
    pub const ALL: [ReturnType; 20] = [
        Self::Void,
        Self::Bool,
        Self::Short,
        Self::Int,
        Self::IntPtr,
        Self::UShort,
        Self::UInt,
        Self::UIntPtr,
        Self::Float,
        Self::Double,
        Self::String,
        Self::SizeT,
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
    ];

    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Width class of the raw value the native stub hands back
    #[inline]
    pub const fn width(self) -> ReturnWidth {
        match self {
            Self::Float => ReturnWidth::Float,
            Self::Double => ReturnWidth::Double,
            Self::Int64 | Self::UInt64 => ReturnWidth::Int64,
            _ => ReturnWidth::IntPtr,
        }
    }

    /// C spelling, also accepted by `FromStr`
    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Short => "short",
            Self::Int => "int",
            Self::IntPtr => "intptr_t",
            Self::UShort => "unsigned short",
            Self::UInt => "unsigned int",
            Self::UIntPtr => "uintptr_t",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "char*",
            Self::SizeT => "size_t",
            Self::Int8 => "int8_t",
            Self::UInt8 => "uint8_t",
            Self::Int16 => "int16_t",
            Self::UInt16 => "uint16_t",
            Self::Int32 => "int32_t",
            Self::UInt32 => "uint32_t",
            Self::Int64 => "int64_t",
            Self::UInt64 => "uint64_t",
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReturnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', " ");
        let found = Self::ALL.iter().copied().find(|ty| {
            ty.name() == normalized
                || (*ty == Self::String && (normalized == "string" || normalized == "char *"))
                || (*ty == Self::UShort && normalized == "ushort")
                || (*ty == Self::UInt && normalized == "uint")
        });
        found.ok_or_else(|| format!("unknown return type '{}'", s))
    }
}

/// Width class selecting the native stub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnWidth {
    IntPtr,
    Int64,
    Float,
    Double,
}

impl ReturnWidth {
    pub const ALL: [ReturnWidth; 4] = [Self::IntPtr, Self::Int64, Self::Float, Self::Double];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::IntPtr => 0,
            Self::Int64 => 1,
            Self::Float => 2,
            Self::Double => 3,
        }
    }
}

/// Calling convention tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Convention {
    /// Caller-cleanup C convention
    #[default]
    Default = 0x00,
    /// Callee-cleanup (`__stdcall`)
    CalleeCleanup = 0x01,
}

impl Convention {
    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Self::Default),
            0x01 => Some(Self::CalleeCleanup),
            _ => None,
        }
    }

    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "cdecl",
            Self::CalleeCleanup => "stdcall",
        }
    }
}

/// Packed call descriptor, kept as raw tags until dispatch so unknown tags
/// can be reported with the offending value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallDescriptor {
    pub return_tag: u8,
    pub convention_tag: u8,
}

impl CallDescriptor {
    #[inline]
    pub const fn new(return_type: ReturnType, convention: Convention) -> Self {
        Self {
            return_tag: return_type as u8,
            convention_tag: convention as u8,
        }
    }

    /// Split a packed descriptor. Bits above 15 are ignored.
    #[inline]
    pub const fn decode(packed: i64) -> Self {
        Self {
            return_tag: (packed & RETURN_TAG_MASK) as u8,
            convention_tag: ((packed & CONVENTION_TAG_MASK) >> CONVENTION_SHIFT) as u8,
        }
    }

    #[inline]
    pub const fn encode(self) -> i64 {
        (self.return_tag as i64) | ((self.convention_tag as i64) << CONVENTION_SHIFT)
    }

    #[inline]
    pub fn return_type(self) -> Option<ReturnType> {
        ReturnType::from_tag(self.return_tag)
    }

    #[inline]
    pub fn convention(self) -> Option<Convention> {
        Convention::from_tag(self.convention_tag)
    }
}

/// Native kind of one argument, named by its signature character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// `i` - C `int`
    Int,
    /// `l` - `intptr_t`
    IntPtr,
    /// `x` - `int64_t`
    Int64,
    /// `p` - `void*`
    Pointer,
    /// `f` - `float`
    Float,
    /// `d` - `double`
    Double,
    /// `s` - `const char*`
    String,
}

impl ArgKind {
    #[inline]
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'i' => Some(Self::Int),
            'l' => Some(Self::IntPtr),
            'x' => Some(Self::Int64),
            'p' => Some(Self::Pointer),
            'f' => Some(Self::Float),
            'd' => Some(Self::Double),
            's' => Some(Self::String),
            _ => None,
        }
    }

    #[inline]
    pub const fn code(self) -> char {
        match self {
            Self::Int => 'i',
            Self::IntPtr => 'l',
            Self::Int64 => 'x',
            Self::Pointer => 'p',
            Self::Float => 'f',
            Self::Double => 'd',
            Self::String => 's',
        }
    }

    /// Passed in floating-point registers where the ABI has them
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Description used in wrong-type reports
    pub const fn expected(self) -> &'static str {
        match self {
            Self::Int => "exact integer between -2147483648 and 4294967295",
            Self::IntPtr => "exact integer in intptr_t range",
            Self::Int64 => "exact integer between -9223372036854775808 and 18446744073709551615",
            Self::Pointer => "exact non-negative integer or null",
            Self::Float | Self::Double => "flonum",
            Self::String => "string, bytevector or null",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("invalid signature character '{code}' at position {position}")]
    UnknownCode { code: char, position: usize },
}

/// Parsed argument signature
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature(Vec<ArgKind>);

impl Signature {
    #[inline]
    pub fn new(kinds: Vec<ArgKind>) -> Self {
        Self(kinds)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn kinds(&self) -> &[ArgKind] {
        &self.0
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = ArgKind> + '_ {
        self.0.iter().copied()
    }

    pub fn float_count(&self) -> usize {
        self.0.iter().filter(|k| k.is_float()).count()
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .enumerate()
            .map(|(position, code)| {
                ArgKind::from_code(code).ok_or(SignatureError::UnknownCode { code, position })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Signature)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|k| write!(f, "{}", k.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_masks() {
        let d = CallDescriptor::decode(0x0112);
        assert_eq!(d.return_type(), Some(ReturnType::Int64));
        assert_eq!(d.convention(), Some(Convention::CalleeCleanup));

        let d = CallDescriptor::decode(0x0014);
        assert_eq!(d.return_type(), None);
        assert_eq!(d.convention(), Some(Convention::Default));

        assert_eq!(CallDescriptor::decode(0x0200).convention(), None);
        assert_eq!(CallDescriptor::new(ReturnType::String, Convention::CalleeCleanup).encode(), 0x010a);
    }

    #[test]
    fn test_tags_are_dense() {
        for (i, ty) in ReturnType::ALL.iter().enumerate() {
            assert_eq!(ty.tag() as usize, i);
            assert_eq!(ReturnType::from_tag(i as u8), Some(*ty));
        }
    }

    #[test]
    fn test_widths() {
        assert_eq!(ReturnType::Void.width(), ReturnWidth::IntPtr);
        assert_eq!(ReturnType::String.width(), ReturnWidth::IntPtr);
        assert_eq!(ReturnType::UInt64.width(), ReturnWidth::Int64);
        assert_eq!(ReturnType::Float.width(), ReturnWidth::Float);
    }

    #[test]
    fn test_return_type_names_parse() {
        assert_eq!("int32_t".parse::<ReturnType>(), Ok(ReturnType::Int32));
        assert_eq!("unsigned-int".parse::<ReturnType>(), Ok(ReturnType::UInt));
        assert_eq!("string".parse::<ReturnType>(), Ok(ReturnType::String));
        assert!("long double".parse::<ReturnType>().is_err());
    }

    #[test]
    fn test_signature_parse() {
        let sig: Signature = "ilxpfds".parse().unwrap();
        assert_eq!(sig.len(), 7);
        assert_eq!(sig.float_count(), 2);
        assert_eq!(sig.to_string(), "ilxpfds");

        let err = "iiq".parse::<Signature>().unwrap_err();
        assert_eq!(err, SignatureError::UnknownCode { code: 'q', position: 2 });
        assert!("".parse::<Signature>().unwrap().is_empty());
    }
}
