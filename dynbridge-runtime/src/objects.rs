//! Object system - the managed values that cross the native boundary
//!
//! Design: a small owned enum standing in for the host interpreter's heap:
//! - Exact integers are `i128` so every native integer width (including
//!   `uint64_t`) converts without loss
//! - `Null` is the "no value" sentinel produced by null `char*` returns and
//!   accepted for null pointer/string arguments
//! - Procedures are reference counted and `Send + Sync` because native code
//!   may call back into them from any thread

use std::fmt;
use std::sync::Arc;

use crate::error::FfiResult;

/// Signature of the Rust body behind a managed procedure.
pub type ProcedureFn = dyn Fn(&[Value]) -> FfiResult<Value> + Send + Sync;

/// A managed closure: a name for diagnostics, an optional declared arity and
/// the body to run.
#[derive(Clone)]
pub struct Procedure {
    name: Arc<str>,
    arity: Option<usize>,
    body: Arc<ProcedureFn>,
}

impl Procedure {
    /// Create a procedure accepting any number of arguments
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&[Value]) -> FfiResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            arity: None,
            body: Arc::new(body),
        }
    }

    /// Create a procedure with a fixed arity
    pub fn with_arity<F>(name: &str, arity: usize, body: F) -> Self
    where
        F: Fn(&[Value]) -> FfiResult<Value> + Send + Sync + 'static,
    {
        Self {
            arity: Some(arity),
            ..Self::new(name, body)
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Apply the procedure to `args`
    pub fn call(&self, args: &[Value]) -> FfiResult<Value> {
        (self.body)(args)
    }

    /// Identity comparison, as managed closures have no structural equality
    #[inline]
    pub fn ptr_eq(&self, other: &Procedure) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<procedure {}>", self.name)
    }
}

/// Universal managed value
#[derive(Debug, Clone)]
pub enum Value {
    Unspecified,
    /// "No value" sentinel, distinct from `#f` and from the empty string
    Null,
    Bool(bool),
    Integer(i128),
    Flonum(f64),
    String(String),
    Symbol(String),
    Bytevector(Vec<u8>),
    Procedure(Procedure),
}

/// Object kinds, used when reporting wrong-type arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Unspecified,
    Null,
    Bool,
    Integer,
    Flonum,
    String,
    Symbol,
    Bytevector,
    Procedure,
}

impl ObjectType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Null => "null",
            Self::Bool => "boolean",
            Self::Integer => "exact integer",
            Self::Flonum => "flonum",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Bytevector => "bytevector",
            Self::Procedure => "procedure",
        }
    }
}

impl Value {
    #[inline]
    pub fn int(n: impl Into<i128>) -> Self {
        Value::Integer(n.into())
    }

    #[inline]
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    #[inline]
    pub fn symbol(s: impl Into<String>) -> Self {
        Value::Symbol(s.into())
    }

    pub fn get_type(&self) -> ObjectType {
        match self {
            Value::Unspecified => ObjectType::Unspecified,
            Value::Null => ObjectType::Null,
            Value::Bool(_) => ObjectType::Bool,
            Value::Integer(_) => ObjectType::Integer,
            Value::Flonum(_) => ObjectType::Flonum,
            Value::String(_) => ObjectType::String,
            Value::Symbol(_) => ObjectType::Symbol,
            Value::Bytevector(_) => ObjectType::Bytevector,
            Value::Procedure(_) => ObjectType::Procedure,
        }
    }

    /// Exact integer payload, if this is one
    #[inline]
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_flonum(&self) -> Option<f64> {
        match self {
            Value::Flonum(f) => Some(*f),
            _ => None,
        }
    }

    /// Text of a string or symbol
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_procedure(&self) -> Option<&Procedure> {
        match self {
            Value::Procedure(p) => Some(p),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Everything except `#f` counts as true
    #[inline]
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unspecified, Value::Unspecified) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Flonum(a), Value::Flonum(b)) => a.to_bits() == b.to_bits() || a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Bytevector(a), Value::Bytevector(b)) => a == b,
            (Value::Procedure(a), Value::Procedure(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unspecified => write!(f, "#<unspecified>"),
            Value::Null => write!(f, "#<null>"),
            Value::Bool(true) => write!(f, "#t"),
            Value::Bool(false) => write!(f, "#f"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Flonum(x) => {
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::String(s) => write!(f, "{:?}", s),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Bytevector(bytes) => {
                write!(f, "#vu8(")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", b)?;
                }
                write!(f, ")")
            }
            Value::Procedure(p) => write!(f, "{:?}", p),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Flonum(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Procedure> for Value {
    fn from(p: Procedure) -> Self {
        Value::Procedure(p)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Integer(n as i128)
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
