//! Calls into the system C library (Linux only)
#![cfg(target_os = "linux")]

use dynbridge_runtime::{Bridge, CallDescriptor, Convention, ReturnType, Signature, Value};

const LIBC: &str = "libc.so.6";

fn desc(ret: ReturnType) -> CallDescriptor {
    CallDescriptor::new(ret, Convention::Default)
}

#[test]
fn strlen_and_abs() {
    let mut bridge = Bridge::new();
    let libc = bridge.open_library(LIBC).unwrap();

    let strlen = bridge.symbol(libc, "strlen").unwrap().unwrap();
    let sig: Signature = "s".parse().unwrap();
    let n = unsafe { bridge.call(desc(ReturnType::SizeT), strlen, "strlen", &sig, &[Value::string("bridge")]) };
    assert_eq!(n, Ok(Value::int(6)));

    let labs = bridge.symbol(libc, "labs").unwrap().unwrap();
    let sig: Signature = "l".parse().unwrap();
    let n = unsafe { bridge.call(desc(ReturnType::IntPtr), labs, "labs", &sig, &[Value::int(-12)]) };
    assert_eq!(n, Ok(Value::int(12)));
}

#[test]
fn strtol_sets_errno_on_overflow() {
    let mut bridge = Bridge::new();
    let libc = bridge.open_library(LIBC).unwrap();
    let strtol = bridge.symbol(libc, "strtol").unwrap().unwrap();
    let sig: Signature = "spi".parse().unwrap();

    let args = [Value::string("99999999999999999999999"), Value::Null, Value::int(10)];
    let n = unsafe { bridge.call(desc(ReturnType::IntPtr), strtol, "strtol", &sig, &args) };
    assert_eq!(n, Ok(Value::from(isize::MAX)));
    assert_eq!(bridge.error_state().errno, libc::ERANGE);
}

#[test]
fn getenv_missing_is_null() {
    let mut bridge = Bridge::new();
    let libc = bridge.open_library(LIBC).unwrap();
    let getenv = bridge.symbol(libc, "getenv").unwrap().unwrap();
    let sig: Signature = "s".parse().unwrap();

    let v = unsafe {
        bridge.call(desc(ReturnType::String), getenv, "getenv", &sig, &[Value::string("DYNBRIDGE_UNSET_VARIABLE_X")])
    };
    assert_eq!(v, Ok(Value::Null));
}

#[test]
fn qsort_with_trampoline_comparator() {
    let mut bridge = Bridge::new();
    let libc = bridge.open_library(LIBC).unwrap();
    let qsort = bridge.symbol(libc, "qsort").unwrap().unwrap();

    // Comparator reads two `int*` arguments
    let compare = dynbridge_runtime::Procedure::with_arity("compare", 2, |args| {
        let a = args[0].as_integer().unwrap_or(0) as usize as *const i32;
        let b = args[1].as_integer().unwrap_or(0) as usize as *const i32;
        let (a, b) = unsafe { (*a, *b) };
        Ok(Value::int(a.cmp(&b) as i32))
    });
    let comparator = bridge.make_trampoline(2, 0, compare).unwrap();

    let mut data = [5i32, -2, 9, 0, 3];
    let sig: Signature = "pllp".parse().unwrap();
    let args = [
        Value::from(data.as_mut_ptr() as usize),
        Value::from(data.len()),
        Value::from(std::mem::size_of::<i32>()),
        Value::from(comparator),
    ];
    let v = unsafe { bridge.call(desc(ReturnType::Void), qsort, "qsort", &sig, &args) };
    assert_eq!(v, Ok(Value::Unspecified));
    assert_eq!(data, [-2, 0, 3, 5, 9]);
}
