//! OS error-state synchronization
//!
//! `errno` (and `GetLastError` on Windows) is thread-local state that the
//! native calls made by the bridge both read and clobber. Each bridge keeps
//! its own copy in `ErrorState`; the live thread state only mirrors it while
//! an `ErrnoBracket` is alive.

/// Per-context snapshot of the OS error state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorState {
    pub errno: i32,
    pub last_error: u32,
}

/// Scoped mirror of an `ErrorState` into the live thread state
///
/// `enter` writes the saved values into the thread; dropping the bracket
/// reads them back, including during unwinding. A panic hook runs before
/// unwinding starts and may itself clobber `errno`, so after a `panic!` the
/// captured value is whatever the hook left behind.
pub struct ErrnoBracket<'a> {
    state: &'a mut ErrorState,
}

impl<'a> ErrnoBracket<'a> {
    pub fn enter(state: &'a mut ErrorState) -> Self {
        os::set_errno(state.errno);
        os::set_last_error(state.last_error);
        Self { state }
    }
}

impl Drop for ErrnoBracket<'_> {
    fn drop(&mut self) {
        self.state.errno = os::errno();
        self.state.last_error = os::last_error();
    }
}

pub mod os {
    //! Thin accessors for the live thread error state

    use std::os::raw::c_int;

    #[cfg(any(target_os = "linux", target_os = "emscripten", target_os = "redox", target_os = "fuchsia"))]
    unsafe fn errno_location() -> *mut c_int {
        libc::__errno_location()
    }

    #[cfg(any(target_os = "android", target_os = "netbsd", target_os = "openbsd"))]
    unsafe fn errno_location() -> *mut c_int {
        libc::__errno()
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    unsafe fn errno_location() -> *mut c_int {
        libc::__error()
    }

    #[cfg(any(target_os = "solaris", target_os = "illumos"))]
    unsafe fn errno_location() -> *mut c_int {
        libc::___errno()
    }

    #[cfg(windows)]
    unsafe fn errno_location() -> *mut c_int {
        extern "C" {
            fn _errno() -> *mut c_int;
        }
        _errno()
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "emscripten",
        target_os = "redox",
        target_os = "fuchsia",
        target_os = "android",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "solaris",
        target_os = "illumos",
        windows
    )))]
    compile_error!(
        "dynbridge-runtime has no errno accessor for this target \
         (dragonfly, haiku, aix and other targets need an errno_location arm)"
    );

    /// Current thread's `errno`
    #[inline]
    pub fn errno() -> i32 {
        unsafe { *errno_location() }
    }

    #[inline]
    pub fn set_errno(value: i32) {
        unsafe { *errno_location() = value }
    }

    #[cfg(windows)]
    #[inline]
    pub fn last_error() -> u32 {
        unsafe { winapi::um::errhandlingapi::GetLastError() }
    }

    #[cfg(windows)]
    #[inline]
    pub fn set_last_error(value: u32) {
        unsafe { winapi::um::errhandlingapi::SetLastError(value) }
    }

    #[cfg(not(windows))]
    #[inline]
    pub fn last_error() -> u32 {
        0
    }

    #[cfg(not(windows))]
    #[inline]
    pub fn set_last_error(_value: u32) {}

    /// Whether the platform has a separate last-error value
    pub const HAS_LAST_ERROR: bool = cfg!(windows);

    /// System message for a Windows error code, with trailing CR/LF removed
    #[cfg(windows)]
    pub fn format_message(code: u32) -> Option<String> {
        use std::ptr;
        use winapi::shared::minwindef::HLOCAL;
        use winapi::um::winbase::{
            FormatMessageA, LocalFree, FORMAT_MESSAGE_ALLOCATE_BUFFER, FORMAT_MESSAGE_FROM_SYSTEM,
            FORMAT_MESSAGE_IGNORE_INSERTS,
        };
        use winapi::um::winnt::{LANG_ENGLISH, LPSTR, MAKELANGID, SUBLANG_DEFAULT};

        let mut buffer: LPSTR = ptr::null_mut();
        let len = unsafe {
            FormatMessageA(
                FORMAT_MESSAGE_ALLOCATE_BUFFER | FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
                ptr::null(),
                code,
                MAKELANGID(LANG_ENGLISH, SUBLANG_DEFAULT) as u32,
                (&mut buffer as *mut LPSTR) as LPSTR,
                0,
                ptr::null_mut(),
            )
        };
        if len == 0 || buffer.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(buffer as *const u8, len as usize) };
        let message = trim_line_end(&String::from_utf8_lossy(bytes)).to_string();
        unsafe {
            LocalFree(buffer as HLOCAL);
        }
        Some(message)
    }

    #[cfg(not(windows))]
    pub fn format_message(_code: u32) -> Option<String> {
        None
    }

    /// Strip trailing carriage returns and line feeds
    pub fn trim_line_end(text: &str) -> &str {
        text.trim_end_matches(['\r', '\n'])
    }
}
