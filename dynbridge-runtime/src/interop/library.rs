//! Dynamic library loading and symbol resolution
//!
//! Thin wrapper over `libloading`. Loaded libraries are kept in a
//! `LibraryTable` and exposed to managed code as small nonzero handles.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::logging::{log_library_failed, log_library_loaded, log_symbol_lookup, perf};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("library name contains a NUL byte: {0:?}")]
    InvalidName(String),

    #[error("{reason}")]
    Failed { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("symbol name contains a NUL byte: {0:?}")]
    InvalidName(String),

    #[error("no library is loaded with handle {0}")]
    UnknownHandle(usize),
}

/// Handle to a dynamically loaded library
pub struct Library {
    path: String,
    inner: libloading::Library,
}

impl Library {
    /// Open `path`; the empty string opens the running program
    pub fn open(path: &str) -> Result<Self, LoadError> {
        if path.contains('\0') {
            return Err(LoadError::InvalidName(path.to_string()));
        }
        let inner = if path.is_empty() {
            Self::this()?
        } else {
            // Safety: loading runs the library's initializers; the caller
            // chose to trust it.
            unsafe { libloading::Library::new(path) }.map_err(|e| LoadError::Failed {
                path: path.to_string(),
                reason: e.to_string(),
            })?
        };
        Ok(Self {
            path: path.to_string(),
            inner,
        })
    }

    #[cfg(unix)]
    fn this() -> Result<libloading::Library, LoadError> {
        Ok(libloading::os::unix::Library::this().into())
    }

    #[cfg(windows)]
    fn this() -> Result<libloading::Library, LoadError> {
        libloading::os::windows::Library::this()
            .map(Into::into)
            .map_err(|e| LoadError::Failed {
                path: String::new(),
                reason: e.to_string(),
            })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Address of `name`, or `None` when the library does not export it
    pub fn symbol(&self, name: &str) -> Result<Option<usize>, SymbolError> {
        let c_name = CString::new(name).map_err(|_| SymbolError::InvalidName(name.to_string()))?;
        // Safety: the symbol is only read as an address, never called here.
        let found = unsafe { self.inner.get::<*const c_void>(c_name.as_bytes_with_nul()) };
        Ok(found.ok().map(|sym| *sym as usize).filter(|&addr| addr != 0))
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("path", &self.path).finish()
    }
}

/// Loaded libraries of one bridge, keyed by handle
#[derive(Debug)]
pub struct LibraryTable {
    libraries: HashMap<usize, Library>,
    next_handle: usize,
    search_paths: Vec<PathBuf>,
}

impl Default for LibraryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryTable {
    pub fn new() -> Self {
        Self {
            libraries: HashMap::new(),
            next_handle: 1,
            search_paths: Vec::new(),
        }
    }

    pub fn with_search_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut table = Self::new();
        table.search_paths.extend(paths.into_iter().map(Into::into));
        table
    }

    /// Resolve `name` to what is handed to the OS loader
    ///
    /// Existing paths are used as given; otherwise each search path is
    /// tried with the raw name and the platform file name, and finally the
    /// raw name goes to the OS search.
    pub fn resolve(&self, name: &str) -> String {
        if name.is_empty() || Path::new(name).exists() {
            return name.to_string();
        }
        let platform_name = library_filename(name);
        self.search_paths
            .iter()
            .flat_map(|dir| [dir.join(name), dir.join(&platform_name)])
            .find(|candidate| candidate.exists())
            .map(|found| found.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string())
    }

    /// Load a library and return its handle
    pub fn open(&mut self, name: &str) -> Result<usize, LoadError> {
        let _timer = perf::track("load-library");
        let path = self.resolve(name);
        let library = Library::open(&path).map_err(|e| {
            log_library_failed(&path, &e.to_string());
            e
        })?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.libraries.insert(handle, library);
        log_library_loaded(&path, handle);
        Ok(handle)
    }

    /// Address of `name` in the library behind `handle`
    pub fn lookup(&self, handle: usize, name: &str) -> Result<Option<usize>, SymbolError> {
        let library = self
            .libraries
            .get(&handle)
            .ok_or(SymbolError::UnknownHandle(handle))?;
        let address = library.symbol(name)?;
        log_symbol_lookup(handle, name, address);
        Ok(address)
    }

    pub fn get(&self, handle: usize) -> Option<&Library> {
        self.libraries.get(&handle)
    }

    /// Drop the library behind `handle`
    pub fn close(&mut self, handle: usize) -> bool {
        self.libraries.remove(&handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

/// Platform file name for a bare library name
pub fn library_filename(name: &str) -> String {
    if cfg!(target_os = "windows") {
        if name.ends_with(".dll") {
            name.to_string()
        } else {
            format!("{}.dll", name)
        }
    } else {
        let ext = if cfg!(target_os = "macos") { "dylib" } else { "so" };
        let stem = name.strip_prefix("lib").unwrap_or(name);
        if name.contains(&format!(".{}", ext)) {
            name.to_string()
        } else {
            format!("lib{}.{}", stem, ext)
        }
    }
}
