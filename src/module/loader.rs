//! Native Module Loader
//!
//! The seam between the registry and whatever actually maps code into the
//! process: `libloading` for shared objects on disk, or an in-process symbol
//! table for statically linked simulators.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use libloading::Library;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::error::LoadError;

/// A module mapped into the process whose exports can be looked up by name
pub trait NativeModule: Send + Sync {
    /// Path the module was opened from
    fn path(&self) -> &Path;

    /// Address of an exported symbol, `None` if it is not exported
    fn resolve(&self, name: &str) -> Option<NonNull<c_void>>;
}

/// Opens modules by path
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>, LoadError>;
}

/// Symbol binding mode used when opening shared objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    /// Resolve function references on first call (RTLD_LAZY)
    #[default]
    Lazy,
    /// Resolve everything while opening (RTLD_NOW)
    Now,
}

// =============================================================================
// Shared objects
// =============================================================================

/// A shared object opened through `libloading`
pub struct SharedObject {
    path: PathBuf,
    library: Library,
}

impl SharedObject {
    /// Open the shared object at `path`
    pub fn open(path: impl AsRef<Path>, binding: Binding) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();

        // Safety: opening a library runs its initializers. The caller asked
        // for this specific module, so its code is trusted.
        let library = unsafe { open_library(&path, binding) }.map_err(|e| {
            LoadError::ModuleIncompatible {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self { path, library })
    }
}

#[cfg(unix)]
unsafe fn open_library(path: &Path, binding: Binding) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LAZY, RTLD_LOCAL, RTLD_NOW};

    let mode = match binding {
        Binding::Lazy => RTLD_LAZY,
        Binding::Now => RTLD_NOW,
    };
    UnixLibrary::open(Some(path), mode | RTLD_LOCAL).map(Library::from)
}

#[cfg(not(unix))]
unsafe fn open_library(path: &Path, _binding: Binding) -> Result<Library, libloading::Error> {
    Library::new(path)
}

impl NativeModule for SharedObject {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, name: &str) -> Option<NonNull<c_void>> {
        let c_name = CString::new(name).ok()?;

        // Safety: the symbol is only read as an address here; it is typed
        // against the fixed ABI by the caller.
        let symbol = unsafe {
            self.library
                .get::<*mut c_void>(c_name.as_bytes_with_nul())
                .ok()?
        };
        NonNull::new(*symbol)
    }
}

impl fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedObject")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Loader for shared objects on disk, with optional search paths
#[derive(Debug, Clone, Default)]
pub struct DynamicLoader {
    search_paths: Vec<PathBuf>,
    binding: Binding,
}

impl DynamicLoader {
    pub fn new(binding: Binding) -> Self {
        Self {
            search_paths: Vec::new(),
            binding,
        }
    }

    /// Add a directory searched for bare module names
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// Find a module on disk.
    ///
    /// An existing path is used as given. Otherwise, a name without directory
    /// components is tried in each search path, first verbatim and then as a
    /// platform library file name (`libNAME.so`, ...).
    pub fn locate(&self, path: &Path) -> Option<PathBuf> {
        if path.exists() {
            return Some(path.to_path_buf());
        }

        if has_dir_component(path) {
            return None;
        }

        let name = path.to_str()?;
        let lib_name = library_filename(name);
        for dir in &self.search_paths {
            for candidate in [dir.join(name), dir.join(&lib_name)] {
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

impl ModuleLoader for DynamicLoader {
    /// Open a module found by [`DynamicLoader::locate`]. A bare name that is
    /// not found there goes to the platform loader unchanged, which applies
    /// its own lookup (`LD_LIBRARY_PATH`, rpath, loader cache).
    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>, LoadError> {
        let module = match self.locate(path) {
            Some(found) => SharedObject::open(&found, self.binding)?,
            None if has_dir_component(path) => {
                return Err(LoadError::PathNotFound(path.to_path_buf()))
            }
            None => SharedObject::open(path, self.binding)?,
        };
        Ok(Box::new(module))
    }
}

fn has_dir_component(path: &Path) -> bool {
    path.parent()
        .map(|p| !p.as_os_str().is_empty())
        .unwrap_or(false)
}

/// Construct the platform-specific library filename
fn library_filename(name: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        if name.starts_with("lib") && name.ends_with(".dylib") {
            name.to_string()
        } else {
            format!("lib{}.dylib", name)
        }
    }

    #[cfg(target_os = "windows")]
    {
        if name.ends_with(".dll") {
            name.to_string()
        } else {
            format!("{}.dll", name)
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        if name.starts_with("lib") && name.ends_with(".so") {
            name.to_string()
        } else {
            format!("lib{}.so", name)
        }
    }
}

// =============================================================================
// Statically linked modules
// =============================================================================

/// Export table of an in-process module (symbol name -> address)
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an export. `addr` is normally `f as *const () as usize`.
    pub fn with(mut self, name: impl Into<String>, addr: usize) -> Self {
        self.insert(name, addr);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, addr: usize) {
        self.symbols.insert(name.into(), addr);
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) -> Option<usize> {
        self.symbols.remove(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

struct StaticModule {
    path: PathBuf,
    table: Arc<SymbolTable>,
}

impl NativeModule for StaticModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, name: &str) -> Option<NonNull<c_void>> {
        let addr = *self.table.symbols.get(name)?;
        NonNull::new(addr as *mut c_void)
    }
}

/// Loader serving modules linked into the current binary.
///
/// Modules are registered under a virtual path; `open` on an unknown path
/// fails with [`LoadError::PathNotFound`] just like a missing file.
#[derive(Default)]
pub struct StaticLoader {
    modules: RwLock<HashMap<PathBuf, Arc<SymbolTable>>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `table` available under `path`, replacing any previous entry
    pub fn register(&self, path: impl AsRef<Path>, table: SymbolTable) {
        self.modules
            .write()
            .insert(path.as_ref().to_path_buf(), Arc::new(table));
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.modules.read().contains_key(path.as_ref())
    }
}

impl ModuleLoader for StaticLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>, LoadError> {
        let table = self
            .modules
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::PathNotFound(path.to_path_buf()))?;
        Ok(Box::new(StaticModule {
            path: path.to_path_buf(),
            table,
        }))
    }
}

impl<L: ModuleLoader + ?Sized> ModuleLoader for Arc<L> {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>, LoadError> {
        (**self).open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_filename() {
        #[cfg(target_os = "linux")]
        {
            assert_eq!(library_filename("sim"), "libsim.so");
            assert_eq!(library_filename("libsim.so"), "libsim.so");
        }
    }

    #[test]
    fn test_locate_missing() {
        let loader = DynamicLoader::default();
        assert!(loader.locate(Path::new("/no/such/dir/libsim.so")).is_none());
        assert!(loader.locate(Path::new("definitely_not_a_module")).is_none());
    }

    #[test]
    fn test_dynamic_open_missing_path() {
        let loader = DynamicLoader::default();
        match loader.open(Path::new("/no/such/dir/libsim.so")) {
            Err(LoadError::PathNotFound(p)) => assert_eq!(p, Path::new("/no/such/dir/libsim.so")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opened a module that does not exist"),
        }
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_bare_soname_uses_platform_lookup() {
        let loader = DynamicLoader::default();
        assert!(loader.locate(Path::new("libm.so.6")).is_none());

        let module = loader.open(Path::new("libm.so.6")).unwrap();
        assert_eq!(module.path(), Path::new("libm.so.6"));
        assert!(module.resolve("cos").is_some());
    }

    #[test]
    fn test_unknown_bare_name_reaches_platform_loader() {
        let loader = DynamicLoader::default();
        assert!(matches!(
            loader.open(Path::new("libsimbind_no_such_module.so")),
            Err(LoadError::ModuleIncompatible { .. })
        ));
    }

    #[test]
    fn test_dynamic_open_not_a_library() {
        // Cargo.toml exists but is not a shared object
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        let loader = DynamicLoader::default();
        assert!(matches!(
            loader.open(&path),
            Err(LoadError::ModuleIncompatible { .. })
        ));
    }

    #[test]
    fn test_static_loader() {
        extern "C" fn answer() -> u32 {
            42
        }

        let loader = StaticLoader::new();
        loader.register("mem://answer", SymbolTable::new().with("answer", answer as *const () as usize));
        assert!(loader.contains("mem://answer"));

        let module = loader.open(Path::new("mem://answer")).unwrap();
        assert_eq!(module.path(), Path::new("mem://answer"));
        assert!(module.resolve("answer").is_some());
        assert!(module.resolve("question").is_none());

        assert!(matches!(
            loader.open(Path::new("mem://other")),
            Err(LoadError::PathNotFound(_))
        ));
    }
}
