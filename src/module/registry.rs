//! Module Registry
//!
//! Assigns handles to loaded simulator modules and forwards typed calls to
//! the right module instance.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::abi::{EntryPoint, EntryPointTable, SimState};
use super::error::{BindError, BindResult};
use super::loader::{DynamicLoader, ModuleLoader, NativeModule};
use super::marshal::{bounded_cstring, ArgVector, MarshalLimits};
use crate::config::SimbindConfig;

/// Host-visible identifier of a loaded module.
///
/// Handles are allocated densely from 0 in load order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleHandle(u32);

impl ModuleHandle {
    /// Largest raw handle; handles must stay representable as a host `i32`
    pub const MAX_RAW: i32 = i32::MAX;

    /// Handle for the module stored at `index`
    pub(crate) fn allocate(index: usize) -> BindResult<Self> {
        match u32::try_from(index) {
            Ok(i) if i <= Self::MAX_RAW as u32 => Ok(ModuleHandle(i)),
            _ => Err(BindError::HandlesExhausted(index)),
        }
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Handle as the host's 32-bit integer
    pub fn as_raw(&self) -> i32 {
        self.0 as i32
    }

    /// Handle from the host's 32-bit integer. Negative values are never valid.
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(ModuleHandle)
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A module kept alive for the rest of the process
struct LoadedModule {
    entry_points: EntryPointTable,
    // Owns the code `entry_points` points into
    image: Box<dyn NativeModule>,
}

/// Registry of loaded simulator modules.
///
/// `load` may be called from any number of threads. Per-instance calls take
/// no lock while the module runs; a single simulation instance must not be
/// driven from two threads at once unless its module says otherwise.
pub struct ModuleRegistry {
    loader: Box<dyn ModuleLoader>,
    limits: MarshalLimits,
    modules: RwLock<Vec<LoadedModule>>,
}

impl ModuleRegistry {
    pub fn new(loader: impl ModuleLoader + 'static, limits: MarshalLimits) -> Self {
        Self {
            loader: Box::new(loader),
            limits,
            modules: RwLock::new(Vec::new()),
        }
    }

    /// Registry backed by the platform loader with default settings
    pub fn with_dynamic_loader() -> Self {
        Self::new(DynamicLoader::default(), MarshalLimits::default())
    }

    /// Registry configured from a `simbind.toml`
    pub fn from_config(config: &SimbindConfig) -> Self {
        Self::new(config.loader.build(), config.marshal.limits())
    }

    pub fn limits(&self) -> MarshalLimits {
        self.limits
    }

    /// Number of modules loaded so far
    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path a module was loaded from
    pub fn module_path(&self, handle: ModuleHandle) -> BindResult<PathBuf> {
        let modules = self.modules.read();
        let module = modules
            .get(handle.index())
            .ok_or(BindError::InvalidHandle(handle.0 as i64))?;
        Ok(module.image.path().to_path_buf())
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load the module at `path` and return its handle.
    ///
    /// Opening and symbol resolution run without any lock held; only the
    /// final append, which allocates the handle, is serialized. A failed
    /// load allocates nothing.
    pub fn load(&self, path: impl AsRef<Path>) -> BindResult<ModuleHandle> {
        let path = path.as_ref();

        let image = self.loader.open(path).map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to open simulator module");
            e
        })?;
        let entry_points = EntryPointTable::resolve(image.as_ref()).map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to bind simulator module");
            e
        })?;

        let handle = {
            let mut modules = self.modules.write();
            let handle = ModuleHandle::allocate(modules.len())?;
            modules.push(LoadedModule {
                entry_points,
                image,
            });
            handle
        };

        debug!(handle = handle.0, path = %path.display(), "loaded simulator module");
        Ok(handle)
    }

    /// Copy out the resolved entry points of `handle`
    pub fn entry_points(&self, handle: ModuleHandle) -> BindResult<EntryPointTable> {
        self.modules
            .read()
            .get(handle.index())
            .map(|m| m.entry_points)
            .ok_or(BindError::InvalidHandle(handle.0 as i64))
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Start a new simulation instance of the module.
    ///
    /// A NULL token from `sim_init` is reported as a dispatch failure.
    pub fn initialize(&self, handle: ModuleHandle) -> BindResult<SimState> {
        let ep = self.entry_points(handle)?;
        let raw = unsafe { (ep.sim_init)() };
        SimState::from_ptr(raw).ok_or(BindError::Dispatch {
            entry: EntryPoint::SimInit,
            code: 0,
        })
    }

    /// Advance the instance by `cycles` clock cycles; returns the module's
    /// result unchanged
    pub fn step(&self, handle: ModuleHandle, state: &SimState, cycles: i32) -> BindResult<i64> {
        let ep = self.entry_points(handle)?;
        Ok(unsafe { (ep.step)(state.as_ptr(), cycles) })
    }

    /// Settle combinational logic without consuming a cycle (`update`)
    pub fn advance(&self, handle: ModuleHandle, state: &SimState) -> BindResult<()> {
        let ep = self.entry_points(handle)?;
        unsafe { (ep.update)(state.as_ptr()) };
        Ok(())
    }

    /// End the simulation. The token is consumed.
    pub fn finish(&self, handle: ModuleHandle, state: SimState) -> BindResult<()> {
        let ep = self.entry_points(handle)?;
        unsafe { (ep.finish)(state.as_ptr()) };
        Ok(())
    }

    pub fn reset_coverage(&self, handle: ModuleHandle, state: &SimState) -> BindResult<()> {
        let ep = self.entry_points(handle)?;
        unsafe { (ep.reset_coverage)(state.as_ptr()) };
        Ok(())
    }

    /// Ask the module to write its coverage counters to `filename`
    pub fn write_coverage(
        &self,
        handle: ModuleHandle,
        state: &SimState,
        filename: &str,
    ) -> BindResult<()> {
        let ep = self.entry_points(handle)?;
        let filename = bounded_cstring(filename, self.limits)?;
        unsafe { (ep.write_coverage)(state.as_ptr(), filename.as_ptr()) };
        Ok(())
    }

    /// Write a scalar signal. Signal ids are not range-checked here.
    pub fn poke(
        &self,
        handle: ModuleHandle,
        state: &SimState,
        signal: i32,
        value: i64,
    ) -> BindResult<()> {
        let ep = self.entry_points(handle)?;
        unsafe { (ep.poke)(state.as_ptr(), signal, value) };
        Ok(())
    }

    pub fn peek(&self, handle: ModuleHandle, state: &SimState, signal: i32) -> BindResult<i64> {
        let ep = self.entry_points(handle)?;
        Ok(unsafe { (ep.peek)(state.as_ptr(), signal) })
    }

    /// Write one 64-bit word of a wide signal
    pub fn poke_wide(
        &self,
        handle: ModuleHandle,
        state: &SimState,
        signal: i32,
        word: i32,
        value: i64,
    ) -> BindResult<()> {
        let ep = self.entry_points(handle)?;
        unsafe { (ep.poke_wide)(state.as_ptr(), signal, word, value) };
        Ok(())
    }

    /// Read one 64-bit word of a wide signal
    pub fn peek_wide(
        &self,
        handle: ModuleHandle,
        state: &SimState,
        signal: i32,
        word: i32,
    ) -> BindResult<i64> {
        let ep = self.entry_points(handle)?;
        Ok(unsafe { (ep.peek_wide)(state.as_ptr(), signal, word) })
    }

    /// Pass a command line to the instance.
    ///
    /// All arguments are validated and copied before the call; the copies are
    /// released as soon as it returns.
    pub fn set_args<S: AsRef<str>>(
        &self,
        handle: ModuleHandle,
        state: &SimState,
        args: &[S],
    ) -> BindResult<()> {
        let ep = self.entry_points(handle)?;
        let mut argv = ArgVector::new(args, self.limits)?;
        unsafe { (ep.set_args)(state.as_ptr(), argv.argc(), argv.argv()) };
        Ok(())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_dynamic_loader()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.len())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
