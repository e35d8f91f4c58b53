//! Simulator Module ABI
//!
//! The fixed set of entry points every loadable simulator module exports,
//! their C signatures, and the opaque per-instance state token.

use std::ffi::{c_char, c_void};
use std::fmt;
use std::ptr::NonNull;

use super::error::LoadError;
use super::loader::NativeModule;

/// Version of the calling convention implemented by this crate.
///
/// Modules may export `simbind_abi_version` to declare the version they were
/// built against; modules that do not are assumed compatible.
pub const ABI_VERSION: u32 = 1;

/// Name of the optional version export.
pub const ABI_VERSION_SYMBOL: &str = "simbind_abi_version";

pub type SimInitFn = unsafe extern "C" fn() -> *mut c_void;
pub type StepFn = unsafe extern "C" fn(*mut c_void, i32) -> i64;
pub type UpdateFn = unsafe extern "C" fn(*mut c_void);
pub type FinishFn = unsafe extern "C" fn(*mut c_void);
pub type ResetCoverageFn = unsafe extern "C" fn(*mut c_void);
pub type WriteCoverageFn = unsafe extern "C" fn(*mut c_void, *const c_char);
pub type PokeFn = unsafe extern "C" fn(*mut c_void, i32, i64);
pub type PeekFn = unsafe extern "C" fn(*mut c_void, i32) -> i64;
pub type PokeWideFn = unsafe extern "C" fn(*mut c_void, i32, i32, i64);
pub type PeekWideFn = unsafe extern "C" fn(*mut c_void, i32, i32) -> i64;
pub type SetArgsFn = unsafe extern "C" fn(*mut c_void, i32, *mut *mut c_char);
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// One of the eleven exports a simulator module must provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    SimInit,
    Step,
    Update,
    Finish,
    ResetCoverage,
    WriteCoverage,
    Poke,
    Peek,
    PokeWide,
    PeekWide,
    SetArgs,
}

impl EntryPoint {
    /// All entry points, in resolution order
    pub const ALL: [EntryPoint; 11] = [
        EntryPoint::SimInit,
        EntryPoint::Step,
        EntryPoint::Update,
        EntryPoint::Finish,
        EntryPoint::ResetCoverage,
        EntryPoint::WriteCoverage,
        EntryPoint::Poke,
        EntryPoint::Peek,
        EntryPoint::PokeWide,
        EntryPoint::PeekWide,
        EntryPoint::SetArgs,
    ];

    /// The exported symbol name
    pub const fn symbol(&self) -> &'static str {
        match self {
            EntryPoint::SimInit => "sim_init",
            EntryPoint::Step => "step",
            EntryPoint::Update => "update",
            EntryPoint::Finish => "finish",
            EntryPoint::ResetCoverage => "resetCoverage",
            EntryPoint::WriteCoverage => "writeCoverage",
            EntryPoint::Poke => "poke",
            EntryPoint::Peek => "peek",
            EntryPoint::PokeWide => "poke_wide",
            EntryPoint::PeekWide => "peek_wide",
            EntryPoint::SetArgs => "set_args",
        }
    }

    /// Look up an entry point by its exported name
    pub fn from_symbol(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.symbol() == name)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Resolved, typed entry points of one module.
///
/// The pointers stay valid for as long as the owning [`NativeModule`] is
/// alive; the registry never drops a loaded module, so a copied table is
/// usable without holding any lock.
#[derive(Clone, Copy)]
pub struct EntryPointTable {
    pub sim_init: SimInitFn,
    pub step: StepFn,
    pub update: UpdateFn,
    pub finish: FinishFn,
    pub reset_coverage: ResetCoverageFn,
    pub write_coverage: WriteCoverageFn,
    pub poke: PokeFn,
    pub peek: PeekFn,
    pub poke_wide: PokeWideFn,
    pub peek_wide: PeekWideFn,
    pub set_args: SetArgsFn,
}

/// Resolve one export and reinterpret it as the given function pointer type.
macro_rules! bind {
    ($module:expr, $entry:expr => $ty:ty) => {{
        let addr = $module
            .resolve($entry.symbol())
            .ok_or(LoadError::MissingSymbol($entry))?;
        // Safety: the address was exported under a name from the fixed ABI,
        // whose signature is `$ty`.
        unsafe { std::mem::transmute::<*mut c_void, $ty>(addr.as_ptr()) }
    }};
}

impl EntryPointTable {
    /// Resolve every required export of `module`.
    ///
    /// Fails on the first missing name; nothing is deferred to call time.
    pub fn resolve(module: &dyn NativeModule) -> Result<Self, LoadError> {
        check_abi_version(module)?;

        Ok(Self {
            sim_init: bind!(module, EntryPoint::SimInit => SimInitFn),
            step: bind!(module, EntryPoint::Step => StepFn),
            update: bind!(module, EntryPoint::Update => UpdateFn),
            finish: bind!(module, EntryPoint::Finish => FinishFn),
            reset_coverage: bind!(module, EntryPoint::ResetCoverage => ResetCoverageFn),
            write_coverage: bind!(module, EntryPoint::WriteCoverage => WriteCoverageFn),
            poke: bind!(module, EntryPoint::Poke => PokeFn),
            peek: bind!(module, EntryPoint::Peek => PeekFn),
            poke_wide: bind!(module, EntryPoint::PokeWide => PokeWideFn),
            peek_wide: bind!(module, EntryPoint::PeekWide => PeekWideFn),
            set_args: bind!(module, EntryPoint::SetArgs => SetArgsFn),
        })
    }

    /// Address bound to `entry`
    pub fn address(&self, entry: EntryPoint) -> *const () {
        match entry {
            EntryPoint::SimInit => self.sim_init as *const (),
            EntryPoint::Step => self.step as *const (),
            EntryPoint::Update => self.update as *const (),
            EntryPoint::Finish => self.finish as *const (),
            EntryPoint::ResetCoverage => self.reset_coverage as *const (),
            EntryPoint::WriteCoverage => self.write_coverage as *const (),
            EntryPoint::Poke => self.poke as *const (),
            EntryPoint::Peek => self.peek as *const (),
            EntryPoint::PokeWide => self.poke_wide as *const (),
            EntryPoint::PeekWide => self.peek_wide as *const (),
            EntryPoint::SetArgs => self.set_args as *const (),
        }
    }
}

impl fmt::Debug for EntryPointTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPointTable")
            .field("sim_init", &(self.sim_init as *const ()))
            .field("step", &(self.step as *const ()))
            .field("poke", &(self.poke as *const ()))
            .field("peek", &(self.peek as *const ()))
            .finish_non_exhaustive()
    }
}

fn check_abi_version(module: &dyn NativeModule) -> Result<(), LoadError> {
    let Some(addr) = module.resolve(ABI_VERSION_SYMBOL) else {
        return Ok(());
    };
    // Safety: `simbind_abi_version` is declared as `fn() -> u32`.
    let version = unsafe {
        let f = std::mem::transmute::<*mut c_void, AbiVersionFn>(addr.as_ptr());
        f()
    };
    if version != ABI_VERSION {
        return Err(LoadError::ModuleIncompatible {
            path: module.path().to_path_buf(),
            reason: format!(
                "module declares ABI version {}, expected {}",
                version, ABI_VERSION
            ),
        });
    }
    Ok(())
}

/// Opaque state token for one running simulation instance.
///
/// Produced by a module's `sim_init` and passed back unchanged on every
/// per-instance call. The binding layer never inspects or frees it.
/// `finish` consumes the token; other calls borrow it.
#[derive(Debug, PartialEq, Eq)]
pub struct SimState(NonNull<c_void>);

// Safety: the token is an opaque address owned by the module. Moving it to
// another thread is allowed; concurrent use of one instance is not, hence no
// `Sync` or `Clone`.
unsafe impl Send for SimState {}

impl SimState {
    pub(crate) fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(SimState)
    }

    /// Raw pointer handed to the module
    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// The token as the host-side 64-bit integer
    pub fn as_raw(&self) -> i64 {
        self.0.as_ptr() as usize as i64
    }

    /// Give up ownership and return the host-side integer
    pub fn into_raw(self) -> i64 {
        self.as_raw()
    }

    /// Rebuild a token from its host-side integer.
    ///
    /// # Safety
    ///
    /// `raw` must have come from [`SimState::as_raw`] on a token returned by
    /// `initialize` for the module it will be used with, and that instance
    /// must not have been finished.
    pub unsafe fn from_raw(raw: i64) -> Option<Self> {
        Self::from_ptr(raw as usize as *mut c_void)
    }
}
