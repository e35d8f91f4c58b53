//! Simulator Module Registry & Dispatcher
//!
//! Loads externally built simulator modules at runtime, binds their fixed
//! entry points, and routes host calls to them by integer handle.
//!
//! # Architecture
//!
//! ```text
//! Host
//!   │  load("libdut.so")              initialize / step / poke / ...
//!   ▼                                          │
//! ModuleRegistry ── handle ──► EntryPointTable ┘
//!   │
//!   ▼
//! ModuleLoader (libloading / static symbol table)
//!   │
//!   ▼
//! Simulator module (sim_init, step, update, finish, poke, peek, ...)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let registry = ModuleRegistry::with_dynamic_loader();
//! let dut = registry.load("build/libdut.so")?;
//! let sim = registry.initialize(dut)?;
//! registry.poke(dut, &sim, 0, 1)?;
//! registry.step(dut, &sim, 10)?;
//! let out = registry.peek(dut, &sim, 3)?;
//! registry.finish(dut, sim)?;
//! ```

mod abi;
mod error;
mod loader;
mod marshal;
mod registry;

pub use abi::{EntryPoint, EntryPointTable, SimState, ABI_VERSION, ABI_VERSION_SYMBOL};
pub use error::{BindError, BindResult, LoadError};
pub use loader::{
    Binding, DynamicLoader, ModuleLoader, NativeModule, SharedObject, StaticLoader, SymbolTable,
};
pub use marshal::{bounded_cstring, ArgVector, MarshalLimits, DEFAULT_MAX_ARG_LEN};
pub use registry::{ModuleHandle, ModuleRegistry};
