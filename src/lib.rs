//! simbind - native simulator module binding
//!
//! Two halves of the plumbing between a hardware simulation runtime and
//! compiled simulator code.
//!
//! # Module registry
//!
//! [`module::ModuleRegistry`] loads shared objects that export the
//! simulator entry point set, hands out small integer handles, and forwards
//! typed calls (step, poke, peek, coverage, arguments) to the right module.
//! [`capi`] exposes the same registry through plain C functions.
//!
//! ```no_run
//! use simbind::module::ModuleRegistry;
//!
//! let registry = ModuleRegistry::with_dynamic_loader();
//! let handle = registry.load("build/libcounter.so")?;
//! let state = registry.initialize(handle)?;
//!
//! registry.poke(handle, &state, 0, 1)?;
//! registry.step(handle, &state, 10)?;
//! let count = registry.peek(handle, &state, 1)?;
//! println!("count = {}", count);
//!
//! registry.finish(handle, state)?;
//! # Ok::<(), simbind::module::BindError>(())
//! ```
//!
//! # Event hooks
//!
//! [`hooks`] publishes `vlog_startup_routines`, so an event-driven simulator
//! that loads this library registers the `$init_rsts`, `$init_ins`,
//! `$init_outs`, `$init_sigs` and `$tick` system tasks. Their behavior comes
//! from a [`hooks::SystemTaskHandler`] installed by the host.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   C ABI    ┌──────────────────┐  dlopen/dlsym  ┌──────────────┐
//! │ Host runtime │ ─────────▶ │  ModuleRegistry  │ ─────────────▶ │ libsim_*.so  │
//! └──────────────┘  (capi)    └──────────────────┘                └──────────────┘
//!
//! ┌──────────────┐  vlog_startup_routines  ┌──────────────┐        ┌──────────────┐
//! │  Simulator   │ ──────────────────────▶ │ HookRegistrar│ ─────▶ │   Handler    │
//! └──────────────┘                         └──────────────┘        └──────────────┘
//! ```

pub mod capi;
pub mod config;
pub mod hooks;
pub mod module;

pub use config::{ConfigError, SimbindConfig};
pub use hooks::{HookError, HookRegistrar, SystemTask, SystemTaskHandler};
pub use module::{BindError, LoadError, ModuleHandle, ModuleRegistry, SimState};
