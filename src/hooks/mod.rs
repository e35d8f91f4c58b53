//! Event-Hook Registrar
//!
//! Publishes the system tasks (`$init_rsts`, `$init_ins`, `$init_outs`,
//! `$init_sigs`, `$tick`) to an event-driven simulator kernel through the
//! VPI startup routine table, and forwards their invocations to a host
//! handler.
//!
//! ```text
//! kernel loads library ── vlog_startup_routines[0]() ── HookRegistrar
//!                                                           │ vpi_register_systf × 5
//! $tick in testbench ── tick_calltf ── SystemTaskHandler::call(Tick)
//! ```

mod registrar;
mod table;
mod vpi;

use thiserror::Error;

pub use registrar::{startup_state, vlog_startup_routines, HookRegistrar, RegistrationState};
pub use table::{
    handler_installed, install_handler, HookDescriptor, SystemTask, SystemTaskHandler,
    SYSTEM_TASKS,
};
pub use vpi::{
    PliByte8, PliInt32, RegisterSystfFn, SimulatorKernel, SystfCallback, SystfData, VpiKernel,
    VPI_SYS_TASK,
};

/// Errors raised while publishing system tasks
#[derive(Debug, Error)]
pub enum HookError {
    #[error("system tasks are already registered")]
    AlreadyRegistered,

    #[error("a system task handler is already installed")]
    HandlerAlreadyInstalled,

    #[error("simulator kernel unavailable: {0}")]
    KernelUnavailable(String),

    #[error("simulator kernel rejected system task {0}")]
    Rejected(String),

    #[error("{registered} system tasks registered, rejected: {}", .rejected.join(", "))]
    Incomplete {
        registered: usize,
        rejected: Vec<String>,
    },
}

#[cfg(test)]
mod tests;
