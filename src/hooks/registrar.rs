//! One-shot registration of the system task table

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, warn};

use super::table::SYSTEM_TASKS;
use super::vpi::{SimulatorKernel, VpiKernel};
use super::HookError;

/// Registration state. `Registered` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered,
}

/// Hands [`SYSTEM_TASKS`] to a simulator kernel exactly once.
///
/// The pass is attempted at most once and always offers every entry. Entries
/// the kernel rejects are reported together once the pass is over; the
/// registrar still ends up `Registered`.
#[derive(Debug)]
pub struct HookRegistrar {
    registered: AtomicBool,
}

impl HookRegistrar {
    pub const fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> RegistrationState {
        if self.registered.load(Ordering::Acquire) {
            RegistrationState::Registered
        } else {
            RegistrationState::Unregistered
        }
    }

    /// Register every system task with `kernel`; returns how many were registered
    pub fn register(&self, kernel: &dyn SimulatorKernel) -> Result<usize, HookError> {
        if self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(HookError::AlreadyRegistered);
        }

        let mut rejected = Vec::new();
        for descriptor in SYSTEM_TASKS.iter() {
            let mut data = descriptor.systf_data();
            match kernel.register_systf(&mut data) {
                Ok(()) => debug!(task = %descriptor.task, "registered system task"),
                Err(e) => {
                    warn!(task = %descriptor.task, error = %e, "system task not registered");
                    rejected.push(descriptor.task.to_string());
                }
            }
        }

        if rejected.is_empty() {
            Ok(SYSTEM_TASKS.len())
        } else {
            Err(HookError::Incomplete {
                registered: SYSTEM_TASKS.len() - rejected.len(),
                rejected,
            })
        }
    }
}

impl Default for HookRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

static STARTUP_REGISTRAR: HookRegistrar = HookRegistrar::new();

/// State of the registration performed through `vlog_startup_routines`
pub fn startup_state() -> RegistrationState {
    STARTUP_REGISTRAR.state()
}

extern "C" fn register_system_tasks() {
    let result = std::panic::catch_unwind(|| {
        let kernel = VpiKernel::from_process()?;
        STARTUP_REGISTRAR.register(&kernel)
    });
    match result {
        Ok(Ok(count)) => debug!(count, "system tasks registered"),
        Ok(Err(e)) => error!(error = %e, "system task registration failed"),
        Err(_) => error!("system task registration panicked"),
    }
}

/// Startup routine table the simulator kernel looks up when loading this
/// library as a VPI module. NULL-terminated.
#[no_mangle]
#[allow(non_upper_case_globals)]
pub static vlog_startup_routines: [Option<extern "C" fn()>; 2] = [Some(register_system_tasks), None];
