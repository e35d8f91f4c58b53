//! System task table
//!
//! The fixed set of system tasks the simulator kernel can invoke, and the
//! callbacks that forward each invocation to the host's handler.

use std::ffi::CStr;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use once_cell::sync::OnceCell;
use tracing::{error, warn};

use super::vpi::{PliByte8, PliInt32, SystfCallback, SystfData, VPI_SYS_TASK};
use super::HookError;

/// A simulation lifecycle point exposed as a system task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemTask {
    /// Reset initialization
    InitResets,
    /// Input enumeration
    InitInputs,
    /// Output enumeration
    InitOutputs,
    /// Generic signal enumeration
    InitSignals,
    /// Per-cycle tick
    Tick,
}

impl SystemTask {
    pub const ALL: [SystemTask; 5] = [
        SystemTask::InitResets,
        SystemTask::InitInputs,
        SystemTask::InitOutputs,
        SystemTask::InitSignals,
        SystemTask::Tick,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            SystemTask::InitResets => "init_rsts",
            SystemTask::InitInputs => "init_ins",
            SystemTask::InitOutputs => "init_outs",
            SystemTask::InitSignals => "init_sigs",
            SystemTask::Tick => "tick",
        }
    }

    /// Name as written in the description-language program
    pub const fn tfname(&self) -> &'static CStr {
        match self {
            SystemTask::InitResets => c"$init_rsts",
            SystemTask::InitInputs => c"$init_ins",
            SystemTask::InitOutputs => c"$init_outs",
            SystemTask::InitSignals => c"$init_sigs",
            SystemTask::Tick => c"$tick",
        }
    }
}

impl fmt::Display for SystemTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name())
    }
}

/// Host logic behind the system tasks
pub trait SystemTaskHandler: Send + Sync {
    /// Run `task`; the return value is handed back to the kernel
    fn call(&self, task: SystemTask) -> PliInt32;

    /// Check a task's arguments once before simulation starts
    fn validate(&self, _task: SystemTask) -> Result<(), String> {
        Ok(())
    }
}

static HANDLER: OnceCell<Box<dyn SystemTaskHandler>> = OnceCell::new();

/// Install the process-wide handler. Only the first call succeeds.
pub fn install_handler(handler: impl SystemTaskHandler + 'static) -> Result<(), HookError> {
    HANDLER
        .set(Box::new(handler))
        .map_err(|_| HookError::HandlerAlreadyInstalled)
}

pub fn handler_installed() -> bool {
    HANDLER.get().is_some()
}

fn dispatch_call(task: SystemTask) -> PliInt32 {
    let Some(handler) = HANDLER.get() else {
        warn!(task = %task, "system task invoked with no handler installed");
        return 0;
    };
    match catch_unwind(AssertUnwindSafe(|| handler.call(task))) {
        Ok(status) => status,
        Err(_) => {
            error!(task = %task, "system task handler panicked");
            1
        }
    }
}

fn dispatch_validate(task: SystemTask) -> PliInt32 {
    let Some(handler) = HANDLER.get() else {
        return 0;
    };
    match catch_unwind(AssertUnwindSafe(|| handler.validate(task))) {
        Ok(Ok(())) => 0,
        Ok(Err(msg)) => {
            error!(task = %task, "system task arguments rejected: {}", msg);
            1
        }
        Err(_) => {
            error!(task = %task, "system task validator panicked");
            1
        }
    }
}

macro_rules! calltf {
    ($name:ident, $task:expr) => {
        unsafe extern "C" fn $name(_user_data: *mut PliByte8) -> PliInt32 {
            dispatch_call($task)
        }
    };
}

calltf!(init_rsts_calltf, SystemTask::InitResets);
calltf!(init_ins_calltf, SystemTask::InitInputs);
calltf!(init_outs_calltf, SystemTask::InitOutputs);
calltf!(init_sigs_calltf, SystemTask::InitSignals);
calltf!(tick_calltf, SystemTask::Tick);

unsafe extern "C" fn tick_compiletf(_user_data: *mut PliByte8) -> PliInt32 {
    dispatch_validate(SystemTask::Tick)
}

/// One entry of the registration table
#[derive(Clone, Copy)]
pub struct HookDescriptor {
    pub task: SystemTask,
    pub calltf: SystfCallback,
    pub compiletf: Option<SystfCallback>,
}

impl HookDescriptor {
    /// The VPI record for this entry
    pub fn systf_data(&self) -> SystfData {
        SystfData {
            kind: VPI_SYS_TASK,
            sysfunctype: 0,
            tfname: self.task.tfname().as_ptr(),
            calltf: Some(self.calltf),
            compiletf: self.compiletf,
            sizetf: None,
            user_data: ptr::null_mut(),
        }
    }
}

impl fmt::Debug for HookDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDescriptor")
            .field("task", &self.task)
            .field("compiletf", &self.compiletf.is_some())
            .finish()
    }
}

/// Every system task, registered in this order
pub static SYSTEM_TASKS: [HookDescriptor; 5] = [
    HookDescriptor {
        task: SystemTask::InitResets,
        calltf: init_rsts_calltf,
        compiletf: None,
    },
    HookDescriptor {
        task: SystemTask::InitInputs,
        calltf: init_ins_calltf,
        compiletf: None,
    },
    HookDescriptor {
        task: SystemTask::InitOutputs,
        calltf: init_outs_calltf,
        compiletf: None,
    },
    HookDescriptor {
        task: SystemTask::InitSignals,
        calltf: init_sigs_calltf,
        compiletf: None,
    },
    HookDescriptor {
        task: SystemTask::Tick,
        calltf: tick_calltf,
        compiletf: Some(tick_compiletf),
    },
];
