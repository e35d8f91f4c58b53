use std::cell::RefCell;
use std::ffi::{c_void, CStr};
use std::ptr;
use std::sync::Once;

use super::*;

/// Kernel double that records what was registered
#[derive(Default)]
struct RecordingKernel {
    registered: RefCell<Vec<(String, SystfCallback, Option<SystfCallback>, PliInt32)>>,
    reject: Option<&'static str>,
}

impl SimulatorKernel for RecordingKernel {
    fn register_systf(&self, data: &mut SystfData) -> Result<(), HookError> {
        let name = unsafe { CStr::from_ptr(data.tfname) }
            .to_str()
            .unwrap()
            .to_string();
        if self.reject == Some(name.as_str()) {
            return Err(HookError::Rejected(name));
        }
        assert!(data.user_data.is_null());
        assert!(data.sizetf.is_none());
        self.registered
            .borrow_mut()
            .push((name, data.calltf.unwrap(), data.compiletf, data.kind));
        Ok(())
    }
}

/// Reports a distinct status per task, panics on `$init_sigs`
struct TestHandler;

impl SystemTaskHandler for TestHandler {
    fn call(&self, task: SystemTask) -> PliInt32 {
        match task {
            SystemTask::InitResets => 10,
            SystemTask::InitInputs => 11,
            SystemTask::InitOutputs => 12,
            SystemTask::InitSignals => panic!("signal enumeration failed"),
            SystemTask::Tick => 14,
        }
    }
}

fn ensure_handler() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| install_handler(TestHandler).unwrap());
}

#[test]
fn test_table_contents() {
    let names: Vec<_> = SYSTEM_TASKS.iter().map(|d| d.task.name()).collect();
    assert_eq!(names, ["init_rsts", "init_ins", "init_outs", "init_sigs", "tick"]);

    for d in SYSTEM_TASKS.iter() {
        assert_eq!(d.compiletf.is_some(), d.task == SystemTask::Tick);
    }
    assert_eq!(SystemTask::Tick.tfname().to_str().unwrap(), "$tick");
    assert_eq!(SystemTask::InitResets.to_string(), "$init_rsts");
}

#[test]
fn test_register_once() {
    let registrar = HookRegistrar::new();
    let kernel = RecordingKernel::default();
    assert_eq!(registrar.state(), RegistrationState::Unregistered);

    assert_eq!(registrar.register(&kernel).unwrap(), 5);
    assert_eq!(registrar.state(), RegistrationState::Registered);

    let registered = kernel.registered.borrow();
    let names: Vec<_> = registered.iter().map(|r| r.0.as_str()).collect();
    assert_eq!(names, ["$init_rsts", "$init_ins", "$init_outs", "$init_sigs", "$tick"]);
    assert!(registered.iter().all(|r| r.3 == VPI_SYS_TASK));
    drop(registered);

    assert!(matches!(
        registrar.register(&kernel),
        Err(HookError::AlreadyRegistered)
    ));
    assert_eq!(kernel.registered.borrow().len(), 5);
    assert_eq!(registrar.state(), RegistrationState::Registered);
}

#[test]
fn test_rejected_entry_is_reported() {
    let registrar = HookRegistrar::new();
    let kernel = RecordingKernel {
        reject: Some("$init_outs"),
        ..Default::default()
    };

    match registrar.register(&kernel) {
        Err(HookError::Incomplete {
            registered,
            rejected,
        }) => {
            assert_eq!(registered, 4);
            assert_eq!(rejected, ["$init_outs"]);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(registrar.state(), RegistrationState::Registered);

    // Entries after the rejected one were still offered
    let registered = kernel.registered.borrow();
    let names: Vec<_> = registered.iter().map(|r| r.0.as_str()).collect();
    assert_eq!(names, ["$init_rsts", "$init_ins", "$init_sigs", "$tick"]);
}

#[test]
fn test_first_entry_rejected_rest_registered() {
    let registrar = HookRegistrar::new();
    let kernel = RecordingKernel {
        reject: Some("$init_rsts"),
        ..Default::default()
    };

    assert!(matches!(
        registrar.register(&kernel),
        Err(HookError::Incomplete { registered: 4, .. })
    ));
    assert_eq!(kernel.registered.borrow().len(), 4);
    assert!(kernel.registered.borrow().iter().any(|r| r.0 == "$tick"));

    assert!(matches!(
        registrar.register(&kernel),
        Err(HookError::AlreadyRegistered)
    ));
    assert_eq!(kernel.registered.borrow().len(), 4);
}

#[test]
fn test_callbacks_reach_handler() {
    ensure_handler();
    assert!(handler_installed());

    let registrar = HookRegistrar::new();
    let kernel = RecordingKernel::default();
    registrar.register(&kernel).unwrap();

    let statuses: Vec<PliInt32> = kernel
        .registered
        .borrow()
        .iter()
        .filter(|r| r.0 != "$init_sigs")
        .map(|r| unsafe { (r.1)(ptr::null_mut()) })
        .collect();
    assert_eq!(statuses, [10, 11, 12, 14]);
}

#[test]
fn test_panicking_handler_reports_failure() {
    ensure_handler();
    let sigs = SYSTEM_TASKS
        .iter()
        .find(|d| d.task == SystemTask::InitSignals)
        .unwrap();
    assert_eq!(unsafe { (sigs.calltf)(ptr::null_mut()) }, 1);
}

#[test]
fn test_tick_validator_default_accepts() {
    ensure_handler();
    let tick = SYSTEM_TASKS.iter().find(|d| d.task == SystemTask::Tick).unwrap();
    let compiletf = tick.compiletf.unwrap();
    assert_eq!(unsafe { compiletf(ptr::null_mut()) }, 0);
}

#[test]
fn test_second_handler_refused() {
    ensure_handler();
    assert!(matches!(
        install_handler(TestHandler),
        Err(HookError::HandlerAlreadyInstalled)
    ));
}

unsafe extern "C" fn refusing_register(_data: *mut SystfData) -> *mut c_void {
    ptr::null_mut()
}

unsafe extern "C" fn accepting_register(data: *mut SystfData) -> *mut c_void {
    data as *mut c_void
}

#[test]
fn test_vpi_kernel_null_handle_is_rejection() {
    let registrar = HookRegistrar::new();
    let kernel = VpiKernel::with_register_fn(refusing_register);
    match registrar.register(&kernel) {
        Err(HookError::Incomplete {
            registered,
            rejected,
        }) => {
            assert_eq!(registered, 0);
            assert_eq!(rejected.len(), 5);
            assert_eq!(rejected[0], "$init_rsts");
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    let registrar = HookRegistrar::new();
    let kernel = VpiKernel::with_register_fn(accepting_register);
    assert_eq!(registrar.register(&kernel).unwrap(), 5);
}

#[test]
fn test_startup_table_without_kernel() {
    assert!(vlog_startup_routines[0].is_some());
    assert!(vlog_startup_routines[1].is_none());

    // No simulator kernel in a test binary: the routine logs and leaves the
    // registration undone.
    (vlog_startup_routines[0].unwrap())();
    assert_eq!(startup_state(), RegistrationState::Unregistered);
}
