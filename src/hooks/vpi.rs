//! VPI system-task registration interface
//!
//! Only the part of the IEEE 1364 VPI needed to register system tasks.

use std::ffi::{c_char, c_void};
use std::fmt;

use super::HookError;

pub type PliInt32 = i32;
pub type PliByte8 = c_char;

/// `vpiSysTask`
pub const VPI_SYS_TASK: PliInt32 = 1;

/// Signature of `calltf`, `compiletf` and `sizetf` callbacks
pub type SystfCallback = unsafe extern "C" fn(*mut PliByte8) -> PliInt32;

/// `s_vpi_systf_data`
#[repr(C)]
pub struct SystfData {
    pub kind: PliInt32,
    pub sysfunctype: PliInt32,
    pub tfname: *const PliByte8,
    pub calltf: Option<SystfCallback>,
    pub compiletf: Option<SystfCallback>,
    pub sizetf: Option<SystfCallback>,
    pub user_data: *mut PliByte8,
}

impl fmt::Debug for SystfData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystfData")
            .field("kind", &self.kind)
            .field("tfname", &self.tfname)
            .field("compiletf", &self.compiletf.is_some())
            .finish_non_exhaustive()
    }
}

/// Signature of `vpi_register_systf`
pub type RegisterSystfFn = unsafe extern "C" fn(*mut SystfData) -> *mut c_void;

/// Something system tasks can be registered with
pub trait SimulatorKernel {
    fn register_systf(&self, data: &mut SystfData) -> Result<(), HookError>;
}

/// The simulator kernel hosting this process.
///
/// `vpi_register_systf` is looked up in the global symbol namespace at
/// startup, so this crate never links against a particular simulator.
pub struct VpiKernel {
    register: RegisterSystfFn,
}

impl VpiKernel {
    pub const REGISTER_SYMBOL: &'static [u8] = b"vpi_register_systf\0";

    /// Find the kernel in the running process
    #[cfg(unix)]
    pub fn from_process() -> Result<Self, HookError> {
        let this = libloading::os::unix::Library::this();
        // Safety: the symbol has the VPI-defined signature. The process image
        // outlives every use of the pointer, so dropping `this` is fine.
        let register = unsafe {
            this.get::<RegisterSystfFn>(Self::REGISTER_SYMBOL)
                .map(|sym| *sym)
                .map_err(|e| HookError::KernelUnavailable(e.to_string()))?
        };
        Ok(Self { register })
    }

    #[cfg(not(unix))]
    pub fn from_process() -> Result<Self, HookError> {
        Err(HookError::KernelUnavailable(
            "process symbol lookup is only supported on unix".to_string(),
        ))
    }

    /// Use an explicit `vpi_register_systf`
    pub fn with_register_fn(register: RegisterSystfFn) -> Self {
        Self { register }
    }
}

impl SimulatorKernel for VpiKernel {
    fn register_systf(&self, data: &mut SystfData) -> Result<(), HookError> {
        let handle = unsafe { (self.register)(data) };
        if handle.is_null() {
            let name = unsafe { std::ffi::CStr::from_ptr(data.tfname) }
                .to_string_lossy()
                .into_owned();
            return Err(HookError::Rejected(name));
        }
        Ok(())
    }
}
