//! C ABI exports for host runtimes
//!
//! A process-wide [`ModuleRegistry`] reachable through plain C functions, for
//! hosts that bind native code through a foreign function interface rather
//! than linking Rust.
//!
//! Every function returns `0` on success or a negative status from
//! [`BindError::status`]. Results go through out-pointers. Where a function
//! takes `error_out`, a message is written there on failure; free it with
//! `simbind_free_error`.

use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr;

use tracing::warn;

use crate::config::SimbindConfig;
use crate::module::{BindError, BindResult, ModuleHandle, ModuleRegistry, SimState};

lazy_static::lazy_static! {
    /// Registry shared by every caller of the C ABI
    static ref REGISTRY: ModuleRegistry = {
        let config = SimbindConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unusable simbind configuration");
            SimbindConfig::default()
        });
        ModuleRegistry::from_config(&config)
    };
}

/// The registry behind the C ABI
pub fn global_registry() -> &'static ModuleRegistry {
    &REGISTRY
}

/// Status reported for a NULL pointer argument
fn null_argument(what: &str) -> BindError {
    BindError::InvalidArgument(format!("{} is NULL", what))
}

unsafe fn write_error(error_out: *mut *mut c_char, err: &BindError) {
    if error_out.is_null() {
        return;
    }
    let msg = CString::new(err.to_string())
        .unwrap_or_else(|_| CString::from(c"error message contained a NUL byte"));
    *error_out = msg.into_raw();
}

unsafe fn status<T>(result: BindResult<T>, error_out: *mut *mut c_char) -> c_int {
    match result {
        Ok(_) => 0,
        Err(e) => {
            write_error(error_out, &e);
            e.status()
        }
    }
}

unsafe fn host_str<'a>(s: *const c_char, what: &str) -> BindResult<&'a str> {
    if s.is_null() {
        return Err(null_argument(what));
    }
    CStr::from_ptr(s)
        .to_str()
        .map_err(|e| BindError::InvalidArgument(format!("{} is not UTF-8: {}", what, e)))
}

fn handle(raw: c_int) -> BindResult<ModuleHandle> {
    ModuleHandle::from_raw(raw).ok_or(BindError::InvalidHandle(raw as i64))
}

unsafe fn state(raw: i64) -> BindResult<SimState> {
    SimState::from_raw(raw).ok_or_else(|| null_argument("state"))
}

/// Run `f` with the token borrowed; the host keeps ownership
unsafe fn with_state<T>(
    raw_handle: c_int,
    raw_state: i64,
    f: impl FnOnce(ModuleHandle, &SimState) -> BindResult<T>,
) -> BindResult<T> {
    let h = handle(raw_handle)?;
    let s = state(raw_state)?;
    f(h, &s)
}

unsafe fn write_out<T>(out: *mut T, value: T) -> BindResult<()> {
    if out.is_null() {
        return Err(null_argument("output pointer"));
    }
    *out = value;
    Ok(())
}

/// Load a simulator module; the handle is written to `handle_out`
#[no_mangle]
pub unsafe extern "C" fn simbind_load(
    path: *const c_char,
    handle_out: *mut c_int,
    error_out: *mut *mut c_char,
) -> c_int {
    let result = host_str(path, "path")
        .and_then(|p| REGISTRY.load(p))
        .and_then(|h| write_out(handle_out, h.as_raw()));
    status(result, error_out)
}

/// Start a simulation instance; the token is written to `state_out`
#[no_mangle]
pub unsafe extern "C" fn simbind_initialize(
    handle: c_int,
    state_out: *mut i64,
    error_out: *mut *mut c_char,
) -> c_int {
    let result = self::handle(handle)
        .and_then(|h| REGISTRY.initialize(h))
        .and_then(|s| write_out(state_out, s.into_raw()));
    status(result, error_out)
}

#[no_mangle]
pub unsafe extern "C" fn simbind_step(
    handle: c_int,
    state: i64,
    cycles: i32,
    result_out: *mut i64,
) -> c_int {
    let result = with_state(handle, state, |h, s| REGISTRY.step(h, s, cycles))
        .and_then(|r| write_out(result_out, r));
    status(result, ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn simbind_advance(handle: c_int, state: i64) -> c_int {
    status(
        with_state(handle, state, |h, s| REGISTRY.advance(h, s)),
        ptr::null_mut(),
    )
}

/// End a simulation instance. The token must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn simbind_finish(handle: c_int, state: i64) -> c_int {
    let result = self::handle(handle).and_then(|h| {
        let s = self::state(state)?;
        REGISTRY.finish(h, s)
    });
    status(result, ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn simbind_reset_coverage(handle: c_int, state: i64) -> c_int {
    status(
        with_state(handle, state, |h, s| REGISTRY.reset_coverage(h, s)),
        ptr::null_mut(),
    )
}

#[no_mangle]
pub unsafe extern "C" fn simbind_write_coverage(
    handle: c_int,
    state: i64,
    filename: *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    let result = with_state(handle, state, |h, s| {
        let filename = host_str(filename, "filename")?;
        REGISTRY.write_coverage(h, s, filename)
    });
    status(result, error_out)
}

#[no_mangle]
pub unsafe extern "C" fn simbind_poke(handle: c_int, state: i64, signal: i32, value: i64) -> c_int {
    status(
        with_state(handle, state, |h, s| REGISTRY.poke(h, s, signal, value)),
        ptr::null_mut(),
    )
}

#[no_mangle]
pub unsafe extern "C" fn simbind_peek(
    handle: c_int,
    state: i64,
    signal: i32,
    value_out: *mut i64,
) -> c_int {
    let result = with_state(handle, state, |h, s| REGISTRY.peek(h, s, signal))
        .and_then(|v| write_out(value_out, v));
    status(result, ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn simbind_poke_wide(
    handle: c_int,
    state: i64,
    signal: i32,
    word: i32,
    value: i64,
) -> c_int {
    status(
        with_state(handle, state, |h, s| {
            REGISTRY.poke_wide(h, s, signal, word, value)
        }),
        ptr::null_mut(),
    )
}

#[no_mangle]
pub unsafe extern "C" fn simbind_peek_wide(
    handle: c_int,
    state: i64,
    signal: i32,
    word: i32,
    value_out: *mut i64,
) -> c_int {
    let result = with_state(handle, state, |h, s| REGISTRY.peek_wide(h, s, signal, word))
        .and_then(|v| write_out(value_out, v));
    status(result, ptr::null_mut())
}

/// Pass `argc` strings from `argv` to the instance
#[no_mangle]
pub unsafe extern "C" fn simbind_set_args(
    handle: c_int,
    state: i64,
    argc: i32,
    argv: *const *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    let result = with_state(handle, state, |h, s| {
        let argc = usize::try_from(argc)
            .map_err(|_| BindError::InvalidArgument(format!("negative argc {}", argc)))?;
        if argc > 0 && argv.is_null() {
            return Err(null_argument("argv"));
        }
        let args = (0..argc)
            .map(|i| host_str(*argv.add(i), "argv entry"))
            .collect::<BindResult<Vec<_>>>()?;
        REGISTRY.set_args(h, s, &args)
    });
    status(result, error_out)
}

/// Free a message written to an `error_out` parameter
#[no_mangle]
pub unsafe extern "C" fn simbind_free_error(error: *mut c_char) {
    if !error.is_null() {
        drop(CString::from_raw(error));
    }
}
