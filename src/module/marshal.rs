//! Bounded string marshaling for calls that cross into a module

use std::ffi::{c_char, CString};
use std::ptr;

use serde::{Deserialize, Serialize};

use super::error::{BindError, BindResult};

/// Default upper bound for one string argument, in bytes, terminator excluded
pub const DEFAULT_MAX_ARG_LEN: usize = 1024;

/// Limits applied to strings copied into native buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarshalLimits {
    pub max_arg_len: usize,
}

impl Default for MarshalLimits {
    fn default() -> Self {
        Self {
            max_arg_len: DEFAULT_MAX_ARG_LEN,
        }
    }
}

/// Copy `arg` into a NUL-terminated buffer of at most `max_arg_len + 1` bytes.
///
/// Strings longer than the bound are rejected, never truncated.
pub fn bounded_cstring(arg: &str, limits: MarshalLimits) -> BindResult<CString> {
    if arg.len() > limits.max_arg_len {
        return Err(BindError::ArgumentTooLong {
            len: arg.len(),
            max: limits.max_arg_len,
        });
    }
    CString::new(arg).map_err(|e| {
        BindError::InvalidArgument(format!("interior NUL byte at offset {}", e.nul_position()))
    })
}

/// A native argument vector (`argc`, `argv`) owning its string copies.
///
/// Every entry is validated before the vector exists, so a failed build never
/// hands anything to the module. The copies and the pointer array are freed
/// when the vector is dropped.
pub struct ArgVector {
    // Buffers released from their `CString`s; reclaimed in `Drop`
    owned: Vec<*mut c_char>,
    // What the module sees. It may rewrite entries, so `owned` is kept apart.
    ptrs: Vec<*mut c_char>,
}

impl ArgVector {
    pub fn new<S: AsRef<str>>(args: &[S], limits: MarshalLimits) -> BindResult<Self> {
        if i32::try_from(args.len()).is_err() {
            return Err(BindError::TooManyArgs(args.len()));
        }

        let strings = args
            .iter()
            .map(|a| bounded_cstring(a.as_ref(), limits))
            .collect::<BindResult<Vec<_>>>()?;

        let owned: Vec<*mut c_char> = strings.into_iter().map(CString::into_raw).collect();
        let mut ptrs = owned.clone();
        ptrs.push(ptr::null_mut());

        Ok(Self { owned, ptrs })
    }

    pub fn argc(&self) -> i32 {
        // Bounded by the check in `new`
        (self.ptrs.len() - 1) as i32
    }

    /// NULL-terminated pointer array, valid while `self` is alive
    pub fn argv(&mut self) -> *mut *mut c_char {
        self.ptrs.as_mut_ptr()
    }

    pub fn len(&self) -> usize {
        self.ptrs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ArgVector {
    fn drop(&mut self) {
        for raw in self.owned.drain(..) {
            // Safety: every entry came from `CString::into_raw` in `new` and
            // is reclaimed exactly once.
            drop(unsafe { CString::from_raw(raw) });
        }
    }
}
