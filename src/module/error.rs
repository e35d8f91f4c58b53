//! Error types for module loading and dispatch

use std::path::PathBuf;

use thiserror::Error;

use super::abi::EntryPoint;

/// Failure to turn a path into a usable module.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("module is missing required entry point '{0}'")]
    MissingSymbol(EntryPoint),

    #[error("module '{}' is incompatible: {reason}", path.display())]
    ModuleIncompatible { path: PathBuf, reason: String },
}

/// Error returned by registry operations.
#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("invalid module handle: {0}")]
    InvalidHandle(i64),

    #[error("argument too long: {len} bytes exceeds the limit of {max}")]
    ArgumentTooLong { len: usize, max: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("too many arguments: {0}")]
    TooManyArgs(usize),

    #[error("entry point '{entry}' reported failure (code {code})")]
    Dispatch { entry: EntryPoint, code: i64 },

    #[error("module handle space exhausted ({0} modules loaded)")]
    HandlesExhausted(usize),
}

impl BindError {
    /// Status code reported across the C ABI
    pub fn status(&self) -> i32 {
        match self {
            BindError::Load(LoadError::PathNotFound(_)) => -1,
            BindError::Load(LoadError::MissingSymbol(_)) => -2,
            BindError::Load(LoadError::ModuleIncompatible { .. }) => -3,
            BindError::InvalidHandle(_) => -4,
            BindError::ArgumentTooLong { .. } => -5,
            BindError::InvalidArgument(_) => -6,
            BindError::TooManyArgs(_) => -7,
            BindError::Dispatch { .. } => -8,
            BindError::HandlesExhausted(_) => -9,
        }
    }
}

/// Result type for registry operations.
pub type BindResult<T> = Result<T, BindError>;
