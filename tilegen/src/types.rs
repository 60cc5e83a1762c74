// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Shared types.

use thiserror::Error;

/// Every way a generator invocation can fail.
///
/// All of these are fatal: the generator never emits a partial description.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("Size divisibility error for kind '{kind}' ({ratio}): {reason}")]
    SizeDivisibility {
        kind: String,
        ratio: String,
        reason: String,
    },

    #[error("Unsupported kernel: {0}")]
    UnsupportedKernel(String),

    #[error("Structural verification failed:\n{0}")]
    StructuralVerification(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Simulation error: {0}")]
    Simulation(String),
}

/// The return type for most generator functions
pub type GenResult<T> = Result<T, GenError>;

#[macro_export]
/// Build an `Err(GenError::<Variant>)` from a format string
macro_rules! gen_error {
    ($variant:ident, $($arg:tt)+) => {
        Err($crate::types::GenError::$variant(format!($($arg)+)))
    };
}
