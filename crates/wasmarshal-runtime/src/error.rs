//! Error types for the host/module bridge

use thiserror::Error;

use crate::value::NumKind;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Instantiation or import resolution failed. Fatal for the attempt;
    /// callers must start over with a fresh link.
    #[error("link failed: {0}")]
    Link(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("arity mismatch for '{symbol}': export takes {expected} arguments, {actual} supplied")]
    ArityMismatch {
        symbol: String,
        expected: usize,
        actual: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("out of memory: failed to reserve {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("out of bounds: {len} bytes at offset {offset} exceed memory of {size} bytes")]
    OutOfBounds { offset: u32, len: usize, size: usize },

    #[error("invalid element width {width} for {kind} lane")]
    InvalidWidth { width: usize, kind: NumKind },

    /// A deferred binding was invoked before its module instance was resolved.
    #[error("module not ready: '{0}' has not been resolved")]
    NotReady(String),

    /// Engine-level failure: a trap raised by the module or a wasmtime error.
    #[error(transparent)]
    Wasm(#[from] anyhow::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
