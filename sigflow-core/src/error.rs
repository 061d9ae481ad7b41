//! Error taxonomy surfaced by kind (never by string) per subsystem, composed
//! into a single discriminated result returned from `start`/`stop`/`run`.

use thiserror::Error;

/// Errors raised while validating and wiring a graph, before any worker spawns.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("port '{0}' does not exist on the referenced block")]
    PortNotFound(String),

    #[error("type mismatch connecting {from} -> {to}")]
    TypeMismatch { from: String, to: String },

    #[error("input port '{0}' already has an incoming edge")]
    MultiplyConnectedInput(String),

    #[error("input port '{0}' has no incoming edge")]
    UnconnectedInput(String),

    #[error("graph contains a cycle")]
    GraphCycle,

    #[error("rate is undefined for block '{0}'")]
    UndefinedRate(String),
}

/// Errors raised while initializing a block, before it is scheduled.
#[derive(Debug, Error, PartialEq)]
pub enum InitError {
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("unsupported audio format code {0} (only PCM/1 is supported)")]
    UnsupportedAudioFormat(u16),

    #[error("unsupported bits per sample: {0} (expected 8, 16, or 32)")]
    UnsupportedBitsPerSample(u16),

    #[error("channel count mismatch: file declares {found}, caller requested {expected}")]
    NumChannelsMismatch { expected: usize, found: usize },

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("allocation failed")]
    AllocationFailure,
}

/// Errors raised by a running block, or by a CLI host wrapping this crate.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PartialEq for RuntimeError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeError::IOError(a), RuntimeError::IOError(b)) => a.kind() == b.kind(),
            (RuntimeError::InvalidArgument(a), RuntimeError::InvalidArgument(b)) => a == b,
            _ => false,
        }
    }
}

/// The single discriminated error returned from `start`/`stop`/`run`.
///
/// `EndOfStream` is deliberately absent from this type: it is a normal
/// control value from `process`, never an error.
#[derive(Debug, Error, PartialEq)]
pub enum FlowError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type FlowResult<T> = Result<T, FlowError>;
