//! Structured error types for job construction, negotiation, and dispatch.
//!
//! Every failure here is fatal to the phase invocation that raised it.
//! Nothing is retried internally; re-running a whole phase belongs to the
//! orchestration layer driving this crate.

use thiserror::Error;

use crate::step::PhaseKind;

#[derive(Debug, Error)]
pub enum Error {
    /// Incompatible phase mixing, an out-of-range step or phase request,
    /// or a requested phase with no body hook.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A raw mapper or distributed phase was invoked with the wrong number
    /// of positional arguments.
    #[error("expected exactly {expected} positional arguments, got {actual}")]
    ArgumentArity { expected: usize, actual: usize },

    /// Protocol roles were requested for a phase that is not script code.
    /// Signals an orchestration bug upstream: command phases never decode
    /// or encode records in-process.
    #[error("can't pick a protocol for non-script {phase} in step {step}")]
    ProtocolResolution { step: usize, phase: PhaseKind },

    /// A record did not match the shape the governing protocol expects.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A user hook failed. The underlying error passes through unmodified.
    #[error(transparent)]
    Hook(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Configuration(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
