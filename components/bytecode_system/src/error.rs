//! VM error type
//!
//! Every fallible VM operation returns [`VmResult`]. Besides ordinary
//! raised errors, [`VmError::Throw`] carries an in-flight non-local
//! transfer (return, break, retry) through native frames until the frame
//! loop that owns its target catches it.

use core_types::{ErrorKind, LocalJumpReason, MissingReason, Visibility};
use thiserror::Error;

use crate::closure::EnvId;
use crate::value::Value;

/// Result alias used across the VM
pub type VmResult<T> = Result<T, VmError>;

/// Kind of a non-local transfer in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Return from the enclosing method (or lambda)
    Return,
    /// Break out of the call the block was passed to
    Break,
    /// Re-enter a protected region
    Retry,
}

/// A non-local transfer travelling toward its target frame
#[derive(Debug, Clone)]
pub struct ThrowObject {
    /// What kind of transfer this is
    pub kind: TransferKind,
    /// Environment identity of the frame that must catch it
    pub target: EnvId,
    /// Payload delivered to the target
    pub value: Value,
}

/// Errors raised by the object model and dispatcher
#[derive(Debug, Clone, Error)]
pub enum VmError {
    /// Argument count outside the declared arity
    #[error("wrong number of arguments ({actual} for {expected})")]
    ArgumentCount {
        /// Bound that was violated
        expected: usize,
        /// Number of arguments supplied
        actual: usize,
    },

    /// Other argument errors
    #[error("{0}")]
    Argument(String),

    /// A module inclusion would create a cycle
    #[error("cyclic include detected")]
    CyclicInclude,

    /// Expected capability or kind not met
    #[error("{0}")]
    Type(String),

    /// Method missing after the fallback was exhausted
    #[error("{}", missing_message(.name, .receiver, .reason))]
    NoMethod {
        /// Method name
        name: String,
        /// Description of the receiver
        receiver: String,
        /// Why the method was not callable
        reason: MissingReason,
    },

    /// Name could not be resolved
    #[error("{0}")]
    Name(String),

    /// Caller trust level too low
    #[error("{0}")]
    Security(String),

    /// Mutation of a frozen class or object
    #[error("{0}")]
    Frozen(String),

    /// Raised by user code or a miscellaneous runtime failure
    #[error("{0}")]
    Runtime(String),

    /// Orphaned control transfer or missing block
    #[error("{}", .reason.message())]
    LocalJump {
        /// Which transfer failed
        reason: LocalJumpReason,
        /// Value the transfer carried
        value: Value,
    },

    /// Value stack or frame depth bound exceeded
    #[error("stack level too deep")]
    StackOverflow {
        /// The bound that was hit
        limit: usize,
    },

    /// Unreachable state reached; VM state presumed corrupt
    #[error("[BUG] {0}")]
    InternalInvariant(String),

    /// Non-local transfer in flight
    #[error("unexpected {:?} transfer", .0.kind)]
    Throw(Box<ThrowObject>),
}

fn missing_message(name: &str, receiver: &str, reason: &MissingReason) -> String {
    match reason.visibility {
        Some(Visibility::Private) => {
            format!("private method `{}' called for {}", name, receiver)
        }
        Some(Visibility::Protected) => {
            format!("protected method `{}' called for {}", name, receiver)
        }
        _ if reason.super_call => {
            format!("super: no superclass method `{}' for {}", name, receiver)
        }
        _ if reason.vcall => {
            format!("undefined local variable or method `{}' for {}", name, receiver)
        }
        _ => format!("undefined method `{}' for {}", name, receiver),
    }
}

impl VmError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VmError::ArgumentCount { .. } => ErrorKind::ArgumentCountError,
            VmError::Argument(_) | VmError::CyclicInclude => ErrorKind::ArgumentError,
            VmError::Type(_) => ErrorKind::TypeError,
            VmError::NoMethod { reason, .. } => {
                if reason.vcall && reason.visibility.is_none() {
                    ErrorKind::NameError
                } else {
                    ErrorKind::NoMethodError
                }
            }
            VmError::Name(_) => ErrorKind::NameError,
            VmError::Security(_) => ErrorKind::SecurityError,
            VmError::Frozen(_) => ErrorKind::FrozenError,
            VmError::Runtime(_) => ErrorKind::RuntimeError,
            VmError::LocalJump { .. } => ErrorKind::LocalJumpError,
            VmError::StackOverflow { .. } => ErrorKind::StackOverflow,
            VmError::InternalInvariant(_) => ErrorKind::InternalInvariantViolation,
            VmError::Throw(_) => ErrorKind::Throw,
        }
    }

    /// Whether a rescue clause may handle this error
    ///
    /// Orphaned transfers, stack overflow, invariant violations and
    /// in-flight throws are not rescuable; a missing block is.
    pub fn is_rescuable(&self) -> bool {
        match self {
            VmError::LocalJump { reason, .. } => *reason == LocalJumpReason::NoBlock,
            VmError::StackOverflow { .. } | VmError::InternalInvariant(_) | VmError::Throw(_) => {
                false
            }
            _ => true,
        }
    }

    /// Errors that abort the call chain without running any handler
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VmError::StackOverflow { .. } | VmError::InternalInvariant(_)
        )
    }

    /// Build a local-jump error
    pub fn local_jump(reason: LocalJumpReason, value: Value) -> Self {
        VmError::LocalJump { reason, value }
    }

    /// Build an in-flight transfer
    pub fn throw(kind: TransferKind, target: EnvId, value: Value) -> Self {
        VmError::Throw(Box::new(ThrowObject {
            kind,
            target,
            value,
        }))
    }
}
