//! Error taxonomy.
//!
//! The concrete error value (which can carry runtime values) lives next to
//! `Value` in `bytecode_system`; this module defines the classification
//! shared by every component and the small reason types attached to
//! missing-method and local-jump errors.

use crate::Visibility;

/// The kind of a VM error.
///
/// Everything up to and including [`ErrorKind::LocalJumpError`] is raised
/// at a call boundary; [`ErrorKind::StackOverflow`] and
/// [`ErrorKind::InternalInvariantViolation`] abort the current call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Argument count outside the declared arity
    ArgumentCountError,
    /// Other argument errors (bad native arity, cyclic include)
    ArgumentError,
    /// Expected capability or kind not met
    TypeError,
    /// Name could not be resolved (variable-style call, undef of unknown method)
    NameError,
    /// Method missing after the fallback was exhausted
    NoMethodError,
    /// Caller trust level too low
    SecurityError,
    /// Mutation of a frozen class or object
    FrozenError,
    /// Explicitly raised or miscellaneous runtime error
    RuntimeError,
    /// Orphaned control transfer or missing block
    LocalJumpError,
    /// Value stack bound exceeded
    StackOverflow,
    /// Unreachable state reached; VM state presumed corrupt
    InternalInvariantViolation,
    /// A non-local transfer still travelling to its target frame
    Throw,
}

impl ErrorKind {
    /// Class-like name used in messages and backtraces
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::ArgumentCountError | ErrorKind::ArgumentError => "ArgumentError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::NameError => "NameError",
            ErrorKind::NoMethodError => "NoMethodError",
            ErrorKind::SecurityError => "SecurityError",
            ErrorKind::FrozenError => "FrozenError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::LocalJumpError => "LocalJumpError",
            ErrorKind::StackOverflow => "SystemStackError",
            ErrorKind::InternalInvariantViolation => "fatal",
            ErrorKind::Throw => "ThrowObject",
        }
    }
}

/// Why dispatch fell back to `method_missing`.
///
/// Mirrors the flags recorded for the handler: the visibility that
/// forbade the call (if any), whether the call looked like a variable
/// reference, and whether it came from `super`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MissingReason {
    /// Set when a private or protected entry was found but not callable
    pub visibility: Option<Visibility>,
    /// Receiver-less call with no arguments (`foo` rather than `foo()`)
    pub vcall: bool,
    /// Lookup started from `super`
    pub super_call: bool,
}

impl MissingReason {
    /// Reason for a call forbidden by `visibility`
    pub fn forbidden(visibility: Visibility) -> Self {
        MissingReason {
            visibility: Some(visibility),
            ..Self::default()
        }
    }
}

/// What kind of control transfer could not find its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalJumpReason {
    /// `return` from a block whose method already completed
    Return,
    /// `break` from a block whose call site is no longer active
    Break,
    /// `retry` with no live construct to re-enter
    Retry,
    /// `yield` in a frame that received no block
    NoBlock,
}

impl LocalJumpReason {
    /// Message used for the corresponding error
    pub fn message(self) -> &'static str {
        match self {
            LocalJumpReason::Return => "unexpected return",
            LocalJumpReason::Break => "break from proc-closure",
            LocalJumpReason::Retry => "retry outside of rescue clause",
            LocalJumpReason::NoBlock => "no block given (yield)",
        }
    }
}
