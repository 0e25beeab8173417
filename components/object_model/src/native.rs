//! Native methods
//!
//! Natives are Rust closures installed in method tables. They receive a
//! [`NativeContext`] through which they reach the class graph and call
//! back into the VM.

use std::fmt;
use std::sync::Arc;

use bytecode_system::{Block, Proc, Value, VmError, VmResult};
use core_types::{MissingReason, Symbol};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::class_graph::ClassGraph;

/// Highest fixed arity a native may declare
pub const MAX_NATIVE_ARITY: usize = 15;

/// Signature every native implements: context, receiver, arguments
pub type NativeFn =
    Arc<dyn Fn(&mut dyn NativeContext, &Value, &[Value]) -> VmResult<Value> + Send + Sync>;

/// How a native receives its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many arguments
    Fixed(usize),
    /// Any number, passed as a slice
    Variadic,
    /// Any number, packed into a single array argument
    Packed,
}

/// Dispatcher hints attached to a native
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeHint {
    /// Call normally
    None,
    /// This is `send`: the dispatcher may re-dispatch on the first argument
    Send,
}

/// A native method descriptor
#[derive(Clone)]
pub struct NativeMethod {
    /// Name shown in logs and debug output
    pub name: &'static str,
    /// Argument convention
    pub arity: Arity,
    /// Dispatcher hint
    pub hint: NativeHint,
    /// Implementation
    pub func: NativeFn,
}

impl NativeMethod {
    /// Describe a native.
    ///
    /// # Errors
    ///
    /// A fixed arity above [`MAX_NATIVE_ARITY`] is rejected with
    /// `too many arguments(N)`.
    pub fn new(name: &'static str, arity: Arity, func: NativeFn) -> VmResult<Self> {
        if let Arity::Fixed(n) = arity {
            if n > MAX_NATIVE_ARITY {
                return Err(VmError::Argument(format!("too many arguments({})", n)));
            }
        }
        Ok(NativeMethod {
            name,
            arity,
            hint: NativeHint::None,
            func,
        })
    }

    /// Attach a dispatcher hint
    pub fn with_hint(mut self, hint: NativeHint) -> Self {
        self.hint = hint;
        self
    }

    /// Check an argument count against the declared arity
    pub fn check_arity(&self, argc: usize) -> VmResult<()> {
        match self.arity {
            Arity::Fixed(n) if n != argc => Err(VmError::ArgumentCount {
                expected: n,
                actual: argc,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for NativeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeMethod")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("hint", &self.hint)
            .finish()
    }
}

/// What a running native can ask of the VM.
///
/// Guards returned by [`NativeContext::graph`] and
/// [`NativeContext::graph_mut`] must be dropped before any call back into
/// the VM (`funcall`, `yield_block`, `call_proc`).
pub trait NativeContext {
    /// Read access to the class graph
    fn graph(&self) -> RwLockReadGuard<'_, ClassGraph>;

    /// Write access to the class graph
    fn graph_mut(&self) -> RwLockWriteGuard<'_, ClassGraph>;

    /// Intern a name
    fn intern(&self, name: &str) -> Symbol;

    /// Text of a symbol
    fn symbol_name(&self, sym: Symbol) -> String;

    /// Receiver-less call (private methods reachable)
    fn funcall(
        &mut self,
        recv: &Value,
        mid: Symbol,
        args: &[Value],
        block: Option<Arc<Block>>,
    ) -> VmResult<Value>;

    /// Block passed to the running native
    fn block(&self) -> Option<Arc<Block>>;

    /// Yield to the running native's block
    fn yield_block(&mut self, args: &[Value]) -> VmResult<Value>;

    /// Whether the frame that called the running native received a block
    fn caller_block_given(&self) -> bool;

    /// Wrap the running native's block in a proc object
    fn make_proc(&mut self, lambda: bool) -> VmResult<Value>;

    /// Invoke a proc
    fn call_proc(&mut self, proc: &Proc, args: &[Value], block: Option<Arc<Block>>) -> VmResult<Value>;

    /// Reason recorded for the `method_missing` call in progress
    fn missing_reason(&self) -> MissingReason;

    /// Human-readable description of a value, used in messages
    fn inspect(&self, value: &Value) -> String;

    /// Trust level of the running context
    fn safe_level(&self) -> u8;
}
