//! Instruction set
//!
//! A small stack-machine instruction set: just enough to express method
//! bodies, blocks, calls and control transfers against the dispatcher.

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use core_types::{Symbol, Visibility};

use crate::iseq::Iseq;
use crate::value::Value;

/// Call-site flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallFlags(u8);

impl CallFlags {
    /// Last positional argument is spread into the argument list
    pub const SPLAT: CallFlags = CallFlags(1 << 0);
    /// An explicit block argument (`&blk`) sits above the arguments
    pub const BLOCKARG: CallFlags = CallFlags(1 << 1);
    /// Receiver-less call; private methods are reachable
    pub const FCALL: CallFlags = CallFlags(1 << 2);
    /// Receiver-less call without arguments or parentheses
    pub const VCALL: CallFlags = CallFlags(1 << 3);
    /// Callee may reuse the caller's frame
    pub const TAILCALL: CallFlags = CallFlags(1 << 4);
    /// Lookup starts above the current method's owner
    pub const SUPER: CallFlags = CallFlags(1 << 5);
    /// Call re-dispatched through `send`
    pub const SEND: CallFlags = CallFlags(1 << 6);

    /// No flags set
    pub const fn empty() -> Self {
        CallFlags(0)
    }

    /// True when every flag in `other` is set
    pub const fn contains(self, other: CallFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags in `other`
    pub fn insert(&mut self, other: CallFlags) {
        self.0 |= other.0;
    }

    /// Clear the flags in `other`
    pub fn remove(&mut self, other: CallFlags) {
        self.0 &= !other.0;
    }

    /// Raw bit pattern
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for CallFlags {
    type Output = CallFlags;

    fn bitor(self, rhs: CallFlags) -> CallFlags {
        CallFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for CallFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(CallFlags, &str); 7] = [
            (CallFlags::SPLAT, "SPLAT"),
            (CallFlags::BLOCKARG, "BLOCKARG"),
            (CallFlags::FCALL, "FCALL"),
            (CallFlags::VCALL, "VCALL"),
            (CallFlags::TAILCALL, "TAILCALL"),
            (CallFlags::SUPER, "SUPER"),
            (CallFlags::SEND, "SEND"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "CallFlags({})", set.join("|"))
    }
}

/// Static description of one call site
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Method name
    pub mid: Symbol,
    /// Positional argument count on the stack (splat counts as one)
    pub argc: usize,
    /// Call-site flags
    pub flags: CallFlags,
    /// Literal block body, if the call passes one
    pub block: Option<Arc<Iseq>>,
    /// Index of this site's inline cache within the body
    pub cache_slot: usize,
}

/// Kind of control transfer raised by [`Opcode::Throw`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrowKind {
    /// `return`; non-local when executed inside a block
    Return,
    /// `break` out of a block
    Break,
    /// `retry`, re-entering the construct `level` scopes out
    Retry {
        /// Number of enclosing scopes to walk
        level: usize,
    },
    /// Re-raise the pending error operand (end of an ensure clause)
    Continue,
}

/// Where [`Opcode::DefineMethod`] installs its body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineTarget {
    /// The class `self` denotes, with the given visibility
    Lexical(Visibility),
    /// Private instance method plus public singleton method
    ModuleFunction,
    /// The singleton class of `self`
    Singleton,
}

/// Instruction opcodes
#[derive(Debug, Clone)]
pub enum Opcode {
    /// Do nothing
    Nop,
    /// Push `nil`
    PutNil,
    /// Push the frame's receiver
    PutSelf,
    /// Push a literal
    PutObject(Value),
    /// Push local `index` from the scope `level` environments out
    GetLocal {
        /// Slot index
        index: usize,
        /// Enclosing-scope distance
        level: usize,
    },
    /// Pop into local `index` of the scope `level` environments out
    SetLocal {
        /// Slot index
        index: usize,
        /// Enclosing-scope distance
        level: usize,
    },
    /// Push an instance variable of `self`
    GetIvar(Symbol),
    /// Pop into an instance variable of `self`
    SetIvar(Symbol),
    /// Discard the top value
    Pop,
    /// Duplicate the top value
    Dup,
    /// Pop `n` values into a new array
    NewArray(usize),
    /// Destructure the top value for multiple assignment
    ExpandArray {
        /// Number of targets
        count: usize,
        /// Also push the remaining elements as an array
        splat: bool,
        /// Bind targets from the tail
        post: bool,
    },
    /// Method call; stack holds receiver, arguments and optional block argument
    Send(Arc<CallInfo>),
    /// `super` call on the current receiver
    InvokeSuper(Arc<CallInfo>),
    /// `yield` to the frame's block
    InvokeBlock {
        /// Argument count on the stack
        argc: usize,
        /// Last argument is spread
        splat: bool,
    },
    /// Define a method from a body; pushes the method name as a symbol
    DefineMethod {
        /// Method name
        name: Symbol,
        /// Method body
        body: Arc<Iseq>,
        /// Where the method lands
        target: DefineTarget,
    },
    /// Return the top value from the current frame
    Leave,
    /// Raise a control transfer with the top value as payload
    Throw(ThrowKind),
    /// Unconditional jump
    Jump(usize),
    /// Pop and jump when truthy
    BranchIf(usize),
    /// Pop and jump when falsy
    BranchUnless(usize),
}

impl Opcode {
    /// Jump target of a branch instruction
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Opcode::Jump(t) | Opcode::BranchIf(t) | Opcode::BranchUnless(t) => Some(*t),
            _ => None,
        }
    }
}
