//! Runtime value representation
//!
//! Values are either immediates (nil, booleans, fixnums, symbols), shared
//! heap data (strings, arrays, procs, exceptions) or handles into the
//! object model's arenas (objects and classes).

use std::fmt;
use std::sync::Arc;

use core_types::{ClassId, ObjectId, Symbol};
use parking_lot::RwLock;

use crate::closure::Proc;
use crate::error::VmError;

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// Immediate integer
    Fixnum(i64),
    /// Interned symbol
    Symbol(Symbol),
    /// Immutable string data
    Str(Arc<str>),
    /// Shared, mutable array
    Array(Arc<RwLock<Vec<Value>>>),
    /// Ordinary object record in the class graph heap
    Object(ObjectId),
    /// A class, module or singleton class
    Class(ClassId),
    /// Proc or lambda object
    Proc(Arc<Proc>),
    /// A raised error captured as a value (rescue / ensure operand)
    Exception(Arc<VmError>),
    /// Absent marker for unfilled slots; never visible as a receiver
    Undef,
}

impl Value {
    /// Build an array value from its elements
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    /// Build a string value
    pub fn string(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Convert a Rust bool
    pub fn from_bool(b: bool) -> Self {
        if b {
            Value::True
        } else {
            Value::False
        }
    }

    /// Everything except `nil`, `false` and the absent marker is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::False | Value::Undef)
    }

    /// True for `nil`
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Immediates whose class is fixed and resolved without the graph
    pub fn is_special_const(&self) -> bool {
        matches!(
            self,
            Value::Nil | Value::True | Value::False | Value::Fixnum(_) | Value::Symbol(_)
        )
    }

    /// Integer payload, if a fixnum
    pub fn as_fixnum(&self) -> Option<i64> {
        match self {
            Value::Fixnum(n) => Some(*n),
            _ => None,
        }
    }

    /// Symbol payload, if a symbol
    pub fn as_symbol(&self) -> Option<Symbol> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    /// Class handle, if a class or module
    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Value::Class(c) => Some(*c),
            _ => None,
        }
    }

    /// Proc payload, if a proc
    pub fn as_proc(&self) -> Option<&Arc<Proc>> {
        match self {
            Value::Proc(p) => Some(p),
            _ => None,
        }
    }

    /// Snapshot of an array's elements
    pub fn array_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.read().clone()),
            _ => None,
        }
    }

    /// Convert to a list the way a splat does: arrays expand, `nil` is
    /// empty, anything else becomes a one-element list
    pub fn splat(&self) -> Vec<Value> {
        match self {
            Value::Array(items) => items.read().clone(),
            Value::Nil => Vec::new(),
            other => vec![other.clone()],
        }
    }

    /// Identity comparison (`equal?`)
    ///
    /// Immediates compare by value, heap data by allocation.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil)
            | (Value::True, Value::True)
            | (Value::False, Value::False)
            | (Value::Undef, Value::Undef) => true,
            (Value::Fixnum(a), Value::Fixnum(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Proc(a), Value::Proc(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    /// Structural equality for strings and arrays, identity otherwise
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                Arc::ptr_eq(a, b) || *a.read() == *b.read()
            }
            _ => self.identical(other),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Fixnum(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::from_bool(b)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::True => write!(f, "true"),
            Value::False => write!(f, "false"),
            Value::Fixnum(n) => write!(f, "{}", n),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.read().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(id) => write!(f, "#<{}>", id),
            Value::Class(id) => write!(f, "#<{}>", id),
            Value::Proc(p) => write!(f, "#<Proc{}>", if p.is_lambda() { " (lambda)" } else { "" }),
            Value::Exception(e) => write!(f, "#<{}: {}>", e.kind().name(), e),
            Value::Undef => write!(f, "undef"),
        }
    }
}
