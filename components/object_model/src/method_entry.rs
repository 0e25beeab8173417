//! Method entries
//!
//! An entry records how a method is implemented, its visibility, and the
//! class or module whose table it was defined in. Entries are immutable
//! once installed; redefinition replaces the `Arc` in the table.

use std::fmt;
use std::sync::Arc;

use bytecode_system::{Iseq, Proc};
use core_types::{ClassId, Symbol, Visibility};

use crate::native::NativeMethod;

/// How a method is implemented
#[derive(Clone)]
pub enum MethodBody {
    /// Rust function
    Native(NativeMethod),
    /// Instruction sequence run in a new frame
    Interpreted(Arc<Iseq>),
    /// Returns an instance variable
    AttrReader(Symbol),
    /// Assigns an instance variable
    AttrWriter(Symbol),
    /// Proc run with the receiver as `self`
    BoundClosure(Arc<Proc>),
    /// Resolves the same name above the owner, with this entry's visibility
    SuperForward,
}

impl MethodBody {
    /// Short tag used in logs
    pub fn tag(&self) -> &'static str {
        match self {
            MethodBody::Native(_) => "native",
            MethodBody::Interpreted(_) => "interpreted",
            MethodBody::AttrReader(_) => "attr_reader",
            MethodBody::AttrWriter(_) => "attr_writer",
            MethodBody::BoundClosure(_) => "closure",
            MethodBody::SuperForward => "super_forward",
        }
    }
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodBody::Native(native) => write!(f, "Native({})", native.name),
            MethodBody::Interpreted(iseq) => write!(f, "Interpreted({})", iseq.name),
            MethodBody::AttrReader(ivar) => write!(f, "AttrReader({:?})", ivar),
            MethodBody::AttrWriter(ivar) => write!(f, "AttrWriter({:?})", ivar),
            MethodBody::BoundClosure(_) => write!(f, "BoundClosure"),
            MethodBody::SuperForward => write!(f, "SuperForward"),
        }
    }
}

/// One method table entry
#[derive(Debug, Clone)]
pub struct MethodEntry {
    /// Visibility; [`Visibility::Undefined`] marks a tombstone
    pub visibility: Visibility,
    /// Implementation; `None` for tombstones
    pub body: Option<MethodBody>,
    /// Class or module the entry was defined in
    pub owner: ClassId,
    /// Trust level in effect when the method was defined
    pub safe_level: u8,
}

impl MethodEntry {
    /// A live entry
    pub fn new(body: MethodBody, visibility: Visibility, owner: ClassId) -> Self {
        MethodEntry {
            visibility,
            body: Some(body),
            owner,
            safe_level: 0,
        }
    }

    /// A tombstone stopping lookup at `owner`
    pub fn tombstone(owner: ClassId) -> Self {
        MethodEntry {
            visibility: Visibility::Undefined,
            body: None,
            owner,
            safe_level: 0,
        }
    }

    /// Record the trust level the method was defined at
    pub fn with_safe_level(mut self, level: u8) -> Self {
        self.safe_level = level;
        self
    }

    /// True for tombstones
    pub fn is_undefined(&self) -> bool {
        self.body.is_none() || self.visibility.is_undefined()
    }
}
