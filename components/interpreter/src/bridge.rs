//! Foreign object bridge
//!
//! Classes flagged foreign (see `ClassGraph::mark_foreign`) may have
//! methods that live outside the class graph. When lookup finds nothing on
//! such a class the dispatcher asks the installed bridge before falling
//! back to `method_missing`.

use std::fmt;

use core_types::{ClassId, Symbol};
use object_model::{Arity, NativeFn};

/// A method supplied by the bridge
#[derive(Clone)]
pub struct ForeignMethod {
    /// Calling signature
    pub arity: Arity,
    /// Implementation, called like a native
    pub func: NativeFn,
}

impl fmt::Debug for ForeignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignMethod").field("arity", &self.arity).finish()
    }
}

/// Resolves methods for foreign classes
pub trait ForeignBridge: Send + Sync {
    /// Method implementing `mid` for instances of `class`, if any
    fn resolve(&self, class: ClassId, mid: Symbol) -> Option<ForeignMethod>;
}
