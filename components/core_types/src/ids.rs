//! Arena handles.
//!
//! Descriptors and object records live in arenas owned by the class
//! graph; these handles index into them. Identity comparison of handles
//! is identity comparison of the underlying nodes.

use std::fmt;

/// Handle to a class, module, singleton class or include-proxy descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Create a handle from an arena index
    pub const fn new(index: u32) -> Self {
        ClassId(index)
    }

    /// Arena index of this handle
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Handle to an object record (an instance with a class pointer and ivars)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Create a handle from an arena index
    pub const fn new(index: u32) -> Self {
        ObjectId(index)
    }

    /// Arena index of this handle
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}
