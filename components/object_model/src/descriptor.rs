//! Class descriptors
//!
//! Nodes of the class graph. Ordinary classes and modules own a method
//! table; include-proxies point at their module's table instead.

use std::collections::HashMap;

use bytecode_system::Value;
use core_types::{ClassId, Symbol};

use crate::method_table::TableId;

/// What a descriptor represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Instantiable class
    Class,
    /// Module (mixin)
    Module,
    /// Singleton class attached to one object
    Singleton,
    /// Chain node standing in for an included module
    IncludeProxy,
}

/// Descriptor flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassFlags {
    /// Method table and ivars may not change
    pub frozen: bool,
    /// Created or touched by untrusted code
    pub tainted: bool,
    /// Created without a name
    pub anonymous: bool,
    /// Instances belong to an external object system
    pub foreign: bool,
}

/// A node in the class graph
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    /// Node kind
    pub kind: ClassKind,
    /// Name, when assigned
    pub name: Option<String>,
    /// Next node in the lookup chain
    pub superclass: Option<ClassId>,
    /// Method table; shared with the module for proxies
    pub table: TableId,
    /// Module a proxy stands in for
    pub origin: Option<ClassId>,
    /// Class of this class object (its metaclass, or `Module`/`Class`)
    pub klass: Option<ClassId>,
    /// Object a singleton class belongs to
    pub attached: Option<Value>,
    /// Flags
    pub flags: ClassFlags,
    /// Instance variables of the class object itself
    pub ivars: HashMap<Symbol, Value>,
}

impl ClassDescriptor {
    /// Fresh descriptor with no superclass or metaclass yet
    pub fn new(kind: ClassKind, name: Option<String>, table: TableId) -> Self {
        ClassDescriptor {
            kind,
            flags: ClassFlags {
                anonymous: name.is_none(),
                ..Default::default()
            },
            name,
            superclass: None,
            table,
            origin: None,
            klass: None,
            attached: None,
            ivars: HashMap::new(),
        }
    }

    /// True for singleton classes
    pub fn is_singleton(&self) -> bool {
        self.kind == ClassKind::Singleton
    }

    /// True for include-proxies
    pub fn is_proxy(&self) -> bool {
        self.kind == ClassKind::IncludeProxy
    }

    /// True for modules
    pub fn is_module(&self) -> bool {
        self.kind == ClassKind::Module
    }

    /// Identity reported for this node: a proxy reports its module
    pub fn reported_id(&self, id: ClassId) -> ClassId {
        self.origin.unwrap_or(id)
    }
}
