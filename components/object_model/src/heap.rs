//! Object records
//!
//! Plain objects are records in an arena: a class pointer (rewired when a
//! singleton class is attached), instance variables and flags. Reclaiming
//! records is left to the embedder.

use std::collections::HashMap;

use bytecode_system::Value;
use core_types::{ClassId, ObjectId, Symbol};

/// One object
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    /// Current class; a singleton class once one is attached
    pub klass: ClassId,
    /// Instance variables
    pub ivars: HashMap<Symbol, Value>,
    /// Frozen flag
    pub frozen: bool,
    /// Tainted flag
    pub tainted: bool,
}

/// Arena of object records
#[derive(Debug, Default)]
pub struct Heap {
    records: Vec<ObjectRecord>,
}

impl Heap {
    /// Creates an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a record of class `klass`.
    ///
    /// # Returns
    ///
    /// The handle of the new record.
    pub fn allocate(&mut self, klass: ClassId) -> ObjectId {
        let id = ObjectId::new(self.records.len() as u32);
        self.records.push(ObjectRecord {
            klass,
            ivars: HashMap::new(),
            frozen: false,
            tainted: false,
        });
        id
    }

    /// Record for `id`
    pub fn get(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.records.get(id.index())
    }

    /// Mutable record for `id`
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectRecord> {
        self.records.get_mut(id.index())
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing was allocated
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
