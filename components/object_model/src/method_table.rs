//! Method tables
//!
//! A table belongs to exactly one class or module. Include-proxies refer
//! to their module's table by [`TableId`], so a method added to a module
//! is visible through every proxy at once.

use std::collections::HashMap;
use std::sync::Arc;

use core_types::Symbol;

use crate::method_entry::MethodEntry;

/// Handle to a method table in the graph's table arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(u32);

impl TableId {
    /// Create a handle from an arena index
    pub const fn new(index: u32) -> Self {
        TableId(index)
    }

    /// Arena index of this handle
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Symbol to method-entry mapping, remembering definition order
#[derive(Debug, Default, Clone)]
pub struct MethodTable {
    entries: HashMap<Symbol, Arc<MethodEntry>>,
    order: Vec<Symbol>,
}

impl MethodTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `mid`, tombstones included
    pub fn get(&self, mid: Symbol) -> Option<&Arc<MethodEntry>> {
        self.entries.get(&mid)
    }

    /// Insert or replace the entry for `mid`
    pub fn insert(&mut self, mid: Symbol, entry: MethodEntry) {
        if self.entries.insert(mid, Arc::new(entry)).is_none() {
            self.order.push(mid);
        }
    }

    /// Remove the entry for `mid`
    pub fn remove(&mut self, mid: Symbol) -> Option<Arc<MethodEntry>> {
        let removed = self.entries.remove(&mid);
        if removed.is_some() {
            self.order.retain(|m| *m != mid);
        }
        removed
    }

    /// Entries in definition order
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &Arc<MethodEntry>)> {
        self.order
            .iter()
            .filter_map(move |mid| self.entries.get(mid).map(|e| (*mid, e)))
    }

    /// Number of entries, tombstones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
