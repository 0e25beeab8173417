//! Ancestor iteration
//!
//! [`SuperChain`] walks raw chain nodes the way lookup does: singletons,
//! proxies and all. [`Ancestors`] is the user-facing linearization, which
//! reports a proxy as the module it stands in for and omits singleton
//! classes.

use core_types::ClassId;

use crate::class_graph::ClassGraph;

/// Raw walk over `superclass` links, starting node included
#[derive(Debug, Clone)]
pub struct SuperChain<'g> {
    graph: &'g ClassGraph,
    next: Option<ClassId>,
}

impl<'g> Iterator for SuperChain<'g> {
    type Item = ClassId;

    fn next(&mut self) -> Option<ClassId> {
        let cur = self.next?;
        self.next = self.graph.desc(cur).superclass;
        Some(cur)
    }
}

/// Linearized ancestors as reported to users
#[derive(Debug, Clone)]
pub struct Ancestors<'g> {
    chain: SuperChain<'g>,
}

impl<'g> Iterator for Ancestors<'g> {
    type Item = ClassId;

    fn next(&mut self) -> Option<ClassId> {
        loop {
            let node = self.chain.next()?;
            let desc = self.chain.graph.desc(node);
            if desc.is_singleton() {
                continue;
            }
            return Some(desc.reported_id(node));
        }
    }
}

impl ClassGraph {
    /// Raw lookup chain from `start`
    pub fn chain(&self, start: ClassId) -> SuperChain<'_> {
        SuperChain {
            graph: self,
            next: Some(start),
        }
    }

    /// User-facing ancestors of `start`.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use core_types::SymbolTable;
    /// use object_model::{well_known, ClassGraph, StateVersion};
    /// use parking_lot::RwLock;
    ///
    /// let symbols = Arc::new(RwLock::new(SymbolTable::new()));
    /// let graph = ClassGraph::new(Arc::new(StateVersion::new()), symbols);
    /// let names: Vec<String> = graph
    ///     .ancestors(well_known::OBJECT)
    ///     .map(|c| graph.name_of(c))
    ///     .collect();
    /// assert_eq!(names, ["Object", "Kernel", "BasicObject"]);
    /// ```
    pub fn ancestors(&self, start: ClassId) -> Ancestors<'_> {
        Ancestors {
            chain: self.chain(start),
        }
    }
}
