//! Module inclusion
//!
//! Including a module splices an include-proxy sharing the module's
//! method table directly above the includer, followed by proxies for
//! whatever the module itself includes. A module already anywhere in the
//! includer's chain is not inserted again.

use bytecode_system::{Value, VmError, VmResult};
use core_types::ClassId;

use crate::class_graph::ClassGraph;

impl ClassGraph {
    /// Include `module` into `class` at trust level 0
    pub fn include_module(&mut self, class: ClassId, module: ClassId) -> VmResult<()> {
        self.include_module_at(class, module, 0)
    }

    /// Include `module` into `class`.
    ///
    /// # Errors
    ///
    /// - TypeError when `module` is not a module
    /// - [`VmError::CyclicInclude`] when `class` already appears in
    ///   `module`'s chain; the graph is left untouched
    /// - FrozenError / SecurityError as for method definition
    pub fn include_module_at(&mut self, class: ClassId, module: ClassId, safe_level: u8) -> VmResult<()> {
        if !self.desc(module).is_module() {
            let kind = self.class_of(&Value::Class(module));
            return Err(VmError::Type(format!(
                "wrong argument type {} (expected Module)",
                self.name_of(self.real_class(kind))
            )));
        }
        self.check_modifiable(class, safe_level)?;

        let class_table = self.desc(class).table;
        let incoming: Vec<ClassId> = self.chain(module).collect();
        if incoming.iter().any(|node| self.desc(*node).table == class_table) {
            return Err(VmError::CyclicInclude);
        }
        if self.desc(module).flags.tainted {
            self.desc_mut(class).flags.tainted = true;
        }

        let mut insertion = class;
        let mut changed = false;
        for node in incoming {
            let table = self.desc(node).table;
            let mut superclass_seen = false;
            let mut present = None;
            let mut p = self.desc(class).superclass;
            while let Some(cur) = p {
                let desc = self.desc(cur);
                if desc.is_proxy() {
                    if desc.table == table {
                        present = Some((cur, superclass_seen));
                        break;
                    }
                } else {
                    superclass_seen = true;
                }
                p = desc.superclass;
            }
            if let Some((existing, above_superclass)) = present {
                if !above_superclass {
                    insertion = existing;
                }
                continue;
            }
            let above = self.desc(insertion).superclass;
            let proxy = self.new_proxy(node, above);
            self.desc_mut(insertion).superclass = Some(proxy);
            insertion = proxy;
            changed = true;
        }

        if changed {
            self.bump("include_module", class, None);
        }
        Ok(())
    }

    /// Modules in `class`'s chain, nearest first
    pub fn included_modules(&self, class: ClassId) -> Vec<ClassId> {
        self.chain(class)
            .filter_map(|node| {
                let desc = self.desc(node);
                if desc.is_proxy() {
                    desc.origin
                } else {
                    None
                }
            })
            .collect()
    }

    /// Whether `module` is included anywhere in `class`'s chain
    pub fn include_p(&self, class: ClassId, module: ClassId) -> bool {
        self.desc(module).is_module() && self.included_modules(class).contains(&module)
    }
}
