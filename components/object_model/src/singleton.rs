//! Singleton classes
//!
//! A singleton class is spliced between an object and its class the first
//! time something is defined on the object alone. Class objects already
//! have theirs (metaclasses are created eagerly).

use bytecode_system::{Value, VmError, VmResult};
use core_types::{ClassId, Symbol, VisibilityFilter};

use crate::class_graph::ClassGraph;
use crate::descriptor::ClassKind;
use crate::well_known::*;

impl ClassGraph {
    /// Singleton class of `value`, created on first use.
    ///
    /// `nil`, `true` and `false` share their fixed classes.
    ///
    /// # Errors
    ///
    /// TypeError for integers, symbols and the other immediate kinds.
    pub fn singleton_class_of(&mut self, value: &Value) -> VmResult<ClassId> {
        match value {
            Value::Nil => return Ok(NIL_CLASS),
            Value::True => return Ok(TRUE_CLASS),
            Value::False => return Ok(FALSE_CLASS),
            Value::Object(_) | Value::Class(_) => {}
            _ => return Err(VmError::Type("can't define singleton".into())),
        }

        let klass = self.class_of(value);
        let existing = self.desc(klass);
        if existing.is_singleton() && existing.attached.as_ref().is_some_and(|a| a.identical(value)) {
            return Ok(klass);
        }

        let real_super = self.real_class(klass);
        let meta_klass = self.desc(real_super).klass.unwrap_or(CLASS);
        let single = self.alloc(ClassKind::Singleton, None, Some(klass));
        let (frozen, tainted) = (self.is_frozen(value), self.is_tainted(value));
        {
            let desc = self.desc_mut(single);
            desc.attached = Some(value.clone());
            desc.klass = Some(meta_klass);
            desc.flags.anonymous = false;
            desc.flags.frozen = frozen;
            desc.flags.tainted = tainted;
        }

        match value {
            Value::Object(id) => {
                if let Some(record) = self.heap.get_mut(*id) {
                    record.klass = single;
                }
            }
            Value::Class(id) => self.desc_mut(*id).klass = Some(single),
            _ => {}
        }
        self.bump("singleton_class", single, None);
        Ok(single)
    }

    /// Singleton class of `value` if one is attached, without creating it
    pub fn existing_singleton(&self, value: &Value) -> Option<ClassId> {
        let klass = self.class_of(value);
        let desc = self.desc(klass);
        (desc.is_singleton() && desc.attached.as_ref().is_some_and(|a| a.identical(value))).then_some(klass)
    }

    /// Public and protected methods defined on `value` alone.
    ///
    /// With `recursive`, modules included into the singleton class are
    /// searched too, and for a class object so are the singleton classes
    /// of its superclasses.
    pub fn singleton_methods(&self, value: &Value, recursive: bool) -> Vec<Symbol> {
        let Some(start) = self.existing_singleton(value) else {
            return Vec::new();
        };
        let graph = self;
        let nodes = self.chain(start).take_while(move |node| {
            let desc = graph.desc(*node);
            desc.is_singleton() || (recursive && desc.is_proxy())
        });
        let nodes: Vec<ClassId> = if recursive {
            nodes.collect()
        } else {
            nodes.take(1).collect()
        };
        self.collect_symbols(nodes.into_iter(), VisibilityFilter::NonPrivate)
    }
}
