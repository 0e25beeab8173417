//! The class graph
//!
//! Owns every class descriptor, method table and object record. Lookup is
//! lazy: creating a class copies nothing from its ancestors, and a method
//! is found by walking the superclass chain at call time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytecode_system::{Value, VmError, VmResult};
use core_types::{ClassId, Symbol, SymbolTable, Visibility, VisibilityFilter};
use parking_lot::RwLock;
use tracing::debug;

use crate::descriptor::{ClassDescriptor, ClassKind};
use crate::heap::Heap;
use crate::method_entry::{MethodBody, MethodEntry};
use crate::method_table::{MethodTable, TableId};
use crate::version::StateVersion;
use crate::well_known::*;

/// Class/module graph plus the object heap
#[derive(Debug)]
pub struct ClassGraph {
    pub(crate) classes: Vec<ClassDescriptor>,
    pub(crate) tables: Vec<MethodTable>,
    pub(crate) heap: Heap,
    constants: HashMap<String, ClassId>,
    version: Arc<StateVersion>,
    symbols: Arc<RwLock<SymbolTable>>,
}

impl ClassGraph {
    /// Create a graph holding the core hierarchy.
    ///
    /// `BasicObject < Object < Module < Class`, the `Kernel` module
    /// included into `Object`, and the built-in value classes. Every class
    /// gets its metaclass eagerly.
    pub fn new(version: Arc<StateVersion>, symbols: Arc<RwLock<SymbolTable>>) -> Self {
        let mut graph = ClassGraph {
            classes: Vec::with_capacity(64),
            tables: Vec::with_capacity(64),
            heap: Heap::new(),
            constants: HashMap::new(),
            version,
            symbols,
        };

        graph.boot(ClassKind::Class, "BasicObject", None);
        graph.boot(ClassKind::Class, "Object", Some(BASIC_OBJECT));
        graph.boot(ClassKind::Class, "Module", Some(OBJECT));
        graph.boot(ClassKind::Class, "Class", Some(MODULE));
        graph.boot(ClassKind::Module, "Kernel", None);
        for name in [
            "NilClass",
            "TrueClass",
            "FalseClass",
            "Integer",
            "Symbol",
            "String",
            "Array",
            "Proc",
            "Exception",
        ] {
            graph.boot(ClassKind::Class, name, Some(OBJECT));
        }

        let booted: Vec<ClassId> = (0..graph.classes.len() as u32).map(ClassId::new).collect();
        for id in booted {
            if id == KERNEL {
                graph.desc_mut(id).klass = Some(MODULE);
            } else {
                graph.attach_metaclass(id);
            }
        }

        let proxy = graph.new_proxy(KERNEL, Some(BASIC_OBJECT));
        graph.desc_mut(OBJECT).superclass = Some(proxy);
        graph
    }

    fn boot(&mut self, kind: ClassKind, name: &str, superclass: Option<ClassId>) -> ClassId {
        let id = self.alloc(kind, Some(name.to_string()), superclass);
        self.constants.insert(name.to_string(), id);
        id
    }

    pub(crate) fn alloc(&mut self, kind: ClassKind, name: Option<String>, superclass: Option<ClassId>) -> ClassId {
        let table = TableId::new(self.tables.len() as u32);
        self.tables.push(MethodTable::new());
        let mut desc = ClassDescriptor::new(kind, name, table);
        desc.superclass = superclass;
        if kind == ClassKind::Module {
            desc.klass = Some(MODULE);
        }
        let id = ClassId::new(self.classes.len() as u32);
        self.classes.push(desc);
        id
    }

    pub(crate) fn new_proxy(&mut self, module: ClassId, superclass: Option<ClassId>) -> ClassId {
        let origin = self.desc(module).origin.unwrap_or(module);
        let table = self.desc(origin).table;
        let tainted = self.desc(origin).flags.tainted;
        let mut desc = ClassDescriptor::new(ClassKind::IncludeProxy, None, table);
        desc.superclass = superclass;
        desc.origin = Some(origin);
        desc.klass = Some(origin);
        desc.flags.anonymous = false;
        desc.flags.tainted = tainted;
        let id = ClassId::new(self.classes.len() as u32);
        self.classes.push(desc);
        id
    }

    /// Give class `id` its metaclass: a singleton attached to the class
    /// object whose superclass is the superclass's metaclass
    fn attach_metaclass(&mut self, id: ClassId) -> ClassId {
        let meta_super = match self.desc(id).superclass {
            Some(sup) => {
                let real = self.real_class(sup);
                self.desc(real).klass.unwrap_or(CLASS)
            }
            None => CLASS,
        };
        let meta = self.alloc(ClassKind::Singleton, None, Some(meta_super));
        {
            let desc = self.desc_mut(meta);
            desc.attached = Some(Value::Class(id));
            desc.klass = Some(CLASS);
            desc.flags.anonymous = false;
        }
        self.desc_mut(id).klass = Some(meta);
        meta
    }

    /// The shared state version
    pub fn version(&self) -> &Arc<StateVersion> {
        &self.version
    }

    /// The shared symbol table
    pub fn symbols(&self) -> &Arc<RwLock<SymbolTable>> {
        &self.symbols
    }

    /// Text of a symbol, for messages
    pub fn symbol_name(&self, mid: Symbol) -> String {
        self.symbols
            .read()
            .name(mid)
            .map(str::to_string)
            .unwrap_or_else(|| mid.to_string())
    }

    pub(crate) fn bump(&self, action: &str, class: ClassId, mid: Option<Symbol>) -> u64 {
        let version = self.version.advance();
        match mid {
            Some(mid) => debug!(
                target: "vm::graph",
                action,
                class = %self.name_of(class),
                method = %self.symbol_name(mid),
                version,
            ),
            None => debug!(target: "vm::graph", action, class = %self.name_of(class), version),
        }
        version
    }

    /// Descriptor for `id`.
    ///
    /// # Panics
    ///
    /// Panics when `id` was not issued by this graph.
    pub fn desc(&self, id: ClassId) -> &ClassDescriptor {
        &self.classes[id.index()]
    }

    pub(crate) fn desc_mut(&mut self, id: ClassId) -> &mut ClassDescriptor {
        &mut self.classes[id.index()]
    }

    /// Descriptor for `id`, if it exists
    pub fn get(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.classes.get(id.index())
    }

    /// Method table of node `id` (shared with the module for proxies)
    pub fn table(&self, id: ClassId) -> &MethodTable {
        &self.tables[self.desc(id).table.index()]
    }

    fn table_mut(&mut self, id: ClassId) -> &mut MethodTable {
        let tid = self.desc(id).table;
        &mut self.tables[tid.index()]
    }

    /// Number of descriptors, proxies and singletons included
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Always false once bootstrapped
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Object records
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Top-level class or module registered under `name`
    pub fn constant(&self, name: &str) -> Option<ClassId> {
        self.constants.get(name).copied()
    }

    /// Display name of a node
    pub fn name_of(&self, id: ClassId) -> String {
        let desc = self.desc(id);
        match desc.kind {
            ClassKind::IncludeProxy => desc.origin.map(|o| self.name_of(o)).unwrap_or_default(),
            ClassKind::Singleton => match &desc.attached {
                Some(Value::Class(c)) => format!("#<Class:{}>", self.name_of(*c)),
                Some(other) => format!("#<Class:{}>", self.describe(other)),
                None => "#<Class:?>".to_string(),
            },
            ClassKind::Module => desc
                .name
                .clone()
                .unwrap_or_else(|| format!("#<Module:{:#x}>", id.index())),
            ClassKind::Class => desc
                .name
                .clone()
                .unwrap_or_else(|| format!("#<Class:{:#x}>", id.index())),
        }
    }

    /// Short description of a value for error messages
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::True => "true".to_string(),
            Value::False => "false".to_string(),
            Value::Fixnum(n) => n.to_string(),
            Value::Symbol(s) => format!(":{}", self.symbol_name(*s)),
            Value::Class(c) => self.name_of(*c),
            Value::Object(_) => format!("#<{}>", self.name_of(self.real_class_of(value))),
            other => format!("#<{}>", self.name_of(self.real_class_of(other))),
        }
    }

    /// Receiver description in the classic `value:Class` form
    pub fn describe_receiver(&self, value: &Value) -> String {
        match value {
            Value::Object(_) => self.describe(value),
            Value::Class(c) => {
                let kind = if self.desc(*c).is_module() { "Module" } else { "Class" };
                format!("{}:{}", self.name_of(*c), kind)
            }
            _ => format!("{}:{}", self.describe(value), self.name_of(self.real_class_of(value))),
        }
    }

    /// Create a class.
    ///
    /// # Errors
    ///
    /// TypeError when `superclass` is not a class, is a singleton class, or
    /// is `Class` itself.
    pub fn create_class(&mut self, name: Option<&str>, superclass: Option<ClassId>) -> VmResult<ClassId> {
        let sup = superclass.unwrap_or(OBJECT);
        self.check_inheritable(sup)?;
        let id = self.alloc(ClassKind::Class, name.map(str::to_string), Some(sup));
        let tainted = self.desc(sup).flags.tainted;
        self.desc_mut(id).flags.tainted = tainted;
        self.attach_metaclass(id);
        self.bump("create_class", id, None);
        Ok(id)
    }

    fn check_inheritable(&self, sup: ClassId) -> VmResult<()> {
        let desc = self.desc(sup);
        match desc.kind {
            ClassKind::Singleton => Err(VmError::Type("can't make subclass of singleton class".into())),
            ClassKind::Class if sup == CLASS => Err(VmError::Type("can't make subclass of Class".into())),
            ClassKind::Class => Ok(()),
            _ => Err(VmError::Type(format!(
                "superclass must be a Class ({} given)",
                self.name_of(desc.klass.unwrap_or(MODULE))
            ))),
        }
    }

    /// Create or reopen the top-level class `name`
    pub fn define_class(&mut self, name: &str, superclass: Option<ClassId>) -> VmResult<ClassId> {
        if let Some(existing) = self.constant(name) {
            if self.desc(existing).kind != ClassKind::Class {
                return Err(VmError::Type(format!("{} is not a class", name)));
            }
            if let Some(sup) = superclass {
                if self.superclass(existing) != Some(sup) {
                    return Err(VmError::Name(format!("{} is already defined", name)));
                }
            }
            return Ok(existing);
        }
        let id = self.create_class(Some(name), superclass)?;
        self.constants.insert(name.to_string(), id);
        Ok(id)
    }

    /// Create a module
    pub fn create_module(&mut self, name: Option<&str>) -> ClassId {
        let id = self.alloc(ClassKind::Module, name.map(str::to_string), None);
        debug!(target: "vm::graph", action = "create_module", module = %self.name_of(id));
        id
    }

    /// Create or reopen the top-level module `name`
    pub fn define_module(&mut self, name: &str) -> VmResult<ClassId> {
        if let Some(existing) = self.constant(name) {
            if !self.desc(existing).is_module() {
                return Err(VmError::Type(format!("{} is not a module", name)));
            }
            return Ok(existing);
        }
        let id = self.create_module(Some(name));
        self.constants.insert(name.to_string(), id);
        Ok(id)
    }

    /// Class a value dispatches through; singleton classes included.
    ///
    /// Immediates resolve to their fixed class without touching the arena.
    pub fn class_of(&self, value: &Value) -> ClassId {
        match value {
            Value::Nil | Value::Undef => NIL_CLASS,
            Value::True => TRUE_CLASS,
            Value::False => FALSE_CLASS,
            Value::Fixnum(_) => INTEGER,
            Value::Symbol(_) => SYMBOL,
            Value::Str(_) => STRING,
            Value::Array(_) => ARRAY,
            Value::Proc(_) => PROC,
            Value::Exception(_) => EXCEPTION,
            Value::Object(id) => self.heap.get(*id).map(|r| r.klass).unwrap_or(OBJECT),
            Value::Class(id) => self.desc(*id).klass.unwrap_or(CLASS),
        }
    }

    /// First ordinary class at or above `id`, skipping singletons and proxies
    pub fn real_class(&self, id: ClassId) -> ClassId {
        let mut cur = id;
        loop {
            let desc = self.desc(cur);
            match (desc.kind, desc.superclass) {
                (ClassKind::Singleton | ClassKind::IncludeProxy, Some(sup)) => cur = sup,
                _ => return cur,
            }
        }
    }

    /// Class of a value ignoring singleton classes (`obj.class`)
    pub fn real_class_of(&self, value: &Value) -> ClassId {
        self.real_class(self.class_of(value))
    }

    /// Superclass, skipping include-proxies
    pub fn superclass(&self, id: ClassId) -> Option<ClassId> {
        let mut sup = self.desc(id).superclass;
        while let Some(s) = sup {
            if !self.desc(s).is_proxy() {
                return Some(s);
            }
            sup = self.desc(s).superclass;
        }
        None
    }

    /// Whether `value` is an instance of `class` or of a descendant; an
    /// included module counts through its proxy
    pub fn kind_of(&self, value: &Value, class: ClassId) -> bool {
        self.is_descendant(self.class_of(value), class)
    }

    /// Whether `class` appears in the chain starting at `start`
    pub fn is_descendant(&self, start: ClassId, class: ClassId) -> bool {
        self.chain(start)
            .any(|node| node == class || self.desc(node).origin == Some(class))
    }

    /// First entry for `mid` on the chain from `start`, tombstones included
    pub fn lookup_entry(&self, start: ClassId, mid: Symbol) -> Option<Arc<MethodEntry>> {
        self.chain(start).find_map(|node| self.table(node).get(mid).cloned())
    }

    /// Method `mid` as seen from `start`; a tombstone reads as absent
    pub fn lookup(&self, start: ClassId, mid: Symbol) -> Option<Arc<MethodEntry>> {
        self.lookup_entry(start, mid).filter(|e| !e.is_undefined())
    }

    /// Method `mid` above `owner` in the chain of `class`.
    ///
    /// `owner` is located by table identity, so a module's method finds the
    /// module's proxy in the receiver's chain.
    pub fn lookup_super(&self, class: ClassId, owner: ClassId, mid: Symbol) -> Option<Arc<MethodEntry>> {
        let owner_table = self.desc(owner).table;
        let node = self.chain(class).find(|n| self.desc(*n).table == owner_table)?;
        let above = self.desc(node).superclass?;
        self.lookup(above, mid)
    }

    /// Whether a live entry for `mid` is visible from `class`
    pub fn method_defined(&self, class: ClassId, mid: Symbol) -> bool {
        self.lookup(class, mid).is_some()
    }

    fn lookup_for_update(&self, class: ClassId, mid: Symbol) -> Option<Arc<MethodEntry>> {
        self.lookup(class, mid).or_else(|| {
            if self.desc(class).is_module() {
                self.lookup(OBJECT, mid)
            } else {
                None
            }
        })
    }

    fn kind_name(&self, class: ClassId) -> &'static str {
        if self.desc(class).is_module() {
            "module"
        } else {
            "class"
        }
    }

    fn undefined_method(&self, class: ClassId, mid: Symbol) -> VmError {
        VmError::Name(format!(
            "undefined method `{}' for {} `{}'",
            self.symbol_name(mid),
            self.kind_name(class),
            self.name_of(class)
        ))
    }

    /// Reject mutation of a frozen class, or of an untainted class at
    /// trust level 4 and above
    pub fn check_modifiable(&self, class: ClassId, safe_level: u8) -> VmResult<()> {
        let desc = self.desc(class);
        if safe_level >= 4 && !desc.flags.tainted {
            return Err(VmError::Security(format!(
                "Insecure: can't modify {}",
                self.kind_name(class)
            )));
        }
        if desc.flags.frozen {
            let what = match desc.kind {
                ClassKind::Singleton => "object",
                ClassKind::Module => "module",
                _ => "class",
            };
            return Err(VmError::Frozen(format!("can't modify frozen {}", what)));
        }
        Ok(())
    }

    /// Define `mid` on `class` at trust level 0
    pub fn define_method(
        &mut self,
        class: ClassId,
        mid: Symbol,
        body: MethodBody,
        visibility: Visibility,
    ) -> VmResult<()> {
        self.define_method_at(class, mid, body, visibility, 0)
    }

    /// Define `mid` on `class`, recording the caller's trust level.
    ///
    /// `initialize` and `initialize_copy` are always private.
    ///
    /// # Errors
    ///
    /// FrozenError for a frozen class, SecurityError at level 4 and above
    /// on an untainted class.
    pub fn define_method_at(
        &mut self,
        class: ClassId,
        mid: Symbol,
        body: MethodBody,
        visibility: Visibility,
        safe_level: u8,
    ) -> VmResult<()> {
        self.check_modifiable(class, safe_level)?;
        let visibility = if mid == Symbol::INITIALIZE || mid == Symbol::INITIALIZE_COPY {
            Visibility::Private
        } else {
            visibility
        };
        let entry = if visibility.is_undefined() {
            MethodEntry::tombstone(class)
        } else {
            MethodEntry::new(body, visibility, class).with_safe_level(safe_level)
        };
        self.table_mut(class).insert(mid, entry);
        self.bump("define_method", class, Some(mid));
        Ok(())
    }

    /// Private instance method plus public singleton method
    pub fn define_module_function(&mut self, module: ClassId, mid: Symbol, body: MethodBody) -> VmResult<()> {
        self.define_method(module, mid, body.clone(), Visibility::Private)?;
        let singleton = self.singleton_class_of(&Value::Class(module))?;
        self.define_method(singleton, mid, body, Visibility::Public)
    }

    /// Install a tombstone for `mid` on `class`.
    ///
    /// # Errors
    ///
    /// NameError when `mid` is not defined anywhere `class` can see.
    pub fn undef_method(&mut self, class: ClassId, mid: Symbol) -> VmResult<()> {
        self.check_modifiable(class, 0)?;
        if self.lookup_for_update(class, mid).is_none() {
            return Err(self.undefined_method(class, mid));
        }
        self.table_mut(class).insert(mid, MethodEntry::tombstone(class));
        self.bump("undef_method", class, Some(mid));
        Ok(())
    }

    /// Delete `mid` from `class`'s own table
    pub fn remove_method(&mut self, class: ClassId, mid: Symbol) -> VmResult<()> {
        self.check_modifiable(class, 0)?;
        let own = self.table(class).get(mid).is_some_and(|e| !e.is_undefined());
        if !own {
            return Err(VmError::Name(format!(
                "method `{}' not defined in {}",
                self.symbol_name(mid),
                self.name_of(class)
            )));
        }
        self.table_mut(class).remove(mid);
        self.bump("remove_method", class, Some(mid));
        Ok(())
    }

    /// Copy the entry `old` resolves to under the name `new`.
    ///
    /// A super-forward entry is followed to the body it forwards to; the
    /// copy keeps the original owner.
    pub fn alias_method(&mut self, class: ClassId, new: Symbol, old: Symbol) -> VmResult<()> {
        self.check_modifiable(class, 0)?;
        let found = self
            .lookup_for_update(class, old)
            .ok_or_else(|| self.undefined_method(class, old))?;
        let resolved = match found.body {
            Some(MethodBody::SuperForward) => self
                .lookup_super(class, found.owner, old)
                .ok_or_else(|| self.undefined_method(class, old))?,
            _ => found.clone(),
        };
        let body = resolved
            .body
            .clone()
            .ok_or_else(|| self.undefined_method(class, old))?;
        let entry = MethodEntry::new(body, found.visibility, resolved.owner).with_safe_level(resolved.safe_level);
        self.table_mut(class).insert(new, entry);
        self.bump("alias_method", class, Some(new));
        Ok(())
    }

    /// Change the visibility of `mid` as seen from `class`.
    ///
    /// An own entry is updated in place; an inherited one gets a
    /// super-forward entry carrying the new visibility.
    pub fn set_visibility(&mut self, class: ClassId, mid: Symbol, visibility: Visibility) -> VmResult<()> {
        self.check_modifiable(class, 0)?;
        let found = self
            .lookup_for_update(class, mid)
            .ok_or_else(|| self.undefined_method(class, mid))?;
        if found.visibility == visibility {
            return Ok(());
        }
        let own = self.table(class).get(mid).cloned();
        let entry = match own {
            Some(own) if !own.is_undefined() => MethodEntry {
                visibility,
                ..(*own).clone()
            },
            _ => MethodEntry::new(MethodBody::SuperForward, visibility, class),
        };
        self.table_mut(class).insert(mid, entry);
        self.bump("set_visibility", class, Some(mid));
        Ok(())
    }

    /// Install attribute accessors for `ivar`
    pub fn define_attr(
        &mut self,
        class: ClassId,
        ivar: Symbol,
        reader: Option<Symbol>,
        writer: Option<Symbol>,
        visibility: Visibility,
    ) -> VmResult<()> {
        if let Some(mid) = reader {
            self.define_method(class, mid, MethodBody::AttrReader(ivar), visibility)?;
        }
        if let Some(mid) = writer {
            self.define_method(class, mid, MethodBody::AttrWriter(ivar), visibility)?;
        }
        Ok(())
    }

    /// Names of instance methods visible on `class` that pass `filter`.
    ///
    /// The nearest entry for each name decides its visibility, so a
    /// tombstone or a narrower redefinition hides an ancestor's entry.
    /// Without `recursive`, only `class`'s own table is read.
    pub fn instance_methods(&self, class: ClassId, recursive: bool, filter: VisibilityFilter) -> Vec<Symbol> {
        let mut seen: HashMap<Symbol, Visibility> = HashMap::new();
        let mut order = Vec::new();
        for node in self.chain(class) {
            for (mid, entry) in self.table(node).iter() {
                if !seen.contains_key(&mid) {
                    seen.insert(mid, entry.visibility);
                    order.push(mid);
                }
            }
            let desc = self.desc(node);
            if desc.is_proxy() || desc.is_singleton() {
                continue;
            }
            if !recursive {
                break;
            }
        }
        order
            .into_iter()
            .filter(|mid| seen.get(mid).is_some_and(|v| filter.accepts(*v)))
            .collect()
    }

    /// Allocate an instance of `class`
    pub fn allocate(&mut self, class: ClassId) -> VmResult<Value> {
        let desc = self.desc(class);
        match desc.kind {
            ClassKind::Class => {}
            ClassKind::Singleton => return Err(VmError::Type("can't create instance of singleton class".into())),
            _ => {
                return Err(VmError::Type(format!(
                    "wrong argument type {} (expected Class)",
                    self.name_of(desc.klass.unwrap_or(MODULE))
                )))
            }
        }
        if [NIL_CLASS, TRUE_CLASS, FALSE_CLASS, INTEGER, SYMBOL, PROC, CLASS, MODULE].contains(&class) {
            return Err(VmError::Type(format!("allocator undefined for {}", self.name_of(class))));
        }
        let tainted = desc.flags.tainted;
        let id = self.heap.allocate(class);
        if let Some(record) = self.heap.get_mut(id) {
            record.tainted = tainted;
        }
        Ok(Value::Object(id))
    }

    /// Instance variable of an object or class; nil when unset
    pub fn ivar_get(&self, value: &Value, ivar: Symbol) -> Value {
        let found = match value {
            Value::Object(id) => self.heap.get(*id).and_then(|r| r.ivars.get(&ivar)),
            Value::Class(id) => self.desc(*id).ivars.get(&ivar),
            _ => None,
        };
        found.cloned().unwrap_or(Value::Nil)
    }

    /// Set an instance variable of an object or class
    pub fn ivar_set(&mut self, value: &Value, ivar: Symbol, v: Value) -> VmResult<()> {
        if self.is_frozen(value) {
            return Err(VmError::Frozen(format!(
                "can't modify frozen {}",
                self.name_of(self.real_class_of(value))
            )));
        }
        match value {
            Value::Object(id) => {
                if let Some(record) = self.heap.get_mut(*id) {
                    record.ivars.insert(ivar, v);
                }
                Ok(())
            }
            Value::Class(id) => {
                self.desc_mut(*id).ivars.insert(ivar, v);
                Ok(())
            }
            other => Err(VmError::Runtime(format!(
                "can't modify instance variable of {}",
                self.describe(other)
            ))),
        }
    }

    /// Freeze an object or class; other values are unaffected
    pub fn freeze(&mut self, value: &Value) {
        match value {
            Value::Object(id) => {
                if let Some(record) = self.heap.get_mut(*id) {
                    record.frozen = true;
                }
            }
            Value::Class(id) => self.desc_mut(*id).flags.frozen = true,
            _ => {}
        }
    }

    /// Whether a value is frozen; immediates are always frozen
    pub fn is_frozen(&self, value: &Value) -> bool {
        match value {
            Value::Object(id) => self.heap.get(*id).is_some_and(|r| r.frozen),
            Value::Class(id) => self.desc(*id).flags.frozen,
            Value::Str(_) | Value::Array(_) | Value::Proc(_) | Value::Exception(_) => false,
            _ => true,
        }
    }

    /// Mark an object or class as tainted
    pub fn taint(&mut self, value: &Value) {
        match value {
            Value::Object(id) => {
                if let Some(record) = self.heap.get_mut(*id) {
                    record.tainted = true;
                }
            }
            Value::Class(id) => self.desc_mut(*id).flags.tainted = true,
            _ => {}
        }
    }

    /// Whether a value is tainted
    pub fn is_tainted(&self, value: &Value) -> bool {
        match value {
            Value::Object(id) => self.heap.get(*id).is_some_and(|r| r.tainted),
            Value::Class(id) => self.desc(*id).flags.tainted,
            _ => false,
        }
    }

    /// Flag `class` as belonging to an external object system
    pub fn mark_foreign(&mut self, class: ClassId) {
        self.desc_mut(class).flags.foreign = true;
    }

    /// Whether dispatch on `class` may consult the foreign bridge
    pub fn is_foreign(&self, class: ClassId) -> bool {
        self.chain(class).any(|node| self.desc(node).flags.foreign)
    }

    pub(crate) fn collect_symbols<'a>(
        &'a self,
        nodes: impl Iterator<Item = ClassId> + 'a,
        filter: VisibilityFilter,
    ) -> Vec<Symbol> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for node in nodes {
            for (mid, entry) in self.table(node).iter() {
                if seen.insert(mid) && filter.accepts(entry.visibility) {
                    out.push(mid);
                }
            }
        }
        out
    }
}
