//! Process-wide runtime state
//!
//! A [`Runtime`] owns everything execution contexts share: the class graph
//! (behind a single `RwLock`, so every table mutation, include splice and
//! singleton creation has exactly one writer), the state version, the
//! symbol table and the optional foreign bridge. It is created once,
//! shared as `Arc<Runtime>`, and torn down when the last context drops it.

use std::sync::Arc;

use bytecode_system::{Iseq, Value, VmError, VmResult};
use core_types::{ClassId, Symbol, SymbolTable, Visibility, VisibilityFilter, VmConfig};
use object_model::well_known::OBJECT;
use object_model::{Arity, ClassGraph, MethodBody, NativeFn, NativeMethod, StateVersion};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bridge::ForeignBridge;
use crate::kernel;
use crate::vm::Vm;

/// Shared state of all execution contexts
pub struct Runtime {
    graph: RwLock<ClassGraph>,
    version: Arc<StateVersion>,
    symbols: Arc<RwLock<SymbolTable>>,
    config: VmConfig,
    bridge: RwLock<Option<Arc<dyn ForeignBridge>>>,
    main: Value,
}

impl Runtime {
    /// Create a runtime with the default configuration
    ///
    /// # Example
    ///
    /// ```
    /// use interpreter::Runtime;
    ///
    /// let runtime = Runtime::new().unwrap();
    /// let a = runtime.create_class(Some("A"), None).unwrap();
    /// assert_eq!(runtime.graph().name_of(a), "A");
    /// ```
    pub fn new() -> VmResult<Arc<Self>> {
        Self::with_config(VmConfig::default())
    }

    /// Create a runtime with an explicit configuration.
    ///
    /// Boots the class graph and installs the kernel natives.
    ///
    /// # Errors
    ///
    /// [`VmError::Argument`] when the configuration does not validate.
    pub fn with_config(config: VmConfig) -> VmResult<Arc<Self>> {
        config.validate().map_err(VmError::Argument)?;
        let version = Arc::new(StateVersion::new());
        let symbols = Arc::new(RwLock::new(SymbolTable::new()));
        let mut graph = ClassGraph::new(version.clone(), symbols.clone());
        kernel::install(&mut graph)?;
        let main = graph.allocate(OBJECT)?;
        Ok(Arc::new(Self {
            graph: RwLock::new(graph),
            version,
            symbols,
            config,
            bridge: RwLock::new(None),
            main,
        }))
    }

    /// New execution context on this runtime
    pub fn context(self: &Arc<Self>) -> Vm {
        Vm::new(self.clone())
    }

    /// Configuration the runtime was built with
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Read access to the class graph
    pub fn graph(&self) -> RwLockReadGuard<'_, ClassGraph> {
        self.graph.read()
    }

    /// Exclusive access to the class graph
    pub fn graph_mut(&self) -> RwLockWriteGuard<'_, ClassGraph> {
        self.graph.write()
    }

    /// Current state version
    pub fn version(&self) -> u64 {
        self.version.current()
    }

    /// Intern a name
    pub fn intern(&self, name: &str) -> Symbol {
        if let Some(sym) = self.symbols.read().lookup(name) {
            return sym;
        }
        self.symbols.write().intern(name)
    }

    /// Text of a symbol
    pub fn symbol_name(&self, sym: Symbol) -> String {
        self.symbols
            .read()
            .name(sym)
            .map(str::to_string)
            .unwrap_or_else(|| sym.to_string())
    }

    /// The top-level receiver
    pub fn main_object(&self) -> Value {
        self.main.clone()
    }

    /// Install the foreign-object bridge
    pub fn set_bridge(&self, bridge: Arc<dyn ForeignBridge>) {
        *self.bridge.write() = Some(bridge);
    }

    pub(crate) fn bridge(&self) -> Option<Arc<dyn ForeignBridge>> {
        self.bridge.read().clone()
    }

    /// Create a class; `superclass` defaults to `Object`
    pub fn create_class(&self, name: Option<&str>, superclass: Option<ClassId>) -> VmResult<ClassId> {
        self.graph_mut().create_class(name, superclass)
    }

    /// Create or reopen a named top-level class
    pub fn define_class(&self, name: &str, superclass: Option<ClassId>) -> VmResult<ClassId> {
        self.graph_mut().define_class(name, superclass)
    }

    /// Create a module
    pub fn create_module(&self, name: Option<&str>) -> ClassId {
        self.graph_mut().create_module(name)
    }

    /// Create or reopen a named top-level module
    pub fn define_module(&self, name: &str) -> VmResult<ClassId> {
        self.graph_mut().define_module(name)
    }

    /// Define `mid` on `class`
    pub fn define_method(&self, class: ClassId, mid: Symbol, body: MethodBody, visibility: Visibility) -> VmResult<()> {
        self.graph_mut().define_method(class, mid, body, visibility)
    }

    /// Define an interpreted method named `name`
    pub fn define_iseq(&self, class: ClassId, name: &str, iseq: Arc<Iseq>, visibility: Visibility) -> VmResult<()> {
        let mid = self.intern(name);
        self.define_method(class, mid, MethodBody::Interpreted(iseq), visibility)
    }

    /// Define a native method named `name`
    ///
    /// # Errors
    ///
    /// "too many arguments(N)" for a fixed arity above 15, plus the usual
    /// definition errors.
    pub fn define_native(
        &self,
        class: ClassId,
        name: &'static str,
        arity: Arity,
        func: NativeFn,
        visibility: Visibility,
    ) -> VmResult<()> {
        let native = NativeMethod::new(name, arity, func)?;
        let mid = self.intern(name);
        self.define_method(class, mid, MethodBody::Native(native), visibility)
    }

    /// Undefine `mid` on `class`
    pub fn undef_method(&self, class: ClassId, mid: Symbol) -> VmResult<()> {
        self.graph_mut().undef_method(class, mid)
    }

    /// Alias `old` as `new` on `class`
    pub fn alias_method(&self, class: ClassId, new: Symbol, old: Symbol) -> VmResult<()> {
        self.graph_mut().alias_method(class, new, old)
    }

    /// Include `module` into `class`
    pub fn include_module(&self, class: ClassId, module: ClassId) -> VmResult<()> {
        self.graph_mut().include_module(class, module)
    }

    /// Singleton class of `value`, created on first use
    pub fn singleton_class_of(&self, value: &Value) -> VmResult<ClassId> {
        self.graph_mut().singleton_class_of(value)
    }

    /// Ancestors of `class`, nearest first, collected into a snapshot.
    ///
    /// Callers that want the lazy [`object_model::Ancestors`] iterator
    /// should hold [`Runtime::graph`] and walk it there; the walk is only
    /// consistent while that read guard is held.
    ///
    /// ```
    /// use interpreter::Runtime;
    /// use object_model::well_known::{KERNEL, OBJECT};
    ///
    /// let runtime = Runtime::new().unwrap();
    /// let graph = runtime.graph();
    /// let nearest: Vec<_> = graph.ancestors(OBJECT).take(2).collect();
    /// assert_eq!(nearest, [OBJECT, KERNEL]);
    /// ```
    pub fn ancestors(&self, class: ClassId) -> Vec<ClassId> {
        self.graph().ancestors(class).collect()
    }

    /// Instance method names of `class` passing `filter`
    pub fn instance_methods(&self, class: ClassId, recursive: bool, filter: VisibilityFilter) -> Vec<Symbol> {
        self.graph().instance_methods(class, recursive, filter)
    }

    /// Allocate an instance of `class`
    pub fn allocate(&self, class: ClassId) -> VmResult<Value> {
        self.graph_mut().allocate(class)
    }
}
