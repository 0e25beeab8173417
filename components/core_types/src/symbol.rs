//! Interned method and variable names.
//!
//! Symbols are small copyable handles; the owning [`SymbolTable`] maps
//! them back to their text. A fixed set of well-known names is seeded at
//! construction so the dispatcher can refer to them without a lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An interned name.
///
/// Two symbols are equal exactly when they were interned from the same
/// text in the same [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// `method_missing`, the reserved fallback handler
    pub const METHOD_MISSING: Symbol = Symbol(0);
    /// `initialize`, always defined private
    pub const INITIALIZE: Symbol = Symbol(1);
    /// `initialize_copy`, always defined private
    pub const INITIALIZE_COPY: Symbol = Symbol(2);
    /// `send`
    pub const SEND: Symbol = Symbol(3);
    /// `__send__`
    pub const UNDERSCORE_SEND: Symbol = Symbol(4);
    /// `to_proc`, used to coerce explicit block arguments
    pub const TO_PROC: Symbol = Symbol(5);
    /// `call`
    pub const CALL: Symbol = Symbol(6);
    /// `==`
    pub const EQ: Symbol = Symbol(7);
    /// `each`
    pub const EACH: Symbol = Symbol(8);
    /// `respond_to?`
    pub const RESPOND_TO: Symbol = Symbol(9);

    /// Create a symbol from its raw table index
    pub const fn from_raw(raw: u32) -> Self {
        Symbol(raw)
    }

    /// Raw table index of this symbol
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":#{}", self.0)
    }
}

const WELL_KNOWN: [&str; 10] = [
    "method_missing",
    "initialize",
    "initialize_copy",
    "send",
    "__send__",
    "to_proc",
    "call",
    "==",
    "each",
    "respond_to?",
];

/// Bidirectional map between names and [`Symbol`]s.
///
/// # Example
///
/// ```
/// use core_types::SymbolTable;
///
/// let mut table = SymbolTable::new();
/// let sym = table.intern("greet");
/// assert_eq!(table.name(sym), Some("greet"));
/// assert_eq!(table.lookup("missing"), None);
/// ```
#[derive(Debug, Clone)]
pub struct SymbolTable {
    names: Vec<Arc<str>>,
    index: HashMap<Arc<str>, Symbol>,
}

impl SymbolTable {
    /// Create a table pre-seeded with the well-known symbols
    pub fn new() -> Self {
        let mut table = SymbolTable {
            names: Vec::with_capacity(256),
            index: HashMap::with_capacity(256),
        };
        for name in WELL_KNOWN {
            table.intern(name);
        }
        table
    }

    /// Intern `name`, returning the existing symbol if already present
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(sym) = self.index.get(name) {
            return *sym;
        }
        let sym = Symbol(self.names.len() as u32);
        let text: Arc<str> = Arc::from(name);
        self.names.push(text.clone());
        self.index.insert(text, sym);
        sym
    }

    /// Find the symbol for `name` without interning it
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.index.get(name).copied()
    }

    /// Text of `sym`, if it belongs to this table
    pub fn name(&self, sym: Symbol) -> Option<&str> {
        self.names.get(sym.0 as usize).map(|s| s.as_ref())
    }

    /// Number of interned symbols
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing has been interned (never the case after `new`)
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
