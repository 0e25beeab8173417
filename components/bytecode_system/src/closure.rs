//! Closure data: environments, blocks and procs
//!
//! Every frame owns an [`Env`] holding its locals. Environments are
//! reference counted so a block can keep its defining scope alive after
//! that frame is popped; the environment's [`EnvId`] is the stable
//! identity used to find the target frame of a non-local transfer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use core_types::{ClassId, Symbol};
use parking_lot::Mutex;

use crate::error::VmResult;
use crate::iseq::Iseq;
use crate::value::Value;

static NEXT_ENV_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one activation's scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(u64);

impl EnvId {
    fn next() -> Self {
        EnvId(NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Locals of one scope plus a link to the lexically enclosing scope
pub struct Env {
    id: EnvId,
    locals: Mutex<Vec<Value>>,
    parent: Option<Arc<Env>>,
}

impl Env {
    /// Create a scope with `size` nil-initialised locals
    pub fn new(size: usize, parent: Option<Arc<Env>>) -> Arc<Self> {
        Arc::new(Env {
            id: EnvId::next(),
            locals: Mutex::new(vec![Value::Nil; size]),
            parent,
        })
    }

    /// Create a scope whose leading locals are `values`
    pub fn with_values(mut values: Vec<Value>, size: usize, parent: Option<Arc<Env>>) -> Arc<Self> {
        if values.len() < size {
            values.resize(size, Value::Nil);
        }
        Arc::new(Env {
            id: EnvId::next(),
            locals: Mutex::new(values),
            parent,
        })
    }

    /// Identity of this scope
    pub fn id(&self) -> EnvId {
        self.id
    }

    /// Enclosing scope
    pub fn parent(&self) -> Option<&Arc<Env>> {
        self.parent.as_ref()
    }

    /// The scope `level` links out (0 is this scope)
    pub fn ancestor(self: &Arc<Self>, level: usize) -> Option<Arc<Env>> {
        let mut env = self.clone();
        for _ in 0..level {
            env = env.parent.clone()?;
        }
        Some(env)
    }

    /// True when `id` is this scope or any enclosing one
    pub fn encloses(&self, id: EnvId) -> bool {
        let mut env = Some(self);
        while let Some(e) = env {
            if e.id == id {
                return true;
            }
            env = e.parent.as_deref();
        }
        false
    }

    /// Read a local; out-of-range slots read as nil
    pub fn get(&self, index: usize) -> Value {
        self.locals.lock().get(index).cloned().unwrap_or(Value::Nil)
    }

    /// Write a local, growing the scope if needed
    pub fn set(&self, index: usize, value: Value) {
        let mut locals = self.locals.lock();
        if index >= locals.len() {
            locals.resize(index + 1, Value::Nil);
        }
        locals[index] = value;
    }

    /// Number of local slots
    pub fn len(&self) -> usize {
        self.locals.lock().len()
    }

    /// True when the scope has no locals
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Env {
    // Locals may hold procs capturing this very scope
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .finish()
    }
}

/// Method identity a frame runs under; `super` resolves from here
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodContext {
    /// Class or module whose table holds the running method
    pub owner: ClassId,
    /// Name the method was called by
    pub mid: Symbol,
}

/// A Rust closure standing in for a block body
///
/// Plain native blocks receive the first yielded value (or nil); lambda
/// native blocks receive all yielded values packed in an array.
pub type NativeBlockFn = Arc<dyn Fn(Value) -> VmResult<Value> + Send + Sync>;

/// Code a block runs
#[derive(Clone)]
pub enum BlockCode {
    /// An instruction sequence
    Iseq(Arc<Iseq>),
    /// A Rust closure
    Native(NativeBlockFn),
}

impl fmt::Debug for BlockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockCode::Iseq(iseq) => write!(f, "Iseq({})", iseq.name),
            BlockCode::Native(_) => write!(f, "Native"),
        }
    }
}

/// A block captured at a call site
#[derive(Debug, Clone)]
pub struct Block {
    /// Body
    pub code: BlockCode,
    /// Receiver the body runs with
    pub self_value: Value,
    /// Defining scope; the block's own scope links here
    pub env: Option<Arc<Env>>,
    /// Scope identity of the method (or top level) enclosing the block
    pub lfp: Option<EnvId>,
    /// Method context, for `super` inside the block
    pub method: Option<MethodContext>,
    /// Block visible to `yield` inside this block
    pub outer: Option<Arc<Block>>,
    /// Strict arity and local `return`
    pub lambda: bool,
}

impl Block {
    /// A block backed by a Rust closure
    pub fn native(f: NativeBlockFn, lambda: bool) -> Self {
        Block {
            code: BlockCode::Native(f),
            self_value: Value::Nil,
            env: None,
            lfp: None,
            method: None,
            outer: None,
            lambda,
        }
    }

    /// Copy of this block with a different receiver
    pub fn with_self(&self, self_value: Value) -> Self {
        Block {
            self_value,
            ..self.clone()
        }
    }

    /// Copy of this block with lambda semantics
    pub fn to_lambda(&self) -> Self {
        Block {
            lambda: true,
            ..self.clone()
        }
    }

    /// Declared arity: required count, or `-(required + 1)` when optional
    /// or rest parameters exist
    pub fn arity(&self) -> i64 {
        match &self.code {
            BlockCode::Iseq(iseq) => iseq.shape.arity(),
            BlockCode::Native(_) => -1,
        }
    }
}

/// A proc object wrapping a captured block
#[derive(Debug)]
pub struct Proc {
    block: Arc<Block>,
}

impl Proc {
    /// Wrap a block without copying it
    pub fn new(block: Arc<Block>) -> Self {
        Proc { block }
    }

    /// Captured block
    pub fn block(&self) -> &Arc<Block> {
        &self.block
    }

    /// True for lambdas
    pub fn is_lambda(&self) -> bool {
        self.block.lambda
    }
}
