//! Call frames and the per-context frame stack
//!
//! Frames live in a `Vec` addressed by index; operand values live in a
//! second `Vec` shared by every frame, each frame owning the suffix that
//! starts at its `sp_base`. Popping a frame truncates its operands, so an
//! unwinding error can never leave a dangling region behind.

use std::sync::Arc;

use bytecode_system::{Block, CatchEntry, Env, EnvId, Iseq, MethodContext, Value, VmError, VmResult};
use tracing::warn;

/// What kind of activation a frame is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Top-level body
    Top,
    /// Interpreted method body
    Method,
    /// Plain block body
    Block,
    /// Lambda body, or a closure bound as a method
    Lambda,
    /// Thin marker for a running native
    Native,
    /// Rescue clause body
    Rescue,
    /// Ensure clause body
    Ensure,
}

impl FrameKind {
    /// Whether `return` in this frame returns from the frame itself
    pub fn returns_locally(self) -> bool {
        matches!(self, FrameKind::Top | FrameKind::Method | FrameKind::Lambda)
    }
}

/// Call frame representing one activation
///
/// `env` is the frame's own scope (its dynamic frame pointer); `lfp`
/// identifies the scope of the method the frame belongs to lexically and is
/// shared by every block nested inside that method.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Activation kind
    pub kind: FrameKind,
    /// Body being executed (`None` for native markers)
    pub iseq: Option<Arc<Iseq>>,
    /// Index of the next instruction
    pub pc: usize,
    /// Receiver
    pub self_value: Value,
    /// Local scope
    pub env: Arc<Env>,
    /// Scope of the enclosing method
    pub lfp: EnvId,
    /// Defining class and name, for `super`
    pub method: Option<MethodContext>,
    /// Block visible to `yield` in this frame
    pub block: Option<Arc<Block>>,
    /// Operand stack base
    pub sp_base: usize,
    /// Slots charged against the stack bound
    pub reserved: usize,
    /// Leaving this frame ends the current interpreter run
    pub finish: bool,
}

impl CallFrame {
    /// Create a frame; stack accounting is filled in on push
    pub fn new(kind: FrameKind, iseq: Option<Arc<Iseq>>, self_value: Value, env: Arc<Env>, lfp: EnvId) -> Self {
        Self {
            kind,
            iseq,
            pc: 0,
            self_value,
            env,
            lfp,
            method: None,
            block: None,
            sp_base: 0,
            reserved: 0,
            finish: false,
        }
    }

    /// Attach a method context
    pub fn with_method(mut self, method: Option<MethodContext>) -> Self {
        self.method = method;
        self
    }

    /// Attach the block visible to `yield`
    pub fn with_block(mut self, block: Option<Arc<Block>>) -> Self {
        self.block = block;
        self
    }

    /// Start executing at `pc`
    pub fn at(mut self, pc: usize) -> Self {
        self.pc = pc;
        self
    }

    /// Identity of this frame's own scope
    pub fn dfp(&self) -> EnvId {
        self.env.id()
    }

    /// Catch table of the running body
    pub fn catch_table(&self) -> &[CatchEntry] {
        self.iseq.as_ref().map(|iseq| iseq.catch_table.as_slice()).unwrap_or(&[])
    }
}

/// Frame stack of one execution context
#[derive(Debug)]
pub struct FrameStack {
    frames: Vec<CallFrame>,
    values: Vec<Value>,
    reserved: usize,
    natives: usize,
    max_slots: usize,
    max_depth: usize,
    max_natives: usize,
}

impl FrameStack {
    /// Create an empty stack with the given bounds
    ///
    /// # Arguments
    ///
    /// * `max_slots` - Total locals plus temporaries all live frames may reserve
    /// * `max_depth` - Maximum number of live frames
    pub fn new(max_slots: usize, max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            values: Vec::new(),
            reserved: 0,
            natives: 0,
            max_slots,
            max_depth,
            max_natives: max_depth,
        }
    }

    /// Bound the number of live native frames separately
    pub fn with_native_limit(mut self, limit: usize) -> Self {
        self.max_natives = limit;
        self
    }

    /// Push a frame, charging its locals and temporaries.
    ///
    /// # Errors
    ///
    /// [`VmError::StackOverflow`] when either bound would be exceeded; the
    /// stack is left unchanged.
    pub fn push(&mut self, mut frame: CallFrame) -> VmResult<()> {
        let slots = frame.iseq.as_ref().map(|iseq| iseq.reserved_slots()).unwrap_or(0);
        if self.frames.len() >= self.max_depth {
            warn!(target: "vm::frames", depth = self.frames.len(), limit = self.max_depth, "frame depth exceeded");
            return Err(VmError::StackOverflow { limit: self.max_depth });
        }
        if self.reserved + slots > self.max_slots {
            warn!(target: "vm::frames", reserved = self.reserved, requested = slots, limit = self.max_slots, "value stack exhausted");
            return Err(VmError::StackOverflow { limit: self.max_slots });
        }
        if frame.kind == FrameKind::Native {
            if self.natives >= self.max_natives {
                warn!(target: "vm::frames", natives = self.natives, limit = self.max_natives, "native nesting exceeded");
                return Err(VmError::StackOverflow { limit: self.max_natives });
            }
            self.natives += 1;
        }
        frame.sp_base = self.values.len();
        frame.reserved = slots;
        self.reserved += slots;
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the top frame and discard its operands
    pub fn pop(&mut self) -> Option<CallFrame> {
        let frame = self.frames.pop()?;
        self.values.truncate(frame.sp_base);
        self.reserved -= frame.reserved;
        if frame.kind == FrameKind::Native {
            self.natives -= 1;
        }
        Some(frame)
    }

    /// Topmost frame
    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Topmost frame, mutably
    pub fn top_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    /// Frame at `index` (0 = bottom)
    pub fn get(&self, index: usize) -> Option<&CallFrame> {
        self.frames.get(index)
    }

    /// Frame at `index`, mutably
    pub fn get_mut(&mut self, index: usize) -> Option<&mut CallFrame> {
        self.frames.get_mut(index)
    }

    /// Live frames, bottom first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &CallFrame> {
        self.frames.iter()
    }

    /// Number of live frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when no frame is live
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Slots currently reserved
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Index of the newest frame whose scope is `env`
    pub fn find_by_env(&self, env: EnvId) -> Option<usize> {
        self.frames.iter().rposition(|f| f.dfp() == env)
    }

    fn base(&self) -> usize {
        self.frames.last().map(|f| f.sp_base).unwrap_or(0)
    }

    /// Push an operand for the top frame
    pub fn push_value(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Pop an operand; an empty frame yields `nil`
    pub fn pop_value(&mut self) -> Value {
        if self.values.len() > self.base() {
            self.values.pop().unwrap_or(Value::Nil)
        } else {
            Value::Nil
        }
    }

    /// Pop `n` operands, oldest first
    ///
    /// # Errors
    ///
    /// InternalInvariant when the top frame holds fewer than `n` operands.
    pub fn pop_values(&mut self, n: usize) -> VmResult<Vec<Value>> {
        let available = self.values.len() - self.base();
        if available < n {
            return Err(VmError::InternalInvariant(format!(
                "operand stack underflow ({} of {})",
                available, n
            )));
        }
        let at = self.values.len() - n;
        Ok(self.values.split_off(at))
    }

    /// Top operand without popping
    pub fn peek(&self) -> Value {
        if self.values.len() > self.base() {
            self.values.last().cloned().unwrap_or(Value::Nil)
        } else {
            Value::Nil
        }
    }

    /// Operand count of the top frame
    pub fn depth(&self) -> usize {
        self.values.len() - self.base()
    }

    /// Cut the top frame's operands back to `sp`
    pub fn truncate_to(&mut self, sp: usize) {
        let at = self.base() + sp;
        if at < self.values.len() {
            self.values.truncate(at);
        }
    }
}
