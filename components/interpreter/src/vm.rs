//! Execution context
//!
//! A [`Vm`] is one logical thread of execution over a shared [`Runtime`]:
//! it owns its frame stack, its call-site caches and its trust level, and
//! it is what natives see as their [`NativeContext`].

use std::sync::Arc;

use bytecode_system::{Block, CallFlags, Env, Iseq, Proc, TransferKind, Value, VmError, VmResult};
use core_types::{LocalJumpReason, MissingReason, StackFrame, Symbol};
use object_model::{ClassGraph, NativeContext};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::call_frame::{CallFrame, FrameKind, FrameStack};
use crate::dispatch::{BlockCall, CallRequest, Dispatched};
use crate::inline_cache::{CacheStats, CallCacheTable};
use crate::runtime::Runtime;

/// A `method_missing` call in progress
#[derive(Debug, Clone)]
pub(crate) struct MissingCall {
    pub(crate) recv: Value,
    pub(crate) mid: Symbol,
    pub(crate) reason: MissingReason,
}

/// One execution context
///
/// # Example
///
/// ```
/// use bytecode_system::Value;
/// use interpreter::Runtime;
///
/// let runtime = Runtime::new().unwrap();
/// let mut vm = runtime.context();
/// let sum = vm.call(&Value::Fixnum(40), "+", vec![Value::Fixnum(2)]).unwrap();
/// assert_eq!(sum, Value::Fixnum(42));
/// ```
pub struct Vm {
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) frames: FrameStack,
    pub(crate) caches: CallCacheTable,
    pub(crate) safe_level: u8,
    pub(crate) missing: Vec<MissingCall>,
}

impl Vm {
    /// Create a context on `runtime`
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let config = runtime.config();
        Self {
            frames: FrameStack::new(config.stack_size, config.max_frame_depth)
                .with_native_limit(config.max_native_depth),
            caches: CallCacheTable::new(),
            safe_level: config.safe_level,
            missing: Vec::new(),
            runtime,
        }
    }

    /// The shared runtime
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Run a top-level body with the main object as `self`
    ///
    /// # Arguments
    ///
    /// * `iseq` - Body to run, usually of kind `Top`
    ///
    /// # Returns
    ///
    /// The value the body leaves with.
    pub fn execute(&mut self, iseq: &Arc<Iseq>) -> VmResult<Value> {
        let main = self.runtime.main_object();
        self.execute_with_self(iseq, main)
    }

    /// Run a top-level body with an explicit `self`
    pub fn execute_with_self(&mut self, iseq: &Arc<Iseq>, self_value: Value) -> VmResult<Value> {
        let outermost = self.frames.is_empty();
        let env = Env::new(iseq.local_size, None);
        let lfp = env.id();
        let mut frame = CallFrame::new(FrameKind::Top, Some(iseq.clone()), self_value, env, lfp);
        frame.finish = true;
        self.frames.push(frame)?;
        let result = self.run();
        if outermost {
            result.map_err(settle)
        } else {
            result
        }
    }

    /// Call `name` on `recv` with an explicit receiver (private methods
    /// are not reachable)
    pub fn call(&mut self, recv: &Value, name: &str, args: Vec<Value>) -> VmResult<Value> {
        let mid = self.runtime.intern(name);
        self.call_method(recv.clone(), mid, args, None, CallFlags::empty())
    }

    /// Receiver-less call of `name` on `recv` (private methods reachable)
    pub fn funcall_named(&mut self, recv: &Value, name: &str, args: Vec<Value>) -> VmResult<Value> {
        let mid = self.runtime.intern(name);
        self.call_method(recv.clone(), mid, args, None, CallFlags::FCALL)
    }

    /// Call `mid` on `recv` passing `block`
    pub fn call_with_block(
        &mut self,
        recv: &Value,
        mid: Symbol,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
    ) -> VmResult<Value> {
        self.call_method(recv.clone(), mid, args, block, CallFlags::empty())
    }

    /// Dispatch a call and run it to completion
    pub(crate) fn call_method(
        &mut self,
        recv: Value,
        mid: Symbol,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
        flags: CallFlags,
    ) -> VmResult<Value> {
        let outermost = self.frames.is_empty();
        let caller_self = match self.frames.top() {
            Some(frame) => frame.self_value.clone(),
            None => self.runtime.main_object(),
        };
        let request = CallRequest {
            recv,
            mid,
            args,
            block,
            flags,
            site: None,
            caller_self,
            super_owner: None,
        };
        let result = match self.dispatch(request) {
            Ok(Dispatched::Value(value)) => Ok(value),
            Ok(Dispatched::Pushed) => self.run_pushed(),
            Err(err) => Err(err),
        };
        if outermost {
            result.map_err(settle)
        } else {
            result
        }
    }

    /// Invoke a proc with `args`
    pub fn invoke_proc(&mut self, proc: &Proc, args: Vec<Value>, block: Option<Arc<Block>>) -> VmResult<Value> {
        let outermost = self.frames.is_empty();
        let call = BlockCall {
            args,
            block_arg: block,
            ..BlockCall::default()
        };
        let result = self.yield_value(proc.block(), call);
        if outermost {
            result.map_err(settle)
        } else {
            result
        }
    }

    /// Run the frame just pushed until it leaves
    pub(crate) fn run_pushed(&mut self) -> VmResult<Value> {
        if let Some(frame) = self.frames.top_mut() {
            frame.finish = true;
        }
        self.run()
    }

    /// Invoke `block` and run it to completion
    pub(crate) fn yield_value(&mut self, block: &Arc<Block>, call: BlockCall) -> VmResult<Value> {
        match self.invoke_block(block, call)? {
            Dispatched::Value(value) => Ok(value),
            Dispatched::Pushed => self.run_pushed(),
        }
    }

    /// Live frames, innermost first
    pub fn backtrace(&self) -> Vec<StackFrame> {
        let graph = self.runtime.graph();
        self.frames
            .iter()
            .rev()
            .map(|frame| StackFrame {
                label: frame_label(&graph, frame),
                pc: frame.pc,
            })
            .collect()
    }

    /// Number of live frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Call-site cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.caches.stats()
    }

    /// Current trust level
    pub fn safe_level(&self) -> u8 {
        self.safe_level
    }

    /// Raise the trust level; it can never be lowered
    pub fn set_safe_level(&mut self, level: u8) -> VmResult<()> {
        if level < self.safe_level {
            return Err(VmError::Security(format!(
                "tried to downgrade safe level from {} to {}",
                self.safe_level, level
            )));
        }
        self.safe_level = level;
        Ok(())
    }

    /// The native marker frame on top, if a native is running
    fn native_frame(&self) -> Option<&CallFrame> {
        self.frames.top().filter(|frame| frame.kind == FrameKind::Native)
    }
}

fn frame_label(graph: &ClassGraph, frame: &CallFrame) -> String {
    let method = frame
        .method
        .map(|m| format!("{}#{}", graph.name_of(m.owner), graph.symbol_name(m.mid)));
    let body = || {
        method
            .clone()
            .or_else(|| frame.iseq.as_ref().map(|iseq| iseq.name.clone()))
            .unwrap_or_else(|| "<native>".to_string())
    };
    match frame.kind {
        FrameKind::Top => "<main>".to_string(),
        FrameKind::Method | FrameKind::Native => body(),
        FrameKind::Block | FrameKind::Lambda => format!("block in {}", body()),
        FrameKind::Rescue => format!("rescue in {}", body()),
        FrameKind::Ensure => format!("ensure in {}", body()),
    }
}

/// A transfer that escaped every frame of the context is an orphan
fn settle(err: VmError) -> VmError {
    match err {
        VmError::Throw(throw) => {
            let reason = match throw.kind {
                TransferKind::Return => LocalJumpReason::Return,
                TransferKind::Break => LocalJumpReason::Break,
                TransferKind::Retry => LocalJumpReason::Retry,
            };
            warn!(target: "vm::control", reason = ?reason, "control transfer escaped its context");
            VmError::local_jump(reason, throw.value)
        }
        other => other,
    }
}

impl NativeContext for Vm {
    fn graph(&self) -> RwLockReadGuard<'_, ClassGraph> {
        self.runtime.graph()
    }

    fn graph_mut(&self) -> RwLockWriteGuard<'_, ClassGraph> {
        self.runtime.graph_mut()
    }

    fn intern(&self, name: &str) -> Symbol {
        self.runtime.intern(name)
    }

    fn symbol_name(&self, sym: Symbol) -> String {
        self.runtime.symbol_name(sym)
    }

    fn funcall(&mut self, recv: &Value, mid: Symbol, args: &[Value], block: Option<Arc<Block>>) -> VmResult<Value> {
        self.call_method(recv.clone(), mid, args.to_vec(), block, CallFlags::FCALL)
    }

    fn block(&self) -> Option<Arc<Block>> {
        self.native_frame().and_then(|frame| frame.block.clone())
    }

    fn yield_block(&mut self, args: &[Value]) -> VmResult<Value> {
        let block = self
            .block()
            .ok_or_else(|| VmError::local_jump(LocalJumpReason::NoBlock, Value::Nil))?;
        let call = BlockCall {
            args: args.to_vec(),
            ..BlockCall::default()
        };
        self.yield_value(&block, call)
    }

    fn caller_block_given(&self) -> bool {
        let len = self.frames.len();
        if self.native_frame().is_none() || len < 2 {
            return false;
        }
        self.frames.get(len - 2).is_some_and(|frame| frame.block.is_some())
    }

    fn make_proc(&mut self, lambda: bool) -> VmResult<Value> {
        let block = self
            .block()
            .ok_or_else(|| VmError::Argument("tried to create Proc object without a block".into()))?;
        let block = if lambda { Arc::new(block.to_lambda()) } else { block };
        Ok(Value::Proc(Arc::new(Proc::new(block))))
    }

    fn call_proc(&mut self, proc: &Proc, args: &[Value], block: Option<Arc<Block>>) -> VmResult<Value> {
        self.invoke_proc(proc, args.to_vec(), block)
    }

    fn missing_reason(&self) -> MissingReason {
        self.missing.last().map(|call| call.reason).unwrap_or_default()
    }

    fn inspect(&self, value: &Value) -> String {
        self.runtime.graph().describe(value)
    }

    fn safe_level(&self) -> u8 {
        self.safe_level
    }
}
