//! Instruction execution
//!
//! [`Vm::run`] drives the frame on top of the stack until the frame marked
//! `finish` leaves. Calls that push an interpreted frame simply continue
//! the loop in that frame; natives and nested runs re-enter `run` with a
//! fresh finish frame.

use std::sync::Arc;

use bytecode_system::{
    Block, BlockCode, CallFlags, CallInfo, DefineTarget, Env, Iseq, Opcode, Value, VmError, VmResult,
};
use core_types::{LocalJumpReason, Symbol, Visibility};
use object_model::MethodBody;

use crate::arguments::expand_array;
use crate::dispatch::{BlockCall, CallRequest, Dispatched};
use crate::vm::Vm;

impl Vm {
    /// Execute until the innermost finish frame leaves.
    ///
    /// # Returns
    ///
    /// The value the finish frame left with, or the error that unwound
    /// past it.
    pub(crate) fn run(&mut self) -> VmResult<Value> {
        loop {
            let outcome = match self.step() {
                Ok(outcome) => outcome,
                Err(err) => self.unwind(err)?,
            };
            if let Some(value) = outcome {
                return Ok(value);
            }
        }
    }

    /// Execute one instruction of the top frame
    fn step(&mut self) -> VmResult<Option<Value>> {
        let (iseq, pc) = match self.frames.top() {
            Some(frame) => match &frame.iseq {
                Some(iseq) => (iseq.clone(), frame.pc),
                None => return Err(VmError::InternalInvariant("interpreter entered a native frame".into())),
            },
            None => return Err(VmError::InternalInvariant("interpreter ran without a frame".into())),
        };
        let Some(instruction) = iseq.instruction(pc) else {
            return self.leave(Value::Nil);
        };
        self.jump(pc + 1);

        match &instruction.opcode {
            Opcode::Nop => {}
            Opcode::PutNil => self.frames.push_value(Value::Nil),
            Opcode::PutSelf => {
                let value = self.current_self();
                self.frames.push_value(value);
            }
            Opcode::PutObject(value) => self.frames.push_value(value.clone()),
            Opcode::GetLocal { index, level } => {
                let value = self.scope(*level)?.get(*index);
                self.frames.push_value(value);
            }
            Opcode::SetLocal { index, level } => {
                let value = self.frames.pop_value();
                self.scope(*level)?.set(*index, value);
            }
            Opcode::GetIvar(ivar) => {
                let value = self.runtime.graph().ivar_get(&self.current_self(), *ivar);
                self.frames.push_value(value);
            }
            Opcode::SetIvar(ivar) => {
                let value = self.frames.pop_value();
                let target = self.current_self();
                self.runtime.graph_mut().ivar_set(&target, *ivar, value)?;
            }
            Opcode::Pop => {
                self.frames.pop_value();
            }
            Opcode::Dup => {
                let value = self.frames.peek();
                self.frames.push_value(value);
            }
            Opcode::NewArray(n) => {
                let items = self.frames.pop_values(*n)?;
                self.frames.push_value(Value::array(items));
            }
            Opcode::ExpandArray { count, splat, post } => {
                let value = self.frames.pop_value();
                for item in expand_array(&value, *count, *splat, *post) {
                    self.frames.push_value(item);
                }
            }
            Opcode::Send(ci) => return self.op_send(&iseq, ci),
            Opcode::InvokeSuper(ci) => return self.op_invoke_super(ci),
            Opcode::InvokeBlock { argc, splat } => {
                let block = self
                    .frames
                    .top()
                    .and_then(|frame| frame.block.clone())
                    .ok_or_else(|| VmError::local_jump(LocalJumpReason::NoBlock, Value::Nil))?;
                let args = self.pop_args(*argc, *splat)?;
                let call = BlockCall {
                    args,
                    ..BlockCall::default()
                };
                let dispatched = self.invoke_block(&block, call)?;
                self.complete(dispatched);
            }
            Opcode::DefineMethod { name, body, target } => {
                self.op_define_method(*name, body, *target)?;
                self.frames.push_value(Value::Symbol(*name));
            }
            Opcode::Leave => {
                let value = self.frames.pop_value();
                return self.leave(value);
            }
            Opcode::Throw(kind) => {
                let value = self.frames.pop_value();
                return self.throw(*kind, value);
            }
            Opcode::Jump(target) => self.jump(*target),
            Opcode::BranchIf(target) => {
                if self.frames.pop_value().is_truthy() {
                    self.jump(*target);
                }
            }
            Opcode::BranchUnless(target) => {
                if !self.frames.pop_value().is_truthy() {
                    self.jump(*target);
                }
            }
        }
        Ok(None)
    }

    fn jump(&mut self, pc: usize) {
        if let Some(frame) = self.frames.top_mut() {
            frame.pc = pc;
        }
    }

    fn current_self(&self) -> Value {
        self.frames
            .top()
            .map(|frame| frame.self_value.clone())
            .unwrap_or(Value::Nil)
    }

    fn scope(&self, level: usize) -> VmResult<Arc<Env>> {
        self.frames
            .top()
            .and_then(|frame| frame.env.ancestor(level))
            .ok_or_else(|| VmError::InternalInvariant(format!("no scope {} levels out", level)))
    }

    /// Pop the top frame; a finish frame ends the run
    fn leave(&mut self, value: Value) -> VmResult<Option<Value>> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::InternalInvariant("leave without a frame".into()))?;
        if frame.finish {
            return Ok(Some(value));
        }
        self.frames.push_value(value);
        Ok(None)
    }

    fn complete(&mut self, dispatched: Dispatched) {
        if let Dispatched::Value(value) = dispatched {
            self.frames.push_value(value);
        }
    }

    /// Pop `argc` arguments, spreading the last one for a splat call
    fn pop_args(&mut self, argc: usize, splat: bool) -> VmResult<Vec<Value>> {
        let mut args = self.frames.pop_values(argc)?;
        if splat {
            if let Some(last) = args.pop() {
                args.extend(last.splat());
            }
        }
        Ok(args)
    }

    /// Block for a call site: the `&arg` operand, or the literal body
    fn call_block(&mut self, ci: &CallInfo) -> VmResult<Option<Arc<Block>>> {
        if ci.flags.contains(CallFlags::BLOCKARG) {
            let value = self.frames.pop_value();
            return self.block_from_value(value);
        }
        Ok(ci.block.as_ref().and_then(|body| self.literal_block(body)))
    }

    /// Capture a literal block in the current frame
    fn literal_block(&self, body: &Arc<Iseq>) -> Option<Arc<Block>> {
        let frame = self.frames.top()?;
        Some(Arc::new(Block {
            code: BlockCode::Iseq(body.clone()),
            self_value: frame.self_value.clone(),
            env: Some(frame.env.clone()),
            lfp: Some(frame.lfp),
            method: frame.method,
            outer: frame.block.clone(),
            lambda: false,
        }))
    }

    /// Convert a `&arg` operand to a block
    fn block_from_value(&mut self, value: Value) -> VmResult<Option<Arc<Block>>> {
        match value {
            Value::Nil => Ok(None),
            Value::Proc(proc) => Ok(Some(proc.block().clone())),
            other => {
                let convertible = {
                    let graph = self.runtime.graph();
                    graph.lookup(graph.class_of(&other), Symbol::TO_PROC).is_some()
                };
                let converted = if convertible {
                    self.call_method(other.clone(), Symbol::TO_PROC, Vec::new(), None, CallFlags::FCALL)?
                } else {
                    Value::Nil
                };
                match converted {
                    Value::Proc(proc) => Ok(Some(proc.block().clone())),
                    _ => {
                        let graph = self.runtime.graph();
                        Err(VmError::Type(format!(
                            "wrong argument type {} (expected Proc)",
                            graph.name_of(graph.real_class_of(&other))
                        )))
                    }
                }
            }
        }
    }

    fn op_send(&mut self, iseq: &Arc<Iseq>, ci: &CallInfo) -> VmResult<Option<Value>> {
        let block = self.call_block(ci)?;
        let args = self.pop_args(ci.argc, ci.flags.contains(CallFlags::SPLAT))?;
        let recv = self.frames.pop_value();
        let request = CallRequest {
            recv,
            mid: ci.mid,
            args,
            block,
            flags: ci.flags,
            site: Some((iseq.id, ci.cache_slot)),
            caller_self: self.current_self(),
            super_owner: None,
        };
        let dispatched = self.dispatch(request)?;
        self.complete(dispatched);
        Ok(None)
    }

    fn op_invoke_super(&mut self, ci: &CallInfo) -> VmResult<Option<Value>> {
        let (method, implicit) = match self.frames.top() {
            Some(frame) => (frame.method, frame.block.clone()),
            None => (None, None),
        };
        let method = method.ok_or_else(|| VmError::Runtime("super called outside of method".into()))?;
        let block = match self.call_block(ci)? {
            Some(block) => Some(block),
            None if ci.flags.contains(CallFlags::BLOCKARG) => None,
            None => implicit,
        };
        let args = self.pop_args(ci.argc, ci.flags.contains(CallFlags::SPLAT))?;
        let recv = self.current_self();
        let request = CallRequest {
            caller_self: recv.clone(),
            recv,
            mid: method.mid,
            args,
            block,
            flags: ci.flags | CallFlags::SUPER | CallFlags::FCALL,
            site: None,
            super_owner: Some(method.owner),
        };
        let dispatched = self.dispatch(request)?;
        self.complete(dispatched);
        Ok(None)
    }

    fn op_define_method(&mut self, name: Symbol, body: &Arc<Iseq>, target: DefineTarget) -> VmResult<()> {
        let self_value = self.current_self();
        let method = MethodBody::Interpreted(body.clone());
        let mut graph = self.runtime.graph_mut();
        match target {
            DefineTarget::Lexical(visibility) => {
                let class = match self_value {
                    Value::Class(class) => class,
                    ref other => graph.real_class_of(other),
                };
                graph.define_method_at(class, name, method, visibility, self.safe_level)
            }
            DefineTarget::ModuleFunction => match self_value {
                Value::Class(module) if graph.desc(module).is_module() => {
                    graph.define_module_function(module, name, method)
                }
                _ => Err(VmError::Type("module_function must be called for modules".into())),
            },
            DefineTarget::Singleton => {
                let class = graph.singleton_class_of(&self_value)?;
                graph.define_method_at(class, name, method, Visibility::Public, self.safe_level)
            }
        }
    }
}
