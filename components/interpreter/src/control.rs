//! Non-local control flow
//!
//! `return`, `break` and `retry` are raised as [`VmError::Throw`] carrying
//! the [`EnvId`] of the frame that must catch them. The target is
//! resolved against live frames when the transfer starts: a transfer with
//! no live target fails right there as a `LocalJumpError`, so an in-flight
//! throw always has somewhere to land.
//!
//! Unwinding walks frames top-down. A frame that is the target of a
//! transfer resumes (break, retry) or leaves with the value (return); any
//! other frame runs the first covering ensure clause, or rescue clause for
//! rescuable errors, and is popped otherwise.

use std::sync::Arc;

use bytecode_system::{CatchEntry, CatchKind, Env, ThrowKind, TransferKind, Value, VmError, VmResult};
use core_types::LocalJumpReason;
use tracing::{debug, warn};

use crate::call_frame::{CallFrame, FrameKind};
use crate::vm::Vm;

impl Vm {
    /// Start a control transfer from the top frame
    pub(crate) fn throw(&mut self, kind: ThrowKind, value: Value) -> VmResult<Option<Value>> {
        match kind {
            ThrowKind::Continue => match value {
                Value::Nil => Ok(None),
                Value::Exception(err) => Err((*err).clone()),
                other => Err(VmError::Type(format!(
                    "exception object expected, got {}",
                    self.runtime.graph().describe(&other)
                ))),
            },
            ThrowKind::Return => Err(self.return_target(value)),
            ThrowKind::Break => Err(self.break_target(value)),
            ThrowKind::Retry { level } => Err(self.retry_target(level, value)),
        }
    }

    fn return_target(&self, value: Value) -> VmError {
        let Some(top) = self.frames.top() else {
            return orphan(LocalJumpReason::Return, value);
        };
        if top.kind.returns_locally() {
            return VmError::throw(TransferKind::Return, top.dfp(), value);
        }
        let env = top.env.clone();
        for frame in self.frames.iter().rev() {
            match frame.kind {
                FrameKind::Lambda if env.encloses(frame.dfp()) => {
                    return VmError::throw(TransferKind::Return, frame.dfp(), value);
                }
                FrameKind::Method | FrameKind::Top if frame.dfp() == top.lfp => {
                    return VmError::throw(TransferKind::Return, top.lfp, value);
                }
                _ => {}
            }
        }
        orphan(LocalJumpReason::Return, value)
    }

    fn break_target(&self, value: Value) -> VmError {
        let Some(mut index) = self.frames.len().checked_sub(1) else {
            return orphan(LocalJumpReason::Break, value);
        };
        // a clause breaks on behalf of the body it protects
        loop {
            let Some(frame) = self.frames.get(index) else {
                return orphan(LocalJumpReason::Break, value);
            };
            if !matches!(frame.kind, FrameKind::Rescue | FrameKind::Ensure) {
                break;
            }
            match frame.env.parent().and_then(|parent| self.frames.find_by_env(parent.id())) {
                Some(owner) => index = owner,
                None => return orphan(LocalJumpReason::Break, value),
            }
        }

        let Some(frame) = self.frames.get(index) else {
            return orphan(LocalJumpReason::Break, value);
        };
        match frame.kind {
            FrameKind::Lambda => VmError::throw(TransferKind::Break, frame.dfp(), value),
            FrameKind::Block => {
                let target = frame.env.parent().map(|parent| parent.id());
                let landing = target
                    .and_then(|id| self.frames.find_by_env(id))
                    .and_then(|i| self.frames.get(i))
                    .is_some_and(|caller| break_entry(caller).is_some());
                match target {
                    Some(id) if landing => VmError::throw(TransferKind::Break, id, value),
                    _ => orphan(LocalJumpReason::Break, value),
                }
            }
            _ => orphan(LocalJumpReason::Break, value),
        }
    }

    fn retry_target(&self, level: usize, value: Value) -> VmError {
        let mut env: Option<Arc<Env>> = self.frames.top().and_then(|frame| frame.env.parent().cloned());
        for _ in 0..level {
            env = env.and_then(|e| e.parent().cloned());
        }
        let target = env.map(|e| e.id());
        let resumable = target
            .and_then(|id| self.frames.find_by_env(id))
            .and_then(|i| self.frames.get(i))
            .is_some_and(|frame| covering(frame, CatchKind::Retry).is_some());
        match target {
            Some(id) if resumable => VmError::throw(TransferKind::Retry, id, value),
            _ => orphan(LocalJumpReason::Retry, value),
        }
    }

    /// Unwind after `err` was raised in the top frame.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when a frame resumed or a clause was entered,
    /// `Ok(Some(value))` when a return landed on the finish frame, and the
    /// error when it unwound past the finish frame.
    pub(crate) fn unwind(&mut self, mut err: VmError) -> VmResult<Option<Value>> {
        loop {
            let Some(frame) = self.frames.top() else {
                return Err(err);
            };

            if let VmError::Throw(throw) = &err {
                if throw.target == frame.dfp() {
                    let resume = match throw.kind {
                        TransferKind::Break => break_entry(frame),
                        TransferKind::Retry => covering(frame, CatchKind::Retry),
                        TransferKind::Return => None,
                    };
                    if let Some(entry) = resume {
                        let value = throw.value.clone();
                        let kind = throw.kind;
                        self.frames.truncate_to(entry.sp);
                        if kind == TransferKind::Break {
                            self.frames.push_value(value);
                        }
                        if let Some(frame) = self.frames.top_mut() {
                            frame.pc = entry.cont;
                        }
                        debug!(target: "vm::control", kind = ?kind, cont = entry.cont, "transfer landed");
                        return Ok(None);
                    }
                    if let Some(entry) = covering(frame, CatchKind::Ensure) {
                        match self.run_clause(&entry, err) {
                            Ok(()) => return Ok(None),
                            Err(next) => {
                                err = next;
                                continue;
                            }
                        }
                    }
                    let value = throw.value.clone();
                    let finished = self.frames.pop().is_some_and(|frame| frame.finish);
                    if finished {
                        return Ok(Some(value));
                    }
                    self.frames.push_value(value);
                    return Ok(None);
                }
            }

            if !err.is_fatal() {
                let pc = frame.pc;
                let rescuable = err.is_rescuable();
                let handler = frame
                    .catch_table()
                    .iter()
                    .find(|entry| {
                        entry.covers(pc)
                            && (entry.kind == CatchKind::Ensure || (entry.kind == CatchKind::Rescue && rescuable))
                    })
                    .cloned();
                if let Some(entry) = handler {
                    match self.run_clause(&entry, err) {
                        Ok(()) => return Ok(None),
                        Err(next) => {
                            err = next;
                            continue;
                        }
                    }
                }
            }

            if self.frames.pop().is_some_and(|frame| frame.finish) {
                return Err(err);
            }
        }
    }

    /// Move the top frame to `entry.cont` and push the clause frame, with
    /// the error in its first local
    fn run_clause(&mut self, entry: &CatchEntry, err: VmError) -> VmResult<()> {
        let body = entry
            .iseq
            .clone()
            .ok_or_else(|| VmError::InternalInvariant("catch entry without a clause body".into()))?;
        let frame = self
            .frames
            .top_mut()
            .ok_or_else(|| VmError::InternalInvariant("clause without a frame".into()))?;
        frame.pc = entry.cont;
        let (self_value, env, lfp, method, block) = (
            frame.self_value.clone(),
            frame.env.clone(),
            frame.lfp,
            frame.method,
            frame.block.clone(),
        );
        self.frames.truncate_to(entry.sp);

        let kind = match entry.kind {
            CatchKind::Rescue => FrameKind::Rescue,
            _ => FrameKind::Ensure,
        };
        debug!(target: "vm::control", kind = ?entry.kind, error = %err, "entering clause");
        let scope = Env::with_values(vec![Value::Exception(Arc::new(err))], body.local_size.max(1), Some(env));
        let clause = CallFrame::new(kind, Some(body), self_value, scope, lfp)
            .with_method(method)
            .with_block(block);
        self.frames.push(clause)
    }
}

/// Catch entry of `kind` protecting `frame`'s resume point
fn covering(frame: &CallFrame, kind: CatchKind) -> Option<CatchEntry> {
    frame
        .catch_table()
        .iter()
        .find(|entry| entry.kind == kind && entry.covers(frame.pc))
        .cloned()
}

/// Break entry for the call `frame` is suspended in
fn break_entry(frame: &CallFrame) -> Option<CatchEntry> {
    frame
        .catch_table()
        .iter()
        .find(|entry| entry.kind == CatchKind::Break && entry.covers(frame.pc) && entry.cont == frame.pc)
        .cloned()
}

fn orphan(reason: LocalJumpReason, value: Value) -> VmError {
    warn!(target: "vm::control", reason = ?reason, "control transfer has no live target");
    VmError::local_jump(reason, value)
}
