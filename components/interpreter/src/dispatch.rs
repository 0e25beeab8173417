//! Method dispatch
//!
//! A call runs through an explicit state machine:
//!
//! ```text
//! Lookup ──hit/miss──▶ Gate ──▶ Invoke ──▶ value | pushed frame
//!   │                   │         │
//!   │ (nothing found)   │         ├─ send ──▶ Lookup (renamed, receiver-less)
//!   ▼                   ▼         └─ super-forward ──▶ Forward
//! Missing ◀──────── forbidden
//! ```
//!
//! `Lookup` consults the call site's inline cache first and refills it on a
//! miss; super calls start at `SuperLookup` instead. Every path that finds
//! nothing ends in `Missing`, which calls `method_missing` with the name
//! prepended to the arguments.

use std::sync::Arc;

use arrayvec::ArrayVec;
use bytecode_system::{Block, BlockCode, CallFlags, Env, Iseq, MethodContext, Value, VmError, VmResult};
use core_types::{ClassId, MissingReason, Symbol, Visibility};
use object_model::{Arity, MethodBody, MethodEntry, NativeFn, NativeHint, MAX_NATIVE_ARITY};
use tracing::{debug, error, trace, warn};

use crate::arguments::ArgumentBinder;
use crate::call_frame::{CallFrame, FrameKind};
use crate::inline_cache::{CacheEntry, CacheKind, CachedTarget, SiteKey};
use crate::vm::{MissingCall, Vm};

/// A call on its way through the dispatcher
#[derive(Debug, Clone)]
pub(crate) struct CallRequest {
    pub(crate) recv: Value,
    pub(crate) mid: Symbol,
    pub(crate) args: Vec<Value>,
    pub(crate) block: Option<Arc<Block>>,
    pub(crate) flags: CallFlags,
    pub(crate) site: Option<SiteKey>,
    pub(crate) caller_self: Value,
    pub(crate) super_owner: Option<ClassId>,
}

/// Result of dispatching a call
#[derive(Debug)]
pub(crate) enum Dispatched {
    /// Call completed with a value
    Value(Value),
    /// An interpreted frame was pushed; the interpreter loop continues in it
    Pushed,
}

/// How to run a block
#[derive(Debug, Default)]
pub(crate) struct BlockCall {
    pub(crate) args: Vec<Value>,
    pub(crate) self_value: Option<Value>,
    pub(crate) block_arg: Option<Arc<Block>>,
    pub(crate) lambda: bool,
    pub(crate) method: Option<MethodContext>,
}

enum Step {
    Lookup,
    SuperLookup(ClassId),
    Forward(ClassId),
    Gate(Arc<MethodEntry>),
    Invoke(CachedTarget),
    Missing(MissingReason),
}

impl Vm {
    /// Run `request` through the dispatch state machine
    pub(crate) fn dispatch(&mut self, mut request: CallRequest) -> VmResult<Dispatched> {
        let mut step = match request.super_owner {
            Some(owner) => Step::SuperLookup(owner),
            None => Step::Lookup,
        };
        loop {
            step = match step {
                Step::Lookup => self.resolve(&request),
                Step::SuperLookup(owner) => {
                    let graph = self.runtime.graph();
                    let class = graph.class_of(&request.recv);
                    match graph.lookup_super(class, owner, request.mid) {
                        Some(entry) => Step::Gate(entry),
                        None => Step::Missing(MissingReason {
                            super_call: true,
                            ..Default::default()
                        }),
                    }
                }
                Step::Forward(owner) => {
                    let graph = self.runtime.graph();
                    let class = graph.class_of(&request.recv);
                    match graph.lookup_super(class, owner, request.mid) {
                        Some(entry) => Step::Invoke(CachedTarget::Entry(entry)),
                        None => Step::Missing(MissingReason {
                            super_call: true,
                            ..Default::default()
                        }),
                    }
                }
                Step::Gate(entry) => self.gate(&request, entry)?,
                Step::Invoke(CachedTarget::Foreign(foreign)) => {
                    let value = self.call_native(&foreign.func, foreign.arity, request, None)?;
                    return Ok(Dispatched::Value(value));
                }
                Step::Invoke(CachedTarget::Entry(entry)) => match self.invoke(&mut request, &entry)? {
                    Some(next) => next,
                    None => return self.invoke_entry(request, entry),
                },
                Step::Missing(reason) => return self.method_missing(request, reason),
            };
        }
    }

    /// Cache probe, falling back to a full lookup
    fn resolve(&mut self, request: &CallRequest) -> Step {
        // sampled before the lookup so a racing mutation can only leave the entry stale
        let version = self.runtime.version();
        let class = self.runtime.graph().class_of(&request.recv);
        let caching = self.runtime.config().inline_cache;

        if caching {
            if let Some(site) = request.site {
                if let Some(hit) = self.caches.probe(site, class, version) {
                    return match hit.target {
                        CachedTarget::Entry(entry) => Step::Gate(entry),
                        foreign => Step::Invoke(foreign),
                    };
                }
            }
        }

        let (found, foreign) = {
            let graph = self.runtime.graph();
            (graph.lookup(class, request.mid), graph.is_foreign(class))
        };
        trace!(
            target: "vm::dispatch",
            method = %self.runtime.symbol_name(request.mid),
            class = class.index(),
            version,
            "inline cache miss"
        );

        let target = match found {
            Some(entry) => {
                let kind = entry.body.as_ref().map(CacheKind::of).unwrap_or(CacheKind::Forward);
                Some((kind, CachedTarget::Entry(entry)))
            }
            None if foreign => self
                .runtime
                .bridge()
                .and_then(|bridge| bridge.resolve(class, request.mid))
                .map(|method| (CacheKind::Foreign, CachedTarget::Foreign(method))),
            None => None,
        };

        match target {
            Some((kind, target)) => {
                if let (true, Some(site)) = (caching, request.site) {
                    self.caches.fill(
                        site,
                        CacheEntry {
                            class,
                            version,
                            kind,
                            target: target.clone(),
                        },
                    );
                }
                match target {
                    CachedTarget::Entry(entry) => Step::Gate(entry),
                    foreign => Step::Invoke(foreign),
                }
            }
            None => Step::Missing(MissingReason {
                vcall: request.flags.contains(CallFlags::VCALL),
                ..Default::default()
            }),
        }
    }

    /// Visibility and trust checks
    fn gate(&self, request: &CallRequest, entry: Arc<MethodEntry>) -> VmResult<Step> {
        match entry.visibility {
            Visibility::Private if !request.flags.contains(CallFlags::FCALL) => {
                return Ok(Step::Missing(MissingReason {
                    visibility: Some(Visibility::Private),
                    vcall: request.flags.contains(CallFlags::VCALL),
                    super_call: false,
                }));
            }
            Visibility::Protected if !request.flags.contains(CallFlags::SEND) => {
                let graph = self.runtime.graph();
                let defined = graph.real_class(entry.owner);
                if !graph.kind_of(&request.caller_self, defined) {
                    return Ok(Step::Missing(MissingReason::forbidden(Visibility::Protected)));
                }
            }
            _ => {}
        }
        if entry.safe_level > self.safe_level && entry.safe_level > 2 {
            return Err(VmError::Security(format!(
                "calling insecure method: {}",
                self.runtime.symbol_name(request.mid)
            )));
        }
        Ok(Step::Invoke(CachedTarget::Entry(entry)))
    }

    /// Steps that re-enter the state machine instead of invoking
    fn invoke(&mut self, request: &mut CallRequest, entry: &MethodEntry) -> VmResult<Option<Step>> {
        match entry.body.as_ref() {
            Some(MethodBody::Native(native)) if native.hint == NativeHint::Send && !request.args.is_empty() => {
                let name = request.args.remove(0);
                request.mid = self.method_name(&name)?;
                request.flags.insert(CallFlags::FCALL | CallFlags::SEND);
                request.site = None;
                Ok(Some(Step::Lookup))
            }
            Some(MethodBody::SuperForward) => Ok(Some(Step::Forward(entry.owner))),
            Some(_) => Ok(None),
            None => {
                error!(target: "vm::dispatch", owner = entry.owner.index(), "tombstone selected for invocation");
                Err(VmError::InternalInvariant("undefined method entry selected".into()))
            }
        }
    }

    /// Invoke a resolved entry by kind
    fn invoke_entry(&mut self, request: CallRequest, entry: Arc<MethodEntry>) -> VmResult<Dispatched> {
        let Some(body) = entry.body.clone() else {
            return Err(VmError::InternalInvariant("undefined method entry selected".into()));
        };
        match body {
            MethodBody::Native(native) => {
                let value = self.call_native(&native.func, native.arity, request, Some(entry.owner))?;
                Ok(Dispatched::Value(value))
            }
            MethodBody::Interpreted(iseq) => self.push_method_frame(iseq, request, entry.owner),
            MethodBody::AttrReader(ivar) => {
                if !request.args.is_empty() {
                    return Err(VmError::ArgumentCount {
                        expected: 0,
                        actual: request.args.len(),
                    });
                }
                Ok(Dispatched::Value(self.runtime.graph().ivar_get(&request.recv, ivar)))
            }
            MethodBody::AttrWriter(ivar) => {
                let [value] = <[Value; 1]>::try_from(request.args).map_err(|args| VmError::ArgumentCount {
                    expected: 1,
                    actual: args.len(),
                })?;
                self.runtime.graph_mut().ivar_set(&request.recv, ivar, value.clone())?;
                Ok(Dispatched::Value(value))
            }
            MethodBody::BoundClosure(proc) => {
                let call = BlockCall {
                    args: request.args,
                    self_value: Some(request.recv),
                    block_arg: request.block,
                    lambda: true,
                    method: Some(MethodContext {
                        owner: entry.owner,
                        mid: request.mid,
                    }),
                };
                self.invoke_block(proc.block(), call)
            }
            MethodBody::SuperForward => Err(VmError::InternalInvariant("unresolved super forward".into())),
        }
    }

    /// Call a Rust function behind a thin marker frame
    pub(crate) fn call_native(
        &mut self,
        func: &NativeFn,
        arity: Arity,
        request: CallRequest,
        owner: Option<ClassId>,
    ) -> VmResult<Value> {
        let argc = request.args.len();
        if let Arity::Fixed(n) = arity {
            if n > MAX_NATIVE_ARITY {
                return Err(VmError::Argument(format!("too many arguments({})", n)));
            }
            if n != argc {
                return Err(VmError::ArgumentCount {
                    expected: n,
                    actual: argc,
                });
            }
        }

        let env = Env::new(0, None);
        let lfp = env.id();
        let method = owner.map(|owner| MethodContext {
            owner,
            mid: request.mid,
        });
        let frame = CallFrame::new(FrameKind::Native, None, request.recv.clone(), env, lfp)
            .with_method(method)
            .with_block(request.block);
        self.frames.push(frame)?;
        let depth = self.frames.len();

        let func = func.clone();
        let recv = request.recv;
        let result = match arity {
            Arity::Fixed(_) => {
                let argv: ArrayVec<Value, MAX_NATIVE_ARITY> = request.args.into_iter().collect();
                func(self, &recv, &argv)
            }
            Arity::Variadic => func(self, &recv, &request.args),
            Arity::Packed => func(self, &recv, &[Value::array(request.args)]),
        };

        if self.frames.len() != depth {
            error!(target: "vm::dispatch", expected = depth, actual = self.frames.len(), "frame stack inconsistent after native call");
            return Err(VmError::InternalInvariant("cfp consistency error - send".into()));
        }
        self.frames.pop();
        result
    }

    /// Push a method frame with bound arguments
    fn push_method_frame(&mut self, iseq: Arc<Iseq>, request: CallRequest, owner: ClassId) -> VmResult<Dispatched> {
        let bound = ArgumentBinder::new(&iseq).bind_strict(request.args, request.block.as_ref())?;
        if request.flags.contains(CallFlags::TAILCALL) {
            let reusable = self
                .frames
                .top()
                .is_some_and(|frame| tail_reusable(frame, request.block.as_ref()));
            if reusable {
                self.frames.pop();
            }
        }
        let env = Env::with_values(bound.locals, iseq.local_size, None);
        let lfp = env.id();
        let frame = CallFrame::new(FrameKind::Method, Some(iseq), request.recv, env, lfp)
            .with_method(Some(MethodContext {
                owner,
                mid: request.mid,
            }))
            .with_block(request.block)
            .at(bound.entry_pc);
        self.frames.push(frame)?;
        Ok(Dispatched::Pushed)
    }

    /// Run a block: natively, or by pushing a block frame
    pub(crate) fn invoke_block(&mut self, block: &Arc<Block>, call: BlockCall) -> VmResult<Dispatched> {
        let lambda = call.lambda || block.lambda;
        match &block.code {
            BlockCode::Native(f) => {
                let arg = if lambda {
                    Value::array(call.args)
                } else {
                    call.args.into_iter().next().unwrap_or(Value::Nil)
                };
                let f = f.clone();
                f(arg).map(Dispatched::Value)
            }
            BlockCode::Iseq(iseq) => {
                let binder = ArgumentBinder::new(iseq);
                let bound = if lambda {
                    binder.bind_strict(call.args, call.block_arg.as_ref())?
                } else {
                    binder.bind_lenient(call.args, call.block_arg.as_ref())
                };
                let env = Env::with_values(bound.locals, iseq.local_size, block.env.clone());
                let lfp = block.lfp.unwrap_or_else(|| env.id());
                let kind = if lambda { FrameKind::Lambda } else { FrameKind::Block };
                let self_value = call.self_value.unwrap_or_else(|| block.self_value.clone());
                let frame = CallFrame::new(kind, Some(iseq.clone()), self_value, env, lfp)
                    .with_method(call.method.or(block.method))
                    .with_block(block.outer.clone())
                    .at(bound.entry_pc);
                self.frames.push(frame)?;
                Ok(Dispatched::Pushed)
            }
        }
    }

    /// Fall back to `method_missing`
    fn method_missing(&mut self, mut request: CallRequest, reason: MissingReason) -> VmResult<Dispatched> {
        let name = self.runtime.symbol_name(request.mid);
        if request.mid == Symbol::METHOD_MISSING && reason.visibility.is_none() {
            error!(target: "vm::dispatch", "method_missing is not defined");
            return Err(VmError::InternalInvariant("method_missing: no handler".into()));
        }
        if self
            .missing
            .iter()
            .any(|call| call.mid == request.mid && call.recv.identical(&request.recv))
        {
            error!(target: "vm::dispatch", method = %name, "method_missing re-entered for the same call");
            return Err(VmError::InternalInvariant(format!(
                "method_missing re-entered for `{}'",
                name
            )));
        }

        let limit = self.runtime.config().max_native_depth;
        if self.missing.len() >= limit {
            warn!(target: "vm::frames", nesting = self.missing.len(), limit, "method_missing nesting exceeded");
            return Err(VmError::StackOverflow { limit });
        }

        let handler = {
            let graph = self.runtime.graph();
            graph.lookup(graph.class_of(&request.recv), Symbol::METHOD_MISSING)
        };
        if handler.is_none() {
            return Err(self.no_method_error(&request.recv, request.mid, reason));
        }
        debug!(target: "vm::dispatch", method = %name, reason = ?reason, "method_missing fallback");

        self.missing.push(MissingCall {
            recv: request.recv.clone(),
            mid: request.mid,
            reason,
        });
        request.args.insert(0, Value::Symbol(request.mid));
        let handler_request = CallRequest {
            mid: Symbol::METHOD_MISSING,
            flags: CallFlags::FCALL,
            site: None,
            super_owner: None,
            ..request
        };
        let result = match self.dispatch(handler_request) {
            Ok(Dispatched::Value(value)) => Ok(value),
            Ok(Dispatched::Pushed) => self.run_pushed(),
            Err(err) => Err(err),
        };
        self.missing.pop();
        result.map(Dispatched::Value)
    }

    /// The error the default `method_missing` raises
    pub(crate) fn no_method_error(&self, recv: &Value, mid: Symbol, reason: MissingReason) -> VmError {
        let graph = self.runtime.graph();
        VmError::NoMethod {
            name: graph.symbol_name(mid),
            receiver: graph.describe_receiver(recv),
            reason,
        }
    }

    /// Method name from a symbol or string argument
    pub(crate) fn method_name(&self, value: &Value) -> VmResult<Symbol> {
        match value {
            Value::Symbol(sym) => Ok(*sym),
            Value::Str(s) => Ok(self.runtime.intern(s)),
            other => Err(VmError::Type(format!(
                "{} is not a symbol",
                self.runtime.graph().describe(other)
            ))),
        }
    }
}

/// Whether a tail call may replace `frame`.
///
/// The frame must stay live while a block passed along can still return
/// or break to it, or while one of its catch entries protects the call.
fn tail_reusable(frame: &CallFrame, block: Option<&Arc<Block>>) -> bool {
    if frame.kind != FrameKind::Method || frame.finish {
        return false;
    }
    let captured = block.is_some_and(|block| {
        block.lfp == Some(frame.lfp) || block.env.as_ref().is_some_and(|env| env.encloses(frame.dfp()))
    });
    !captured && !frame.catch_table().iter().any(|entry| entry.covers(frame.pc))
}
