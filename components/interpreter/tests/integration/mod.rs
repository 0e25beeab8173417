//! Integration tests: programs assembled by hand and run end to end

use std::sync::Arc;

use bytecode_system::{
    CallFlags, CatchKind, Iseq, IseqBuilder, IseqKind, Opcode, ParamShape, ThrowKind, Value, VmError, VmResult,
};
use core_types::{ClassId, ErrorKind, Symbol, Visibility, VmConfig};
use interpreter::{CacheStats, ForeignBridge, ForeignMethod, Runtime};
use object_model::well_known::{KERNEL, OBJECT};
use object_model::{Arity, MethodBody, NativeContext};

fn fixnums(values: &[i64]) -> Value {
    Value::array(values.iter().map(|n| Value::Fixnum(*n)).collect())
}

/// Body returning a constant
fn constant(name: &str, value: Value) -> Arc<Iseq> {
    let mut b = IseqBuilder::new(name, IseqKind::Method);
    b.emit(Opcode::PutObject(value)).emit(Opcode::Leave);
    b.build().unwrap()
}

/// Top-level body calling `mid` receiver-less
fn call_main(mid: Symbol) -> Arc<Iseq> {
    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf).send(mid, 0, CallFlags::FCALL).emit(Opcode::Leave);
    b.build().unwrap()
}

/// Block body `{ |x| <throw kind> x }`
fn throwing_block(kind: ThrowKind) -> Arc<Iseq> {
    let mut blk = IseqBuilder::new("block", IseqKind::Block);
    blk.params(ParamShape::lead(1))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::Throw(kind))
        .emit(Opcode::Leave);
    blk.build().unwrap()
}

// ============================================================================
// Non-local control
// ============================================================================

#[test]
fn test_return_from_block_inside_native_iterator() {
    let runtime = Runtime::new().unwrap();
    let m = runtime.intern("m");

    let mut body = IseqBuilder::new("m", IseqKind::Method);
    body.emit(Opcode::PutObject(fixnums(&[1, 2, 3])))
        .send_with_block(Symbol::EACH, 0, CallFlags::empty(), throwing_block(ThrowKind::Return))
        .emit(Opcode::PutObject(Value::Fixnum(99)))
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "m", body.build().unwrap(), Visibility::Public).unwrap();

    let mut vm = runtime.context();
    assert_eq!(vm.execute(&call_main(m)).unwrap(), Value::Fixnum(1));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_return_from_proc_after_method_returned() {
    let runtime = Runtime::new().unwrap();
    let make = runtime.intern("make");
    let proc_mid = runtime.intern("proc");

    let mut body = IseqBuilder::new("make", IseqKind::Method);
    body.emit(Opcode::PutSelf)
        .send_with_block(proc_mid, 0, CallFlags::FCALL, throwing_block(ThrowKind::Return))
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "make", body.build().unwrap(), Visibility::Public).unwrap();

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf)
        .send(make, 0, CallFlags::FCALL)
        .emit(Opcode::PutObject(Value::Fixnum(1)))
        .send(Symbol::CALL, 1, CallFlags::empty())
        .emit(Opcode::Leave);

    let mut vm = runtime.context();
    let err = vm.execute(&b.build().unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LocalJumpError);
    assert_eq!(err.to_string(), "unexpected return");
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_return_inside_lambda_is_local() {
    let runtime = Runtime::new().unwrap();
    let lambda = runtime.intern("lambda");
    let plus = runtime.intern("+");

    let mut blk = IseqBuilder::new("block", IseqKind::Block);
    blk.emit(Opcode::PutObject(Value::Fixnum(5)))
        .emit(Opcode::Throw(ThrowKind::Return))
        .emit(Opcode::Leave);

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf)
        .send_with_block(lambda, 0, CallFlags::FCALL, blk.build().unwrap())
        .send(Symbol::CALL, 0, CallFlags::empty())
        .emit(Opcode::PutObject(Value::Fixnum(1)))
        .send(plus, 1, CallFlags::empty())
        .emit(Opcode::Leave);

    let mut vm = runtime.context();
    assert_eq!(vm.execute(&b.build().unwrap()).unwrap(), Value::Fixnum(6));
}

#[test]
fn test_break_out_of_iterator() {
    let runtime = Runtime::new().unwrap();
    let times = runtime.intern("*");

    let mut blk = IseqBuilder::new("block", IseqKind::Block);
    blk.params(ParamShape::lead(1))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::PutObject(Value::Fixnum(100)))
        .send(times, 1, CallFlags::empty())
        .emit(Opcode::Throw(ThrowKind::Break))
        .emit(Opcode::Leave);

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    let (start, end) = (b.label(), b.label());
    b.emit(Opcode::PutObject(fixnums(&[1, 2, 3])))
        .bind(start)
        .send_with_block(Symbol::EACH, 0, CallFlags::empty(), blk.build().unwrap())
        .bind(end)
        .emit(Opcode::Leave)
        .catch_entry(CatchKind::Break, start, end, end, 0, None);

    let mut vm = runtime.context();
    assert_eq!(vm.execute(&b.build().unwrap()).unwrap(), Value::Fixnum(100));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_break_from_detached_proc() {
    let runtime = Runtime::new().unwrap();
    let proc_mid = runtime.intern("proc");

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf)
        .send_with_block(proc_mid, 0, CallFlags::FCALL, throwing_block(ThrowKind::Break))
        .emit(Opcode::PutObject(Value::Fixnum(1)))
        .send(Symbol::CALL, 1, CallFlags::empty())
        .emit(Opcode::Leave);

    let mut vm = runtime.context();
    let err = vm.execute(&b.build().unwrap()).unwrap_err();
    assert_eq!(err.to_string(), "break from proc-closure");
    assert!(!err.is_rescuable());
}

#[test]
fn test_retry_reenters_protected_region() {
    let runtime = Runtime::new().unwrap();
    let raise = runtime.intern("raise");
    let less = runtime.intern("<");
    let plus = runtime.intern("+");

    let mut clause = IseqBuilder::new("rescue in <main>", IseqKind::Rescue);
    clause
        .emit(Opcode::GetLocal { index: 0, level: 1 })
        .emit(Opcode::PutObject(Value::Fixnum(1)))
        .send(plus, 1, CallFlags::empty())
        .emit(Opcode::SetLocal { index: 0, level: 1 })
        .emit(Opcode::PutNil)
        .emit(Opcode::Throw(ThrowKind::Retry { level: 0 }))
        .emit(Opcode::Leave);

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    let (start, ok, end, cont) = (b.label(), b.label(), b.label(), b.label());
    b.locals(1)
        .emit(Opcode::PutObject(Value::Fixnum(0)))
        .emit(Opcode::SetLocal { index: 0, level: 0 })
        .bind(start)
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::PutObject(Value::Fixnum(2)))
        .send(less, 1, CallFlags::empty())
        .branch_unless(ok)
        .emit(Opcode::PutSelf)
        .emit(Opcode::PutObject(Value::string("again")))
        .send(raise, 1, CallFlags::FCALL)
        .bind(ok)
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .bind(end)
        .emit(Opcode::Leave)
        .bind(cont)
        .emit(Opcode::Leave)
        .catch_entry(CatchKind::Rescue, start, end, cont, 0, Some(clause.build().unwrap()))
        .catch_entry(CatchKind::Retry, end, cont, start, 0, None);

    let mut vm = runtime.context();
    assert_eq!(vm.execute(&b.build().unwrap()).unwrap(), Value::Fixnum(2));
}

#[test]
fn test_ensure_runs_on_nonlocal_return() {
    let runtime = Runtime::new().unwrap();
    let m = runtime.intern("m");
    let ensured = runtime.intern("@ensured");

    let mut clause = IseqBuilder::new("ensure in m", IseqKind::Ensure);
    clause
        .emit(Opcode::PutObject(Value::True))
        .emit(Opcode::SetIvar(ensured))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::Throw(ThrowKind::Continue))
        .emit(Opcode::PutNil)
        .emit(Opcode::Leave);

    let mut body = IseqBuilder::new("m", IseqKind::Method);
    let (start, end, cont) = (body.label(), body.label(), body.label());
    body.bind(start)
        .emit(Opcode::PutObject(fixnums(&[1, 2])))
        .send_with_block(Symbol::EACH, 0, CallFlags::empty(), throwing_block(ThrowKind::Return))
        .bind(end)
        .emit(Opcode::PutObject(Value::Fixnum(99)))
        .emit(Opcode::Leave)
        .bind(cont)
        .emit(Opcode::Leave)
        .catch_entry(CatchKind::Ensure, start, end, cont, 0, Some(clause.build().unwrap()));
    runtime.define_iseq(OBJECT, "m", body.build().unwrap(), Visibility::Public).unwrap();

    let mut vm = runtime.context();
    assert_eq!(vm.execute(&call_main(m)).unwrap(), Value::Fixnum(1));
    assert_eq!(runtime.graph().ivar_get(&runtime.main_object(), ensured), Value::True);
}

// ============================================================================
// Visibility and dispatch
// ============================================================================

fn class_with_ivar(runtime: &Runtime, name: &str) -> (ClassId, Symbol) {
    let class = runtime.define_class(name, None).unwrap();
    (class, runtime.intern("@x"))
}

#[test]
fn test_private_method_needs_receiverless_call() {
    let runtime = Runtime::new().unwrap();
    let (a, ivar) = class_with_ivar(&runtime, "A");
    let secret = runtime.intern("secret");
    runtime
        .define_method(a, secret, MethodBody::AttrReader(ivar), Visibility::Private)
        .unwrap();
    let obj = runtime.allocate(a).unwrap();
    runtime.graph_mut().ivar_set(&obj, ivar, Value::Fixnum(3)).unwrap();
    let mut vm = runtime.context();

    let err = vm.call(&obj, "secret", Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "private method `secret' called for #<A>");
    assert_eq!(err.kind(), ErrorKind::NoMethodError);

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf).send(secret, 0, CallFlags::FCALL).emit(Opcode::Leave);
    assert_eq!(vm.execute_with_self(&b.build().unwrap(), obj.clone()).unwrap(), Value::Fixnum(3));

    // send bypasses visibility
    assert_eq!(vm.call(&obj, "send", vec![Value::Symbol(secret)]).unwrap(), Value::Fixnum(3));
}

#[test]
fn test_variable_style_call_raises_name_error() {
    let runtime = Runtime::new().unwrap();
    let foo = runtime.intern("foo");
    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf)
        .send(foo, 0, CallFlags::FCALL | CallFlags::VCALL)
        .emit(Opcode::Leave);
    let mut vm = runtime.context();
    let err = vm.execute(&b.build().unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);
    assert!(err.to_string().starts_with("undefined local variable or method `foo' for "));
}

#[test]
fn test_protected_method_callable_from_same_class() {
    let runtime = Runtime::new().unwrap();
    let (a, ivar) = class_with_ivar(&runtime, "A");
    let prot = runtime.intern("prot");
    runtime
        .define_method(a, prot, MethodBody::AttrReader(ivar), Visibility::Protected)
        .unwrap();

    let mut peek = IseqBuilder::new("peek", IseqKind::Method);
    peek.params(ParamShape::lead(1))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .send(prot, 0, CallFlags::empty())
        .emit(Opcode::Leave);
    runtime.define_iseq(a, "peek", peek.build().unwrap(), Visibility::Public).unwrap();

    let first = runtime.allocate(a).unwrap();
    let second = runtime.allocate(a).unwrap();
    runtime.graph_mut().ivar_set(&second, ivar, Value::Fixnum(7)).unwrap();
    let mut vm = runtime.context();

    assert_eq!(vm.call(&first, "peek", vec![second.clone()]).unwrap(), Value::Fixnum(7));
    let err = vm.call(&second, "prot", Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "protected method `prot' called for #<A>");
}

#[test]
fn test_user_method_missing_receives_name_and_args() {
    let runtime = Runtime::new().unwrap();
    let a = runtime.define_class("A", None).unwrap();
    let mut handler = IseqBuilder::new("method_missing", IseqKind::Method);
    handler
        .params(ParamShape::lead(0).with_rest())
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::Leave);
    runtime
        .define_iseq(a, "method_missing", handler.build().unwrap(), Visibility::Private)
        .unwrap();
    let obj = runtime.allocate(a).unwrap();
    let zap = runtime.intern("zap");

    let mut vm = runtime.context();
    let value = vm.call(&obj, "zap", vec![Value::Fixnum(1)]).unwrap();
    assert_eq!(value, Value::array(vec![Value::Symbol(zap), Value::Fixnum(1)]));
}

#[test]
fn test_method_missing_reentered_for_same_call() {
    let runtime = Runtime::new().unwrap();
    let a = runtime.define_class("A", None).unwrap();
    let zap = runtime.intern("zap");
    let mut handler = IseqBuilder::new("method_missing", IseqKind::Method);
    handler
        .params(ParamShape::lead(0).with_rest())
        .emit(Opcode::PutSelf)
        .send(zap, 0, CallFlags::FCALL)
        .emit(Opcode::Leave);
    runtime
        .define_iseq(a, "method_missing", handler.build().unwrap(), Visibility::Private)
        .unwrap();
    let obj = runtime.allocate(a).unwrap();

    let mut vm = runtime.context();
    let err = vm.call(&obj, "zap", Vec::new()).unwrap_err();
    assert!(matches!(err, VmError::InternalInvariant(_)));
    assert_eq!(err.to_string(), "[BUG] method_missing re-entered for `zap'");
    assert!(err.is_fatal());
    assert_eq!(vm.depth(), 0);

    // the guard is released once the failed call has unwound
    let err = vm.call(&obj, "zap", Vec::new()).unwrap_err();
    assert!(matches!(err, VmError::InternalInvariant(_)));
}

#[test]
fn test_super_without_superclass_method() {
    let runtime = Runtime::new().unwrap();
    let a = runtime.define_class("A", None).unwrap();
    let mut m = IseqBuilder::new("m", IseqKind::Method);
    m.invoke_super(0, CallFlags::empty(), None).emit(Opcode::Leave);
    runtime.define_iseq(a, "m", m.build().unwrap(), Visibility::Public).unwrap();
    let obj = runtime.allocate(a).unwrap();

    let mut vm = runtime.context();
    let err = vm.call(&obj, "m", Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "super: no superclass method `m' for #<A>");
}

#[test]
fn test_super_reaches_included_module() {
    let runtime = Runtime::new().unwrap();
    let plus = runtime.intern("+");
    let module = runtime.define_module("M").unwrap();
    runtime
        .define_iseq(module, "m", constant("m", Value::Fixnum(10)), Visibility::Public)
        .unwrap();

    let b_class = runtime.define_class("B", None).unwrap();
    runtime.include_module(b_class, module).unwrap();
    let mut m = IseqBuilder::new("m", IseqKind::Method);
    m.invoke_super(0, CallFlags::empty(), None)
        .emit(Opcode::PutObject(Value::Fixnum(1)))
        .send(plus, 1, CallFlags::empty())
        .emit(Opcode::Leave);
    runtime.define_iseq(b_class, "m", m.build().unwrap(), Visibility::Public).unwrap();

    let obj = runtime.allocate(b_class).unwrap();
    let mut vm = runtime.context();
    assert_eq!(vm.call(&obj, "m", Vec::new()).unwrap(), Value::Fixnum(11));
    assert_eq!(runtime.ancestors(b_class)[..2], [b_class, module]);
}

#[test]
fn test_class_new_runs_initialize() {
    let runtime = Runtime::new().unwrap();
    let p = runtime.define_class("P", None).unwrap();
    let ivar = runtime.intern("@v");
    let reader = runtime.intern("v");

    let mut init = IseqBuilder::new("initialize", IseqKind::Method);
    init.params(ParamShape::lead(1))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::SetIvar(ivar))
        .emit(Opcode::PutNil)
        .emit(Opcode::Leave);
    runtime.define_iseq(p, "initialize", init.build().unwrap(), Visibility::Public).unwrap();
    runtime
        .graph_mut()
        .define_attr(p, ivar, Some(reader), None, Visibility::Public)
        .unwrap();

    let mut vm = runtime.context();
    let obj = vm.call(&Value::Class(p), "new", vec![Value::Fixnum(5)]).unwrap();
    assert_eq!(vm.call(&obj, "v", Vec::new()).unwrap(), Value::Fixnum(5));
    // initialize is forced private
    assert!(vm.call(&obj, "initialize", vec![Value::Nil]).is_err());
}

// ============================================================================
// Inline caches
// ============================================================================

#[test]
fn test_redefinition_invalidates_call_site() {
    let runtime = Runtime::new().unwrap();
    let foo = runtime.intern("foo");
    runtime
        .define_iseq(OBJECT, "foo", constant("foo", Value::Fixnum(1)), Visibility::Public)
        .unwrap();
    let program = call_main(foo);
    let mut vm = runtime.context();

    assert_eq!(vm.execute(&program).unwrap(), Value::Fixnum(1));
    assert_eq!(vm.execute(&program).unwrap(), Value::Fixnum(1));
    runtime
        .define_iseq(OBJECT, "foo", constant("foo", Value::Fixnum(2)), Visibility::Public)
        .unwrap();
    assert_eq!(vm.execute(&program).unwrap(), Value::Fixnum(2));

    assert_eq!(
        vm.cache_stats(),
        CacheStats {
            hits: 1,
            misses: 2,
            invalidations: 1,
        }
    );
}

#[test]
fn test_include_invalidates_call_site() {
    let runtime = Runtime::new().unwrap();
    let greet = runtime.intern("greet");
    runtime
        .define_iseq(OBJECT, "greet", constant("greet", Value::Fixnum(1)), Visibility::Public)
        .unwrap();
    let a = runtime.define_class("A", None).unwrap();
    let obj = runtime.allocate(a).unwrap();

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf).send(greet, 0, CallFlags::empty()).emit(Opcode::Leave);
    let program = b.build().unwrap();
    let mut vm = runtime.context();
    assert_eq!(vm.execute_with_self(&program, obj.clone()).unwrap(), Value::Fixnum(1));

    let module = runtime.define_module("Loud").unwrap();
    runtime
        .define_iseq(module, "greet", constant("greet", Value::Fixnum(2)), Visibility::Public)
        .unwrap();
    runtime.include_module(a, module).unwrap();
    assert_eq!(vm.execute_with_self(&program, obj).unwrap(), Value::Fixnum(2));
}

// ============================================================================
// Foreign bridge
// ============================================================================

struct PingBridge {
    ping: Symbol,
}

impl ForeignBridge for PingBridge {
    fn resolve(&self, _: ClassId, mid: Symbol) -> Option<ForeignMethod> {
        (mid == self.ping).then(|| ForeignMethod {
            arity: Arity::Fixed(0),
            func: Arc::new(|_: &mut dyn NativeContext, _: &Value, _: &[Value]| -> VmResult<Value> {
                Ok(Value::string("pong"))
            }),
        })
    }
}

#[test]
fn test_foreign_bridge_supplies_methods() {
    let runtime = Runtime::new().unwrap();
    let f = runtime.define_class("Remote", None).unwrap();
    runtime.graph_mut().mark_foreign(f);
    runtime.set_bridge(Arc::new(PingBridge {
        ping: runtime.intern("ping"),
    }));
    let obj = runtime.allocate(f).unwrap();

    let mut vm = runtime.context();
    assert_eq!(vm.call(&obj, "ping", Vec::new()).unwrap(), Value::string("pong"));
    let err = vm.call(&obj, "pong", Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMethodError);

    // ordinary classes never consult the bridge
    let plain = runtime.allocate(OBJECT).unwrap();
    assert!(vm.call(&plain, "ping", Vec::new()).is_err());
}

// ============================================================================
// Stack bounds
// ============================================================================

fn recursive(name: &str, mid: Symbol) -> Arc<Iseq> {
    let mut b = IseqBuilder::new(name, IseqKind::Method);
    b.emit(Opcode::PutSelf).send(mid, 0, CallFlags::FCALL).emit(Opcode::Leave);
    b.build().unwrap()
}

#[test]
fn test_unbounded_recursion_overflows() {
    let config = VmConfig {
        max_frame_depth: 50,
        ..VmConfig::default()
    };
    let runtime = Runtime::with_config(config).unwrap();
    let down = runtime.intern("down");
    runtime.define_iseq(OBJECT, "down", recursive("down", down), Visibility::Public).unwrap();

    let mut vm = runtime.context();
    let err = vm.call(&runtime.main_object(), "down", Vec::new()).unwrap_err();
    assert!(matches!(err, VmError::StackOverflow { limit: 50 }));
    assert_eq!(err.to_string(), "stack level too deep");
    assert!(err.is_fatal());
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_tail_call_reuses_frame() {
    let config = VmConfig {
        max_frame_depth: 20,
        ..VmConfig::default()
    };
    let runtime = Runtime::with_config(config).unwrap();
    let count = runtime.intern("count");
    let greater = runtime.intern(">");
    let minus = runtime.intern("-");

    let mut b = IseqBuilder::new("count", IseqKind::Method);
    let done = b.label();
    b.params(ParamShape::lead(1))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::PutObject(Value::Fixnum(0)))
        .send(greater, 1, CallFlags::empty())
        .branch_unless(done)
        .emit(Opcode::PutSelf)
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::PutObject(Value::Fixnum(1)))
        .send(minus, 1, CallFlags::empty())
        .send(count, 1, CallFlags::FCALL | CallFlags::TAILCALL)
        .emit(Opcode::Leave)
        .bind(done)
        .emit(Opcode::PutObject(Value::Fixnum(7)))
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "count", b.build().unwrap(), Visibility::Public).unwrap();

    let mut vm = runtime.context();
    let value = vm.call(&runtime.main_object(), "count", vec![Value::Fixnum(100)]).unwrap();
    assert_eq!(value, Value::Fixnum(7));
}

#[test]
fn test_native_reentry_is_bounded() {
    let config = VmConfig {
        max_native_depth: 16,
        ..VmConfig::default()
    };
    let runtime = Runtime::with_config(config).unwrap();
    let r = runtime.intern("r");

    // def r; [1].each { r }; end
    let mut blk = IseqBuilder::new("block in r", IseqKind::Block);
    blk.emit(Opcode::PutSelf).send(r, 0, CallFlags::FCALL).emit(Opcode::Leave);
    let mut body = IseqBuilder::new("r", IseqKind::Method);
    body.emit(Opcode::PutObject(fixnums(&[1])))
        .send_with_block(Symbol::EACH, 0, CallFlags::empty(), blk.build().unwrap())
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "r", body.build().unwrap(), Visibility::Public).unwrap();

    let mut vm = runtime.context();
    let err = vm.execute(&call_main(r)).unwrap_err();
    assert!(matches!(err, VmError::StackOverflow { limit: 16 }));
    assert_eq!(err.to_string(), "stack level too deep");
    assert!(err.is_fatal());
    assert_eq!(vm.depth(), 0);

    // the context stays usable after the overflow
    assert_eq!(vm.call(&Value::Fixnum(2), "+", vec![Value::Fixnum(3)]).unwrap(), Value::Fixnum(5));
}

#[test]
fn test_method_missing_nesting_is_bounded() {
    let config = VmConfig {
        max_native_depth: 8,
        ..VmConfig::default()
    };
    let runtime = Runtime::with_config(config).unwrap();
    let a = runtime.define_class("A", None).unwrap();
    let new = runtime.intern("new");
    let next = runtime.intern("next");

    // def method_missing(*) = A.new.next
    let mut handler = IseqBuilder::new("method_missing", IseqKind::Method);
    handler
        .params(ParamShape::lead(0).with_rest())
        .emit(Opcode::PutObject(Value::Class(a)))
        .send(new, 0, CallFlags::empty())
        .send(next, 0, CallFlags::empty())
        .emit(Opcode::Leave);
    runtime
        .define_iseq(a, "method_missing", handler.build().unwrap(), Visibility::Private)
        .unwrap();
    let obj = runtime.allocate(a).unwrap();

    let mut vm = runtime.context();
    let err = vm.call(&obj, "start", Vec::new()).unwrap_err();
    assert!(matches!(err, VmError::StackOverflow { limit: 8 }));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_tail_call_keeps_frame_a_block_returns_to() {
    let runtime = Runtime::new().unwrap();
    let m = runtime.intern("m");
    let n = runtime.intern("n");
    let plus = runtime.intern("+");

    // def n; yield 5; end
    let mut yielder = IseqBuilder::new("n", IseqKind::Method);
    yielder
        .emit(Opcode::PutObject(Value::Fixnum(5)))
        .emit(Opcode::InvokeBlock { argc: 1, splat: false })
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "n", yielder.build().unwrap(), Visibility::Public).unwrap();

    // def m; n { |x| return x }; end
    let mut body = IseqBuilder::new("m", IseqKind::Method);
    body.emit(Opcode::PutSelf)
        .send_with_block(n, 0, CallFlags::FCALL | CallFlags::TAILCALL, throwing_block(ThrowKind::Return))
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "m", body.build().unwrap(), Visibility::Public).unwrap();

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf)
        .send(m, 0, CallFlags::FCALL)
        .emit(Opcode::PutObject(Value::Fixnum(1)))
        .send(plus, 1, CallFlags::empty())
        .emit(Opcode::Leave);

    let mut vm = runtime.context();
    assert_eq!(vm.execute(&b.build().unwrap()).unwrap(), Value::Fixnum(6));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_tail_call_keeps_frame_a_block_breaks_to() {
    let runtime = Runtime::new().unwrap();
    let m = runtime.intern("m");
    let n = runtime.intern("n");

    let mut yielder = IseqBuilder::new("n", IseqKind::Method);
    yielder
        .emit(Opcode::PutObject(Value::Fixnum(5)))
        .emit(Opcode::InvokeBlock { argc: 1, splat: false })
        .emit(Opcode::PutObject(Value::Fixnum(0)))
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "n", yielder.build().unwrap(), Visibility::Public).unwrap();

    // def m; n { |x| break x }; end
    let mut body = IseqBuilder::new("m", IseqKind::Method);
    let (start, end) = (body.label(), body.label());
    body.emit(Opcode::PutSelf)
        .bind(start)
        .send_with_block(n, 0, CallFlags::FCALL | CallFlags::TAILCALL, throwing_block(ThrowKind::Break))
        .bind(end)
        .emit(Opcode::Leave)
        .catch_entry(CatchKind::Break, start, end, end, 0, None);
    runtime.define_iseq(OBJECT, "m", body.build().unwrap(), Visibility::Public).unwrap();

    let mut vm = runtime.context();
    assert_eq!(vm.execute(&call_main(m)).unwrap(), Value::Fixnum(5));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_tail_call_inside_rescue_keeps_frame() {
    let runtime = Runtime::new().unwrap();
    let raise = runtime.intern("raise");
    let boom = runtime.intern("boom");
    let m = runtime.intern("m");

    let mut failing = IseqBuilder::new("boom", IseqKind::Method);
    failing
        .emit(Opcode::PutSelf)
        .emit(Opcode::PutObject(Value::string("boom")))
        .send(raise, 1, CallFlags::FCALL)
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "boom", failing.build().unwrap(), Visibility::Public).unwrap();

    // def m; begin; boom; rescue; 4; end; end
    let mut clause = IseqBuilder::new("rescue in m", IseqKind::Rescue);
    clause.emit(Opcode::PutObject(Value::Fixnum(4))).emit(Opcode::Leave);
    let mut body = IseqBuilder::new("m", IseqKind::Method);
    let (start, end, cont) = (body.label(), body.label(), body.label());
    body.bind(start)
        .emit(Opcode::PutSelf)
        .send(boom, 0, CallFlags::FCALL | CallFlags::TAILCALL)
        .bind(end)
        .emit(Opcode::Leave)
        .bind(cont)
        .emit(Opcode::Leave)
        .catch_entry(CatchKind::Rescue, start, end, cont, 0, Some(clause.build().unwrap()));
    runtime.define_iseq(OBJECT, "m", body.build().unwrap(), Visibility::Public).unwrap();

    let mut vm = runtime.context();
    assert_eq!(vm.execute(&call_main(m)).unwrap(), Value::Fixnum(4));
    assert_eq!(vm.depth(), 0);
}

// ============================================================================
// Argument binding
// ============================================================================

#[test]
fn test_method_arity_is_strict() {
    let runtime = Runtime::new().unwrap();
    let mut b = IseqBuilder::new("two", IseqKind::Method);
    b.params(ParamShape::lead(2)).emit(Opcode::PutNil).emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "two", b.build().unwrap(), Visibility::Public).unwrap();

    let mut vm = runtime.context();
    let err = vm.call(&runtime.main_object(), "two", vec![Value::Nil]).unwrap_err();
    assert_eq!(err.to_string(), "wrong number of arguments (1 for 2)");
    assert_eq!(err.kind().name(), "ArgumentError");
}

#[test]
fn test_optional_argument_defaults() {
    let runtime = Runtime::new().unwrap();
    let plus = runtime.intern("+");
    let mut b = IseqBuilder::new("opt", IseqKind::Method);
    let (fill, body) = (b.label(), b.label());
    b.params(ParamShape::lead(1))
        .optional(&[fill, body])
        .bind(fill)
        .emit(Opcode::PutObject(Value::Fixnum(10)))
        .emit(Opcode::SetLocal { index: 1, level: 0 })
        .bind(body)
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::GetLocal { index: 1, level: 0 })
        .send(plus, 1, CallFlags::empty())
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "opt", b.build().unwrap(), Visibility::Public).unwrap();

    let main = runtime.main_object();
    let mut vm = runtime.context();
    assert_eq!(vm.call(&main, "opt", vec![Value::Fixnum(1)]).unwrap(), Value::Fixnum(11));
    assert_eq!(
        vm.call(&main, "opt", vec![Value::Fixnum(1), Value::Fixnum(2)]).unwrap(),
        Value::Fixnum(3)
    );
    assert!(vm.call(&main, "opt", Vec::new()).is_err());
}

#[test]
fn test_yielded_array_spreads_over_block_params() {
    let runtime = Runtime::new().unwrap();
    let pair = runtime.intern("pair");
    let minus = runtime.intern("-");

    let mut m = IseqBuilder::new("pair", IseqKind::Method);
    m.emit(Opcode::PutObject(fixnums(&[1, 2])))
        .emit(Opcode::InvokeBlock { argc: 1, splat: false })
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "pair", m.build().unwrap(), Visibility::Public).unwrap();

    let mut blk = IseqBuilder::new("block", IseqKind::Block);
    blk.params(ParamShape::lead(2))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::GetLocal { index: 1, level: 0 })
        .send(minus, 1, CallFlags::empty())
        .emit(Opcode::Leave);

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf)
        .send_with_block(pair, 0, CallFlags::FCALL, blk.build().unwrap())
        .emit(Opcode::Leave);
    let mut vm = runtime.context();
    assert_eq!(vm.execute(&b.build().unwrap()).unwrap(), Value::Fixnum(-1));
}

#[test]
fn test_define_method_closure_sees_defining_scope() {
    let runtime = Runtime::new().unwrap();
    let a = runtime.define_class("A", None).unwrap();
    let define_method = runtime.intern("define_method");
    let get = runtime.intern("get");

    let mut blk = IseqBuilder::new("block", IseqKind::Block);
    blk.emit(Opcode::GetLocal { index: 0, level: 1 }).emit(Opcode::Leave);

    let mut b = IseqBuilder::new("<class:A>", IseqKind::Top);
    b.locals(1)
        .emit(Opcode::PutObject(Value::Fixnum(10)))
        .emit(Opcode::SetLocal { index: 0, level: 0 })
        .emit(Opcode::PutSelf)
        .emit(Opcode::PutObject(Value::Symbol(get)))
        .send_with_block(define_method, 1, CallFlags::FCALL, blk.build().unwrap())
        .emit(Opcode::Leave);

    let mut vm = runtime.context();
    assert_eq!(vm.execute_with_self(&b.build().unwrap(), Value::Class(a)).unwrap(), Value::Symbol(get));

    let obj = runtime.allocate(a).unwrap();
    assert_eq!(vm.call(&obj, "get", Vec::new()).unwrap(), Value::Fixnum(10));
    // closures bound as methods check arity like lambdas
    let err = vm.call(&obj, "get", vec![Value::Nil]).unwrap_err();
    assert_eq!(err.to_string(), "wrong number of arguments (1 for 0)");
}

#[test]
fn test_splat_with_block_argument() {
    let runtime = Runtime::new().unwrap();
    let collect = runtime.intern("collect");
    let proc_mid = runtime.intern("proc");

    // def collect(a, b, c); yield a, b, c; end
    let mut m = IseqBuilder::new("collect", IseqKind::Method);
    m.params(ParamShape::lead(3))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::GetLocal { index: 1, level: 0 })
        .emit(Opcode::GetLocal { index: 2, level: 0 })
        .emit(Opcode::InvokeBlock { argc: 3, splat: false })
        .emit(Opcode::Leave);
    runtime.define_iseq(OBJECT, "collect", m.build().unwrap(), Visibility::Public).unwrap();

    // { |x, y, z| [z, y, x] }
    let mut blk = IseqBuilder::new("block", IseqKind::Block);
    blk.params(ParamShape::lead(3))
        .emit(Opcode::GetLocal { index: 2, level: 0 })
        .emit(Opcode::GetLocal { index: 1, level: 0 })
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::NewArray(3))
        .emit(Opcode::Leave);

    // collect(1, *[2, 3], &proc { ... })
    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.emit(Opcode::PutSelf)
        .emit(Opcode::PutObject(Value::Fixnum(1)))
        .emit(Opcode::PutObject(fixnums(&[2, 3])))
        .emit(Opcode::PutSelf)
        .send_with_block(proc_mid, 0, CallFlags::FCALL, blk.build().unwrap())
        .send(collect, 2, CallFlags::FCALL | CallFlags::SPLAT | CallFlags::BLOCKARG)
        .emit(Opcode::Leave);

    let mut vm = runtime.context();
    assert_eq!(vm.execute(&b.build().unwrap()).unwrap(), fixnums(&[3, 2, 1]));
}

// ============================================================================
// Trust levels
// ============================================================================

#[test]
fn test_insecure_method_rejected() {
    let runtime = Runtime::new().unwrap();
    let m = runtime.intern("m");
    runtime
        .graph_mut()
        .define_method_at(
            OBJECT,
            m,
            MethodBody::Interpreted(constant("m", Value::Nil)),
            Visibility::Public,
            3,
        )
        .unwrap();

    let mut vm = runtime.context();
    let err = vm.call(&runtime.main_object(), "m", Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "calling insecure method: m");
    assert_eq!(err.kind(), ErrorKind::SecurityError);

    vm.set_safe_level(3).unwrap();
    assert_eq!(vm.call(&runtime.main_object(), "m", Vec::new()).unwrap(), Value::Nil);
}

#[test]
fn test_kernel_module_reachable_from_objects() {
    let runtime = Runtime::new().unwrap();
    let ancestors = runtime.ancestors(OBJECT);
    assert!(ancestors.contains(&KERNEL));
    let mut vm = runtime.context();
    let value = vm
        .call(&Value::Fixnum(3), "respond_to?", vec![Value::string("times")])
        .unwrap();
    assert_eq!(value, Value::True);
}
