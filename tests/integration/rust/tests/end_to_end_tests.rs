//! End-to-End Program Tests
//!
//! Whole programs: class bodies defining methods, instantiation through
//! `Class#new`, `super` chains, and blocks yielding back through a
//! user-defined iterator.

use std::sync::Arc;

use bytecode_system::{CallFlags, DefineTarget, Iseq, IseqBuilder, IseqKind, Opcode, ParamShape, Value};
use core_types::{ClassId, ErrorKind, Symbol, Visibility};
use interpreter::{Runtime, Vm};
use object_model::well_known::{BASIC_OBJECT, KERNEL, OBJECT};

fn define(name: Symbol, body: Arc<Iseq>) -> Opcode {
    Opcode::DefineMethod {
        name,
        body,
        target: DefineTarget::Lexical(Visibility::Public),
    }
}

/// ```text
/// class Stack
///   attr_reader :items
///   def initialize; @items = []; end
///   def push(x); @items << x; self; end
///   def each; @items.each { |x| yield x }; end
/// end
/// ```
fn stack_body(runtime: &Runtime) -> Arc<Iseq> {
    let items = runtime.intern("@items");
    let shovel = runtime.intern("<<");

    let mut init = IseqBuilder::new("initialize", IseqKind::Method);
    init.emit(Opcode::NewArray(0))
        .emit(Opcode::SetIvar(items))
        .emit(Opcode::PutNil)
        .emit(Opcode::Leave);

    let mut push = IseqBuilder::new("push", IseqKind::Method);
    push.params(ParamShape::lead(1))
        .emit(Opcode::GetIvar(items))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .send(shovel, 1, CallFlags::empty())
        .emit(Opcode::Pop)
        .emit(Opcode::PutSelf)
        .emit(Opcode::Leave);

    let mut relay = IseqBuilder::new("block in each", IseqKind::Block);
    relay
        .params(ParamShape::lead(1))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::InvokeBlock { argc: 1, splat: false })
        .emit(Opcode::Leave);

    let mut each = IseqBuilder::new("each", IseqKind::Method);
    each.emit(Opcode::GetIvar(items))
        .send_with_block(Symbol::EACH, 0, CallFlags::empty(), relay.build().unwrap())
        .emit(Opcode::Leave);

    let mut body = IseqBuilder::new("<class:Stack>", IseqKind::Top);
    body.emit(Opcode::PutSelf)
        .emit(Opcode::PutObject(Value::Symbol(runtime.intern("items"))))
        .send(runtime.intern("attr_reader"), 1, CallFlags::FCALL)
        .emit(Opcode::Pop)
        .emit(define(runtime.intern("initialize"), init.build().unwrap()))
        .emit(Opcode::Pop)
        .emit(define(runtime.intern("push"), push.build().unwrap()))
        .emit(Opcode::Pop)
        .emit(define(Symbol::EACH, each.build().unwrap()))
        .emit(Opcode::Pop)
        .emit(Opcode::PutNil)
        .emit(Opcode::Leave);
    body.build().unwrap()
}

/// ```text
/// class Doubling < Stack
///   def push(x); super(x * 2); end
/// end
/// ```
fn doubling_body(runtime: &Runtime) -> Arc<Iseq> {
    let mut push = IseqBuilder::new("push", IseqKind::Method);
    push.params(ParamShape::lead(1))
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .emit(Opcode::PutObject(Value::Fixnum(2)))
        .send(runtime.intern("*"), 1, CallFlags::empty())
        .invoke_super(1, CallFlags::empty(), None)
        .emit(Opcode::Leave);

    let mut body = IseqBuilder::new("<class:Doubling>", IseqKind::Top);
    body.emit(define(runtime.intern("push"), push.build().unwrap()))
        .emit(Opcode::Leave);
    body.build().unwrap()
}

fn boot(runtime: &Arc<Runtime>) -> (Vm, ClassId, ClassId) {
    let stack = runtime.define_class("Stack", None).unwrap();
    let doubling = runtime.define_class("Doubling", Some(stack)).unwrap();
    let mut vm = runtime.context();
    vm.execute_with_self(&stack_body(runtime), Value::Class(stack)).unwrap();
    vm.execute_with_self(&doubling_body(runtime), Value::Class(doubling)).unwrap();
    (vm, stack, doubling)
}

/// ```text
/// s = Doubling.new
/// s.push(1).push(2).push(3)
/// sum = 0
/// s.each { |x| sum = sum + x }
/// sum
/// ```
fn summing_main(runtime: &Runtime, class: ClassId) -> Arc<Iseq> {
    let push = runtime.intern("push");

    let mut blk = IseqBuilder::new("block in <main>", IseqKind::Block);
    blk.params(ParamShape::lead(1))
        .emit(Opcode::GetLocal { index: 1, level: 1 })
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .send(runtime.intern("+"), 1, CallFlags::empty())
        .emit(Opcode::SetLocal { index: 1, level: 1 })
        .emit(Opcode::PutNil)
        .emit(Opcode::Leave);

    let mut b = IseqBuilder::new("<main>", IseqKind::Top);
    b.locals(2)
        .emit(Opcode::PutObject(Value::Class(class)))
        .send(runtime.intern("new"), 0, CallFlags::empty())
        .emit(Opcode::SetLocal { index: 0, level: 0 })
        .emit(Opcode::GetLocal { index: 0, level: 0 });
    for n in 1..=3 {
        b.emit(Opcode::PutObject(Value::Fixnum(n))).send(push, 1, CallFlags::empty());
    }
    b.emit(Opcode::Pop)
        .emit(Opcode::PutObject(Value::Fixnum(0)))
        .emit(Opcode::SetLocal { index: 1, level: 0 })
        .emit(Opcode::GetLocal { index: 0, level: 0 })
        .send_with_block(Symbol::EACH, 0, CallFlags::empty(), blk.build().unwrap())
        .emit(Opcode::Pop)
        .emit(Opcode::GetLocal { index: 1, level: 0 })
        .emit(Opcode::Leave);
    b.build().unwrap()
}

/// Test: a user iterator yields through a native one
#[test]
fn test_stack_program_sums_items() {
    let runtime = Runtime::new().unwrap();
    let (mut vm, stack, _) = boot(&runtime);
    assert_eq!(vm.execute(&summing_main(&runtime, stack)).unwrap(), Value::Fixnum(6));
    assert_eq!(vm.depth(), 0);
}

/// Test: the subclass override reaches the parent through super
#[test]
fn test_super_chain_transforms_arguments() {
    let runtime = Runtime::new().unwrap();
    let (mut vm, _, doubling) = boot(&runtime);
    assert_eq!(vm.execute(&summing_main(&runtime, doubling)).unwrap(), Value::Fixnum(12));

    let s = vm.call(&Value::Class(doubling), "new", Vec::new()).unwrap();
    vm.call(&s, "push", vec![Value::Fixnum(5)]).unwrap();
    assert_eq!(
        vm.call(&s, "items", Vec::new()).unwrap(),
        Value::array(vec![Value::Fixnum(10)])
    );
}

/// Test: the built classes report the expected shape
#[test]
fn test_reflection_over_built_classes() {
    let runtime = Runtime::new().unwrap();
    let (mut vm, stack, doubling) = boot(&runtime);

    assert_eq!(runtime.ancestors(doubling), vec![doubling, stack, OBJECT, KERNEL, BASIC_OBJECT]);
    let own = vm.call(&Value::Class(doubling), "instance_methods", vec![Value::False]).unwrap();
    assert_eq!(own, Value::array(vec![Value::Symbol(runtime.intern("push"))]));
    assert_eq!(
        vm.call(&Value::Class(doubling), "superclass", Vec::new()).unwrap(),
        Value::Class(stack)
    );

    let s = vm.call(&Value::Class(stack), "new", Vec::new()).unwrap();
    assert_eq!(vm.call(&s, "is_a?", vec![Value::Class(stack)]).unwrap(), Value::True);
    assert_eq!(vm.call(&s, "is_a?", vec![Value::Class(doubling)]).unwrap(), Value::False);
}

/// Test: calling the iterator without a block fails inside the relay
#[test]
fn test_iterator_without_block() {
    let runtime = Runtime::new().unwrap();
    let (mut vm, stack, _) = boot(&runtime);
    let s = vm.call(&Value::Class(stack), "new", Vec::new()).unwrap();
    vm.call(&s, "push", vec![Value::Fixnum(1)]).unwrap();

    let err = vm.call(&s, "each", Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LocalJumpError);
    assert_eq!(err.to_string(), "no block given (yield)");
    assert_eq!(vm.depth(), 0);

    // an empty stack never reaches the yield
    let empty = vm.call(&Value::Class(stack), "new", Vec::new()).unwrap();
    assert_eq!(vm.call(&empty, "each", Vec::new()).unwrap(), Value::array(Vec::new()));
}

/// Test: initialize stays private after the class body ran
#[test]
fn test_initialize_is_private() {
    let runtime = Runtime::new().unwrap();
    let (mut vm, stack, _) = boot(&runtime);
    let s = vm.call(&Value::Class(stack), "new", Vec::new()).unwrap();
    let err = vm.call(&s, "initialize", Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMethodError);
    assert_eq!(err.to_string(), "private method `initialize' called for #<Stack>");
}
