//! Contract tests: what the interpreter relies on from the object model

use std::sync::Arc;

use bytecode_system::{Value, VmResult};
use core_types::{SymbolTable, Visibility};
use object_model::well_known::*;
use object_model::{Arity, ClassGraph, MethodBody, NativeContext, NativeFn, NativeMethod, StateVersion, MAX_NATIVE_ARITY};
use parking_lot::RwLock;

fn graph() -> ClassGraph {
    ClassGraph::new(
        Arc::new(StateVersion::new()),
        Arc::new(RwLock::new(SymbolTable::new())),
    )
}

#[test]
fn test_contract_graph_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ClassGraph>();
    assert_send_sync::<StateVersion>();
    assert_send_sync::<MethodBody>();
}

#[test]
fn test_contract_special_constants_resolve_without_heap() {
    let g = graph();
    assert_eq!(g.class_of(&Value::Nil), NIL_CLASS);
    assert_eq!(g.class_of(&Value::True), TRUE_CLASS);
    assert_eq!(g.class_of(&Value::False), FALSE_CLASS);
    assert_eq!(g.class_of(&Value::Fixnum(-4)), INTEGER);
    assert!(g.heap().is_empty());
}

#[test]
fn test_contract_every_mutation_advances_version() {
    let mut g = graph();
    let sym = g.symbols().write().intern("m");
    let alias = g.symbols().write().intern("n");
    let mut last = g.version().current();
    let mut step = |g: &ClassGraph| {
        let now = g.version().current();
        assert!(now > last, "version did not advance");
        last = now;
    };

    let c = g.create_class(Some("C"), None).unwrap();
    step(&g);
    g.define_method(c, sym, MethodBody::AttrReader(sym), Visibility::Public).unwrap();
    step(&g);
    g.alias_method(c, alias, sym).unwrap();
    step(&g);
    g.undef_method(c, alias).unwrap();
    step(&g);
    let m = g.create_module(Some("M"));
    g.include_module(c, m).unwrap();
    step(&g);
    let obj = g.allocate(c).unwrap();
    g.singleton_class_of(&obj).unwrap();
    step(&g);
}

#[test]
fn test_contract_native_arity_ceiling() {
    let func: NativeFn =
        Arc::new(|_: &mut dyn NativeContext, _: &Value, _: &[Value]| -> VmResult<Value> { Ok(Value::Nil) });
    assert!(NativeMethod::new("max", Arity::Fixed(MAX_NATIVE_ARITY), func.clone()).is_ok());
    assert!(NativeMethod::new("over", Arity::Fixed(MAX_NATIVE_ARITY + 1), func).is_err());
}

#[test]
fn test_contract_singleton_identity() {
    let mut g = graph();
    let c = g.create_class(Some("C"), None).unwrap();
    let a = g.allocate(c).unwrap();
    let b = g.allocate(c).unwrap();
    let sa = g.singleton_class_of(&a).unwrap();
    assert_eq!(g.singleton_class_of(&a).unwrap(), sa);
    assert_ne!(g.singleton_class_of(&b).unwrap(), sa);
    assert_eq!(g.existing_singleton(&a), Some(sa));
}
