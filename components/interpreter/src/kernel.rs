//! Core natives
//!
//! The minimal method set every runtime boots with: object identity and
//! `method_missing` on `BasicObject`, reflection and `send` in `Kernel`,
//! the class-mutation API on `Module`, instantiation on `Class`, and enough
//! of `Proc`, `Array` and `Integer` to drive blocks from native code.

use std::sync::Arc;

use bytecode_system::{Proc, Value, VmError, VmResult};
use core_types::{ClassId, Symbol, Visibility, VisibilityFilter};
use object_model::well_known::{ARRAY, BASIC_OBJECT, CLASS, EXCEPTION, INTEGER, KERNEL, MODULE, PROC};
use object_model::{Arity, ClassGraph, MethodBody, NativeContext, NativeFn, NativeHint, NativeMethod};

use crate::arguments::scan_args;

type Body = fn(&mut dyn NativeContext, &Value, &[Value]) -> VmResult<Value>;

fn def(graph: &mut ClassGraph, class: ClassId, name: &'static str, arity: Arity, visibility: Visibility, body: Body) -> VmResult<()> {
    def_hinted(graph, class, name, arity, visibility, NativeHint::None, body)
}

fn def_hinted(
    graph: &mut ClassGraph,
    class: ClassId,
    name: &'static str,
    arity: Arity,
    visibility: Visibility,
    hint: NativeHint,
    body: Body,
) -> VmResult<()> {
    let func: NativeFn = Arc::new(body);
    let native = NativeMethod::new(name, arity, func)?.with_hint(hint);
    let mid = graph.symbols().write().intern(name);
    graph.define_method(class, mid, MethodBody::Native(native), visibility)
}

/// Install the core natives into a freshly booted graph
pub(crate) fn install(graph: &mut ClassGraph) -> VmResult<()> {
    use Visibility::{Private, Public};

    // BasicObject
    def(graph, BASIC_OBJECT, "initialize", Arity::Fixed(0), Private, |_, _, _| Ok(Value::Nil))?;
    def(graph, BASIC_OBJECT, "method_missing", Arity::Variadic, Private, basic_method_missing)?;
    def(graph, BASIC_OBJECT, "==", Arity::Fixed(1), Public, basic_equal)?;
    def(graph, BASIC_OBJECT, "equal?", Arity::Fixed(1), Public, basic_equal)?;
    def_hinted(graph, BASIC_OBJECT, "__send__", Arity::Variadic, Public, NativeHint::Send, kernel_send)?;

    // Kernel
    def_hinted(graph, KERNEL, "send", Arity::Variadic, Public, NativeHint::Send, kernel_send)?;
    def(graph, KERNEL, "class", Arity::Fixed(0), Public, kernel_class)?;
    def(graph, KERNEL, "kind_of?", Arity::Fixed(1), Public, kernel_kind_of)?;
    def(graph, KERNEL, "is_a?", Arity::Fixed(1), Public, kernel_kind_of)?;
    def(graph, KERNEL, "respond_to?", Arity::Variadic, Public, kernel_respond_to)?;
    def(graph, KERNEL, "inspect", Arity::Fixed(0), Public, |ctx, recv, _| Ok(Value::string(&ctx.inspect(recv))))?;
    def(graph, KERNEL, "freeze", Arity::Fixed(0), Public, kernel_freeze)?;
    def(graph, KERNEL, "frozen?", Arity::Fixed(0), Public, |ctx, recv, _| {
        Ok(Value::from_bool(ctx.graph().is_frozen(recv)))
    })?;
    def(graph, KERNEL, "singleton_methods", Arity::Variadic, Public, kernel_singleton_methods)?;
    def(graph, KERNEL, "instance_variable_get", Arity::Fixed(1), Public, kernel_ivar_get)?;
    def(graph, KERNEL, "instance_variable_set", Arity::Fixed(2), Public, kernel_ivar_set)?;
    def(graph, KERNEL, "proc", Arity::Fixed(0), Private, |ctx, _, _| ctx.make_proc(false))?;
    def(graph, KERNEL, "lambda", Arity::Fixed(0), Private, |ctx, _, _| ctx.make_proc(true))?;
    def(graph, KERNEL, "block_given?", Arity::Fixed(0), Private, |ctx, _, _| {
        Ok(Value::from_bool(ctx.caller_block_given()))
    })?;
    def(graph, KERNEL, "raise", Arity::Variadic, Private, kernel_raise)?;

    // Module
    def(graph, MODULE, "include", Arity::Variadic, Private, module_include)?;
    def(graph, MODULE, "include?", Arity::Fixed(1), Public, module_include_p)?;
    def(graph, MODULE, "included_modules", Arity::Fixed(0), Public, module_included_modules)?;
    def(graph, MODULE, "ancestors", Arity::Fixed(0), Public, module_ancestors)?;
    def(graph, MODULE, "instance_methods", Arity::Variadic, Public, |ctx, recv, args| {
        instance_methods(ctx, recv, args, VisibilityFilter::NonPrivate)
    })?;
    def(graph, MODULE, "public_instance_methods", Arity::Variadic, Public, |ctx, recv, args| {
        instance_methods(ctx, recv, args, VisibilityFilter::Public)
    })?;
    def(graph, MODULE, "protected_instance_methods", Arity::Variadic, Public, |ctx, recv, args| {
        instance_methods(ctx, recv, args, VisibilityFilter::Protected)
    })?;
    def(graph, MODULE, "private_instance_methods", Arity::Variadic, Public, |ctx, recv, args| {
        instance_methods(ctx, recv, args, VisibilityFilter::Private)
    })?;
    def(graph, MODULE, "method_defined?", Arity::Fixed(1), Public, module_method_defined)?;
    def(graph, MODULE, "define_method", Arity::Variadic, Private, module_define_method)?;
    def(graph, MODULE, "alias_method", Arity::Fixed(2), Private, module_alias_method)?;
    def(graph, MODULE, "undef_method", Arity::Variadic, Private, |ctx, recv, args| {
        each_name(ctx, recv, args, |graph, class, mid| graph.undef_method(class, mid))
    })?;
    def(graph, MODULE, "remove_method", Arity::Variadic, Private, |ctx, recv, args| {
        each_name(ctx, recv, args, |graph, class, mid| graph.remove_method(class, mid))
    })?;
    def(graph, MODULE, "attr_reader", Arity::Variadic, Private, |ctx, recv, args| {
        define_attrs(ctx, recv, args, true, false)
    })?;
    def(graph, MODULE, "attr_writer", Arity::Variadic, Private, |ctx, recv, args| {
        define_attrs(ctx, recv, args, false, true)
    })?;
    def(graph, MODULE, "attr_accessor", Arity::Variadic, Private, |ctx, recv, args| {
        define_attrs(ctx, recv, args, true, true)
    })?;
    def(graph, MODULE, "public", Arity::Variadic, Private, |ctx, recv, args| {
        set_visibility(ctx, recv, args, Visibility::Public)
    })?;
    def(graph, MODULE, "protected", Arity::Variadic, Private, |ctx, recv, args| {
        set_visibility(ctx, recv, args, Visibility::Protected)
    })?;
    def(graph, MODULE, "private", Arity::Variadic, Private, |ctx, recv, args| {
        set_visibility(ctx, recv, args, Visibility::Private)
    })?;
    def(graph, MODULE, "module_function", Arity::Variadic, Private, module_function)?;
    def(graph, MODULE, "name", Arity::Fixed(0), Public, module_name)?;

    // Class
    def(graph, CLASS, "new", Arity::Variadic, Public, class_new)?;
    def(graph, CLASS, "allocate", Arity::Fixed(0), Public, |ctx, recv, _| {
        let class = module_of(ctx, recv)?;
        ctx.graph_mut().allocate(class)
    })?;
    def(graph, CLASS, "superclass", Arity::Fixed(0), Public, |ctx, recv, _| {
        let class = module_of(ctx, recv)?;
        Ok(ctx.graph().superclass(class).map(Value::Class).unwrap_or(Value::Nil))
    })?;

    // Proc
    def(graph, PROC, "call", Arity::Variadic, Public, proc_call)?;
    def(graph, PROC, "yield", Arity::Variadic, Public, proc_call)?;
    def(graph, PROC, "[]", Arity::Variadic, Public, proc_call)?;
    def(graph, PROC, "to_proc", Arity::Fixed(0), Public, |_, recv, _| Ok(recv.clone()))?;
    def(graph, PROC, "lambda?", Arity::Fixed(0), Public, |ctx, recv, _| {
        Ok(Value::from_bool(proc_of(ctx, recv)?.is_lambda()))
    })?;
    def(graph, PROC, "arity", Arity::Fixed(0), Public, |ctx, recv, _| {
        Ok(Value::Fixnum(proc_of(ctx, recv)?.block().arity()))
    })?;

    // Array
    def(graph, ARRAY, "each", Arity::Fixed(0), Public, array_each)?;
    def(graph, ARRAY, "size", Arity::Fixed(0), Public, array_size)?;
    def(graph, ARRAY, "length", Arity::Fixed(0), Public, array_size)?;
    def(graph, ARRAY, "[]", Arity::Fixed(1), Public, array_at)?;
    def(graph, ARRAY, "push", Arity::Variadic, Public, array_push)?;
    def(graph, ARRAY, "<<", Arity::Fixed(1), Public, array_push)?;

    // Integer
    def(graph, INTEGER, "+", Arity::Fixed(1), Public, |ctx, recv, args| {
        arith(ctx, recv, args, i64::checked_add)
    })?;
    def(graph, INTEGER, "-", Arity::Fixed(1), Public, |ctx, recv, args| {
        arith(ctx, recv, args, i64::checked_sub)
    })?;
    def(graph, INTEGER, "*", Arity::Fixed(1), Public, |ctx, recv, args| {
        arith(ctx, recv, args, i64::checked_mul)
    })?;
    def(graph, INTEGER, "<", Arity::Fixed(1), Public, |ctx, recv, args| compare(ctx, recv, args, |a, b| a < b))?;
    def(graph, INTEGER, ">", Arity::Fixed(1), Public, |ctx, recv, args| compare(ctx, recv, args, |a, b| a > b))?;
    def(graph, INTEGER, "==", Arity::Fixed(1), Public, |_, recv, args| {
        Ok(Value::from_bool(matches!((recv, arg(args, 0)), (Value::Fixnum(a), Value::Fixnum(b)) if *a == b)))
    })?;
    def(graph, INTEGER, "times", Arity::Fixed(0), Public, integer_times)?;

    // Exception
    def(graph, EXCEPTION, "message", Arity::Fixed(0), Public, |_, recv, _| match recv {
        Value::Exception(err) => Ok(Value::string(&err.to_string())),
        _ => Ok(Value::Nil),
    })?;

    Ok(())
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Nil)
}

/// Method name from a symbol or string
fn method_name(ctx: &dyn NativeContext, value: &Value) -> VmResult<Symbol> {
    match value {
        Value::Symbol(sym) => Ok(*sym),
        Value::Str(s) => Ok(ctx.intern(s)),
        other => Err(VmError::Type(format!("{} is not a symbol", ctx.inspect(other)))),
    }
}

/// The class or module a receiver denotes
fn module_of(ctx: &dyn NativeContext, recv: &Value) -> VmResult<ClassId> {
    match recv {
        Value::Class(class) => Ok(*class),
        other => Err(VmError::Type(format!(
            "wrong argument type {} (expected Module)",
            ctx.inspect(other)
        ))),
    }
}

fn proc_of(ctx: &dyn NativeContext, recv: &Value) -> VmResult<Arc<Proc>> {
    recv.as_proc()
        .cloned()
        .ok_or_else(|| VmError::Type(format!("wrong argument type {} (expected Proc)", ctx.inspect(recv))))
}

fn symbols(mids: Vec<Symbol>) -> Value {
    Value::array(mids.into_iter().map(Value::Symbol).collect())
}

fn basic_method_missing(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let Some(Value::Symbol(mid)) = args.first() else {
        return Err(VmError::Argument("no id given".into()));
    };
    let reason = ctx.missing_reason();
    let graph = ctx.graph();
    Err(VmError::NoMethod {
        name: graph.symbol_name(*mid),
        receiver: graph.describe_receiver(recv),
        reason,
    })
}

fn basic_equal(_: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::from_bool(recv.identical(&arg(args, 0))))
}

fn kernel_send(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let Some((name, rest)) = args.split_first() else {
        return Err(VmError::Argument("no method name given".into()));
    };
    let mid = method_name(ctx, name)?;
    let block = ctx.block();
    ctx.funcall(recv, mid, rest, block)
}

fn kernel_class(ctx: &mut dyn NativeContext, recv: &Value, _: &[Value]) -> VmResult<Value> {
    Ok(Value::Class(ctx.graph().real_class_of(recv)))
}

fn kernel_kind_of(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    match arg(args, 0) {
        Value::Class(class) => Ok(Value::from_bool(ctx.graph().kind_of(recv, class))),
        _ => Err(VmError::Type("class or module required".into())),
    }
}

fn kernel_respond_to(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let scanned = scan_args("11", args, None)?;
    let mid = method_name(ctx, &scanned.lead[0])?;
    let include_private = scanned.optional_or(0, Value::False).is_truthy();
    let graph = ctx.graph();
    let found = graph.lookup(graph.class_of(recv), mid);
    Ok(Value::from_bool(
        found.is_some_and(|entry| include_private || !entry.visibility.is_private()),
    ))
}

fn kernel_freeze(ctx: &mut dyn NativeContext, recv: &Value, _: &[Value]) -> VmResult<Value> {
    ctx.graph_mut().freeze(recv);
    Ok(recv.clone())
}

fn kernel_singleton_methods(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let scanned = scan_args("01", args, None)?;
    let all = scanned.optional_or(0, Value::True).is_truthy();
    Ok(symbols(ctx.graph().singleton_methods(recv, all)))
}

fn ivar_name(ctx: &dyn NativeContext, value: &Value) -> VmResult<Symbol> {
    let mid = method_name(ctx, value)?;
    let name = ctx.symbol_name(mid);
    if !name.starts_with('@') || name.len() < 2 {
        return Err(VmError::Name(format!("`{}' is not allowed as an instance variable name", name)));
    }
    Ok(mid)
}

fn kernel_ivar_get(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let ivar = ivar_name(ctx, &arg(args, 0))?;
    Ok(ctx.graph().ivar_get(recv, ivar))
}

fn kernel_ivar_set(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let ivar = ivar_name(ctx, &arg(args, 0))?;
    let value = arg(args, 1);
    ctx.graph_mut().ivar_set(recv, ivar, value.clone())?;
    Ok(value)
}

fn kernel_raise(ctx: &mut dyn NativeContext, _: &Value, args: &[Value]) -> VmResult<Value> {
    let err = match args {
        [] => VmError::Runtime("unhandled exception".into()),
        [Value::Exception(err)] => (**err).clone(),
        [Value::Str(msg)] => VmError::Runtime(msg.to_string()),
        [Value::Class(_), Value::Str(msg)] => VmError::Runtime(msg.to_string()),
        [Value::Class(class)] => VmError::Runtime(ctx.graph().name_of(*class)),
        _ => VmError::Type("exception class/object expected".into()),
    };
    Err(err)
}

fn module_include(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    if args.is_empty() {
        return Err(VmError::ArgumentCount { expected: 1, actual: 0 });
    }
    let mut modules = Vec::with_capacity(args.len());
    {
        let graph = ctx.graph();
        for value in args {
            match value {
                Value::Class(m) if graph.desc(*m).is_module() => modules.push(*m),
                other => {
                    return Err(VmError::Type(format!(
                        "wrong argument type {} (expected Module)",
                        graph.name_of(graph.real_class_of(other))
                    )))
                }
            }
        }
    }
    let level = ctx.safe_level();
    let mut graph = ctx.graph_mut();
    // last argument first, so the first argument ends up nearest
    for module in modules.into_iter().rev() {
        graph.include_module_at(class, module, level)?;
    }
    Ok(recv.clone())
}

fn module_include_p(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let module = module_of(ctx, &arg(args, 0))?;
    Ok(Value::from_bool(ctx.graph().include_p(class, module)))
}

fn module_included_modules(ctx: &mut dyn NativeContext, recv: &Value, _: &[Value]) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let modules = ctx.graph().included_modules(class);
    Ok(Value::array(modules.into_iter().map(Value::Class).collect()))
}

fn module_ancestors(ctx: &mut dyn NativeContext, recv: &Value, _: &[Value]) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let graph = ctx.graph();
    Ok(Value::array(graph.ancestors(class).map(Value::Class).collect()))
}

fn instance_methods(
    ctx: &mut dyn NativeContext,
    recv: &Value,
    args: &[Value],
    filter: VisibilityFilter,
) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let scanned = scan_args("01", args, None)?;
    let recursive = scanned.optional_or(0, Value::True).is_truthy();
    Ok(symbols(ctx.graph().instance_methods(class, recursive, filter)))
}

fn module_method_defined(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let mid = method_name(ctx, &arg(args, 0))?;
    let found = ctx.graph().lookup(class, mid);
    Ok(Value::from_bool(found.is_some_and(|entry| !entry.visibility.is_private())))
}

fn module_define_method(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let scanned = scan_args("11&", args, ctx.block())?;
    let mid = method_name(ctx, &scanned.lead[0])?;
    let proc = match (scanned.optional.first().cloned().flatten(), scanned.block) {
        (Some(Value::Proc(proc)), _) => proc,
        (Some(other), _) => {
            return Err(VmError::Type(format!(
                "wrong argument type {} (expected Proc/Method)",
                ctx.inspect(&other)
            )))
        }
        (None, Some(block)) => Arc::new(Proc::new(block)),
        (None, None) => return Err(VmError::Argument("tried to create Proc object without a block".into())),
    };
    let level = ctx.safe_level();
    ctx.graph_mut()
        .define_method_at(class, mid, MethodBody::BoundClosure(proc), Visibility::Public, level)?;
    Ok(Value::Symbol(mid))
}

fn module_alias_method(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let new = method_name(ctx, &arg(args, 0))?;
    let old = method_name(ctx, &arg(args, 1))?;
    ctx.graph_mut().alias_method(class, new, old)?;
    Ok(recv.clone())
}

/// Apply `f` to each named method of the receiver
fn each_name(
    ctx: &mut dyn NativeContext,
    recv: &Value,
    args: &[Value],
    f: fn(&mut ClassGraph, ClassId, Symbol) -> VmResult<()>,
) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let mids = args.iter().map(|v| method_name(ctx, v)).collect::<VmResult<Vec<_>>>()?;
    let mut graph = ctx.graph_mut();
    for mid in mids {
        f(&mut graph, class, mid)?;
    }
    Ok(recv.clone())
}

fn define_attrs(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value], reader: bool, writer: bool) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    for value in args {
        let mid = method_name(ctx, value)?;
        let name = ctx.symbol_name(mid);
        let ivar = ctx.intern(&format!("@{}", name));
        let setter = writer.then(|| ctx.intern(&format!("{}=", name)));
        ctx.graph_mut()
            .define_attr(class, ivar, reader.then_some(mid), setter, Visibility::Public)?;
    }
    Ok(Value::Nil)
}

fn set_visibility(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value], visibility: Visibility) -> VmResult<Value> {
    if args.is_empty() {
        return Ok(Value::Nil);
    }
    each_visibility(ctx, recv, args, visibility)?;
    Ok(recv.clone())
}

fn each_visibility(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value], visibility: Visibility) -> VmResult<()> {
    let class = module_of(ctx, recv)?;
    let mids = args.iter().map(|v| method_name(ctx, v)).collect::<VmResult<Vec<_>>>()?;
    let mut graph = ctx.graph_mut();
    for mid in mids {
        graph.set_visibility(class, mid, visibility)?;
    }
    Ok(())
}

fn module_function(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    if args.is_empty() {
        return Ok(Value::Nil);
    }
    let module = module_of(ctx, recv)?;
    let mids = args.iter().map(|v| method_name(ctx, v)).collect::<VmResult<Vec<_>>>()?;
    let mut graph = ctx.graph_mut();
    for mid in mids {
        let body = graph
            .lookup(module, mid)
            .and_then(|entry| entry.body.clone())
            .ok_or_else(|| {
                VmError::Name(format!(
                    "undefined method `{}' for module `{}'",
                    graph.symbol_name(mid),
                    graph.name_of(module)
                ))
            })?;
        graph.define_module_function(module, mid, body)?;
    }
    Ok(recv.clone())
}

fn module_name(ctx: &mut dyn NativeContext, recv: &Value, _: &[Value]) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let graph = ctx.graph();
    Ok(graph.desc(class).name.as_deref().map(Value::string).unwrap_or(Value::Nil))
}

fn class_new(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let class = module_of(ctx, recv)?;
    let object = ctx.graph_mut().allocate(class)?;
    let block = ctx.block();
    ctx.funcall(&object, Symbol::INITIALIZE, args, block)?;
    Ok(object)
}

fn proc_call(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let proc = proc_of(ctx, recv)?;
    let block = ctx.block();
    ctx.call_proc(&proc, args, block)
}

fn array_each(ctx: &mut dyn NativeContext, recv: &Value, _: &[Value]) -> VmResult<Value> {
    let items = recv.array_items().unwrap_or_default();
    for item in items {
        ctx.yield_block(&[item])?;
    }
    Ok(recv.clone())
}

fn array_size(_: &mut dyn NativeContext, recv: &Value, _: &[Value]) -> VmResult<Value> {
    let len = recv.array_items().map(|items| items.len()).unwrap_or(0);
    Ok(Value::Fixnum(len as i64))
}

fn array_at(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    let index = match arg(args, 0) {
        Value::Fixnum(i) => i,
        other => {
            return Err(VmError::Type(format!(
                "no implicit conversion from {} into Integer",
                ctx.inspect(&other)
            )))
        }
    };
    let items = recv.array_items().unwrap_or_default();
    let len = items.len() as i64;
    let at = if index < 0 { index + len } else { index };
    if at < 0 || at >= len {
        return Ok(Value::Nil);
    }
    Ok(items[at as usize].clone())
}

fn array_push(_: &mut dyn NativeContext, recv: &Value, args: &[Value]) -> VmResult<Value> {
    if let Value::Array(items) = recv {
        items.write().extend(args.iter().cloned());
    }
    Ok(recv.clone())
}

fn fixnum_operand(ctx: &dyn NativeContext, args: &[Value]) -> VmResult<i64> {
    match arg(args, 0) {
        Value::Fixnum(n) => Ok(n),
        other => Err(VmError::Type(format!("{} can't be coerced into Integer", ctx.inspect(&other)))),
    }
}

fn arith(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value], op: fn(i64, i64) -> Option<i64>) -> VmResult<Value> {
    let a = recv.as_fixnum().unwrap_or(0);
    let b = fixnum_operand(ctx, args)?;
    op(a, b)
        .map(Value::Fixnum)
        .ok_or_else(|| VmError::Runtime("integer overflow".into()))
}

fn compare(ctx: &mut dyn NativeContext, recv: &Value, args: &[Value], op: fn(i64, i64) -> bool) -> VmResult<Value> {
    let a = recv.as_fixnum().unwrap_or(0);
    let b = match arg(args, 0) {
        Value::Fixnum(n) => n,
        other => {
            return Err(VmError::Argument(format!(
                "comparison of Integer with {} failed",
                ctx.inspect(&other)
            )))
        }
    };
    Ok(Value::from_bool(op(a, b)))
}

fn integer_times(ctx: &mut dyn NativeContext, recv: &Value, _: &[Value]) -> VmResult<Value> {
    let n = recv.as_fixnum().unwrap_or(0);
    for i in 0..n {
        ctx.yield_block(&[Value::Fixnum(i)])?;
    }
    Ok(recv.clone())
}
