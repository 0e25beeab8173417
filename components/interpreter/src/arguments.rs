//! Argument binding
//!
//! [`ArgumentBinder`] lays raw arguments out into a body's local slots
//! according to its [`ParamShape`]: leading required, optionals, rest,
//! post-required, block. Methods and lambdas bind strictly and raise on an
//! arity mismatch; plain blocks bind leniently (auto-splat, nil padding,
//! truncation).
//!
//! Also here: multiple-assignment destructuring ([`expand_array`]) and the
//! argument-spec parser natives use ([`scan_args`]).

use std::sync::Arc;

use bytecode_system::{Block, Iseq, ParamShape, Proc, Value, VmError, VmResult};

/// Locals produced by binding, plus the body offset to start at
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgs {
    /// Initial local slots
    pub locals: Vec<Value>,
    /// Entry offset selected by the number of optionals supplied
    pub entry_pc: usize,
}

/// Binds arguments for one body
#[derive(Debug, Clone, Copy)]
pub struct ArgumentBinder<'a> {
    shape: &'a ParamShape,
    local_size: usize,
}

impl<'a> ArgumentBinder<'a> {
    /// Binder for `iseq`'s parameters
    pub fn new(iseq: &'a Iseq) -> Self {
        Self {
            shape: &iseq.shape,
            local_size: iseq.local_size,
        }
    }

    /// Binder for a bare shape
    pub fn for_shape(shape: &'a ParamShape, local_size: usize) -> Self {
        Self { shape, local_size }
    }

    /// Bind with method semantics.
    ///
    /// # Arguments
    ///
    /// * `args` - Positional arguments, already splat-expanded
    /// * `block` - Block passed with the call, bound to `&blk` if declared
    ///
    /// # Returns
    ///
    /// The initial locals and the entry offset for the optionals filled.
    ///
    /// # Errors
    ///
    /// [`VmError::ArgumentCount`] when fewer than the required or (without a
    /// rest parameter) more than the maximum arguments are given.
    pub fn bind_strict(&self, args: Vec<Value>, block: Option<&Arc<Block>>) -> VmResult<BoundArgs> {
        let argc = args.len();
        let required = self.shape.required();
        if argc < required {
            return Err(VmError::ArgumentCount {
                expected: required,
                actual: argc,
            });
        }
        if let Some(max) = self.shape.max_args() {
            if argc > max {
                return Err(VmError::ArgumentCount {
                    expected: max,
                    actual: argc,
                });
            }
        }
        Ok(self.lay_out(args, block))
    }

    /// Bind with plain-block semantics; never fails.
    ///
    /// A single array argument is spread across the parameters when the
    /// block takes more than one, missing parameters are `nil`, and
    /// surplus arguments are dropped when there is no rest parameter.
    pub fn bind_lenient(&self, mut args: Vec<Value>, block: Option<&Arc<Block>>) -> BoundArgs {
        let shape = self.shape;
        let named = shape.lead + shape.post + shape.opt_count();
        if args.len() == 1 && (named > 1 || (named == 1 && shape.rest)) {
            if let Some(items) = args[0].array_items() {
                args = items;
            }
        }
        let required = shape.required();
        if args.len() < required {
            // short calls fill leading parameters first
            let lead_missing = shape.lead.saturating_sub(args.len());
            let at = shape.lead - lead_missing;
            let tail = args.split_off(at);
            args.resize(shape.lead, Value::Nil);
            args.extend(tail);
            args.resize(required, Value::Nil);
        }
        if let Some(max) = shape.max_args() {
            if args.len() > max {
                // excess comes off the middle so post parameters still see the tail
                let tail = args.split_off(args.len() - shape.post);
                args.truncate(max - shape.post);
                args.extend(tail);
            }
        }
        self.lay_out(args, block)
    }

    fn lay_out(&self, mut args: Vec<Value>, block: Option<&Arc<Block>>) -> BoundArgs {
        let shape = self.shape;
        let mut locals = vec![Value::Nil; self.local_size.max(shape.size())];

        let post_values = args.split_off(args.len() - shape.post);
        let middle = args.split_off(shape.lead);
        for (slot, value) in args.into_iter().enumerate() {
            locals[slot] = value;
        }

        let opt_count = shape.opt_count();
        let mut middle = middle.into_iter();
        let mut filled = 0;
        while filled < opt_count {
            match middle.next() {
                Some(value) => {
                    locals[shape.lead + filled] = value;
                    filled += 1;
                }
                None => break,
            }
        }
        if let Some(index) = shape.rest_index() {
            locals[index] = Value::array(middle.collect());
        }

        let post_index = shape.post_index();
        for (offset, value) in post_values.into_iter().enumerate() {
            locals[post_index + offset] = value;
        }

        if let Some(index) = shape.block_index() {
            locals[index] = match block {
                Some(block) => Value::Proc(Arc::new(Proc::new(block.clone()))),
                None => Value::Nil,
            };
        }

        let entry_pc = if opt_count > 0 { shape.opt_entry(filled) } else { 0 };
        BoundArgs { locals, entry_pc }
    }
}

/// Destructure `value` for a multiple assignment.
///
/// Returns values in push order, so the first target's value ends up on
/// top. In normal mode the first `count` elements are produced (nil
/// padded) with the splatted remainder underneath; in `post` mode the
/// last `count` elements are produced and the leading remainder is pushed
/// last.
///
/// # Example
///
/// ```
/// use bytecode_system::Value;
/// use interpreter::expand_array;
///
/// let ary = Value::array(vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)]);
/// let pushed = expand_array(&ary, 2, true, false);
/// assert_eq!(
///     pushed,
///     vec![Value::array(vec![Value::Fixnum(3)]), Value::Fixnum(2), Value::Fixnum(1)]
/// );
/// ```
pub fn expand_array(value: &Value, count: usize, splat: bool, post: bool) -> Vec<Value> {
    let items = value.array_items().unwrap_or_else(|| vec![value.clone()]);
    let len = items.len();
    let mut pushed = Vec::with_capacity(count + usize::from(splat));

    if post {
        let mut taken = 0;
        for _ in len..count {
            pushed.push(Value::Nil);
        }
        while pushed.len() < count {
            pushed.push(items[len - taken - 1].clone());
            taken += 1;
        }
        if splat {
            pushed.push(Value::array(items[..len - taken].to_vec()));
        }
    } else {
        if splat {
            let rest = if len > count { items[count..].to_vec() } else { Vec::new() };
            pushed.push(Value::array(rest));
        }
        for i in (0..count).rev() {
            pushed.push(items.get(i).cloned().unwrap_or(Value::Nil));
        }
    }
    pushed
}

/// Arguments split by a native's argument spec
#[derive(Debug, Clone, Default)]
pub struct ScannedArgs {
    /// Number of arguments given
    pub argc: usize,
    /// Mandatory leading arguments
    pub lead: Vec<Value>,
    /// Optional arguments, `None` where not supplied
    pub optional: Vec<Option<Value>>,
    /// Rest arguments
    pub rest: Vec<Value>,
    /// Mandatory trailing arguments
    pub post: Vec<Value>,
    /// Block, when the spec asks for one
    pub block: Option<Arc<Block>>,
}

impl ScannedArgs {
    /// Optional argument `index`, or `default` when not supplied
    pub fn optional_or(&self, index: usize, default: Value) -> Value {
        self.optional.get(index).cloned().flatten().unwrap_or(default)
    }
}

struct ArgSpec {
    lead: usize,
    opt: usize,
    rest: bool,
    post: usize,
    block: bool,
}

fn parse_spec(spec: &str) -> VmResult<ArgSpec> {
    let bad = || VmError::InternalInvariant(format!("bad scan arg format: {}", spec));
    let mut chars = spec.chars().peekable();
    let mut parsed = ArgSpec {
        lead: 0,
        opt: 0,
        rest: false,
        post: 0,
        block: false,
    };
    if let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        parsed.lead = d as usize;
        chars.next();
        if let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            parsed.opt = d as usize;
            chars.next();
        }
    }
    if chars.peek() == Some(&'*') {
        parsed.rest = true;
        chars.next();
    }
    if let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        parsed.post = d as usize;
        chars.next();
    }
    if chars.peek() == Some(&'&') {
        parsed.block = true;
        chars.next();
    }
    if chars.next().is_some() {
        return Err(bad());
    }
    Ok(parsed)
}

/// Split `args` according to an argument spec such as `"12*&"`.
///
/// The spec is: mandatory count, optional count, `*` for a rest list, a
/// trailing mandatory count, `&` to capture the block. Each part may be
/// omitted from the left (`"*"`, `"01"`, `"1&"`).
///
/// # Errors
///
/// - [`VmError::ArgumentCount`] when `args` does not fit the spec
/// - InternalInvariant for a malformed spec
pub fn scan_args(spec: &str, args: &[Value], block: Option<Arc<Block>>) -> VmResult<ScannedArgs> {
    let parsed = parse_spec(spec)?;
    let argc = args.len();
    let required = parsed.lead + parsed.post;
    if argc < required {
        return Err(VmError::ArgumentCount {
            expected: required,
            actual: argc,
        });
    }
    if !parsed.rest && argc > required + parsed.opt {
        return Err(VmError::ArgumentCount {
            expected: required + parsed.opt,
            actual: argc,
        });
    }

    let lead = args[..parsed.lead].to_vec();
    let post = args[argc - parsed.post..].to_vec();
    let middle = &args[parsed.lead..argc - parsed.post];
    let filled = middle.len().min(parsed.opt);
    let optional = (0..parsed.opt).map(|i| middle.get(i).filter(|_| i < filled).cloned()).collect();
    let rest = if parsed.rest { middle[filled..].to_vec() } else { Vec::new() };

    Ok(ScannedArgs {
        argc,
        lead,
        optional,
        rest,
        post,
        block: if parsed.block { block } else { None },
    })
}
