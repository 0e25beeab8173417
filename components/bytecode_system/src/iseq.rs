//! Instruction sequences
//!
//! An [`Iseq`] is the unit of code the VM runs: a method body, a block
//! body, the top-level program or a rescue/ensure clause. It carries its
//! parameter shape, local and temporary sizing, and a catch table mapping
//! protected instruction ranges to handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use core_types::Symbol;

use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::opcode::{CallFlags, CallInfo, Opcode};

static NEXT_ISEQ_ID: AtomicU64 = AtomicU64::new(1);

/// What an instruction sequence is the body of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IseqKind {
    /// Top-level program
    Top,
    /// Method body
    Method,
    /// Block body
    Block,
    /// Rescue clause; local 0 holds the raised error
    Rescue,
    /// Ensure clause; local 0 holds the pending error
    Ensure,
}

/// Declared parameters of a method or block.
///
/// Locals are laid out as leading parameters, optionals, the rest
/// parameter, post parameters and the block parameter, followed by plain
/// locals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamShape {
    /// Required leading parameters
    pub lead: usize,
    /// Resume offsets keyed by how many optionals were supplied.
    ///
    /// Empty when there are no optionals, otherwise one entry longer than
    /// the optional count.
    pub opt_table: Vec<usize>,
    /// Collects surplus arguments into an array
    pub rest: bool,
    /// Required parameters bound from the tail
    pub post: usize,
    /// Receives the passed block as a proc
    pub block: bool,
}

impl ParamShape {
    /// Shape with `n` required leading parameters
    pub fn lead(n: usize) -> Self {
        ParamShape {
            lead: n,
            ..Default::default()
        }
    }

    /// Add optionals with their resume offsets (`optionals + 1` entries)
    pub fn with_optional(mut self, offsets: Vec<usize>) -> Self {
        self.opt_table = offsets;
        self
    }

    /// Add a rest parameter
    pub fn with_rest(mut self) -> Self {
        self.rest = true;
        self
    }

    /// Add `n` post parameters
    pub fn with_post(mut self, n: usize) -> Self {
        self.post = n;
        self
    }

    /// Add a block parameter
    pub fn with_block(mut self) -> Self {
        self.block = true;
        self
    }

    /// Number of optional parameters
    pub fn opt_count(&self) -> usize {
        self.opt_table.len().saturating_sub(1)
    }

    /// Minimum argument count
    pub fn required(&self) -> usize {
        self.lead + self.post
    }

    /// Maximum argument count, unbounded with a rest parameter
    pub fn max_args(&self) -> Option<usize> {
        if self.rest {
            None
        } else {
            Some(self.required() + self.opt_count())
        }
    }

    /// Local index of the rest parameter
    pub fn rest_index(&self) -> Option<usize> {
        self.rest.then_some(self.lead + self.opt_count())
    }

    /// Local index of the first post parameter
    pub fn post_index(&self) -> usize {
        self.lead + self.opt_count() + usize::from(self.rest)
    }

    /// Local index of the block parameter
    pub fn block_index(&self) -> Option<usize> {
        self.block.then_some(self.post_index() + self.post)
    }

    /// Number of locals the parameters occupy
    pub fn size(&self) -> usize {
        self.post_index() + self.post + usize::from(self.block)
    }

    /// Resume offset when `filled` optionals were supplied
    pub fn opt_entry(&self, filled: usize) -> usize {
        self.opt_table.get(filled).copied().unwrap_or(0)
    }

    /// Arity as reported to user code
    pub fn arity(&self) -> i64 {
        let required = self.required() as i64;
        if self.rest || self.opt_count() > 0 {
            -(required + 1)
        } else {
            required
        }
    }
}

/// Kind of handler a catch entry registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchKind {
    /// Run a rescue clause for rescuable errors
    Rescue,
    /// Run an ensure clause on any unwind
    Ensure,
    /// Re-enter the protected region on `retry`
    Retry,
    /// Resume after a call site whose block executed `break`
    Break,
}

/// One catch table entry.
///
/// A frame paused at resume point `pc` is inside the entry when the
/// instruction it faulted on (`pc - 1`) lies in `start..end`. For rescue
/// and ensure entries `cont` must lie after `end`, since the frame moves
/// there before the clause runs.
#[derive(Debug, Clone)]
pub struct CatchEntry {
    /// Handler kind
    pub kind: CatchKind,
    /// First protected instruction
    pub start: usize,
    /// One past the last protected instruction
    pub end: usize,
    /// Where the frame continues
    pub cont: usize,
    /// Temporary depth to restore before continuing
    pub sp: usize,
    /// Clause body for rescue and ensure entries
    pub iseq: Option<Arc<Iseq>>,
}

impl CatchEntry {
    /// Whether a frame resuming at `pc` is protected by this entry
    pub fn covers(&self, pc: usize) -> bool {
        pc > self.start && pc <= self.end
    }
}

/// An instruction sequence
#[derive(Debug)]
pub struct Iseq {
    /// Process-unique identity; keys per-context inline caches
    pub id: u64,
    /// Label used in backtraces
    pub name: String,
    /// What this is the body of
    pub kind: IseqKind,
    /// Declared parameters
    pub shape: ParamShape,
    /// Total local slots, parameters included
    pub local_size: usize,
    /// Deepest temporary stack this body needs
    pub stack_max: usize,
    /// Instructions
    pub code: Vec<Instruction>,
    /// Protected regions
    pub catch_table: Vec<CatchEntry>,
    /// Number of call sites with inline caches
    pub cache_slots: usize,
}

impl Iseq {
    /// Value-stack slots a frame running this body reserves
    pub fn reserved_slots(&self) -> usize {
        self.local_size + self.stack_max
    }

    /// Instruction at `pc`
    pub fn instruction(&self, pc: usize) -> Option<&Instruction> {
        self.code.get(pc)
    }
}

/// A forward-referencable position in a body under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

struct PendingCatch {
    kind: CatchKind,
    start: Label,
    end: Label,
    cont: Label,
    sp: usize,
    iseq: Option<Arc<Iseq>>,
}

/// Assembles an [`Iseq`], resolving labels at [`IseqBuilder::build`]
pub struct IseqBuilder {
    name: String,
    kind: IseqKind,
    shape: ParamShape,
    opt_labels: Vec<Label>,
    locals: usize,
    stack_max: usize,
    code: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
    catches: Vec<PendingCatch>,
    cache_slots: usize,
    line: Option<u32>,
}

impl IseqBuilder {
    /// Start a body
    pub fn new(name: impl Into<String>, kind: IseqKind) -> Self {
        let locals = match kind {
            IseqKind::Rescue | IseqKind::Ensure => 1,
            _ => 0,
        };
        IseqBuilder {
            name: name.into(),
            kind,
            shape: ParamShape::default(),
            opt_labels: Vec::new(),
            locals,
            stack_max: 16,
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            catches: Vec::new(),
            cache_slots: 0,
            line: None,
        }
    }

    /// Declare parameters
    pub fn params(&mut self, shape: ParamShape) -> &mut Self {
        self.shape = shape;
        self
    }

    /// Declare optionals by the labels their defaults start at.
    ///
    /// `labels[i]` is where execution starts when `i` optionals were
    /// supplied; the last label is the body proper.
    pub fn optional(&mut self, labels: &[Label]) -> &mut Self {
        self.opt_labels = labels.to_vec();
        self
    }

    /// Total locals, parameters included
    pub fn locals(&mut self, n: usize) -> &mut Self {
        self.locals = n;
        self
    }

    /// Deepest temporary stack
    pub fn stack_max(&mut self, n: usize) -> &mut Self {
        self.stack_max = n;
        self
    }

    /// Tag subsequent instructions with a source line
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = Some(line);
        self
    }

    /// Allocate an unbound label
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next instruction
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    /// Index the next instruction will get
    pub fn here(&self) -> usize {
        self.code.len()
    }

    /// Append an instruction
    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        let inst = match self.line {
            Some(line) => Instruction::with_line(opcode, line),
            None => Instruction::new(opcode),
        };
        self.code.push(inst);
        self
    }

    fn emit_jump(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        self.fixups.push((self.code.len(), label));
        self.emit(opcode)
    }

    /// Unconditional jump to `label`
    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::Jump(0), label)
    }

    /// Pop and jump to `label` when truthy
    pub fn branch_if(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::BranchIf(0), label)
    }

    /// Pop and jump to `label` when falsy
    pub fn branch_unless(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::BranchUnless(0), label)
    }

    fn call_info(&mut self, mid: Symbol, argc: usize, flags: CallFlags, block: Option<Arc<Iseq>>) -> Arc<CallInfo> {
        let cache_slot = self.cache_slots;
        self.cache_slots += 1;
        Arc::new(CallInfo {
            mid,
            argc,
            flags,
            block,
            cache_slot,
        })
    }

    /// Method call without a literal block
    pub fn send(&mut self, mid: Symbol, argc: usize, flags: CallFlags) -> &mut Self {
        let ci = self.call_info(mid, argc, flags, None);
        self.emit(Opcode::Send(ci))
    }

    /// Method call passing a literal block
    pub fn send_with_block(&mut self, mid: Symbol, argc: usize, flags: CallFlags, block: Arc<Iseq>) -> &mut Self {
        let ci = self.call_info(mid, argc, flags, Some(block));
        self.emit(Opcode::Send(ci))
    }

    /// `super` call; the running method's name is used at run time
    pub fn invoke_super(&mut self, argc: usize, flags: CallFlags, block: Option<Arc<Iseq>>) -> &mut Self {
        let ci = self.call_info(Symbol::METHOD_MISSING, argc, flags | CallFlags::SUPER, block);
        self.emit(Opcode::InvokeSuper(ci))
    }

    /// Register a catch entry over `start..end`
    pub fn catch_entry(
        &mut self,
        kind: CatchKind,
        start: Label,
        end: Label,
        cont: Label,
        sp: usize,
        iseq: Option<Arc<Iseq>>,
    ) -> &mut Self {
        self.catches.push(PendingCatch {
            kind,
            start,
            end,
            cont,
            sp,
            iseq,
        });
        self
    }

    fn resolve(&self, label: Label) -> VmResult<usize> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or_else(|| VmError::InternalInvariant(format!("unbound label {} in {}", label.0, self.name)))
    }

    /// Resolve labels and produce the body
    pub fn build(self) -> VmResult<Arc<Iseq>> {
        let mut code = self.code.clone();
        for (index, label) in &self.fixups {
            let target = self.resolve(*label)?;
            code[*index].opcode = match code[*index].opcode {
                Opcode::Jump(_) => Opcode::Jump(target),
                Opcode::BranchIf(_) => Opcode::BranchIf(target),
                Opcode::BranchUnless(_) => Opcode::BranchUnless(target),
                ref other => other.clone(),
            };
        }

        let mut shape = self.shape.clone();
        if !self.opt_labels.is_empty() {
            shape.opt_table = self
                .opt_labels
                .iter()
                .map(|l| self.resolve(*l))
                .collect::<VmResult<Vec<_>>>()?;
        }

        let mut catch_table = Vec::with_capacity(self.catches.len());
        for pending in &self.catches {
            catch_table.push(CatchEntry {
                kind: pending.kind,
                start: self.resolve(pending.start)?,
                end: self.resolve(pending.end)?,
                cont: self.resolve(pending.cont)?,
                sp: pending.sp,
                iseq: pending.iseq.clone(),
            });
        }

        Ok(Arc::new(Iseq {
            id: NEXT_ISEQ_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            kind: self.kind,
            local_size: self.locals.max(shape.size()),
            shape,
            stack_max: self.stack_max,
            code,
            catch_table,
            cache_slots: self.cache_slots,
        }))
    }
}
