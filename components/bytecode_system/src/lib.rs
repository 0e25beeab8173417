//! Method bodies, runtime values and closure data
//!
//! This crate provides the instruction-sequence format the dispatcher
//! executes, together with the value and error types that flow through it.
//!
//! # Features
//!
//! - Stack-based instruction sequences (`Iseq`) with catch tables
//! - Call-site descriptors (`CallInfo`) carrying inline-cache slots
//! - Parameter shapes with optional-argument jump tables
//! - Heap-allocated environments shared between frames and blocks
//! - A builder with forward labels for hand-assembling bodies
//!
//! # Example
//!
//! ```
//! use bytecode_system::{CallFlags, IseqBuilder, IseqKind, Opcode, ParamShape, Value};
//! use core_types::Symbol;
//!
//! let mut b = IseqBuilder::new("answer", IseqKind::Method);
//! b.params(ParamShape::lead(1));
//! b.emit(Opcode::GetLocal { index: 0, level: 0 });
//! b.emit(Opcode::PutObject(Value::Fixnum(1)));
//! b.send(Symbol::EQ, 1, CallFlags::empty());
//! b.emit(Opcode::Leave);
//!
//! let iseq = b.build().unwrap();
//! assert_eq!(iseq.local_size, 1);
//! assert_eq!(iseq.cache_slots, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod closure;
pub mod error;
pub mod instruction;
pub mod iseq;
pub mod opcode;
pub mod value;

// Re-export main types at crate root
pub use closure::{Block, BlockCode, Env, EnvId, MethodContext, NativeBlockFn, Proc};
pub use error::{ThrowObject, TransferKind, VmError, VmResult};
pub use instruction::Instruction;
pub use iseq::{CatchEntry, CatchKind, Iseq, IseqBuilder, IseqKind, Label, ParamShape};
pub use opcode::{CallFlags, CallInfo, DefineTarget, Opcode, ThrowKind};
pub use value::Value;
