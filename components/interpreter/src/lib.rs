//! Dispatch core for the object model
//!
//! This crate executes instruction sequences against a shared class graph:
//! - Process-wide [`Runtime`] holding the class graph behind one `RwLock`
//! - One [`Vm`] per execution context, owning its frame stack and caches
//! - Per-call-site inline caches invalidated by the global state version
//! - A dispatcher state machine (lookup, visibility gate, invoke, super, missing)
//! - Strict (method, lambda) and lenient (plain block) argument binding
//! - Non-local `return` / `break` / `retry` resolved against live frames
//!
//! # Example
//!
//! ```
//! use bytecode_system::{IseqBuilder, IseqKind, Opcode, Value};
//! use interpreter::Runtime;
//!
//! let runtime = Runtime::new().unwrap();
//! let mut vm = runtime.context();
//!
//! let mut b = IseqBuilder::new("<main>", IseqKind::Top);
//! b.emit(Opcode::PutObject(Value::Fixnum(42))).emit(Opcode::Leave);
//! let iseq = b.build().unwrap();
//!
//! assert_eq!(vm.execute(&iseq).unwrap(), Value::Fixnum(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arguments;
pub mod bridge;
pub mod call_frame;
pub mod control;
pub mod dispatch;
pub mod execute;
pub mod inline_cache;
pub mod kernel;
pub mod runtime;
pub mod vm;

// Re-export main types at crate root
pub use arguments::{expand_array, scan_args, ArgumentBinder, BoundArgs, ScannedArgs};
pub use bridge::{ForeignBridge, ForeignMethod};
pub use call_frame::{CallFrame, FrameKind, FrameStack};
pub use inline_cache::{CacheEntry, CacheKind, CacheStats, CallCacheTable, InlineCache};
pub use runtime::Runtime;
pub use vm::Vm;
