//! Object Model - class graph, method tables and object records
//!
//! This component provides:
//! - Class, module, singleton-class and include-proxy descriptors
//! - Method tables shared (never copied) between a module and its proxies
//! - Ancestor linearization and method lookup with undefined tombstones
//! - The process-wide state version that invalidates inline caches
//! - Native method descriptors and the context natives call back through
//! - Object records (class pointer, instance variables, flags)
//!
//! All mutation goes through [`ClassGraph`]; callers serialize writers
//! (the interpreter holds it behind a single `RwLock`). Every mutation
//! that can change a lookup result advances the shared [`StateVersion`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ancestors;
pub mod class_graph;
pub mod descriptor;
pub mod heap;
pub mod include;
pub mod method_entry;
pub mod method_table;
pub mod native;
pub mod singleton;
pub mod version;
pub mod well_known;

// Re-export main types
pub use ancestors::{Ancestors, SuperChain};
pub use class_graph::ClassGraph;
pub use descriptor::{ClassDescriptor, ClassFlags, ClassKind};
pub use heap::{Heap, ObjectRecord};
pub use method_entry::{MethodBody, MethodEntry};
pub use method_table::{MethodTable, TableId};
pub use native::{Arity, NativeContext, NativeFn, NativeHint, NativeMethod, MAX_NATIVE_ARITY};
pub use version::StateVersion;
