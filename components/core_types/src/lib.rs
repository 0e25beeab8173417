//! Shared vocabulary for the object-model and dispatch core.
//!
//! This crate provides the small, dependency-free types every other
//! component speaks in: interned symbols, handles into the class graph,
//! method visibility, the error taxonomy and the VM configuration.
//!
//! # Overview
//!
//! - [`Symbol`] / [`SymbolTable`] - Interned method and variable names
//! - [`ClassId`] / [`ObjectId`] - Arena handles into the class graph and object records
//! - [`Visibility`] - Method visibility, including the undefined tombstone
//! - [`ErrorKind`] - Error taxonomy shared by all components
//! - [`VmConfig`] - Stack bounds, cache switch and default trust level
//! - [`StackFrame`] - One line of a VM backtrace
//!
//! # Examples
//!
//! ```
//! use core_types::{Symbol, SymbolTable, Visibility};
//!
//! let mut symbols = SymbolTable::new();
//! let foo = symbols.intern("foo");
//! assert_eq!(symbols.intern("foo"), foo);
//! assert_eq!(symbols.name(Symbol::METHOD_MISSING), Some("method_missing"));
//! assert!(Visibility::Private.is_private());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod config;
mod error;
mod ids;
mod source;
mod symbol;
mod visibility;

pub use config::VmConfig;
pub use error::{ErrorKind, LocalJumpReason, MissingReason};
pub use ids::{ClassId, ObjectId};
pub use source::StackFrame;
pub use symbol::{Symbol, SymbolTable};
pub use visibility::{Visibility, VisibilityFilter};
