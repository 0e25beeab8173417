//! Handles of the classes every graph is bootstrapped with.
//!
//! Bootstrap allocates these in a fixed order, so immediates map to their
//! class without consulting the graph.

use core_types::ClassId;

/// `BasicObject`
pub const BASIC_OBJECT: ClassId = ClassId::new(0);
/// `Object`
pub const OBJECT: ClassId = ClassId::new(1);
/// `Module`
pub const MODULE: ClassId = ClassId::new(2);
/// `Class`
pub const CLASS: ClassId = ClassId::new(3);
/// `Kernel`
pub const KERNEL: ClassId = ClassId::new(4);
/// `NilClass`
pub const NIL_CLASS: ClassId = ClassId::new(5);
/// `TrueClass`
pub const TRUE_CLASS: ClassId = ClassId::new(6);
/// `FalseClass`
pub const FALSE_CLASS: ClassId = ClassId::new(7);
/// `Integer`
pub const INTEGER: ClassId = ClassId::new(8);
/// `Symbol`
pub const SYMBOL: ClassId = ClassId::new(9);
/// `String`
pub const STRING: ClassId = ClassId::new(10);
/// `Array`
pub const ARRAY: ClassId = ClassId::new(11);
/// `Proc`
pub const PROC: ClassId = ClassId::new(12);
/// `Exception`
pub const EXCEPTION: ClassId = ClassId::new(13);
