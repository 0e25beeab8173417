//! Backtrace entries.

use std::fmt;

/// Represents a single live frame in a VM backtrace.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame {
///     label: "Greeter#greet".to_string(),
///     pc: 4,
/// };
///
/// assert_eq!(frame.to_string(), "Greeter#greet:4");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Method or block label (`Class#method`, `block in Class#method`, `<native>`)
    pub label: String,
    /// Resume point within the frame's body
    pub pc: usize,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.pc)
    }
}
