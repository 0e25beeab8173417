//! VM configuration parameters.
//!
//! All bounds are tunable per runtime. Defaults suit test programs and
//! moderate recursion depths.

use serde::{Deserialize, Serialize};

/// Configuration for a runtime and the execution contexts it spawns.
///
/// # Example
///
/// ```
/// use core_types::VmConfig;
///
/// let config = VmConfig {
///     max_frame_depth: 64,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
///
/// let parsed = VmConfig::from_json(r#"{ "stack_size": 1024 }"#).unwrap();
/// assert_eq!(parsed.stack_size, 1024);
/// assert_eq!(parsed.max_frame_depth, VmConfig::default().max_frame_depth);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum value-stack slots reserved by all live frames.
    ///
    /// Each frame reserves its local count plus its temporary depth.
    ///
    /// Default: 65536
    pub stack_size: usize,

    /// Maximum number of live frames.
    ///
    /// Default: 10000
    pub max_frame_depth: usize,

    /// Maximum nesting of native calls on one context.
    ///
    /// A native that calls back into the interpreter (a yielding
    /// iterator, `send`, `Class#new`) nests a machine-stack activation.
    /// Exceeding this raises a stack overflow.
    ///
    /// Default: 256
    pub max_native_depth: usize,

    /// Enable per-call-site inline caches.
    ///
    /// When disabled every call performs a full lookup.
    ///
    /// Default: true
    pub inline_cache: bool,

    /// Trust level new execution contexts start with (0 = fully trusted).
    ///
    /// Default: 0
    pub safe_level: u8,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 64 * 1024,
            max_frame_depth: 10_000,
            max_native_depth: 256,
            inline_cache: true,
            safe_level: 0,
        }
    }
}

impl VmConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize this configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check that the bounds are usable
    pub fn validate(&self) -> Result<(), String> {
        if self.stack_size == 0 {
            return Err("stack_size must be greater than zero".to_string());
        }
        if self.max_frame_depth == 0 {
            return Err("max_frame_depth must be greater than zero".to_string());
        }
        if self.max_native_depth == 0 {
            return Err("max_native_depth must be greater than zero".to_string());
        }
        if self.safe_level > 4 {
            return Err(format!("safe_level must be 0..=4 ({} given)", self.safe_level));
        }
        Ok(())
    }
}
