//! Inline caching for method dispatch
//!
//! Each call site remembers the class it last dispatched on, the state
//! version it looked up under and what it found. An entry is only used
//! while both the receiver's class and the global version still match;
//! a stale entry is simply refilled, never swept.

use std::collections::HashMap;
use std::sync::Arc;

use core_types::ClassId;
use object_model::{MethodBody, MethodEntry};

use crate::bridge::ForeignMethod;

/// Call-site identity: body id plus the call's slot within that body
pub type SiteKey = (u64, usize);

/// Dispatch kind a resolved site jumps straight to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Rust function
    Native,
    /// Instruction sequence in a new frame
    Interpreted,
    /// Attribute reader or writer
    Accessor,
    /// Proc bound as a method
    Closure,
    /// Super-forwarding entry
    Forward,
    /// Resolved by the foreign bridge
    Foreign,
}

impl CacheKind {
    /// Classify a method body
    pub fn of(body: &MethodBody) -> Self {
        match body {
            MethodBody::Native(_) => CacheKind::Native,
            MethodBody::Interpreted(_) => CacheKind::Interpreted,
            MethodBody::AttrReader(_) | MethodBody::AttrWriter(_) => CacheKind::Accessor,
            MethodBody::BoundClosure(_) => CacheKind::Closure,
            MethodBody::SuperForward => CacheKind::Forward,
        }
    }
}

/// What a resolved site calls
#[derive(Debug, Clone)]
pub enum CachedTarget {
    /// Entry from a method table
    Entry(Arc<MethodEntry>),
    /// Invocable supplied by the foreign bridge
    Foreign(ForeignMethod),
}

/// One resolved call site
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Receiver class the lookup ran on
    pub class: ClassId,
    /// State version sampled before the lookup
    pub version: u64,
    /// Dispatch kind
    pub kind: CacheKind,
    /// Lookup result
    pub target: CachedTarget,
}

impl CacheEntry {
    /// Whether this entry may be used for `class` at `version`
    pub fn is_valid(&self, class: ClassId, version: u64) -> bool {
        self.class == class && self.version == version
    }
}

/// Cache state for one call site
#[derive(Debug, Clone, Default)]
pub enum InlineCache {
    /// Nothing looked up yet, or the last entry went stale
    #[default]
    Unresolved,
    /// A lookup result
    Resolved(CacheEntry),
}

impl InlineCache {
    /// Create a new unresolved cache
    pub fn new() -> Self {
        InlineCache::Unresolved
    }

    /// Cached entry if still valid for `class` at `version`
    pub fn probe(&self, class: ClassId, version: u64) -> Option<&CacheEntry> {
        match self {
            InlineCache::Resolved(entry) if entry.is_valid(class, version) => Some(entry),
            _ => None,
        }
    }

    /// Kind this site currently dispatches to
    pub fn kind(&self) -> Option<CacheKind> {
        match self {
            InlineCache::Resolved(entry) => Some(entry.kind),
            InlineCache::Unresolved => None,
        }
    }
}

/// Counters kept by a [`CallCacheTable`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Probes answered from the cache
    pub hits: u64,
    /// Probes that fell through to a full lookup
    pub misses: u64,
    /// Misses on a site whose entry had gone stale
    pub invalidations: u64,
}

/// All call-site caches of one execution context
#[derive(Debug, Default)]
pub struct CallCacheTable {
    sites: HashMap<SiteKey, InlineCache>,
    stats: CacheStats,
}

impl CallCacheTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid entry for `site`, counting the hit or miss
    pub fn probe(&mut self, site: SiteKey, class: ClassId, version: u64) -> Option<CacheEntry> {
        match self.sites.get(&site) {
            Some(cache) => match cache.probe(class, version) {
                Some(entry) => {
                    self.stats.hits += 1;
                    Some(entry.clone())
                }
                None => {
                    self.stats.misses += 1;
                    self.stats.invalidations += 1;
                    None
                }
            },
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Record a lookup result for `site`
    pub fn fill(&mut self, site: SiteKey, entry: CacheEntry) {
        self.sites.insert(site, InlineCache::Resolved(entry));
    }

    /// Cache state of `site`
    pub fn site(&self, site: SiteKey) -> Option<&InlineCache> {
        self.sites.get(&site)
    }

    /// Hit and miss counters
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of sites seen
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// True when no site has been filled
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
