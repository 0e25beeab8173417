//! Method visibility.

/// Visibility of a method entry.
///
/// `Undefined` marks a tombstone: the method was explicitly undefined in
/// this table, which stops the upward search instead of falling through
/// to an ancestor definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Callable with any receiver
    Public,
    /// Callable when the caller's self is a kind of the defining class
    Protected,
    /// Callable only without an explicit receiver
    Private,
    /// Tombstone left by `undef_method`
    Undefined,
}

impl Visibility {
    /// True for [`Visibility::Public`]
    pub fn is_public(self) -> bool {
        self == Visibility::Public
    }

    /// True for [`Visibility::Private`]
    pub fn is_private(self) -> bool {
        self == Visibility::Private
    }

    /// True for [`Visibility::Protected`]
    pub fn is_protected(self) -> bool {
        self == Visibility::Protected
    }

    /// True for the undefined tombstone
    pub fn is_undefined(self) -> bool {
        self == Visibility::Undefined
    }
}

/// Which entries an instance-method enumeration reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisibilityFilter {
    /// Everything except private methods
    #[default]
    NonPrivate,
    /// Public methods only
    Public,
    /// Protected methods only
    Protected,
    /// Private methods only
    Private,
}

impl VisibilityFilter {
    /// Whether an entry with `visibility` passes this filter
    pub fn accepts(self, visibility: Visibility) -> bool {
        match (self, visibility) {
            (_, Visibility::Undefined) => false,
            (VisibilityFilter::NonPrivate, v) => v != Visibility::Private,
            (VisibilityFilter::Public, v) => v == Visibility::Public,
            (VisibilityFilter::Protected, v) => v == Visibility::Protected,
            (VisibilityFilter::Private, v) => v == Visibility::Private,
        }
    }
}
