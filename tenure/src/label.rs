//! Label types naming memory handlers and secondary cache groups.
//!
//! Both are newtypes over `SmolStr`, so short labels never allocate and
//! cloning is cheap enough for metric labels and log fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A label identifying a memory handler.
///
/// Used in handler-invocation logs and as the `handler`, `cache` and
/// `registry` metric labels.
///
/// # Example
/// ```
/// use tenure::HandlerLabel;
///
/// let label = HandlerLabel::new("orders");
/// assert_eq!(label.as_str(), "orders");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerLabel(SmolStr);

impl HandlerLabel {
    /// Label reported by handlers that do not name themselves.
    pub const ANONYMOUS: HandlerLabel = HandlerLabel::new_static("anonymous");

    /// Creates a new handler label.
    #[inline]
    pub fn new(s: impl Into<SmolStr>) -> Self {
        Self(s.into())
    }

    /// Creates a handler label from a static string (no allocation).
    #[inline]
    pub const fn new_static(s: &'static str) -> Self {
        Self(SmolStr::new_static(s))
    }

    /// Returns the label as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for HandlerLabel {
    #[inline]
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl From<String> for HandlerLabel {
    #[inline]
    fn from(s: String) -> Self {
        Self(SmolStr::from(s))
    }
}

/// Key shared by secondary caches that must be invalidated together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey(SmolStr);

impl GroupKey {
    /// Sentinel key: clearing it sweeps caches of dropped owners instead of
    /// clearing a real group.
    pub const SWEEP: GroupKey = GroupKey::new_static("\0sweep");

    /// Creates a new group key.
    #[inline]
    pub fn new(s: impl Into<SmolStr>) -> Self {
        Self(s.into())
    }

    /// Creates a group key from a static string (no allocation).
    #[inline]
    pub const fn new_static(s: &'static str) -> Self {
        Self(SmolStr::new_static(s))
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the [`SWEEP`](Self::SWEEP) sentinel.
    pub fn is_sweep(&self) -> bool {
        *self == Self::SWEEP
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for GroupKey {
    #[inline]
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl From<String> for GroupKey {
    #[inline]
    fn from(s: String) -> Self {
        Self(SmolStr::from(s))
    }
}
