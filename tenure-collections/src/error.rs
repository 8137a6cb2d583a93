//! Error type for collection operations.

use thiserror::Error;

use crate::long_map::KeyState;

/// Boxed error returned by a segment sanity hook.
pub type SanityError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used by every fallible collection operation.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Errors raised by [`LargeLongArray`](crate::LargeLongArray) and
/// [`HashLongMap`](crate::HashLongMap).
///
/// All variants except [`Sanity`](CollectionError::Sanity) are invalid-argument
/// conditions. Validation runs before any mutation, so a failed call leaves the
/// collection exactly as it was.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// Positional access past the last slot.
    #[error("index {index} out of range for {len} slots")]
    IndexOutOfRange {
        /// Requested position.
        index: usize,
        /// Number of addressable slots.
        len: usize,
    },

    /// Zero was written while non-zero validation is active.
    #[error("zero is reserved as the empty-slot sentinel")]
    ZeroValue,

    /// A value already present was written while uniqueness is enforced.
    #[error("duplicate value {0}")]
    Duplicate(i64),

    /// A write would break the ascending order of a sorted, unique array.
    #[error("value {value} breaks ascending order at index {index}")]
    OutOfOrder {
        /// Position of the rejected write.
        index: usize,
        /// Rejected value.
        value: i64,
    },

    /// A bulk-load hint was contradicted by the supplied keys.
    #[error("key state hint {hint:?} contradicted at position {position}")]
    InvalidHint {
        /// Hint supplied by the caller.
        hint: KeyState,
        /// First position where the keys disagree with the hint.
        position: usize,
    },

    /// A builder option was out of its accepted range.
    #[error("invalid option: {0}")]
    InvalidOption(&'static str),

    /// The segment sanity hook refused an allocation.
    #[error("segment sanity check failed: {0}")]
    Sanity(#[source] SanityError),
}

impl CollectionError {
    /// Returns `true` for invalid-argument conditions, `false` for propagated
    /// hook failures.
    pub fn is_invalid_argument(&self) -> bool {
        !matches!(self, Self::Sanity(_))
    }
}
