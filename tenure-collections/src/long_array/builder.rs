//! Builder for configuring [`LargeLongArray`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::{LargeLongArray, Segment};
use crate::error::{CollectionError, CollectionResult, SanityError};

/// Event handed to the sanity hook each time the array allocates a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentAllocation {
    /// Position the new segment will occupy in the output layout.
    pub index: usize,
    /// Number of slots reserved for the segment.
    pub capacity: usize,
}

/// Callback invoked once per segment allocation.
///
/// Returning an error aborts the operation that requested the segment; the
/// error is propagated as [`CollectionError::Sanity`].
pub type SanityHook = Arc<dyn Fn(SegmentAllocation) -> Result<(), SanityError> + Send + Sync>;

/// Options shared by an array and every array derived from it (sort output,
/// deep copies).
#[derive(Clone, Default)]
pub struct ArrayOptions {
    pub(crate) expected_capacity: usize,
    pub(crate) segment_size: Option<usize>,
    pub(crate) input_shared: bool,
    pub(crate) output_shared: bool,
    pub(crate) validate_unique: bool,
    pub(crate) validate_non_zero: bool,
    pub(crate) assert_unique: bool,
    pub(crate) assert_non_zero: bool,
    pub(crate) sanity: Option<SanityHook>,
}

impl ArrayOptions {
    /// Maximum slots per segment, `None` for one contiguous block.
    pub fn segment_size(&self) -> Option<usize> {
        self.segment_size
    }

    /// Whether read operations hand out independent copies.
    pub fn output_shared(&self) -> bool {
        self.output_shared
    }

    /// Whether caller-supplied segments are treated as aliased.
    pub fn input_shared(&self) -> bool {
        self.input_shared
    }

    pub(crate) fn rejects_zero(&self) -> bool {
        self.validate_non_zero || self.assert_non_zero
    }

    pub(crate) fn check_allocation(&self, index: usize, capacity: usize) -> CollectionResult<()> {
        match &self.sanity {
            Some(hook) => hook(SegmentAllocation { index, capacity }).map_err(CollectionError::Sanity),
            None => Ok(()),
        }
    }

    pub(crate) fn allocate(&self, index: usize, capacity: usize) -> CollectionResult<Vec<i64>> {
        self.check_allocation(index, capacity)?;
        Ok(Vec::with_capacity(capacity))
    }
}

impl fmt::Debug for ArrayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayOptions")
            .field("expected_capacity", &self.expected_capacity)
            .field("segment_size", &self.segment_size)
            .field("input_shared", &self.input_shared)
            .field("output_shared", &self.output_shared)
            .field("validate_unique", &self.validate_unique)
            .field("validate_non_zero", &self.validate_non_zero)
            .field("assert_unique", &self.assert_unique)
            .field("assert_non_zero", &self.assert_non_zero)
            .field("sanity", &self.sanity.as_ref().map(|_| "Fn"))
            .finish()
    }
}

/// Builder for creating a [`LargeLongArray`].
///
/// Use [`LargeLongArray::builder`] to create a new builder instance.
///
/// # Examples
///
/// ```
/// use tenure_collections::LargeLongArray;
///
/// let mut array = LargeLongArray::builder()
///     .segment_size(4)
///     .validate_non_zero(true)
///     .build()
///     .unwrap();
///
/// for value in [5, 3, 9, 1, 7] {
///     array.append(value).unwrap();
/// }
/// assert_eq!(array.segment_count(), 2);
/// assert!(array.append(0).is_err());
/// ```
///
/// Wrapping existing buffers:
///
/// ```
/// use std::sync::Arc;
/// use tenure_collections::LargeLongArray;
///
/// let shared = Arc::new(vec![1, 2, 3]);
/// let mut array = LargeLongArray::builder()
///     .input_shared(true)
///     .segment(Arc::clone(&shared))
///     .build()
///     .unwrap();
///
/// array.set(0, 10).unwrap();
/// assert_eq!(shared[0], 1);
/// ```
#[derive(Debug, Default)]
pub struct LongArrayBuilder {
    options: ArrayOptions,
    segments: Vec<Arc<Vec<i64>>>,
}

impl LongArrayBuilder {
    /// Creates a builder with one contiguous block and no validation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizing hint for the first allocation.
    pub fn expected_capacity(mut self, capacity: usize) -> Self {
        self.options.expected_capacity = capacity;
        self
    }

    /// Maximum entries per segment. Must be positive.
    ///
    /// # Default
    ///
    /// One contiguous block.
    pub fn segment_size(mut self, size: usize) -> Self {
        self.options.segment_size = Some(size);
        self
    }

    /// Installs a hook invoked once per segment allocation.
    pub fn sanity<F>(mut self, hook: F) -> Self
    where
        F: Fn(SegmentAllocation) -> Result<(), SanityError> + Send + Sync + 'static,
    {
        self.options.sanity = Some(Arc::new(hook));
        self
    }

    /// Treat supplied segments as aliased: they are copied before the first
    /// write instead of being mutated in place.
    pub fn input_shared(mut self, shared: bool) -> Self {
        self.options.input_shared = shared;
        self
    }

    /// Hand out independent copies from read operations instead of exposing
    /// internal storage.
    pub fn output_shared(mut self, shared: bool) -> Self {
        self.options.output_shared = shared;
        self
    }

    /// Reject duplicate values, at construction and on every write.
    pub fn validate_unique(mut self, enabled: bool) -> Self {
        self.options.validate_unique = enabled;
        self
    }

    /// Reject the zero sentinel, at construction and on every write.
    pub fn validate_non_zero(mut self, enabled: bool) -> Self {
        self.options.validate_non_zero = enabled;
        self
    }

    /// Check uniqueness against the segment being written only.
    pub fn assert_unique(mut self, enabled: bool) -> Self {
        self.options.assert_unique = enabled;
        self
    }

    /// Check the value being written is not the sentinel.
    pub fn assert_non_zero(mut self, enabled: bool) -> Self {
        self.options.assert_non_zero = enabled;
        self
    }

    /// Adds a caller-supplied segment. Segments keep their length even when it
    /// exceeds [`segment_size`](Self::segment_size).
    pub fn segment(mut self, values: impl Into<Arc<Vec<i64>>>) -> Self {
        self.segments.push(values.into());
        self
    }

    /// Adds several caller-supplied segments in order.
    pub fn segments<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<Vec<i64>>>,
    {
        self.segments.extend(segments.into_iter().map(Into::into));
        self
    }

    /// Validates the supplied data and builds the array.
    pub fn build(self) -> CollectionResult<LargeLongArray> {
        if self.options.segment_size == Some(0) {
            return Err(CollectionError::InvalidOption("segment size must be positive"));
        }

        if self.options.rejects_zero()
            && self.segments.iter().any(|segment| segment.contains(&0))
        {
            return Err(CollectionError::ZeroValue);
        }

        if self.options.validate_unique {
            let total = self.segments.iter().map(|segment| segment.len()).sum();
            let mut seen = HashSet::with_capacity(total);
            for &value in self.segments.iter().flat_map(|segment| segment.iter()) {
                if value != 0 && !seen.insert(value) {
                    return Err(CollectionError::Duplicate(value));
                }
            }
        }

        let borrowed = self.options.input_shared;
        let segments = self
            .segments
            .into_iter()
            .map(|values| Segment::supplied(values, borrowed))
            .collect();

        Ok(LargeLongArray::from_segments(segments, Arc::new(self.options)))
    }
}
