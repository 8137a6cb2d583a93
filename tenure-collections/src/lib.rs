//! # tenure-collections
//!
//! Primitive collections for very large sets of 64-bit keys.
//!
//! - [`LargeLongArray`] - segmented growable array with sorting and
//!   repacking, zero reserved as the empty-slot sentinel
//! - [`HashLongMap`] - long-keyed map with an eager hash-table version and a
//!   dual-mode version that keeps bulk loads as a sorted array
//! - [`SharedLongMap`] - lock-free readable wrapper publishing map snapshots
//!
//! Both collections are cheap to clone: storage is reference counted and the
//! first write after a clone copies only what it touches.

pub mod error;
pub mod long_array;
pub mod long_map;

pub use error::{CollectionError, CollectionResult, SanityError};
pub use long_array::{ArrayOptions, LargeLongArray, LongArrayBuilder, SanityHook, SegmentAllocation};
pub use long_map::{
    BRIEF_KEY_LIMIT, DualModeLongMap, EagerLongMap, HashLongMap, HashLongMapBuilder, KeyData,
    KeyState, LongMap, LongMapIter, LongMapVersion, MapOptions, SharedLongMap, select_version,
    selected_version,
};
