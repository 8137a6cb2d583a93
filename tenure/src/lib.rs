//! # tenure
//!
//! Caches that give memory back when the heap runs short.
//!
//! A [`MemoryGovernor`] watches the tenured (long-lived) part of the heap
//! through a pluggable [`MemoryInstrumentation`]. Once usage crosses a
//! threshold derived from the collector family, it asks every registered
//! [`MemoryHandler`] to free memory at a [`CostTier`] matching how severe the
//! pressure is.
//!
//! Two handlers ship with the crate:
//!
//! - [`CacheLongTable`] - `i64`-keyed cache whose entries can be pinned
//!   against eviction
//! - [`SecondaryCacheRegistry`] - auxiliary caches attached to owner objects
//!   and invalidated by group
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tenure::{CacheLongTable, MemoryGovernor, SyntheticInstrumentation};
//!
//! let instrumentation = Arc::new(
//!     SyntheticInstrumentation::new(1_000_000).with_pool("Tenured Gen", None),
//! );
//! let governor = MemoryGovernor::new(instrumentation.clone());
//! let table = CacheLongTable::new(&governor, "quotes");
//! table.put(7, "seven");
//!
//! instrumentation.set_heap_used(950_000);
//! instrumentation.set_tenured_used(950_000);
//!
//! let relief = governor.relieve_pressure().expect("pool is under pressure");
//! assert_eq!(relief.released, 1);
//! assert!(table.is_empty());
//! ```
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Cache keyed by `i64` with pinning.
pub mod cache_table;

/// Governor configuration.
///
/// [`MemoryConfig`](config::MemoryConfig) deserializes with `serde` and is
/// applied through [`MemoryGovernor::with_config`].
pub mod config;

/// Memory governor, instrumentation and the handler contract.
pub mod governor;

/// Label newtypes for handlers and secondary cache groups.
pub mod label;

/// Metrics collection for governor observability.
///
/// When the `metrics` feature is enabled, this module records gauges for
/// tenured usage and threshold, and counters for collection requests,
/// handler invocations and evictions.
#[allow(missing_docs)]
pub mod metrics;

/// Secondary cache registry.
pub mod secondary;

/// Reclamation severity.
pub mod tier;

pub use cache_table::CacheLongTable;
pub use config::{ConfigError, MemoryConfig, MemoryConfigBuilder, Percent};
pub use governor::{
    CollectorDefaults, CollectorFamily, HandlerId, MemoryGovernor, MemoryHandler,
    MemoryInstrumentation, MemorySnapshot, MemoryZone, MonitorHandle, PoolUsage,
    ProcessInstrumentation, Relief, SyntheticInstrumentation,
};
pub use label::{GroupKey, HandlerLabel};
pub use secondary::{SecondaryCacheGroup, SecondaryCacheRegistry};
pub use tier::CostTier;
