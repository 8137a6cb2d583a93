use std::sync::atomic::{AtomicU8, Ordering};

use tracing::info;

static SELECTED: AtomicU8 = AtomicU8::new(LongMapVersion::DualMode as u8);

/// Implementation family used by [`HashLongMap::create`](super::HashLongMap::create).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum LongMapVersion {
    /// Hash table from the first write.
    Eager = 1,
    /// Sorted key array for bulk loads, hash table after scattered writes.
    #[default]
    DualMode = 2,
}

impl LongMapVersion {
    fn from_repr(raw: u8) -> Self {
        match raw {
            1 => Self::Eager,
            _ => Self::DualMode,
        }
    }
}

/// Version newly created maps use. Defaults to [`LongMapVersion::DualMode`].
pub fn selected_version() -> LongMapVersion {
    LongMapVersion::from_repr(SELECTED.load(Ordering::Relaxed))
}

/// Switches the version used by subsequently created maps and returns the
/// previous one. Existing maps keep their implementation.
pub fn select_version(version: LongMapVersion) -> LongMapVersion {
    let previous = LongMapVersion::from_repr(SELECTED.swap(version as u8, Ordering::Relaxed));
    if previous != version {
        info!(?previous, ?version, "switched long map version");
    }
    previous
}
