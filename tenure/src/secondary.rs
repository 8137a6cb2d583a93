//! Registry of auxiliary caches attached to owner objects.
//!
//! Each owner gets at most one secondary cache. Owners are observed through
//! [`Weak`] references, so registration never keeps an owner alive, while
//! the registry owns the cache values themselves. Caches are indexed by the
//! owner's [`GroupKey`] so a whole group can be invalidated at once.
//!
//! Entries of dropped owners linger until a sweep. Sweeps run on
//! [`count_of_caches`](SecondaryCacheRegistry::count_of_caches), on
//! [`clear_secondary_cache`](SecondaryCacheRegistry::clear_secondary_cache)
//! with [`GroupKey::SWEEP`], and whenever the governor asks the registry to
//! free memory.
//!
//! | Tier | Reclamation |
//! |------|-------------|
//! | `Low`, `MediumLow` | sweep dropped owners |
//! | `MediumHigh` | sweep, then clear caches registered before the previous sweep |
//! | `High` | clear the whole registry |

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::governor::{HandlerId, MemoryGovernor, MemoryHandler};
use crate::label::{GroupKey, HandlerLabel};
use crate::metrics;
use crate::tier::CostTier;

/// Object that owns a secondary cache and names the group it belongs to.
pub trait SecondaryCacheGroup {
    /// Key shared by every owner invalidated together with this one.
    fn secondary_cache_group_key(&self) -> GroupKey;
}

type OwnerAddr = usize;

fn addr_of<O>(owner: &Arc<O>) -> OwnerAddr {
    Arc::as_ptr(owner) as *const () as usize
}

struct Registration<O, C> {
    owner: Weak<O>,
    group: GroupKey,
    cache: Arc<C>,
    stamp: u64,
}

struct RegistryState<O, C> {
    entries: HashMap<OwnerAddr, Registration<O, C>>,
    groups: HashMap<GroupKey, HashSet<OwnerAddr>>,
    generation: u64,
}

impl<O, C> RegistryState<O, C> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            groups: HashMap::new(),
            generation: 0,
        }
    }

    /// Live cache registered for the allocation at `addr`.
    fn lookup(&self, addr: OwnerAddr) -> Option<&Arc<C>> {
        self.entries
            .get(&addr)
            .filter(|registration| registration.owner.strong_count() > 0)
            .map(|registration| &registration.cache)
    }

    fn insert(&mut self, addr: OwnerAddr, registration: Registration<O, C>) {
        self.groups
            .entry(registration.group.clone())
            .or_default()
            .insert(addr);
        if let Some(stale) = self.entries.insert(addr, registration) {
            self.unindex(addr, &stale.group);
        }
    }

    fn unindex(&mut self, addr: OwnerAddr, group: &GroupKey) {
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(&addr);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
    }

    fn remove_where(&mut self, mut doomed: impl FnMut(&Registration<O, C>) -> bool) -> usize {
        let victims: Vec<OwnerAddr> = self
            .entries
            .iter()
            .filter(|(_, registration)| doomed(registration))
            .map(|(&addr, _)| addr)
            .collect();
        for &addr in &victims {
            if let Some(registration) = self.entries.remove(&addr) {
                self.unindex(addr, &registration.group);
            }
        }
        victims.len()
    }

    fn prune_dead(&mut self) -> usize {
        self.remove_where(|registration| registration.owner.strong_count() == 0)
    }

    fn clear_group(&mut self, group: &GroupKey) -> usize {
        let Some(members) = self.groups.remove(group) else {
            return 0;
        };
        let mut cleared = 0;
        for addr in members {
            if self.entries.remove(&addr).is_some() {
                cleared += 1;
            }
        }
        cleared
    }

    fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        self.groups.clear();
        cleared
    }
}

/// Registry mapping owners of type `O` to secondary caches of type `C`.
///
/// The registry registers itself with a [`MemoryGovernor`] on construction
/// and deregisters on [`shutdown`](Self::shutdown) or drop. No operation
/// fails; clearing an unknown group is a no-op.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tenure::{
///     GroupKey, MemoryGovernor, SecondaryCacheGroup, SecondaryCacheRegistry,
///     SyntheticInstrumentation,
/// };
///
/// struct Portfolio {
///     account: &'static str,
/// }
///
/// impl SecondaryCacheGroup for Portfolio {
///     fn secondary_cache_group_key(&self) -> GroupKey {
///         GroupKey::new(self.account)
///     }
/// }
///
/// let governor = MemoryGovernor::new(Arc::new(SyntheticInstrumentation::new(1 << 30)));
/// let registry = SecondaryCacheRegistry::<Portfolio, Vec<i64>>::new(&governor, "positions");
///
/// let portfolio = Arc::new(Portfolio { account: "acme" });
/// let first = registry.get_secondary_cache(&portfolio);
/// let again = registry.get_secondary_cache(&portfolio);
/// assert!(Arc::ptr_eq(&first, &again));
///
/// assert_eq!(registry.clear_secondary_cache(&GroupKey::new("acme")), 1);
/// assert_eq!(registry.count_of_caches(), 0);
/// ```
pub struct SecondaryCacheRegistry<O, C> {
    label: HandlerLabel,
    governor: MemoryGovernor,
    handler: OnceLock<HandlerId>,
    shut_down: AtomicBool,
    state: Mutex<RegistryState<O, C>>,
}

impl<O, C> SecondaryCacheRegistry<O, C>
where
    O: SecondaryCacheGroup + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Creates an empty registry and registers it with `governor`.
    pub fn new(governor: &MemoryGovernor, label: impl Into<HandlerLabel>) -> Arc<Self> {
        let registry = Arc::new(Self {
            label: label.into(),
            governor: governor.clone(),
            handler: OnceLock::new(),
            shut_down: AtomicBool::new(false),
            state: Mutex::new(RegistryState::new()),
        });
        let id = governor.add_handler(&registry);
        let _ = registry.handler.set(id);
        registry
    }

    /// Registry name used in logs and metrics.
    pub fn label(&self) -> &HandlerLabel {
        &self.label
    }

    /// Cache attached to `owner`, created with `C::default()` if absent.
    pub fn get_secondary_cache(&self, owner: &Arc<O>) -> Arc<C>
    where
        C: Default,
    {
        self.get_secondary_cache_with(owner, |_| C::default())
    }

    /// Cache attached to `owner`, created with `init` if absent.
    ///
    /// `init` runs without the registry lock held. If another thread
    /// attaches a cache to the same owner meanwhile, that cache wins and is
    /// returned.
    pub fn get_secondary_cache_with(&self, owner: &Arc<O>, init: impl FnOnce(&O) -> C) -> Arc<C> {
        let addr = addr_of(owner);
        if let Some(cache) = self.state.lock().lookup(addr) {
            return Arc::clone(cache);
        }

        let cache = Arc::new(init(owner));
        let group = owner.secondary_cache_group_key();

        let mut state = self.state.lock();
        if let Some(existing) = state.lookup(addr) {
            return Arc::clone(existing);
        }
        let stamp = state.generation;
        state.insert(
            addr,
            Registration {
                owner: Arc::downgrade(owner),
                group,
                cache: Arc::clone(&cache),
                stamp,
            },
        );
        cache
    }

    /// Cache attached to `owner`, without creating one.
    pub fn peek(&self, owner: &Arc<O>) -> Option<Arc<C>> {
        self.state.lock().lookup(addr_of(owner)).cloned()
    }

    /// Drops every cache in `group` and returns how many were dropped.
    ///
    /// [`GroupKey::SWEEP`] sweeps dropped owners instead.
    pub fn clear_secondary_cache(&self, group: &GroupKey) -> usize {
        if group.is_sweep() {
            return self.sweep();
        }
        let cleared = self.state.lock().clear_group(group);
        if cleared > 0 {
            debug!(registry = %self.label, %group, cleared, "cleared secondary cache group");
        }
        metrics::record_secondary_cleared(&self.label, cleared);
        cleared
    }

    /// Number of registered caches whose owner is still alive.
    ///
    /// Prunes dropped owners first; meant for diagnostics, not hot paths.
    pub fn count_of_caches(&self) -> usize {
        let mut state = self.state.lock();
        state.prune_dead();
        state.entries.len()
    }

    /// Number of groups with at least one live cache.
    pub fn group_count(&self) -> usize {
        let mut state = self.state.lock();
        state.prune_dead();
        state.groups.len()
    }

    /// Removes caches of dropped owners and starts a new generation.
    /// Returns how many caches were removed.
    pub fn sweep(&self) -> usize {
        let (swept, generation) = {
            let mut state = self.state.lock();
            let swept = state.prune_dead();
            state.generation += 1;
            (swept, state.generation)
        };
        debug!(registry = %self.label, swept, generation, "swept secondary caches");
        metrics::record_secondary_cleared(&self.label, swept);
        swept
    }

    /// Drops every cache and returns how many were dropped.
    pub fn clear_all(&self) -> usize {
        let cleared = self.state.lock().clear();
        debug!(registry = %self.label, cleared, "cleared secondary cache registry");
        metrics::record_secondary_cleared(&self.label, cleared);
        cleared
    }

    fn clear_older_generations(&self) -> usize {
        let cleared = {
            let mut state = self.state.lock();
            let generation = state.generation;
            state.remove_where(|registration| registration.stamp + 1 < generation)
        };
        debug!(registry = %self.label, cleared, "cleared stale secondary caches");
        metrics::record_secondary_cleared(&self.label, cleared);
        cleared
    }

    /// Reclaims caches according to `tier`; see the module docs.
    pub fn free_memory(&self, tier: CostTier) -> usize {
        match tier {
            CostTier::Low | CostTier::MediumLow => self.sweep(),
            CostTier::MediumHigh => self.sweep() + self.clear_older_generations(),
            CostTier::High => self.clear_all(),
        }
    }

    /// Deregisters from the governor. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel)
            && let Some(&id) = self.handler.get()
        {
            self.governor.remove_handler(id);
        }
    }
}

impl<O, C> MemoryHandler for SecondaryCacheRegistry<O, C>
where
    O: SecondaryCacheGroup + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn free_memory(&self, tier: CostTier) -> usize {
        SecondaryCacheRegistry::free_memory(self, tier)
    }

    fn label(&self) -> HandlerLabel {
        self.label.clone()
    }
}

impl<O, C> Drop for SecondaryCacheRegistry<O, C> {
    fn drop(&mut self) {
        if !self.shut_down.swap(true, Ordering::AcqRel)
            && let Some(&id) = self.handler.get()
        {
            self.governor.remove_handler(id);
        }
    }
}

impl<O, C> fmt::Debug for SecondaryCacheRegistry<O, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SecondaryCacheRegistry")
            .field("label", &self.label)
            .field("entries", &state.entries.len())
            .field("groups", &state.groups.len())
            .field("generation", &state.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::SyntheticInstrumentation;

    struct Owner(&'static str);

    impl SecondaryCacheGroup for Owner {
        fn secondary_cache_group_key(&self) -> GroupKey {
            GroupKey::new_static(self.0)
        }
    }

    fn registry() -> Arc<SecondaryCacheRegistry<Owner, Vec<u8>>> {
        let governor = MemoryGovernor::new(Arc::new(SyntheticInstrumentation::new(1 << 20)));
        SecondaryCacheRegistry::new(&governor, "test")
    }

    #[test]
    fn medium_high_clears_only_older_generations() {
        let registry = registry();
        let old = Arc::new(Owner("a"));
        registry.get_secondary_cache(&old);
        registry.sweep();

        let recent = Arc::new(Owner("a"));
        registry.get_secondary_cache(&recent);

        // The sweep inside MediumHigh advances to generation 2; only the
        // generation-0 registration is older than the previous sweep.
        assert_eq!(registry.free_memory(CostTier::MediumHigh), 1);
        assert!(registry.peek(&old).is_none());
        assert!(registry.peek(&recent).is_some());
    }

    #[test]
    fn low_tier_keeps_live_owners() {
        let registry = registry();
        let alive = Arc::new(Owner("a"));
        let dropped = Arc::new(Owner("b"));
        registry.get_secondary_cache(&alive);
        registry.get_secondary_cache(&dropped);
        drop(dropped);

        assert_eq!(registry.free_memory(CostTier::Low), 1);
        assert_eq!(registry.count_of_caches(), 1);
        assert_eq!(registry.group_count(), 1);
    }

    #[test]
    fn sweep_sentinel_does_not_clear_groups() {
        let registry = registry();
        let owner = Arc::new(Owner("a"));
        registry.get_secondary_cache(&owner);

        assert_eq!(registry.clear_secondary_cache(&GroupKey::SWEEP), 0);
        assert_eq!(registry.clear_secondary_cache(&GroupKey::new("missing")), 0);
        assert_eq!(registry.count_of_caches(), 1);
    }
}
