//! Multi-key pool: one live handle per distinct key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};
use vertex_core::Result;

use crate::handle::ResourceHandle;
use crate::PoolStats;

/// Builds and tears down the resources held by a pool.
pub trait Hydrator<V>: Send + Sync {
    /// Construct the resource for `key`. Errors are never cached.
    fn hydrate(&self, key: &str) -> Result<V>;

    /// Called exactly once when a handle collapses.
    fn release(&self, _key: &str, _value: &V) {}
}

struct PoolState<V> {
    handles: HashMap<String, ResourceHandle<V>>,
    next_id: u64,
    hydrations: u64,
    evictions: u64,
    releases: u64,
}

/// Keyed cache with lazy hydration and idle-TTL eviction.
///
/// All state lives behind one mutex, held for the full duration of
/// `hydrate`. Concurrent hydration of different keys is serialized.
pub struct ResourcePool<V> {
    name: String,
    ttl: Duration,
    hydrator: Arc<dyn Hydrator<V>>,
    state: Mutex<PoolState<V>>,
}

impl<V: Send + Sync> ResourcePool<V> {
    pub fn new(name: impl Into<String>, ttl: Duration, hydrator: Arc<dyn Hydrator<V>>) -> Self {
        Self {
            name: name.into(),
            ttl,
            hydrator,
            state: Mutex::new(PoolState {
                handles: HashMap::new(),
                next_id: 1,
                hydrations: 0,
                evictions: 0,
                releases: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the live handle for `key`, hydrating it if absent.
    pub fn get(&self, key: &str) -> Result<ResourceHandle<V>> {
        let mut state = self.state.lock();
        self.evict_expired(&mut state);

        if let Some(handle) = state.handles.get(key) {
            handle.touch();
            return Ok(handle.clone());
        }

        let value = self.hydrator.hydrate(key)?;
        let id = state.next_id;
        state.next_id += 1;
        state.hydrations += 1;

        let handle = ResourceHandle::new(key, id, value);
        state.handles.insert(key.to_string(), handle.clone());
        info!("[{}] hydrated {} (generation {})", self.name, key, id);
        Ok(handle)
    }

    /// Refresh last-used for `key` without hydrating. Returns false if absent.
    pub fn mark_used(&self, key: &str) -> bool {
        let state = self.state.lock();
        match state.handles.get(key) {
            Some(handle) => {
                handle.touch();
                true
            }
            None => false,
        }
    }

    /// Explicitly unload `key`. Returns false if nothing was held.
    pub fn release(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        match state.handles.remove(key) {
            Some(handle) => {
                state.releases += 1;
                self.collapse(&handle, "released");
                true
            }
            None => false,
        }
    }

    /// Unload `handle` only if it is still the pool's live handle for its key.
    pub fn release_handle(&self, handle: &ResourceHandle<V>) -> bool {
        let mut state = self.state.lock();
        let current = state
            .handles
            .get(handle.key())
            .is_some_and(|h| h.same_as(handle));
        if !current {
            return false;
        }
        state.handles.remove(handle.key());
        state.releases += 1;
        self.collapse(handle, "released");
        true
    }

    /// Evict every handle idle longer than the TTL. Returns the count evicted.
    pub fn sweep(&self) -> usize {
        let mut state = self.state.lock();
        self.evict_expired(&mut state)
    }

    /// Release every handle.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let drained: Vec<_> = state.handles.drain().map(|(_, h)| h).collect();
        state.releases += drained.len() as u64;
        for handle in &drained {
            self.collapse(handle, "released");
        }
        drained.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().handles.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().handles.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            name: self.name.clone(),
            live: state.handles.len(),
            hydrations: state.hydrations,
            evictions: state.evictions,
            releases: state.releases,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    fn evict_expired(&self, state: &mut PoolState<V>) -> usize {
        let expired: Vec<String> = state
            .handles
            .iter()
            .filter(|(_, h)| h.idle() >= self.ttl)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            if let Some(handle) = state.handles.remove(key) {
                state.evictions += 1;
                self.collapse(&handle, "collapsed after idle TTL");
            }
        }
        expired.len()
    }

    fn collapse(&self, handle: &ResourceHandle<V>, reason: &str) {
        if handle.collapse() {
            self.hydrator.release(handle.key(), handle.value());
            info!(
                "[{}] {} {} (generation {})",
                self.name,
                reason,
                handle.key(),
                handle.id()
            );
        } else {
            debug!("[{}] {} already collapsed", self.name, handle.key());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vertex_core::Error;

    #[derive(Default)]
    struct CountingHydrator {
        hydrated: AtomicUsize,
        released: AtomicUsize,
    }

    impl Hydrator<String> for CountingHydrator {
        fn hydrate(&self, key: &str) -> Result<String> {
            if key == "unknown" {
                return Err(Error::Config(format!("unknown provider: {}", key)));
            }
            self.hydrated.fetch_add(1, Ordering::SeqCst);
            Ok(format!("client:{}", key))
        }

        fn release(&self, _key: &str, _value: &String) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool(ttl: Duration) -> (ResourcePool<String>, Arc<CountingHydrator>) {
        let hydrator = Arc::new(CountingHydrator::default());
        (ResourcePool::new("providers", ttl, hydrator.clone()), hydrator)
    }

    #[test]
    fn test_lazy_hydration_and_reuse() {
        let (pool, hydrator) = pool(Duration::from_secs(300));
        assert!(pool.is_empty());

        let a = pool.get("openai").unwrap();
        let b = pool.get("openai").unwrap();
        assert!(a.same_as(&b));
        assert_eq!(a.get().unwrap(), "client:openai");
        assert_eq!(hydrator.hydrated.load(Ordering::SeqCst), 1);

        pool.get("anthropic").unwrap();
        assert_eq!(pool.keys(), vec!["anthropic", "openai"]);
    }

    #[test]
    fn test_hydrate_failure_not_cached() {
        let (pool, _) = pool(Duration::from_secs(300));
        assert!(matches!(pool.get("unknown"), Err(Error::Config(_))));
        assert!(!pool.contains("unknown"));
        assert!(matches!(pool.get("unknown"), Err(Error::Config(_))));
        assert_eq!(pool.stats().hydrations, 0);
    }

    #[test]
    fn test_ttl_eviction_yields_new_identity() {
        let (pool, hydrator) = pool(Duration::from_millis(20));
        let first = pool.get("openai").unwrap();

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(pool.sweep(), 1);
        assert!(!first.is_live());
        assert!(matches!(first.get(), Err(Error::StaleHandle(_))));

        let second = pool.get("openai").unwrap();
        assert!(!first.same_as(&second));
        assert!(second.id() > first.id());
        assert_eq!(hydrator.hydrated.load(Ordering::SeqCst), 2);
        assert_eq!(hydrator.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_access_evicts_other_expired_keys() {
        let (pool, _) = pool(Duration::from_millis(20));
        pool.get("openai").unwrap();
        std::thread::sleep(Duration::from_millis(40));

        pool.get("anthropic").unwrap();
        assert!(!pool.contains("openai"));
        assert_eq!(pool.stats().evictions, 1);
    }

    #[test]
    fn test_release_exactly_once() {
        let (pool, hydrator) = pool(Duration::from_millis(20));
        let handle = pool.get("openai").unwrap();

        assert!(pool.release("openai"));
        assert!(!pool.release("openai"));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(pool.sweep(), 0);
        assert!(!pool.release_handle(&handle));
        assert_eq!(hydrator.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_handle_ignores_newer_generation() {
        let (pool, _) = pool(Duration::from_secs(300));
        let old = pool.get("openai").unwrap();
        pool.release("openai");
        let new = pool.get("openai").unwrap();

        assert!(!pool.release_handle(&old));
        assert!(new.is_live());
        assert!(pool.release_handle(&new));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_mark_used_and_clear() {
        let (pool, hydrator) = pool(Duration::from_secs(300));
        assert!(!pool.mark_used("openai"));
        pool.get("openai").unwrap();
        pool.get("google").unwrap();
        assert!(pool.mark_used("openai"));

        assert_eq!(pool.clear(), 2);
        assert!(pool.is_empty());
        let stats = pool.stats();
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.live, 0);
        assert_eq!(hydrator.released.load(Ordering::SeqCst), 2);
    }
}
