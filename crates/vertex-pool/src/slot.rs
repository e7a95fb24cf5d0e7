//! Single-slot pool for one heavyweight resource.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;
use vertex_core::Result;

use crate::handle::ResourceHandle;
use crate::PoolStats;

type Factory<V> = Box<dyn Fn() -> Result<V> + Send + Sync>;

struct SlotState<V> {
    handle: Option<ResourceHandle<V>>,
    next_id: u64,
    hydrations: u64,
    evictions: u64,
    releases: u64,
}

/// Holds at most one handle, collapsed after the idle TTL regardless of
/// which caller requested it.
pub struct SingleSlotPool<V> {
    name: String,
    ttl: Duration,
    factory: Factory<V>,
    state: Mutex<SlotState<V>>,
}

impl<V: Send + Sync> SingleSlotPool<V> {
    pub fn new<F>(name: impl Into<String>, ttl: Duration, factory: F) -> Self
    where
        F: Fn() -> Result<V> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            ttl,
            factory: Box::new(factory),
            state: Mutex::new(SlotState {
                handle: None,
                next_id: 1,
                hydrations: 0,
                evictions: 0,
                releases: 0,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the resident handle, loading it if the slot is empty.
    pub fn get(&self) -> Result<ResourceHandle<V>> {
        let mut state = self.state.lock();
        self.evict_expired(&mut state);

        if let Some(handle) = &state.handle {
            handle.touch();
            return Ok(handle.clone());
        }

        let value = (self.factory)()?;
        let id = state.next_id;
        state.next_id += 1;
        state.hydrations += 1;
        let handle = ResourceHandle::new(self.name.clone(), id, value);
        state.handle = Some(handle.clone());
        info!("[{}] loaded (generation {})", self.name, id);
        Ok(handle)
    }

    /// Drop the resident handle if it has been idle past the TTL.
    pub fn sweep(&self) -> bool {
        let mut state = self.state.lock();
        self.evict_expired(&mut state)
    }

    /// Explicitly unload. Returns false if the slot was empty.
    pub fn release(&self) -> bool {
        let mut state = self.state.lock();
        match state.handle.take() {
            Some(handle) => {
                state.releases += 1;
                if handle.collapse() {
                    info!("[{}] unloaded (generation {})", self.name, handle.id());
                }
                true
            }
            None => false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            name: self.name.clone(),
            live: usize::from(state.handle.is_some()),
            hydrations: state.hydrations,
            evictions: state.evictions,
            releases: state.releases,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    fn evict_expired(&self, state: &mut SlotState<V>) -> bool {
        let expired = state.handle.as_ref().is_some_and(|h| h.idle() >= self.ttl);
        if !expired {
            return false;
        }
        if let Some(handle) = state.handle.take() {
            state.evictions += 1;
            if handle.collapse() {
                info!(
                    "[{}] collapsed after {:?} idle (generation {})",
                    self.name,
                    self.ttl,
                    handle.id()
                );
            }
        }
        true
    }
}
