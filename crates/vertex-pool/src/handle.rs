//! Resource handles owned by a pool.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use vertex_core::{Error, Result};

struct HandleInner<V> {
    key: String,
    id: u64,
    value: V,
    created_at: Instant,
    created_wall: DateTime<Utc>,
    last_used: Mutex<Instant>,
    released: AtomicBool,
}

/// Shared reference to a live pooled resource.
///
/// Clones share the same underlying resource. Only the owning pool can
/// collapse a handle; once collapsed, `get()` fails with `StaleHandle`.
pub struct ResourceHandle<V> {
    inner: Arc<HandleInner<V>>,
}

impl<V> Clone for ResourceHandle<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> ResourceHandle<V> {
    pub(crate) fn new(key: impl Into<String>, id: u64, value: V) -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(HandleInner {
                key: key.into(),
                id,
                value,
                created_at: now,
                created_wall: Utc::now(),
                last_used: Mutex::new(now),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Generation number, unique within the owning pool.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_wall
    }

    pub fn age(&self) -> Duration {
        self.inner.created_at.elapsed()
    }

    pub fn idle(&self) -> Duration {
        self.inner.last_used.lock().elapsed()
    }

    pub fn is_live(&self) -> bool {
        !self.inner.released.load(Ordering::Acquire)
    }

    /// Access the resource, failing if the handle has collapsed.
    pub fn get(&self) -> Result<&V> {
        if self.is_live() {
            Ok(&self.inner.value)
        } else {
            Err(Error::StaleHandle(format!(
                "{} (generation {})",
                self.inner.key, self.inner.id
            )))
        }
    }

    /// Whether two handles refer to the same hydration.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn touch(&self) {
        *self.inner.last_used.lock() = Instant::now();
    }

    pub(crate) fn value(&self) -> &V {
        &self.inner.value
    }

    /// Flip to released. Returns true only for the first caller.
    pub(crate) fn collapse(&self) -> bool {
        self.inner
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<V> fmt::Debug for ResourceHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("key", &self.inner.key)
            .field("id", &self.inner.id)
            .field("created_at", &self.inner.created_wall)
            .field("live", &self.is_live())
            .finish()
    }
}
