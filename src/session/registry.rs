use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::buffer::RequestState;

/// Tracks live request sessions for the health endpoint.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_key: AtomicU64,
    sessions: Mutex<FxHashMap<u64, Weak<Mutex<RequestState>>>>,
}

/// Point-in-time counts over all live sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub active_requests: usize,
    pub total_buffers: usize,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(self: &Arc<Self>, state: &Arc<Mutex<RequestState>>) -> Registration {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.sessions.lock().insert(key, Arc::downgrade(state));
        Registration {
            registry: Arc::clone(self),
            key,
        }
    }

    fn unregister(&self, key: u64) {
        self.sessions.lock().remove(&key);
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let live: Vec<Arc<Mutex<RequestState>>> = {
            let mut sessions = self.sessions.lock();
            sessions.retain(|_, state| state.strong_count() > 0);
            sessions.values().filter_map(Weak::upgrade).collect()
        };
        RegistryStats {
            active_requests: live.len(),
            total_buffers: live.iter().map(|state| state.lock().buffer_count()).sum(),
        }
    }
}

/// Removes its session from the registry when dropped.
#[derive(Debug)]
pub(crate) struct Registration {
    registry: Arc<SessionRegistry>,
    key: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.key);
    }
}
