//! Explicit registry of the streams a client has handed out.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::stream::StreamAbortHandle;

#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    streams: Arc<Mutex<HashMap<String, StreamAbortHandle>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StreamAbortHandle>> {
        // A panic while holding the lock cannot leave the map inconsistent
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, id: &str, handle: StreamAbortHandle) -> Registration {
        self.lock().insert(id.to_string(), handle);
        Registration {
            id: id.to_string(),
            registry: self.clone(),
            released: false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn handles(&self) -> Vec<StreamAbortHandle> {
        self.lock().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn remove(&self, id: &str) {
        self.lock().remove(id);
    }
}

/// Membership of one stream in the registry.
///
/// Released explicitly when the stream finishes, or on drop for streams
/// that never ran.
#[derive(Debug)]
pub struct Registration {
    id: String,
    registry: StreamRegistry,
    released: bool,
}

impl Registration {
    pub fn release(&mut self) {
        if !self.released {
            self.registry.remove(&self.id);
            self.released = true;
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}
