//! Backend session handle
//!
//! A `Session` is the engine's entry point into the backend: it distributes
//! local collections into partitioned ones and manages named temp views so
//! multi-pass algorithms (the order-by key materialization, for one) can
//! re-read a cached frame by name.

use crate::frame::Frame;
use crate::rdd::Rdd;
use std::collections::HashMap;
use std::sync::RwLock;

/// Default partition count for distributed collections
pub const DEFAULT_PARTITIONS: usize = 4;

/// Backend session
#[derive(Debug)]
pub struct Session {
    views: RwLock<HashMap<String, Frame>>,
    default_partitions: usize,
}

impl Session {
    /// Create a session with the default partition count
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    /// Create a session with an explicit partition count
    pub fn with_partitions(default_partitions: usize) -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
            default_partitions: default_partitions.max(1),
        }
    }

    /// Partition count used by [`parallelize`](Self::parallelize)
    pub fn default_partitions(&self) -> usize {
        self.default_partitions
    }

    /// Distribute a local collection over the session's partitions
    pub fn parallelize<T: Clone>(&self, items: Vec<T>) -> Rdd<T> {
        Rdd::from_vec(items, self.default_partitions)
    }

    /// Register (or replace) a named temp view
    pub fn create_or_replace_temp_view(&self, name: impl Into<String>, frame: Frame) {
        let mut views = self.views.write().unwrap_or_else(|e| e.into_inner());
        views.insert(name.into(), frame);
    }

    /// Look up a temp view by name
    pub fn table(&self, name: &str) -> Option<Frame> {
        let views = self.views.read().unwrap_or_else(|e| e.into_inner());
        views.get(name).cloned()
    }

    /// Remove a temp view; returns whether it existed
    pub fn drop_temp_view(&self, name: &str) -> bool {
        let mut views = self.views.write().unwrap_or_else(|e| e.into_inner());
        views.remove(name).is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
