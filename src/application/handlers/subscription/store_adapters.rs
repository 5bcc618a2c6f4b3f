//! Per-platform store adapter lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::subscription::{Platform, ReconcileError};
use crate::ports::{StoreAdapter, StoreError};

/// The store adapters configured for this deployment, one per platform.
#[derive(Clone, Default)]
pub struct StoreAdapters {
    adapters: HashMap<Platform, Arc<dyn StoreAdapter>>,
}

impl StoreAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under the platform it reports.
    pub fn with(mut self, adapter: Arc<dyn StoreAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> Result<&Arc<dyn StoreAdapter>, ReconcileError> {
        self.adapters.get(&platform).ok_or_else(|| {
            StoreError::NotConfigured(format!("no store adapter for {}", platform)).into()
        })
    }
}
