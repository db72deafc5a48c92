//! In-process config store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::store::{ConfigStore, StoreError};
use crate::target::{BackendClass, Target, TargetId, TargetRecord};

/// Config store backed by a concurrent map.
///
/// Cloning shares the same underlying maps, so a test or an embedding
/// application can keep a handle and edit targets while the orchestrator runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<TargetId, TargetRecord>>,
    statuses: Arc<DashMap<TargetId, String>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a raw record. Records without an id are ignored.
    pub fn put_record(&self, record: TargetRecord) {
        match record.id() {
            Some(id) => {
                self.records.insert(TargetId::new(id), record);
            }
            None => tracing::warn!("Ignoring target record without id"),
        }
    }

    /// Insert or replace a target.
    pub fn put(&self, target: &Target) {
        self.records.insert(target.id.clone(), TargetRecord::from(target));
    }

    /// Apply an edit to an existing target. Returns false if absent or malformed.
    pub fn update<F>(&self, id: &TargetId, f: F) -> bool
    where
        F: FnOnce(&mut Target),
    {
        let Some(mut entry) = self.records.get_mut(id) else {
            return false;
        };
        match Target::try_from(&*entry) {
            Ok(mut target) => {
                f(&mut target);
                *entry = TargetRecord::from(&target);
                true
            }
            Err(_) => false,
        }
    }

    pub fn remove(&self, id: &TargetId) -> Option<TargetRecord> {
        self.records.remove(id).map(|(_, record)| record)
    }

    /// Make subsequent reads fail, simulating an unreachable store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Last status written back for a target.
    pub fn status(&self, id: &TargetId) -> Option<String> {
        self.statuses.get(id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list_targets(&self, backend: BackendClass) -> Result<Vec<TargetRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.value().backend() == Some(backend))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn get_target(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        self.check_available()?;
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    async fn report_status(&self, id: &TargetId, status: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.statuses.insert(id.clone(), status.to_string());
        Ok(())
    }
}
