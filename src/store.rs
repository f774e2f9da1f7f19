//! Plan and archive persistence boundaries.
//!
//! The engines treat persistence as keyed collections: plans keyed by
//! `plan_uuid` (storage) and `(event_id, date)` (sync), the archive as an
//! append-only set of sync keys. Writes are upsert-only so a sync can never
//! silently drop records it did not decide about.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::EngineError;
use crate::types::{ArchiveRecord, PlanRecord};

/// Live plan records.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// All live plan records. Order is storage-defined; the engines sort.
    async fn read_all(&self) -> Result<Vec<PlanRecord>, EngineError>;

    /// Insert or replace a record by `plan_uuid`.
    async fn upsert(&self, record: PlanRecord) -> Result<(), EngineError>;
}

/// Append-only archive of completed plans.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Sync keys (`eventId_date`) of every archived plan.
    async fn keys(&self) -> Result<HashSet<String>, EngineError>;

    async fn append(&self, record: ArchiveRecord) -> Result<(), EngineError>;
}

/// In-memory plan store. Keeps insertion order so scans can walk
/// newest-last; reference implementation for tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    records: Mutex<Vec<PlanRecord>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<PlanRecord>) -> Self {
        MemoryPlanStore {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn read_all(&self) -> Result<Vec<PlanRecord>, EngineError> {
        Ok(self.records.lock().clone())
    }

    async fn upsert(&self, record: PlanRecord) -> Result<(), EngineError> {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.plan_uuid == record.plan_uuid) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }
}

/// In-memory append-only archive.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    records: Mutex<Vec<ArchiveRecord>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all archived records (test/report helper).
    pub fn records(&self) -> Vec<ArchiveRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    async fn keys(&self) -> Result<HashSet<String>, EngineError> {
        Ok(self.records.lock().iter().map(|r| r.sync_key()).collect())
    }

    async fn append(&self, record: ArchiveRecord) -> Result<(), EngineError> {
        self.records.lock().push(record);
        Ok(())
    }
}
