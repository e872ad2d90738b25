//! Accumulation of run records for one session.

use bench_common::{IntegrityIssue, LayerId, RunRecord, Session, SessionMeta};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Collects RunRecords for one session in execution order.
///
/// At most one record is kept per (layer, concurrency) pair; a later record
/// replaces the earlier one.
#[derive(Debug, Clone)]
pub struct ResultStore {
    meta: SessionMeta,
    records: Vec<RunRecord>,
}

impl ResultStore {
    pub fn new(meta: SessionMeta) -> Self {
        Self {
            meta,
            records: Vec::new(),
        }
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    /// Append a record, returning the integrity issues it raised.
    ///
    /// Issues are logged and never reject the record.
    pub fn add(&mut self, record: RunRecord) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();

        if let Some(issue) = self.meta.check(&record) {
            warn!(session = %self.meta.id, "{}", issue);
            issues.push(issue);
        }

        if let Some(existing) = self
            .records
            .iter()
            .position(|r| r.key() == record.key())
        {
            self.records.remove(existing);
            let issue = IntegrityIssue::Duplicate {
                layer: record.layer().clone(),
                concurrency: record.concurrency(),
            };
            warn!(session = %self.meta.id, "{}", issue);
            issues.push(issue);
        }

        self.records.push(record);
        issues
    }

    /// Records of one layer, in configured concurrency order.
    pub fn records_for<'a>(&'a self, layer: &'a LayerId) -> impl Iterator<Item = &'a RunRecord> + 'a {
        let levels = &self.meta.concurrency_levels;
        let configured = levels.iter().filter_map(move |c| {
            self.records
                .iter()
                .find(|r| r.layer() == layer && r.concurrency() == *c)
        });
        let unconfigured = self
            .records
            .iter()
            .filter(move |r| r.layer() == layer && !levels.contains(&r.concurrency()));
        configured.chain(unconfigured)
    }

    /// All records in insertion order.
    pub fn all_records(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Freeze the store into a session.
    pub fn into_session(self) -> Session {
        Session::new(self.meta, self.records)
    }
}

/// Cloneable handle that serializes appends from parallel executions.
#[derive(Debug, Clone)]
pub struct SharedResultStore {
    inner: Arc<Mutex<ResultStore>>,
}

impl SharedResultStore {
    pub fn new(meta: SessionMeta) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResultStore::new(meta))),
        }
    }

    /// Append atomically with respect to other appends.
    pub async fn add(&self, record: RunRecord) -> Vec<IntegrityIssue> {
        self.inner.lock().await.add(record)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Copy of the current records in insertion order.
    pub async fn snapshot(&self) -> Vec<RunRecord> {
        self.inner.lock().await.all_records().cloned().collect()
    }

    /// Freeze into a session once every writer is done.
    ///
    /// Falls back to cloning when other handles are still alive.
    pub async fn into_session(self) -> Session {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner().into_session(),
            Err(shared) => shared.lock().await.clone().into_session(),
        }
    }
}
