use std::sync::Arc;

use parking_lot::Mutex;

use super::chain::GENESIS_DIGEST;
use super::entry::{EntryId, NewTrailEntry, UserTrailEntry};
use super::query::TrailQuery;
use super::store::AuditTrailStore;
use crate::clock::{Clock, SystemClock};
use crate::error::AuditStoreError;
use crate::model::RequesterIp;

/// 基于内存的审计轨迹，便于测试与演示回放。
pub struct InMemoryAuditTrail {
    inner: Mutex<TrailState>,
    clock: Arc<dyn Clock>,
    origin: RequesterIp,
}

#[derive(Default)]
struct TrailState {
    entries: Vec<UserTrailEntry>,
    last_digest: String,
}

impl InMemoryAuditTrail {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(TrailState {
                entries: Vec::new(),
                last_digest: GENESIS_DIGEST.to_owned(),
            }),
            clock,
            origin: RequesterIp::Cli,
        }
    }

    /// 指定请求未携带来源地址时使用的默认值。
    pub fn with_origin(mut self, origin: RequesterIp) -> Self {
        self.origin = origin;
        self
    }

    /// 返回当前已记录条目的副本。
    pub fn entries(&self) -> Vec<UserTrailEntry> {
        self.inner.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 构造便于注入的 `Arc<dyn AuditTrailStore>`。
    pub fn shared(self) -> Arc<dyn AuditTrailStore> {
        Arc::new(self)
    }
}

impl Default for InMemoryAuditTrail {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl AuditTrailStore for InMemoryAuditTrail {
    fn append(&self, entry: NewTrailEntry) -> Result<EntryId, AuditStoreError> {
        let mut guard = self.inner.lock();
        let id = EntryId(guard.entries.len() as u64 + 1);
        let sealed = UserTrailEntry::seal(entry, id, self.clock.now(), self.origin, &guard.last_digest)?;
        guard.last_digest = sealed.digest.clone();
        guard.entries.push(sealed);
        Ok(id)
    }

    fn find_by_user(&self, query: &TrailQuery) -> Result<Vec<UserTrailEntry>, AuditStoreError> {
        let guard = self.inner.lock();
        Ok(query.apply(guard.entries.iter().cloned()))
    }

    fn all(&self) -> Result<Vec<UserTrailEntry>, AuditStoreError> {
        Ok(self.entries())
    }
}
