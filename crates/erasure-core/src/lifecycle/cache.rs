use std::collections::{HashMap, VecDeque};

use crate::model::{UserId, UserRecord};

/// 批处理期间的有界用户快照缓存。
///
/// - **契约 (What)**：容量满时按插入顺序淘汰最早的条目；调度器处理完一个用户后显式调用 [`UserCache::evict`]，
///   因此一轮批处理的常驻内存与候选人数量无关。
#[derive(Debug)]
pub struct UserCache {
    capacity: usize,
    entries: HashMap<UserId, UserRecord>,
    order: VecDeque<UserId>,
}

impl UserCache {
    /// 容量至少为 1。
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, user_id: &UserId) -> Option<&UserRecord> {
        self.entries.get(user_id)
    }

    pub fn insert(&mut self, record: UserRecord) {
        if self.entries.contains_key(&record.id) {
            self.entries.insert(record.id.clone(), record);
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(record.id.clone());
        self.entries.insert(record.id.clone(), record);
    }

    pub fn evict(&mut self, user_id: &UserId) -> Option<UserRecord> {
        let removed = self.entries.remove(user_id)?;
        self.order.retain(|id| id != user_id);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
