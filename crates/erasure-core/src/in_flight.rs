//! 进行中的擦除登记表。
//!
//! - **意图 (Why)**：同一用户的两次擦除并发执行会产生两条轨迹、两次登录禁用，
//!   这里保证任一时刻每个用户至多一个擦除在执行。
//! - **契约 (What)**：[`InFlightWipes::try_acquire`] 成功时返回 RAII 槽位，槽位释放即解除占用；
//!   失败时返回 `None`，调用方据此拒绝请求。不同用户之间互不阻塞。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::model::UserId;

#[derive(Clone, Debug, Default)]
pub struct InFlightWipes {
    slots: Arc<DashMap<UserId, DateTime<Utc>>>,
}

impl InFlightWipes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试占用用户槽位；已被占用时返回 `None`。
    pub fn try_acquire(&self, user_id: &UserId, started_at: DateTime<Utc>) -> Option<InFlightSlot> {
        match self.slots.entry(user_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(started_at);
                Some(InFlightSlot {
                    slots: Arc::clone(&self.slots),
                    user_id: user_id.clone(),
                })
            }
        }
    }

    /// 槽位被占用的起始时间。
    pub fn started_at(&self, user_id: &UserId) -> Option<DateTime<Utc>> {
        self.slots.get(user_id).map(|slot| *slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// 擦除执行期间持有的槽位，析构时释放。
#[derive(Debug)]
pub struct InFlightSlot {
    slots: Arc<DashMap<UserId, DateTime<Utc>>>,
    user_id: UserId,
}

impl InFlightSlot {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.slots.remove(&self.user_id);
    }
}
