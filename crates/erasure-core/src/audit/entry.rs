use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chain::entry_digest;
use crate::error::{AuditStoreError, ValidationError};
use crate::model::{ChangeDescriptor, RequesterIp, UserId};

/// 审计条目编号，从 1 开始单调递增。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    pub const FIRST: EntryId = EntryId(1);

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> EntryId {
        EntryId(self.0.saturating_add(1))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 待追加的审计条目。
///
/// ## 契约说明（What）
/// - `user_id`：必填且非空，否则追加时返回 [`ValidationError`]。
/// - `created_by`：缺省表示系统/无人值守操作者（例如生命周期任务）。
/// - `requester_ip`：缺省时由存储层按所在上下文补齐（CLI 上下文为 `(CLI)`）。
/// - `items`：允许为空，但永远不是 `null`。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTrailEntry {
    pub user_id: UserId,
    pub created_by: Option<UserId>,
    pub requester_ip: Option<RequesterIp>,
    pub items: Vec<ChangeDescriptor>,
}

impl NewTrailEntry {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            created_by: None,
            requester_ip: None,
            items: Vec::new(),
        }
    }

    pub fn with_actor(mut self, actor: Option<UserId>) -> Self {
        self.created_by = actor;
        self
    }

    pub fn with_requester_ip(mut self, ip: Option<RequesterIp>) -> Self {
        self.requester_ip = ip;
        self
    }

    pub fn with_items(mut self, items: Vec<ChangeDescriptor>) -> Self {
        self.items = items;
        self
    }
}

/// 已落盘的审计条目。
///
/// 字段一经写入即不可变；`digest` 为前一条目摘要与本条目规范化 JSON 的 SHA-256。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTrailEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub requester_ip: RequesterIp,
    pub items: Vec<ChangeDescriptor>,
    pub digest: String,
}

impl UserTrailEntry {
    /// 是否由系统/无人值守操作者产生。
    pub fn is_system_actor(&self) -> bool {
        self.created_by.is_none()
    }

    /// 存储层共用的封装步骤：校验、补齐默认值、计算链式摘要。
    ///
    /// ### 前置/后置条件（Contract）
    /// - 前置：`id` 与 `previous_digest` 由调用方在同一把锁内读取，保证链不分叉。
    /// - 后置：返回的条目可直接持久化；校验失败时不产生任何副作用。
    pub(crate) fn seal(
        new: NewTrailEntry,
        id: EntryId,
        created_at: DateTime<Utc>,
        default_origin: RequesterIp,
        previous_digest: &str,
    ) -> Result<Self, AuditStoreError> {
        if new.user_id.is_empty() {
            return Err(ValidationError::new("cannot have an empty user id").into());
        }
        if let Some(actor) = &new.created_by
            && actor.is_empty()
        {
            return Err(ValidationError::new("actor id must not be blank when present").into());
        }
        let mut entry = Self {
            id,
            user_id: new.user_id,
            created_at,
            created_by: new.created_by,
            requester_ip: new.requester_ip.unwrap_or(default_origin),
            items: new.items,
            digest: String::new(),
        };
        entry.digest = entry_digest(previous_digest, &entry)?;
        Ok(entry)
    }
}
