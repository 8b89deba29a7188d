//! 生命周期通知状态。
//!
//! # 教案式说明
//! - **意图（Why）**：通知-删除是两阶段流程，两次运行之间必须记住“谁在什么时候、针对哪个到期日被通知过”，
//!   否则重复运行任务会重复打扰用户。
//! - **契约（What）**：
//!   - 以用户 ID 为键，每个用户至多一条记录；
//!   - 通知窗口由 `reference`（计算到期日所依据的活跃时间）标识：同一窗口内 [`NotificationStateStore::claim`]
//!     返回已有记录，用户重新活跃后参考时间变化，旧记录被新窗口替换；
//!   - `claim` 的“检查并写入”在存储内部原子完成。
//! - **风险（Trade-offs）**：文件实现每次写入都重写整个文件，适合运维脚本规模的数据量。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub user_id: UserId,
    pub notified_at: DateTime<Utc>,
    /// 通知中告知用户的删除时间。
    pub when: DateTime<Utc>,
    /// 计算 `when` 所依据的生命周期参考时间。
    pub reference: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    Existing(NotificationRecord),
}

#[derive(Debug, Error)]
pub enum NotificationStateError {
    #[error("notification state i/o failure on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notification state `{}` is corrupt: {detail}", path.display())]
    Corrupt { path: PathBuf, detail: String },
}

pub trait NotificationStateStore: Send + Sync {
    fn get(&self, user_id: &UserId) -> Result<Option<NotificationRecord>, NotificationStateError>;

    /// 为记录所在窗口登记通知；同一窗口已有记录时返回 [`ClaimOutcome::Existing`] 且不做修改。
    fn claim(&self, record: NotificationRecord) -> Result<ClaimOutcome, NotificationStateError>;

    /// 撤销登记（投递失败回滚、或用户已被擦除）。
    fn release(&self, user_id: &UserId) -> Result<(), NotificationStateError>;

    fn all(&self) -> Result<Vec<NotificationRecord>, NotificationStateError>;
}

fn claim_in(map: &mut BTreeMap<UserId, NotificationRecord>, record: NotificationRecord) -> ClaimOutcome {
    if let Some(existing) = map.get(&record.user_id)
        && existing.reference == record.reference
    {
        return ClaimOutcome::Existing(existing.clone());
    }
    map.insert(record.user_id.clone(), record);
    ClaimOutcome::Claimed
}

#[derive(Debug, Default)]
pub struct InMemoryNotificationState {
    records: Mutex<BTreeMap<UserId, NotificationRecord>>,
}

impl InMemoryNotificationState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationStateStore for InMemoryNotificationState {
    fn get(&self, user_id: &UserId) -> Result<Option<NotificationRecord>, NotificationStateError> {
        Ok(self.records.lock().get(user_id).cloned())
    }

    fn claim(&self, record: NotificationRecord) -> Result<ClaimOutcome, NotificationStateError> {
        Ok(claim_in(&mut self.records.lock(), record))
    }

    fn release(&self, user_id: &UserId) -> Result<(), NotificationStateError> {
        self.records.lock().remove(user_id);
        Ok(())
    }

    fn all(&self) -> Result<Vec<NotificationRecord>, NotificationStateError> {
        Ok(self.records.lock().values().cloned().collect())
    }
}

/// JSON 文件通知状态：整个映射保存为一个 JSON 对象，写入经临时文件替换。
#[derive(Debug)]
pub struct JsonNotificationState {
    path: PathBuf,
    records: Mutex<BTreeMap<UserId, NotificationRecord>>,
}

impl JsonNotificationState {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, NotificationStateError> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|err| NotificationStateError::Corrupt {
                path: path.clone(),
                detail: err.to_string(),
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(NotificationStateError::Io { path, source }),
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &BTreeMap<UserId, NotificationRecord>) -> Result<(), NotificationStateError> {
        let io = |source| NotificationStateError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let text = serde_json::to_string_pretty(records).map_err(|err| NotificationStateError::Corrupt {
            path: self.path.clone(),
            detail: err.to_string(),
        })?;
        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, text).map_err(io)?;
        std::fs::rename(&staging, &self.path).map_err(io)
    }
}

impl NotificationStateStore for JsonNotificationState {
    fn get(&self, user_id: &UserId) -> Result<Option<NotificationRecord>, NotificationStateError> {
        Ok(self.records.lock().get(user_id).cloned())
    }

    fn claim(&self, record: NotificationRecord) -> Result<ClaimOutcome, NotificationStateError> {
        let mut records = self.records.lock();
        let mut updated = records.clone();
        let outcome = claim_in(&mut updated, record);
        if outcome == ClaimOutcome::Claimed {
            self.persist(&updated)?;
            *records = updated;
        }
        Ok(outcome)
    }

    fn release(&self, user_id: &UserId) -> Result<(), NotificationStateError> {
        let mut records = self.records.lock();
        if !records.contains_key(user_id) {
            return Ok(());
        }
        let mut updated = records.clone();
        updated.remove(user_id);
        self.persist(&updated)?;
        *records = updated;
        Ok(())
    }

    fn all(&self) -> Result<Vec<NotificationRecord>, NotificationStateError> {
        Ok(self.records.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reference: &str) -> NotificationRecord {
        NotificationRecord {
            user_id: UserId::from("5"),
            notified_at: "2019-06-01T00:00:00Z".parse().unwrap(),
            when: "2019-07-01T00:00:00Z".parse().unwrap(),
            reference: reference.parse().unwrap(),
        }
    }

    #[test]
    fn same_window_claims_once_new_window_replaces() {
        let state = InMemoryNotificationState::new();
        assert_eq!(state.claim(record("2019-01-01T00:00:00Z")).unwrap(), ClaimOutcome::Claimed);
        assert!(matches!(
            state.claim(record("2019-01-01T00:00:00Z")).unwrap(),
            ClaimOutcome::Existing(_)
        ));
        assert_eq!(state.claim(record("2019-03-01T00:00:00Z")).unwrap(), ClaimOutcome::Claimed);
        assert_eq!(state.all().unwrap().len(), 1);
    }

    #[test]
    fn json_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.json");
        {
            let state = JsonNotificationState::open(&path).unwrap();
            state.claim(record("2019-01-01T00:00:00Z")).unwrap();
        }
        let state = JsonNotificationState::open(&path).unwrap();
        assert!(matches!(
            state.claim(record("2019-01-01T00:00:00Z")).unwrap(),
            ClaimOutcome::Existing(_)
        ));
        state.release(&UserId::from("5")).unwrap();
        assert!(JsonNotificationState::open(&path).unwrap().all().unwrap().is_empty());
    }
}
