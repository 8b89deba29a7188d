use chrono::{DateTime, Utc};

use super::entry::UserTrailEntry;
use crate::model::UserId;

/// 审计轨迹查询参数。
///
/// # 教案式说明
/// - **意图（Why）**：按用户过滤是查询的必选维度，时间窗与条数上限为可选维度；以参数对象显式传入，
///   存储实现无需感知调用方的过滤习惯。
/// - **契约（What）**：`since`/`until` 均为闭区间；`limit` 在过滤后按创建顺序截取前 N 条。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrailQuery {
    pub user_id: UserId,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl TrailQuery {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            since: None,
            until: None,
            limit: None,
        }
    }

    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &UserTrailEntry) -> bool {
        entry.user_id == self.user_id
            && self.since.is_none_or(|since| entry.created_at >= since)
            && self.until.is_none_or(|until| entry.created_at <= until)
    }

    /// 对按创建顺序排列的条目应用过滤与截取。
    pub fn apply<I>(&self, entries: I) -> Vec<UserTrailEntry>
    where
        I: IntoIterator<Item = UserTrailEntry>,
    {
        let filtered = entries.into_iter().filter(|entry| self.matches(entry));
        match self.limit {
            Some(limit) => filtered.take(limit).collect(),
            None => filtered.collect(),
        }
    }
}
