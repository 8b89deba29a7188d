use super::chain;
use super::entry::{EntryId, NewTrailEntry, UserTrailEntry};
use super::query::TrailQuery;
use crate::error::AuditStoreError;

/// 审计轨迹存储契约。
///
/// ## 设计动机（Why）
/// - 擦除引擎只关心“条目被可靠追加”，落到内存、文件还是数据库由宿主决定。
///
/// ## 契约说明（What）
/// - `append`：校验并追加一条记录，返回分配的 [`EntryId`]；`user_id` 为空时返回校验错误且不落盘。
/// - `find_by_user`：按创建顺序返回匹配条目；遇到损坏记录返回错误而非跳过。
/// - `all`：按创建顺序返回全部条目。
/// - 不存在更新或删除操作。
pub trait AuditTrailStore: Send + Sync {
    fn append(&self, entry: NewTrailEntry) -> Result<EntryId, AuditStoreError>;

    fn find_by_user(&self, query: &TrailQuery) -> Result<Vec<UserTrailEntry>, AuditStoreError>;

    fn all(&self) -> Result<Vec<UserTrailEntry>, AuditStoreError>;

    /// 重算哈希链，返回校验通过的条目数。
    fn verify_chain(&self) -> Result<usize, AuditStoreError> {
        let entries = self.all()?;
        chain::verify_chain(&entries)
    }
}
