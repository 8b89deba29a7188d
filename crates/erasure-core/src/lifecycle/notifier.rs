use chrono::{DateTime, Utc};

use crate::error::NotifyError;
use crate::model::UserRecord;

/// 向用户发送“账号即将删除”通知的协作方（邮件、站内信等）。
///
/// 实现只负责投递；是否该发、是否已发过由调度器决定。失败时返回 [`NotifyError::Delivery`]。
pub trait LifecycleNotifier: Send + Sync {
    fn send_notice(&self, user: &UserRecord, when: DateTime<Utc>) -> Result<(), NotifyError>;
}

/// 只把通知写入日志的实现，适用于尚未接入投递通道的部署。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl LifecycleNotifier for TracingNotifier {
    fn send_notice(&self, user: &UserRecord, when: DateTime<Utc>) -> Result<(), NotifyError> {
        tracing::info!(user_id = %user.id, delete_at = %when, "pending deletion notice issued");
        Ok(())
    }
}
