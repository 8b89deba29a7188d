use std::time::Duration;

use thiserror::Error;

use crate::model::{FieldChange, PolicyAction, UserId};

/// 传给业务域处理器的单次调用参数。
#[derive(Clone, Copy, Debug)]
pub struct HandlerRequest<'a> {
    pub user_id: &'a UserId,
    pub action: PolicyAction,
    /// 为 `true` 时处理器只报告将要变更的字段，不得修改任何数据。
    pub dry_run: bool,
}

/// 处理器失败。擦除引擎捕获后转为 `failed` 描述符，不会中断整次擦除。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed(detail.into())
    }
}

/// 业务域处理能力。
///
/// # 教案式说明
/// - **意图（Why）**：擦除引擎不认识任何具体存储，只通过该能力把“擦除/匿名化用户 X”下发给协作方。
/// - **契约（What）**：
///   - 幂等：对同一用户重复调用不会产生额外副作用；
///   - 返回实际（或 dry-run 下将要）变更的字段列表，无数据时返回空列表；
///   - 返回值中不得携带被擦除字段的取值。
/// - **风险（Trade-offs）**：调用是同步的；慢处理器需配合擦除引擎的单处理器超时使用。
pub trait DomainHandler: Send + Sync + 'static {
    fn handle(&self, request: &HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError>;
}

impl<F> DomainHandler for F
where
    F: Fn(&HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, request: &HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError> {
        self(request)
    }
}

/// 什么也不做的处理器，用作隐式 `Ignore` 策略的占位。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl DomainHandler for NoopHandler {
    fn handle(&self, _request: &HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError> {
        Ok(Vec::new())
    }
}
