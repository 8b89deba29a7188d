//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义擦除引擎对外暴露的错误语义，区分“业务结果”与“契约违背”两类。
//! - 资格不足（[`IneligibilityReason`]）与单域处理失败是预期结果，会被收敛为报告数据；
//!   重复注册、轨迹损坏等契约违背才以硬错误向上传播。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error` 与 `anyhow`。
//! - 错误信息只携带标识（用户 ID、域名、条目号），不携带被擦除字段的取值。

use std::borrow::Cow;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::EntryId;
use crate::lifecycle::NotificationStateError;
use crate::model::UserId;

/// 审计条目追加前的校验失败（调用方缺陷，对该次调用致命）。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("audit trail entry rejected: {reason}")]
pub struct ValidationError {
    reason: Cow<'static, str>,
}

impl ValidationError {
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// 同一业务域被重复注册（启动期配置错误）。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("data domain `{domain}` is already registered")]
pub struct DuplicateDomainError {
    pub domain: String,
}

/// 严格模式下，配置声明的业务域没有对应处理器。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("expected data domains have no registered handler: {}", domains.join(", "))]
pub struct UnregisteredDomainsError {
    pub domains: Vec<String>,
}

/// 已持久化的审计记录无法解读。
///
/// - **契约 (What)**：`record` 指向损坏位置（条目号或文件行号），`detail` 为解析器给出的原因；
///   读路径遇到该错误时必须上抛，不得回退为空列表。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("audit trail record {record} is corrupt: {detail}")]
pub struct CorruptRecordError {
    pub record: String,
    pub detail: String,
}

impl CorruptRecordError {
    pub fn at_entry(id: EntryId, detail: impl Into<String>) -> Self {
        Self {
            record: format!("#{id}"),
            detail: detail.into(),
        }
    }

    pub fn at_line(line: usize, detail: impl Into<String>) -> Self {
        Self {
            record: format!("at line {line}"),
            detail: detail.into(),
        }
    }
}

/// 审计轨迹存储层错误。
#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Corrupt(#[from] CorruptRecordError),

    #[error("failed to encode audit trail entry: {detail}")]
    Encode { detail: String },

    #[error("audit trail i/o failure on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 失败的追加未能回滚，文件尾部状态未知，拒绝继续写入。
    #[error("audit trail `{}` is unusable after a failed append could not be rolled back", path.display())]
    Poisoned { path: PathBuf },
}

/// 宿主身份库错误。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("user `{0}` does not exist")]
    NotFound(UserId),

    #[error("identity store failure: {0}")]
    Backend(String),
}

/// 资格守卫拒绝的原因，按规则求值顺序排列。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IneligibilityReason {
    #[error("user does not exist")]
    UserNotFound,

    #[error("user is the only remaining administrator")]
    LastAdministrator,

    #[error("user is a protected system account")]
    ProtectedAccount,

    #[error("user has already been wiped")]
    AlreadyWiped,

    #[error("lifecycle deletion is not due until {due_at}")]
    NotYetDue { due_at: DateTime<Utc> },

    /// 身份库不可用时一律视为不满足资格，不做乐观放行。
    #[error("identity store unavailable: {detail}")]
    IdentityUnavailable { detail: String },
}

impl IneligibilityReason {
    /// 稳定的机器可读代码，用于日志字段与 CLI 输出。
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound => "user_not_found",
            Self::LastAdministrator => "last_administrator",
            Self::ProtectedAccount => "protected_account",
            Self::AlreadyWiped => "already_wiped",
            Self::NotYetDue { .. } => "not_yet_due",
            Self::IdentityUnavailable { .. } => "identity_unavailable",
        }
    }
}

/// 擦除入口的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方需要区分“不该擦”（业务结果）、“正在擦”（并发冲突）与“擦了但轨迹没写进去”三种情形。
/// - **契约 (What)**：
///   - `Ineligible`：未产生任何状态变更；
///   - `InProgress`：同一用户已有擦除在执行，本次请求被拒绝且无副作用；
///   - `AuditAppend`：各域处理已执行，登录禁用也已尝试（结果见 `login_disabled`），但审计条目未能落盘。
#[derive(Debug, Error)]
pub enum WipeError {
    #[error("user is not eligible for wiping: {0}")]
    Ineligible(#[from] IneligibilityReason),

    #[error("a wipe for user `{user_id}` is already in progress")]
    InProgress { user_id: UserId },

    #[error("wipe executed but the audit trail append failed (login disabled: {login_disabled}): {source}")]
    AuditAppend {
        #[source]
        source: AuditStoreError,
        login_disabled: bool,
    },
}

/// 生命周期通知错误。
#[derive(Debug, Error)]
pub enum NotifyError {
    /// 同一窗口内已通知过；编排层视为“跳过”而非失败。
    #[error("user `{user_id}` was already notified at {notified_at}")]
    AlreadyNotified {
        user_id: UserId,
        notified_at: DateTime<Utc>,
    },

    #[error("user is not eligible for lifecycle notification: {0}")]
    Ineligible(#[from] IneligibilityReason),

    #[error("notice delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    State(#[from] NotificationStateError),
}

/// 生命周期批处理的基础设施错误（列出用户或读写通知状态失败）。
///
/// 单个用户的通知失败不会以该错误返回，而是计入 [`SweepSummary`](crate::lifecycle::SweepSummary)。
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    State(#[from] NotificationStateError),
}
