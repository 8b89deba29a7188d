//! 擦除引擎共享的领域类型。
//!
//! # 设计目标（Why）
//! - 审计轨迹、策略注册表、资格守卫与调度器之间只通过这些强类型交互，避免在各组件间传递裸字符串。
//! - 所有类型均实现 `serde`，审计行、通知状态与文件宿主共用同一套编码。
//!
//! # 契约概览（What）
//! - [`UserId`]：主体标识，允许为空字符串以便在追加时由审计轨迹统一拒绝。
//! - [`PolicyAction`] 与 [`FieldAction`]：前者是注册时声明的意图，后者是实际落到轨迹里的结果（多出 `Failed`）。
//! - [`ChangeDescriptor`]：审计条目 `items` 中的单个元素。
//! - [`RequesterIp`]：来源地址或 `(CLI)` 哨兵值。

use std::borrow::Borrow;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 被擦除主体的稳定标识。
///
/// 内部以 `Arc<str>` 保存，克隆只增加引用计数；宿主若使用整数主键，可通过 `From<u64>` 转换。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Arc<str>);

impl UserId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 空白标识视为空；审计轨迹据此拒绝追加。
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for UserId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self::new(value.to_string())
    }
}

/// 业务域名称，例如 `profile`、`comments`、`uploads`。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainName(Arc<str>);

impl DomainName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for DomainName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DomainName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DomainName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// 擦除请求的发起方。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    /// 管理员通过后台或 CLI 发起。
    Admin,
    /// 用户本人行使被遗忘权。
    User,
    /// 生命周期策略触发的无人值守擦除。
    Lifecycle,
}

impl Initiator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Lifecycle => "lifecycle",
        }
    }
}

impl fmt::Display for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 注册策略时声明的动作。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Erase,
    Anonymize,
    Ignore,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erase => "erase",
            Self::Anonymize => "anonymize",
            Self::Ignore => "ignore",
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 审计轨迹中记录的实际结果。
///
/// 与 [`PolicyAction`] 的区别在于 `Failed`：处理器报错、panic 或超时都会以该变体落盘，而不会中断整次擦除。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAction {
    Erase,
    Anonymize,
    Ignore,
    Failed,
}

impl FieldAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erase => "erase",
            Self::Anonymize => "anonymize",
            Self::Ignore => "ignore",
            Self::Failed => "failed",
        }
    }
}

impl From<PolicyAction> for FieldAction {
    fn from(value: PolicyAction) -> Self {
        match value {
            PolicyAction::Erase => Self::Erase,
            PolicyAction::Anonymize => Self::Anonymize,
            PolicyAction::Ignore => Self::Ignore,
        }
    }
}

impl fmt::Display for FieldAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 业务域处理器返回的单字段变更。
///
/// `redacted = true` 表示轨迹中不保留该字段的任何取值，仅保留“动过”这一事实。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub action: FieldAction,
    pub redacted: bool,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, action: FieldAction, redacted: bool) -> Self {
        Self {
            field: field.into(),
            action,
            redacted,
        }
    }

    /// 擦除字段，取值不进入轨迹。
    pub fn erased(field: impl Into<String>) -> Self {
        Self::new(field, FieldAction::Erase, true)
    }

    /// 匿名化字段，取值不进入轨迹。
    pub fn anonymized(field: impl Into<String>) -> Self {
        Self::new(field, FieldAction::Anonymize, true)
    }
}

/// 审计条目 `items` 的元素。
///
/// ## 契约说明（What）
/// - `domain`/`field`：可包含任意字符（逗号、引号、换行），编码层负责转义。
/// - `detail`：可选的非个人信息说明，例如失败原因或“域未注册”。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    pub domain: String,
    pub field: String,
    pub action: FieldAction,
    pub redacted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// 整域级描述符使用的字段名。
pub const WHOLE_DOMAIN_FIELD: &str = "*";

impl ChangeDescriptor {
    pub fn from_change(domain: &DomainName, change: FieldChange) -> Self {
        Self {
            domain: domain.as_str().to_owned(),
            field: change.field,
            action: change.action,
            redacted: change.redacted,
            detail: None,
        }
    }

    /// 针对整个业务域的描述符（忽略、未注册、失败、无数据）。
    pub fn whole_domain(domain: &DomainName, action: FieldAction, detail: impl Into<String>) -> Self {
        Self {
            domain: domain.as_str().to_owned(),
            field: WHOLE_DOMAIN_FIELD.to_owned(),
            action,
            redacted: false,
            detail: Some(detail.into()),
        }
    }
}

/// 变更请求来源。
///
/// 序列化为字符串：网络来源输出 IP 文本，非网络上下文输出哨兵值 `(CLI)`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RequesterIp {
    Cli,
    Address(IpAddr),
}

impl RequesterIp {
    pub const CLI_SENTINEL: &'static str = "(CLI)";
}

impl fmt::Display for RequesterIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => f.write_str(Self::CLI_SENTINEL),
            Self::Address(ip) => write!(f, "{ip}"),
        }
    }
}

impl From<RequesterIp> for String {
    fn from(value: RequesterIp) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for RequesterIp {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for RequesterIp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::CLI_SENTINEL {
            return Ok(Self::Cli);
        }
        s.parse::<IpAddr>()
            .map(Self::Address)
            .map_err(|err| format!("invalid requester ip `{s}`: {err}"))
    }
}

/// 身份库返回的用户快照。
///
/// ## 契约说明（What）
/// - `last_activity` 缺省表示从未登录，生命周期参考时间回退到 `registered_at`。
/// - `wiped` 由身份库在 `disable_login` 这一终态步骤中置位。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub name: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub wiped: bool,
}

impl UserRecord {
    /// 生命周期规则使用的参考时间点。
    pub fn lifecycle_reference(&self) -> DateTime<Utc> {
        self.last_activity.unwrap_or(self.registered_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requester_ip_uses_cli_sentinel() {
        let json = serde_json::to_string(&RequesterIp::Cli).unwrap();
        assert_eq!(json, "\"(CLI)\"");
        let parsed: RequesterIp = serde_json::from_str("\"10.0.0.7\"").unwrap();
        assert_eq!(parsed, RequesterIp::Address("10.0.0.7".parse().unwrap()));
        assert!(serde_json::from_str::<RequesterIp>("\"not-an-ip\"").is_err());
    }

    #[test]
    fn blank_user_id_is_empty() {
        assert!(UserId::from("  ").is_empty());
        assert!(!UserId::from(42u64).is_empty());
    }

    #[test]
    fn reference_falls_back_to_registration() {
        let registered = "2018-01-01T00:00:00Z".parse().unwrap();
        let mut record = UserRecord {
            id: UserId::from("7"),
            username: "alice".into(),
            name: "Alice".into(),
            email: "alice@example.invalid".into(),
            registered_at: registered,
            last_activity: None,
            wiped: false,
        };
        assert_eq!(record.lifecycle_reference(), registered);
        let seen = "2019-02-01T00:00:00Z".parse().unwrap();
        record.last_activity = Some(seen);
        assert_eq!(record.lifecycle_reference(), seen);
    }
}
