#![deny(unsafe_code)]
#![doc = "erasure-core: 用户数据擦除/匿名化引擎、只追加审计轨迹与生命周期调度的核心契约。"]
#![doc = ""]
#![doc = "== 组件拓扑 =="]
#![doc = "生命周期调度器 → 资格守卫 → [通知 | 擦除引擎] → 字段策略注册表（按注册顺序扇出到业务域处理器）→ 审计轨迹（追加）→ 身份库（禁用登录，终态）。"]
#![doc = ""]
#![doc = "== 宿主协作方 =="]
#![doc = "身份库、业务域处理器、通知投递与资源探针均以 trait 注入；本 crate 只负责“改了什么、为什么改”的系统记录。"]

//! # 模块导览
//!
//! - [`audit`]：只追加的用户变更审计轨迹（内存实现与 JSON Lines 文件实现）。
//! - [`policy`]：业务域 → 动作（擦除/匿名化/忽略）的注册表与处理器契约。
//! - [`guard`]：擦除/通知共用的资格规则。
//! - [`wipe`]：擦除编排、部分失败收敛与 dry-run 预览。
//! - [`lifecycle`]：到期计算、通知幂等与批处理资源护栏。
//! - [`config`]：TOML 配置文档。
//! - [`test_stubs`]：测试与演示用的协作方桩实现。

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod identity;
pub mod in_flight;
pub mod lifecycle;
pub mod model;
pub mod policy;
pub mod test_stubs;
pub mod wipe;

pub use audit::{
    AuditTrailStore, EntryId, InMemoryAuditTrail, JsonLinesAuditTrail, NewTrailEntry,
    TrailQuery, UserTrailEntry,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{ComplianceConfig, ConfigError};
pub use error::{
    AuditStoreError, CorruptRecordError, DuplicateDomainError, IdentityError,
    IneligibilityReason, LifecycleError, NotifyError, UnregisteredDomainsError, ValidationError,
    WipeError,
};
pub use guard::EligibilityGuard;
pub use identity::{IdentityStore, InMemoryIdentityStore};
pub use lifecycle::{
    LifecycleNotifier, LifecycleScheduler, LifecycleSettings, LifecycleStatus,
    NotificationStateStore, Period, PeriodParseError, ResourceProbe, SweepParams, SweepSummary,
};
pub use model::{
    ChangeDescriptor, DomainName, FieldAction, FieldChange, Initiator, PolicyAction,
    RequesterIp, UserId, UserRecord,
};
pub use policy::{
    DomainHandler, FieldPolicy, HandlerError, HandlerRequest, PolicyRegistry, PolicyRegistryBuilder,
};
pub use wipe::{DomainOutcome, WipeEngine, WipeReport, WipeRequest, WipeSettings};

/// 统一结果别名，默认错误类型为擦除引擎错误。
pub type Result<T, E = WipeError> = core::result::Result<T, E>;
