//! 生命周期策略：不活跃账号的“先通知、后删除”两阶段流程。

mod cache;
mod notifier;
mod period;
mod resource;
mod scheduler;
mod state;

pub use cache::UserCache;
pub use notifier::{LifecycleNotifier, TracingNotifier};
pub use period::{Period, PeriodParseError};
pub use resource::{ResourceProbe, UnboundedProbe};
pub use scheduler::{
    AutoConfirm, DEFAULT_MIN_FREE_MEMORY, DEFAULT_USER_CACHE_CAPACITY, DueWipe, LifecycleScheduler,
    LifecycleSettings, LifecycleStatus, SweepEvent, SweepObserver, SweepParams, SweepSummary,
};
pub use state::{
    ClaimOutcome, InMemoryNotificationState, JsonNotificationState, NotificationRecord,
    NotificationStateError, NotificationStateStore,
};
