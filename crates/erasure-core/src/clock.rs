// 教案级说明：擦除引擎、审计轨迹与生命周期调度共用同一个墙钟抽象。
//
// - **契约 (What)**：`SystemClock` 读取系统 UTC 时间；`MockClock` 提供手动推进的确定性时间轴，
//   测试据此驱动“到期/未到期”的边界。
// - **实现提示 (How)**：`MockClock` 以 `Arc<Mutex<_>>` 共享状态，克隆后的实例观察同一时间轴。

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// 可注入的墙钟。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前 UTC 时间。
    fn now(&self) -> DateTime<Utc>;
}

/// 读取系统时间的生产实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的虚拟时钟。
///
/// ### 教案式说明
/// - **契约 (What)**：`now` 返回起点加累计推进量；`advance` 只能向前推进，`set` 允许测试直接跳到指定时刻。
/// - **注意 (Trade-offs)**：克隆共享同一状态，适合把同一个时钟同时注入引擎与调度器。
#[derive(Clone, Debug)]
pub struct MockClock {
    inner: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    /// 推进虚拟时间；负值按零处理。
    pub fn advance(&self, delta: TimeDelta) {
        let mut guard = self.inner.lock();
        if delta > TimeDelta::zero()
            && let Some(next) = guard.checked_add_signed(delta)
        {
            *guard = next;
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.inner.lock() = at;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock()
    }
}
