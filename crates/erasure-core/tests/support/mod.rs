//! 集成测试共享夹具：内存身份库、内存轨迹与可推进的时钟。

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use erasure_core::lifecycle::InMemoryNotificationState;
use erasure_core::test_stubs::lifecycle::RecordingNotifier;
use erasure_core::{
    EligibilityGuard, InMemoryAuditTrail, InMemoryIdentityStore, LifecycleScheduler, MockClock,
    Period, PolicyRegistry, UserId, UserRecord, WipeEngine, WipeSettings,
};

pub fn at(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("valid RFC 3339 timestamp")
}

pub fn user(id: &str, last_activity: Option<&str>) -> UserRecord {
    UserRecord {
        id: UserId::from(id),
        username: format!("user{id}"),
        name: format!("User {id}"),
        email: format!("user{id}@example.invalid"),
        registered_at: at("2017-01-01T00:00:00Z"),
        last_activity: last_activity.map(at),
        wiped: false,
    }
}

pub struct Harness {
    pub clock: MockClock,
    pub identity: Arc<InMemoryIdentityStore>,
    pub trail: Arc<InMemoryAuditTrail>,
    pub interval: Period,
}

impl Harness {
    /// 以 2019-06-01 为“现在”、30 天为生命周期间隔的夹具，预置两个管理员。
    pub fn new() -> Self {
        let clock = MockClock::new(at("2019-06-01T00:00:00Z"));
        let identity = Arc::new(InMemoryIdentityStore::new());
        identity.insert(user("admin-1", Some("2019-05-30T00:00:00Z")), true);
        identity.insert(user("admin-2", Some("2019-05-30T00:00:00Z")), true);
        let trail = Arc::new(InMemoryAuditTrail::new(Arc::new(clock.clone())));
        Self {
            clock,
            identity,
            trail,
            interval: Period::days(30),
        }
    }

    pub fn add_user(&self, id: &str, last_activity: Option<&str>) -> UserId {
        self.identity.insert(user(id, last_activity), false);
        UserId::from(id)
    }

    pub fn guard(&self) -> EligibilityGuard {
        EligibilityGuard::new(self.identity.clone(), self.interval)
    }

    pub fn engine(&self, registry: PolicyRegistry) -> WipeEngine {
        self.engine_with(registry, WipeSettings::default())
    }

    pub fn engine_with(&self, registry: PolicyRegistry, settings: WipeSettings) -> WipeEngine {
        WipeEngine::new(
            registry,
            self.guard(),
            self.trail.clone(),
            Arc::new(self.clock.clone()),
        )
        .with_settings(settings)
    }

    pub fn scheduler(&self, notifier: &RecordingNotifier) -> (LifecycleScheduler, Arc<InMemoryNotificationState>) {
        self.scheduler_with_guard(self.guard(), notifier)
    }

    pub fn scheduler_with_guard(
        &self,
        guard: EligibilityGuard,
        notifier: &RecordingNotifier,
    ) -> (LifecycleScheduler, Arc<InMemoryNotificationState>) {
        let state = Arc::new(InMemoryNotificationState::new());
        let scheduler = LifecycleScheduler::new(
            guard,
            state.clone(),
            Arc::new(notifier.clone()),
            Arc::new(self.clock.clone()),
        );
        (scheduler, state)
    }
}
