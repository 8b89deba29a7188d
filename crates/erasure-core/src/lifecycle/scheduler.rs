//! 生命周期调度器：到期计算、通知与到期擦除。
//!
//! # 教案式说明
//! - **意图（Why）**：长期不活跃的账号按策略先通知、后删除；两个阶段可能间隔数周并由不同的任务运行触发，
//!   因此调度器本身无状态，所有跨运行的事实都落在 [`NotificationStateStore`] 中。
//! - **契约（What）**：
//!   - [`LifecycleScheduler::due_user_ids`]：未擦除、参考时间加间隔不晚于 `as_of` 的用户；
//!   - [`LifecycleScheduler::notify_user`]：守卫检查 → 窗口内已通知则 `AlreadyNotified` → 投递并登记；
//!   - [`LifecycleScheduler::run_notify_sweep`]：批量通知，带资源护栏、逐个确认与有界缓存；
//!   - [`LifecycleScheduler::wipe_due`]：对已通知且承诺删除时间已到的用户发起生命周期擦除。
//! - **风险（Trade-offs）**：资源不足时提前结束本轮而非报错，剩余用户留给下一次运行。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::cache::UserCache;
use super::notifier::LifecycleNotifier;
use super::period::Period;
use super::resource::{ResourceProbe, UnboundedProbe};
use super::state::{ClaimOutcome, NotificationRecord, NotificationStateStore};
use crate::clock::Clock;
use crate::error::{IdentityError, IneligibilityReason, LifecycleError, NotifyError, WipeError};
use crate::guard::EligibilityGuard;
use crate::model::{Initiator, UserId, UserRecord};
use crate::wipe::{WipeEngine, WipeReport, WipeRequest};

/// 批处理默认的最低可用内存（字节）。
pub const DEFAULT_MIN_FREE_MEMORY: u64 = 6_316_032;
/// 批处理默认的用户缓存容量。
pub const DEFAULT_USER_CACHE_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub min_free_memory: u64,
    pub user_cache_capacity: usize,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            min_free_memory: DEFAULT_MIN_FREE_MEMORY,
            user_cache_capacity: DEFAULT_USER_CACHE_CAPACITY,
        }
    }
}

/// 一轮通知批处理的参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepParams {
    /// 通知中告知的删除时间；候选人为届时将到期的用户。
    pub when: DateTime<Utc>,
    /// 只统计将被通知的用户，不投递、不登记。
    pub dry_run: bool,
}

/// 批处理过程中逐用户产生的事件。
#[derive(Debug)]
pub enum SweepEvent<'a> {
    Notified { user: &'a UserRecord },
    WouldNotify { user: &'a UserRecord },
    AlreadyNotified { user_id: &'a UserId, notified_at: DateTime<Utc> },
    Ineligible { user_id: &'a UserId, reason: &'a IneligibilityReason },
    Declined { user_id: &'a UserId },
    Failed { user_id: &'a UserId, error: &'a NotifyError },
    LowMemory { available: u64, required: u64 },
}

/// 批处理的交互钩子：逐个确认与事件回调，默认全部放行、忽略事件。
pub trait SweepObserver {
    fn confirm(&mut self, _user: &UserRecord, _when: DateTime<Utc>) -> bool {
        true
    }

    fn on_event(&mut self, _event: &SweepEvent<'_>) {}
}

/// 无人值守运行使用的观察者。
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoConfirm;

impl SweepObserver for AutoConfirm {}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub found: usize,
    pub notified: usize,
    pub failed: usize,
    pub already_notified: usize,
    /// 未通过资格检查的用户。
    pub skipped: usize,
    /// 操作员逐个确认时拒绝的用户。
    pub declined: usize,
    pub stopped_early: bool,
    pub elapsed: Duration,
}

impl SweepSummary {
    /// 无法通知的用户数（不满足资格或被操作员拒绝）。
    pub fn cannot_notify(&self) -> usize {
        self.skipped + self.declined
    }
}

/// [`LifecycleScheduler::wipe_due`] 中单个用户的结果。
#[derive(Debug)]
pub struct DueWipe {
    pub user_id: UserId,
    pub due_at: DateTime<Utc>,
    pub outcome: Result<WipeReport, WipeError>,
    /// 用户在通知后重新活跃，通知记录已撤销；`outcome` 为 `NotYetDue`。
    pub withdrawn: bool,
}

/// 生命周期状态快照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleStatus {
    pub as_of: DateTime<Utc>,
    pub interval: Period,
    /// 当前已到期（可被通知）的用户数。
    pub due: usize,
    /// 已登记通知的用户数。
    pub notified: usize,
    /// 已通知且承诺删除时间已到的用户数。
    pub awaiting_wipe: usize,
    /// 最早的承诺删除时间。
    pub next_wipe_at: Option<DateTime<Utc>>,
}

pub struct LifecycleScheduler {
    guard: EligibilityGuard,
    state: Arc<dyn NotificationStateStore>,
    notifier: Arc<dyn LifecycleNotifier>,
    probe: Arc<dyn ResourceProbe>,
    clock: Arc<dyn Clock>,
    settings: LifecycleSettings,
}

impl LifecycleScheduler {
    pub fn new(
        guard: EligibilityGuard,
        state: Arc<dyn NotificationStateStore>,
        notifier: Arc<dyn LifecycleNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            guard,
            state,
            notifier,
            probe: Arc::new(UnboundedProbe),
            clock,
            settings: LifecycleSettings::default(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    pub fn guard(&self) -> &EligibilityGuard {
        &self.guard
    }

    /// 截至 `as_of` 已到期的用户，按身份库列出顺序返回。
    pub fn due_user_ids(&self, as_of: DateTime<Utc>) -> Result<Vec<UserId>, IdentityError> {
        Ok(self
            .guard
            .identity()
            .list_users()?
            .into_iter()
            .filter(|user| !user.wiped && self.is_due(user, as_of))
            .map(|user| user.id)
            .collect())
    }

    fn is_due(&self, user: &UserRecord, as_of: DateTime<Utc>) -> bool {
        self.guard.lifecycle_due_at(user).is_some_and(|due_at| due_at <= as_of)
    }

    /// 通知单个用户其账号将于 `when` 删除。
    ///
    /// ### 前置/后置条件（Contract）
    /// - 资格检查以 `when` 为基准：届时仍不到期的用户返回 `Ineligible(NotYetDue)`；
    /// - 同一通知窗口内重复调用返回 [`NotifyError::AlreadyNotified`]，不会再次投递；
    /// - 投递失败时撤销登记，下次运行可重试。
    pub fn notify_user(&self, user_id: &UserId, when: DateTime<Utc>) -> Result<(), NotifyError> {
        self.guard.check_eligibility(user_id, Initiator::Lifecycle, when)?;
        let user = self.guard.identity().get_user(user_id).map_err(|err| match err {
            IdentityError::NotFound(_) => NotifyError::Ineligible(IneligibilityReason::UserNotFound),
            other => NotifyError::Ineligible(IneligibilityReason::IdentityUnavailable {
                detail: other.to_string(),
            }),
        })?;
        self.deliver(&user, when)
    }

    fn deliver(&self, user: &UserRecord, when: DateTime<Utc>) -> Result<(), NotifyError> {
        let record = NotificationRecord {
            user_id: user.id.clone(),
            notified_at: self.clock.now(),
            when,
            reference: user.lifecycle_reference(),
        };
        if let ClaimOutcome::Existing(existing) = self.state.claim(record)? {
            debug!(user_id = %user.id, notified_at = %existing.notified_at, "user already notified in this window");
            return Err(NotifyError::AlreadyNotified {
                user_id: user.id.clone(),
                notified_at: existing.notified_at,
            });
        }
        if let Err(err) = self.notifier.send_notice(user, when) {
            warn!(user_id = %user.id, error = %err, "notice delivery failed, releasing notification claim");
            if let Err(release) = self.state.release(&user.id) {
                warn!(user_id = %user.id, error = %release, "failed to release notification claim");
            }
            return Err(err);
        }
        info!(user_id = %user.id, delete_at = %when, "user notified of pending deletion");
        Ok(())
    }

    /// 批量通知届时将到期的用户。
    ///
    /// 单个用户的失败计入汇总并继续；只有列出候选人失败才以错误返回。
    pub fn run_notify_sweep(
        &self,
        params: SweepParams,
        observer: &mut dyn SweepObserver,
    ) -> Result<SweepSummary, LifecycleError> {
        let started = Instant::now();
        let candidates = self.due_user_ids(params.when)?;
        let mut summary = SweepSummary {
            found: candidates.len(),
            ..SweepSummary::default()
        };
        info!(found = summary.found, delete_at = %params.when, dry_run = params.dry_run, "lifecycle notify sweep started");

        let mut cache = UserCache::new(self.settings.user_cache_capacity);
        for user_id in candidates {
            if let Some(available) = self.probe.available_bytes()
                && available < self.settings.min_free_memory
            {
                warn!(available, required = self.settings.min_free_memory, "free memory below threshold, stopping sweep");
                observer.on_event(&SweepEvent::LowMemory {
                    available,
                    required: self.settings.min_free_memory,
                });
                summary.stopped_early = true;
                break;
            }
            self.sweep_one(&user_id, params, observer, &mut cache, &mut summary);
            cache.evict(&user_id);
        }

        summary.elapsed = started.elapsed();
        info!(
            notified = summary.notified,
            failed = summary.failed,
            already_notified = summary.already_notified,
            cannot_notify = summary.cannot_notify(),
            stopped_early = summary.stopped_early,
            "lifecycle notify sweep finished"
        );
        Ok(summary)
    }

    fn sweep_one(
        &self,
        user_id: &UserId,
        params: SweepParams,
        observer: &mut dyn SweepObserver,
        cache: &mut UserCache,
        summary: &mut SweepSummary,
    ) {
        if let Err(reason) = self.guard.check_eligibility(user_id, Initiator::Lifecycle, params.when) {
            debug!(user_id = %user_id, reason = reason.code(), "user cannot be notified");
            observer.on_event(&SweepEvent::Ineligible {
                user_id,
                reason: &reason,
            });
            summary.skipped += 1;
            return;
        }

        let user = match cache.get(user_id) {
            Some(user) => user.clone(),
            None => match self.guard.identity().get_user(user_id) {
                Ok(user) => {
                    cache.insert(user.clone());
                    user
                }
                Err(err) => {
                    let reason = IneligibilityReason::IdentityUnavailable {
                        detail: err.to_string(),
                    };
                    observer.on_event(&SweepEvent::Ineligible {
                        user_id,
                        reason: &reason,
                    });
                    summary.skipped += 1;
                    return;
                }
            },
        };

        match self.state.get(user_id) {
            Ok(Some(existing)) if existing.reference == user.lifecycle_reference() => {
                observer.on_event(&SweepEvent::AlreadyNotified {
                    user_id,
                    notified_at: existing.notified_at,
                });
                summary.already_notified += 1;
                return;
            }
            Ok(_) => {}
            Err(err) => {
                let err = NotifyError::State(err);
                observer.on_event(&SweepEvent::Failed { user_id, error: &err });
                summary.failed += 1;
                return;
            }
        }

        if !observer.confirm(&user, params.when) {
            observer.on_event(&SweepEvent::Declined { user_id });
            summary.declined += 1;
            return;
        }

        if params.dry_run {
            observer.on_event(&SweepEvent::WouldNotify { user: &user });
            summary.notified += 1;
            return;
        }

        match self.deliver(&user, params.when) {
            Ok(()) => {
                observer.on_event(&SweepEvent::Notified { user: &user });
                summary.notified += 1;
            }
            Err(NotifyError::AlreadyNotified { notified_at, .. }) => {
                observer.on_event(&SweepEvent::AlreadyNotified { user_id, notified_at });
                summary.already_notified += 1;
            }
            Err(err) => {
                observer.on_event(&SweepEvent::Failed { user_id, error: &err });
                summary.failed += 1;
            }
        }
    }

    /// 第二阶段：对承诺删除时间不晚于 `as_of` 的已通知用户发起生命周期擦除。
    ///
    /// 擦除成功（或用户已不存在、已被擦除）后撤销通知登记；其余结果保留登记留待下次运行。
    pub fn wipe_due(&self, engine: &WipeEngine, as_of: DateTime<Utc>) -> Result<Vec<DueWipe>, LifecycleError> {
        let mut results = Vec::new();
        for record in self.state.all()? {
            if record.when > as_of {
                continue;
            }
            let request = WipeRequest::lifecycle(record.user_id.clone(), record.when);
            let outcome = engine.wipe(request);
            let withdrawn = matches!(outcome, Err(WipeError::Ineligible(IneligibilityReason::NotYetDue { .. })))
                && self.reactivated_since(&record)?;
            let settled = withdrawn
                || match &outcome {
                    Ok(report) => report.entry_id.is_some(),
                    Err(WipeError::Ineligible(
                        IneligibilityReason::AlreadyWiped | IneligibilityReason::UserNotFound,
                    )) => true,
                    Err(_) => false,
                };
            if settled {
                self.state.release(&record.user_id)?;
            }
            if withdrawn {
                info!(user_id = %record.user_id, "user active again since notice, notification withdrawn");
            }
            results.push(DueWipe {
                user_id: record.user_id,
                due_at: record.when,
                outcome,
                withdrawn,
            });
        }
        Ok(results)
    }

    /// 通知记录所依据的参考时间已被新的活动取代。
    fn reactivated_since(&self, record: &NotificationRecord) -> Result<bool, LifecycleError> {
        match self.guard.identity().get_user(&record.user_id) {
            Ok(user) => Ok(user.lifecycle_reference() != record.reference),
            Err(IdentityError::NotFound(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn status(&self, as_of: DateTime<Utc>) -> Result<LifecycleStatus, LifecycleError> {
        let due = self.due_user_ids(as_of)?.len();
        let records = self.state.all()?;
        Ok(LifecycleStatus {
            as_of,
            interval: *self.guard.interval(),
            due,
            notified: records.len(),
            awaiting_wipe: records.iter().filter(|record| record.when <= as_of).count(),
            next_wipe_at: records.iter().map(|record| record.when).min(),
        })
    }
}
