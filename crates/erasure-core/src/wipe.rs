//! 擦除引擎。
//!
//! # 教案式说明
//! - **意图（Why）**：宿主没有分布式事务，擦除只能“尽力而为但可核查”：每个业务域独立执行，
//!   单域失败不阻断其余业务域，最终把每一个业务域的结果写进同一条审计条目，并禁用登录作为终态。
//! - **契约（What）**：[`WipeEngine::wipe`]
//!   1. 占用用户的进行中槽位，同一用户的并发请求返回 [`WipeError::InProgress`]；
//!   2. 经 [`EligibilityGuard`] 检查，失败返回 [`WipeError::Ineligible`] 且没有任何副作用；
//!   3. 按登记顺序处理业务域：`Ignore` 策略不调用处理器，直接记录 `ignore`；其余调用处理器，
//!      错误、panic、超时记为 `failed` 并继续；随后对配置中声明但未登记的业务域记录回退 `ignore` 并告警；
//!   4. 非 dry-run 时追加恰好一条审计条目，再禁用登录；两步在处理器失败时同样执行；
//!   5. 返回 [`WipeReport`]。
//! - **风险（Trade-offs）**：超时只是停止等待，处理器线程不会被强行终止；处理器必须幂等，
//!   重试擦除时重复执行不会造成额外伤害。

use std::any::Any;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::audit::{AuditTrailStore, EntryId, NewTrailEntry};
use crate::clock::Clock;
use crate::error::{IneligibilityReason, WipeError};
use crate::guard::EligibilityGuard;
use crate::in_flight::InFlightWipes;
use crate::model::{
    ChangeDescriptor, DomainName, FieldAction, FieldChange, Initiator, PolicyAction, RequesterIp, UserId,
};
use crate::policy::{FieldPolicy, HandlerError, HandlerRequest, PolicyRegistry};

/// 无数据可处理时整域描述符的说明。
pub const NO_DATA_DETAIL: &str = "no personal data held";
/// 策略声明为忽略时整域描述符的说明。
pub const IGNORED_DETAIL: &str = "ignored by policy";
/// 业务域未登记时整域描述符的说明。
pub const UNREGISTERED_DETAIL: &str = "no registered policy";

/// 一次擦除请求，不持久化。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WipeRequest {
    pub user_id: UserId,
    pub initiator: Initiator,
    /// 生命周期擦除时通知中承诺的删除时间；未到该时间前拒绝执行。
    pub when_lifecycle_due: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub actor: Option<UserId>,
    pub requester_ip: Option<RequesterIp>,
}

impl WipeRequest {
    pub fn new(user_id: UserId, initiator: Initiator) -> Self {
        Self {
            user_id,
            initiator,
            when_lifecycle_due: None,
            dry_run: false,
            actor: None,
            requester_ip: None,
        }
    }

    pub fn lifecycle(user_id: UserId, when: DateTime<Utc>) -> Self {
        Self {
            when_lifecycle_due: Some(when),
            ..Self::new(user_id, Initiator::Lifecycle)
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_requester_ip(mut self, ip: RequesterIp) -> Self {
        self.requester_ip = Some(ip);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WipeSettings {
    /// 单个处理器的等待上限；`None` 表示在当前线程内直接调用。
    pub handler_timeout: Option<Duration>,
    /// 部署中预期存在的业务域，未登记者以回退 `ignore` 记录。
    pub expected_domains: Vec<DomainName>,
}

/// 单个业务域的处理结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainOutcome {
    pub domain: DomainName,
    pub action: FieldAction,
    pub descriptors: Vec<ChangeDescriptor>,
    pub failure: Option<HandlerError>,
    pub fallback: bool,
}

impl DomainOutcome {
    fn whole(domain: &DomainName, action: FieldAction, detail: &str) -> Self {
        Self {
            domain: domain.clone(),
            action,
            descriptors: vec![ChangeDescriptor::whole_domain(domain, action, detail)],
            failure: None,
            fallback: false,
        }
    }

    fn failed(domain: &DomainName, failure: HandlerError) -> Self {
        Self {
            domain: domain.clone(),
            action: FieldAction::Failed,
            descriptors: vec![ChangeDescriptor::whole_domain(
                domain,
                FieldAction::Failed,
                failure.to_string(),
            )],
            failure: Some(failure),
            fallback: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WipeReport {
    pub user_id: UserId,
    /// dry-run 时为 `None`。
    pub entry_id: Option<EntryId>,
    pub per_domain: Vec<DomainOutcome>,
    pub any_failures: bool,
    pub login_disabled: bool,
    pub dry_run: bool,
}

impl WipeReport {
    /// 按业务域顺序展开的全部描述符，与审计条目 `items` 一致。
    pub fn descriptors(&self) -> Vec<ChangeDescriptor> {
        self.per_domain
            .iter()
            .flat_map(|outcome| outcome.descriptors.iter().cloned())
            .collect()
    }

    pub fn failed_domains(&self) -> impl Iterator<Item = &DomainName> {
        self.per_domain
            .iter()
            .filter(|outcome| outcome.failure.is_some())
            .map(|outcome| &outcome.domain)
    }
}

pub struct WipeEngine {
    registry: PolicyRegistry,
    guard: EligibilityGuard,
    trail: Arc<dyn AuditTrailStore>,
    clock: Arc<dyn Clock>,
    settings: WipeSettings,
    in_flight: InFlightWipes,
}

impl WipeEngine {
    pub fn new(
        registry: PolicyRegistry,
        guard: EligibilityGuard,
        trail: Arc<dyn AuditTrailStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            guard,
            trail,
            clock,
            settings: WipeSettings::default(),
            in_flight: InFlightWipes::new(),
        }
    }

    pub fn with_settings(mut self, settings: WipeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &EligibilityGuard {
        &self.guard
    }

    pub fn trail(&self) -> &Arc<dyn AuditTrailStore> {
        &self.trail
    }

    pub fn in_flight(&self) -> &InFlightWipes {
        &self.in_flight
    }

    pub fn wipe(&self, request: WipeRequest) -> Result<WipeReport, WipeError> {
        let now = self.clock.now();
        let _slot = self
            .in_flight
            .try_acquire(&request.user_id, now)
            .ok_or_else(|| WipeError::InProgress {
                user_id: request.user_id.clone(),
            })?;
        let span = tracing::info_span!(
            "wipe",
            user_id = %request.user_id,
            initiator = %request.initiator,
            dry_run = request.dry_run,
        );
        let _entered = span.enter();

        if let Err(reason) = self.check(&request, now) {
            info!(reason = reason.code(), "wipe refused");
            return Err(reason.into());
        }

        let per_domain = self.run_policies(&request);
        let mut any_failures = per_domain.iter().any(|outcome| outcome.failure.is_some());

        if request.dry_run {
            info!(domains = per_domain.len(), any_failures, "dry-run wipe completed");
            return Ok(WipeReport {
                user_id: request.user_id,
                entry_id: None,
                per_domain,
                any_failures,
                login_disabled: false,
                dry_run: true,
            });
        }

        let items = per_domain
            .iter()
            .flat_map(|outcome| outcome.descriptors.iter().cloned())
            .collect();
        let appended = self.trail.append(
            NewTrailEntry::new(request.user_id.clone())
                .with_actor(request.actor.clone())
                .with_requester_ip(request.requester_ip)
                .with_items(items),
        );

        let login_disabled = match self.guard.identity().disable_login(&request.user_id) {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to disable login after wipe");
                false
            }
        };

        let entry_id = match appended {
            Ok(id) => id,
            Err(source) => {
                error!(error = %source, login_disabled, "audit trail append failed after wipe");
                return Err(WipeError::AuditAppend {
                    source,
                    login_disabled,
                });
            }
        };
        any_failures |= !login_disabled;

        info!(entry_id = %entry_id, any_failures, "user wiped");
        Ok(WipeReport {
            user_id: request.user_id,
            entry_id: Some(entry_id),
            per_domain,
            any_failures,
            login_disabled,
            dry_run: false,
        })
    }

    fn check(&self, request: &WipeRequest, now: DateTime<Utc>) -> Result<(), IneligibilityReason> {
        self.guard
            .check_eligibility(&request.user_id, request.initiator, now)?;
        if request.initiator == Initiator::Lifecycle
            && let Some(due_at) = request.when_lifecycle_due
            && due_at > now
        {
            return Err(IneligibilityReason::NotYetDue { due_at });
        }
        Ok(())
    }

    fn run_policies(&self, request: &WipeRequest) -> Vec<DomainOutcome> {
        let mut outcomes: Vec<DomainOutcome> = self
            .registry
            .all_policies()
            .iter()
            .map(|policy| self.run_policy(policy, request))
            .collect();

        let mut seen = HashSet::new();
        for domain in &self.settings.expected_domains {
            if !seen.insert(domain.as_str()) {
                continue;
            }
            let resolved = self.registry.resolve(domain.as_str());
            if resolved.is_fallback() {
                warn!(domain = %domain, "data domain has no registered policy, recording as ignored");
                let mut outcome = DomainOutcome::whole(domain, FieldAction::Ignore, UNREGISTERED_DETAIL);
                outcome.fallback = true;
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    fn run_policy(&self, policy: &FieldPolicy, request: &WipeRequest) -> DomainOutcome {
        if policy.action == PolicyAction::Ignore {
            debug!(domain = %policy.domain, "domain ignored by policy");
            return DomainOutcome::whole(&policy.domain, FieldAction::Ignore, IGNORED_DETAIL);
        }
        match self.invoke(policy, request) {
            Ok(changes) if changes.is_empty() => {
                debug!(domain = %policy.domain, "domain holds no personal data for user");
                DomainOutcome::whole(&policy.domain, FieldAction::Ignore, NO_DATA_DETAIL)
            }
            Ok(changes) => {
                debug!(domain = %policy.domain, fields = changes.len(), "domain handler completed");
                DomainOutcome {
                    domain: policy.domain.clone(),
                    action: policy.action.into(),
                    descriptors: changes
                        .into_iter()
                        .map(|change| ChangeDescriptor::from_change(&policy.domain, change))
                        .collect(),
                    failure: None,
                    fallback: false,
                }
            }
            Err(failure) => {
                warn!(domain = %policy.domain, error = %failure, "domain handler failed");
                DomainOutcome::failed(&policy.domain, failure)
            }
        }
    }

    fn invoke(&self, policy: &FieldPolicy, request: &WipeRequest) -> Result<Vec<FieldChange>, HandlerError> {
        let Some(timeout) = self.settings.handler_timeout else {
            let call = HandlerRequest {
                user_id: &request.user_id,
                action: policy.action,
                dry_run: request.dry_run,
            };
            return catch_unwind(AssertUnwindSafe(|| policy.handler.handle(&call)))
                .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload.as_ref()))));
        };

        let (tx, rx) = mpsc::channel();
        let handler = Arc::clone(&policy.handler);
        let user_id = request.user_id.clone();
        let action = policy.action;
        let dry_run = request.dry_run;
        std::thread::Builder::new()
            .name(format!("wipe-{}", policy.domain))
            .spawn(move || {
                let call = HandlerRequest {
                    user_id: &user_id,
                    action,
                    dry_run,
                };
                let result = catch_unwind(AssertUnwindSafe(|| handler.handle(&call)))
                    .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload.as_ref()))));
                // 超时后接收端已被丢弃，发送失败无需处理。
                let _ = tx.send(result);
            })
            .map_err(|err| HandlerError::failed(format!("cannot start handler worker: {err}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(HandlerError::TimedOut { after: timeout }),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(HandlerError::Panicked("handler worker exited without a result".into()))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
