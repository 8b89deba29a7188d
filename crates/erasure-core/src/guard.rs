//! 擦除资格守卫。
//!
//! # 教案式说明
//! - **意图（Why）**：擦除不可逆，所有入口（管理员 CLI、用户自助、生命周期任务）在产生任何副作用之前
//!   必须经过同一组规则。
//! - **契约（What）**：[`EligibilityGuard::check_eligibility`] 按固定顺序求值，第一条失败的规则胜出：
//!   1. 用户存在，否则 `UserNotFound`；
//!   2. 不是唯一的管理员，否则 `LastAdministrator`；
//!   3. 不是受保护的系统账号，否则 `ProtectedAccount`；
//!   4. 尚未被擦除，否则 `AlreadyWiped`；
//!   5. 发起方为生命周期时，参考时间加策略间隔不晚于 `as_of`，否则 `NotYetDue`。
//! - **逻辑（How）**：只读查询身份库，没有任何写操作；身份库报错一律转为
//!   `IdentityUnavailable`，绝不当作“满足资格”放行。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{IdentityError, IneligibilityReason};
use crate::identity::IdentityStore;
use crate::lifecycle::Period;
use crate::model::{Initiator, UserId, UserRecord};

#[derive(Clone)]
pub struct EligibilityGuard {
    identity: Arc<dyn IdentityStore>,
    interval: Period,
    protected: Arc<HashSet<UserId>>,
}

impl EligibilityGuard {
    pub fn new(identity: Arc<dyn IdentityStore>, interval: Period) -> Self {
        Self {
            identity,
            interval,
            protected: Arc::new(HashSet::new()),
        }
    }

    /// 登记不可擦除的系统账号（例如匿名访客占位账号）。
    pub fn with_protected(mut self, ids: impl IntoIterator<Item = UserId>) -> Self {
        self.protected = Arc::new(ids.into_iter().collect());
        self
    }

    pub fn identity(&self) -> &Arc<dyn IdentityStore> {
        &self.identity
    }

    pub fn interval(&self) -> &Period {
        &self.interval
    }

    pub fn is_protected(&self, user_id: &UserId) -> bool {
        self.protected.contains(user_id)
    }

    /// 用户在生命周期策略下的到期时间；日历运算溢出时返回 `None`。
    pub fn lifecycle_due_at(&self, user: &UserRecord) -> Option<DateTime<Utc>> {
        self.interval.add_to(user.lifecycle_reference())
    }

    pub fn check_eligibility(
        &self,
        user_id: &UserId,
        initiator: Initiator,
        as_of: DateTime<Utc>,
    ) -> Result<(), IneligibilityReason> {
        if !self.identity.exists(user_id).map_err(unavailable)? {
            return Err(IneligibilityReason::UserNotFound);
        }
        if self.identity.is_last_administrator(user_id).map_err(unavailable)? {
            return Err(IneligibilityReason::LastAdministrator);
        }
        if self.is_protected(user_id) {
            return Err(IneligibilityReason::ProtectedAccount);
        }
        let user = match self.identity.get_user(user_id) {
            Ok(user) => user,
            Err(IdentityError::NotFound(_)) => return Err(IneligibilityReason::UserNotFound),
            Err(err) => return Err(unavailable(err)),
        };
        if user.wiped {
            return Err(IneligibilityReason::AlreadyWiped);
        }
        if initiator == Initiator::Lifecycle {
            let due_at = self.lifecycle_due_at(&user).unwrap_or(DateTime::<Utc>::MAX_UTC);
            if due_at > as_of {
                return Err(IneligibilityReason::NotYetDue { due_at });
            }
        }
        Ok(())
    }
}

fn unavailable(err: IdentityError) -> IneligibilityReason {
    IneligibilityReason::IdentityUnavailable {
        detail: err.to_string(),
    }
}
