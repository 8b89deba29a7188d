use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::handler::{DomainHandler, NoopHandler};
use crate::error::{DuplicateDomainError, UnregisteredDomainsError};
use crate::model::{DomainName, PolicyAction};

/// 单个业务域的擦除策略。
#[derive(Clone)]
pub struct FieldPolicy {
    pub domain: DomainName,
    pub action: PolicyAction,
    pub handler: Arc<dyn DomainHandler>,
}

impl fmt::Debug for FieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldPolicy")
            .field("domain", &self.domain)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

/// 解析结果的来源。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyOrigin {
    Registered,
    /// 业务域未登记，返回的是隐式 `Ignore` 策略。
    Fallback,
}

/// [`PolicyRegistry::resolve`] 的返回值。
#[derive(Clone, Debug)]
pub struct Resolved {
    pub policy: FieldPolicy,
    pub origin: PolicyOrigin,
}

impl Resolved {
    pub fn is_fallback(&self) -> bool {
        self.origin == PolicyOrigin::Fallback
    }
}

/// 装配期使用的可变注册表。
#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    policies: Vec<FieldPolicy>,
}

impl PolicyRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记业务域策略；同名业务域重复登记返回 [`DuplicateDomainError`]，已有登记保持不变。
    pub fn register(
        &mut self,
        domain: impl Into<DomainName>,
        action: PolicyAction,
        handler: impl DomainHandler,
    ) -> Result<&mut Self, DuplicateDomainError> {
        self.register_shared(domain, action, Arc::new(handler))
    }

    pub fn register_shared(
        &mut self,
        domain: impl Into<DomainName>,
        action: PolicyAction,
        handler: Arc<dyn DomainHandler>,
    ) -> Result<&mut Self, DuplicateDomainError> {
        let domain = domain.into();
        if self.policies.iter().any(|policy| policy.domain == domain) {
            return Err(DuplicateDomainError {
                domain: domain.as_str().to_owned(),
            });
        }
        tracing::debug!(domain = %domain, action = %action, "field policy registered");
        self.policies.push(FieldPolicy {
            domain,
            action,
            handler,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// 冻结注册表。
    pub fn build(self) -> PolicyRegistry {
        PolicyRegistry {
            policies: self.policies.into(),
        }
    }
}

/// 冻结后的策略注册表，构建后不可变，可跨线程共享。
#[derive(Clone, Debug)]
pub struct PolicyRegistry {
    policies: Arc<[FieldPolicy]>,
}

impl PolicyRegistry {
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::new()
    }

    /// 按登记顺序返回全部策略。
    pub fn all_policies(&self) -> &[FieldPolicy] {
        &self.policies
    }

    pub fn get(&self, domain: &str) -> Option<&FieldPolicy> {
        self.policies.iter().find(|policy| policy.domain.as_str() == domain)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.get(domain).is_some()
    }

    /// 解析业务域策略；未登记时返回隐式 `Ignore` 策略并标记为 [`PolicyOrigin::Fallback`]。
    ///
    /// 本方法不打日志，回退的记录由调用方负责。
    pub fn resolve(&self, domain: &str) -> Resolved {
        match self.get(domain) {
            Some(policy) => Resolved {
                policy: policy.clone(),
                origin: PolicyOrigin::Registered,
            },
            None => Resolved {
                policy: FieldPolicy {
                    domain: DomainName::from(domain),
                    action: PolicyAction::Ignore,
                    handler: Arc::new(NoopHandler),
                },
                origin: PolicyOrigin::Fallback,
            },
        }
    }

    /// 严格模式的启动期检查：列出所有未登记的预期业务域。
    pub fn ensure_covers(&self, expected: &[DomainName]) -> Result<(), UnregisteredDomainsError> {
        let mut seen = HashSet::new();
        let missing: Vec<String> = expected
            .iter()
            .filter(|domain| !self.contains(domain.as_str()))
            .filter(|domain| seen.insert(domain.as_str()))
            .map(|domain| domain.as_str().to_owned())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(UnregisteredDomainsError { domains: missing })
        }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldChange;
    use crate::policy::{HandlerError, HandlerRequest};

    fn profile(_: &HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError> {
        Ok(vec![FieldChange::erased("email")])
    }

    #[test]
    fn duplicate_domain_is_rejected_and_original_kept() {
        let mut builder = PolicyRegistry::builder();
        builder.register("profile", PolicyAction::Erase, profile).unwrap();
        let err = builder
            .register("profile", PolicyAction::Anonymize, profile)
            .unwrap_err();
        assert_eq!(err.domain, "profile");
        let registry = builder.build();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.all_policies()[0].action, PolicyAction::Erase);
    }

    #[test]
    fn policies_keep_registration_order() {
        let mut builder = PolicyRegistry::builder();
        for name in ["comments", "profile", "uploads"] {
            builder.register(name, PolicyAction::Anonymize, profile).unwrap();
        }
        let registry = builder.build();
        let order: Vec<_> = registry.all_policies().iter().map(|p| p.domain.as_str()).collect();
        assert_eq!(order, ["comments", "profile", "uploads"]);
    }

    #[test]
    fn unregistered_domain_resolves_to_ignore_fallback() {
        let registry = PolicyRegistry::builder().build();
        let resolved = registry.resolve("newsletter");
        assert!(resolved.is_fallback());
        assert_eq!(resolved.policy.action, PolicyAction::Ignore);
    }

    #[test]
    fn ensure_covers_lists_missing_once() {
        let mut builder = PolicyRegistry::builder();
        builder.register("profile", PolicyAction::Erase, profile).unwrap();
        let registry = builder.build();
        let expected = ["profile", "billing", "billing", "chat"].map(DomainName::from);
        let err = registry.ensure_covers(&expected).unwrap_err();
        assert_eq!(err.domains, ["billing", "chat"]);
        assert!(registry.ensure_covers(&expected[..1]).is_ok());
    }
}
