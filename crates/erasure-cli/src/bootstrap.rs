//! 运行时装配。
//!
//! # 教案式说明
//! - **意图（Why）**：两个命令共用同一套协作方；装配集中在这里，命令只面对 [`Runtime`]。
//! - **契约（What）**：
//!   - 配置路径缺省时读取当前目录的 [`DEFAULT_CONFIG_FILE`]，文件也不存在则使用内置默认值；
//!   - `[[domains]]` 按出现顺序登记：`ignore` 域登记空处理器，其余域登记 [`JsonDomainHandler`]；
//!   - `strict_domains = true` 时，`expected_domains` 中缺少处理器的域让装配失败；
//!   - `verify_on_open = true` 时，打开轨迹后先重算哈希链，链断裂即失败。
//! - **逻辑（How）**：任何一步失败都以 `anyhow` 错误返回并附带所在步骤，由命令映射为配置类退出码。

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use erasure_core::lifecycle::{JsonNotificationState, TracingNotifier};
use erasure_core::policy::NoopHandler;
use erasure_core::{
    AuditTrailStore, Clock, ComplianceConfig, EligibilityGuard, JsonLinesAuditTrail,
    LifecycleNotifier, LifecycleScheduler, PolicyAction, PolicyRegistry, RequesterIp, SystemClock,
    WipeEngine,
};

use crate::host::{JsonDomainHandler, JsonIdentityStore, OutboxNotifier};
use crate::resource::MeminfoProbe;

/// 未指定 `--config` 时查找的配置文件名。
pub const DEFAULT_CONFIG_FILE: &str = "erasure.toml";

pub struct Runtime {
    pub config: ComplianceConfig,
    pub clock: Arc<dyn Clock>,
    pub identity: Arc<JsonIdentityStore>,
    pub engine: WipeEngine,
    pub scheduler: LifecycleScheduler,
}

impl Runtime {
    /// 按命令行给出的配置路径装配运行时，使用系统时钟。
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => ComplianceConfig::from_path(path)
                .with_context(|| format!("loading configuration `{}`", path.display()))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => ComplianceConfig::from_path(DEFAULT_CONFIG_FILE)
                .with_context(|| format!("loading configuration `{DEFAULT_CONFIG_FILE}`"))?,
            None => ComplianceConfig::default(),
        };
        Self::from_config(config, Arc::new(SystemClock))
    }

    pub fn from_config(config: ComplianceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate().context("validating configuration")?;

        let identity = Arc::new(
            JsonIdentityStore::open(&config.identity.users_path).context("opening identity snapshot")?,
        );

        let trail = JsonLinesAuditTrail::open(&config.audit.path, clock.clone(), RequesterIp::Cli)
            .context("opening audit trail")?;
        if config.audit.verify_on_open {
            let entries = trail.verify_chain().context("verifying audit trail")?;
            tracing::info!(path = %trail.path().display(), entries, "audit trail chain verified");
        }
        let trail: Arc<dyn AuditTrailStore> = Arc::new(trail);

        let registry = build_registry(&config)?;
        if config.wipe.strict_domains {
            registry
                .ensure_covers(&config.wipe.expected_domains)
                .context("checking expected domains")?;
        }

        let guard = EligibilityGuard::new(identity.clone(), config.lifecycle.interval)
            .with_protected(config.identity.protected.iter().cloned());

        let engine = WipeEngine::new(registry, guard.clone(), trail, clock.clone())
            .with_settings(config.wipe_settings());

        let state = Arc::new(
            JsonNotificationState::open(&config.lifecycle.state_path).context("opening notification state")?,
        );
        let notifier: Arc<dyn LifecycleNotifier> = match &config.notifications.outbox {
            Some(path) => Arc::new(OutboxNotifier::new(path, clock.clone())),
            None => Arc::new(TracingNotifier),
        };
        let scheduler = LifecycleScheduler::new(guard, state, notifier, clock.clone())
            .with_probe(Arc::new(MeminfoProbe::new()))
            .with_settings(config.lifecycle_settings());

        tracing::debug!(
            domains = config.domains.len(),
            users_path = %config.identity.users_path.display(),
            audit_path = %config.audit.path.display(),
            "runtime assembled"
        );
        Ok(Self {
            config,
            clock,
            identity,
            engine,
            scheduler,
        })
    }
}

/// 按配置顺序登记业务域策略。
pub fn build_registry(config: &ComplianceConfig) -> Result<PolicyRegistry> {
    let mut builder = PolicyRegistry::builder();
    for domain in &config.domains {
        match (&domain.path, domain.action) {
            (Some(path), PolicyAction::Erase | PolicyAction::Anonymize) => builder.register(
                domain.name.clone(),
                domain.action,
                JsonDomainHandler::new(path, domain.fields.clone()),
            ),
            _ => builder.register(domain.name.clone(), domain.action, NoopHandler),
        }
        .with_context(|| format!("registering domain `{}`", domain.name))?;
    }
    Ok(builder.build())
}
