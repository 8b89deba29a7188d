//! # config 模块说明
//!
//! ## 角色定位（Why）
//! - 部署参数（轨迹文件、生命周期间隔、处理器超时、业务域清单）集中在一份 TOML 文档中，
//!   运维脚本与 CLI 共用同一套解析与校验。
//!
//! ## 契约（What）
//! - 文档结构：`[audit]`、`[lifecycle]`、`[wipe]`、`[notifications]`、`[identity]` 与若干 `[[domains]]`；
//! - 所有可选键都有默认值，未知键直接报错；
//! - 时长使用 ISO-8601 文本（`P2Y`、`PT30S`），加载时校验；
//! - [`ComplianceConfig::from_path`] 会把相对路径解析为相对配置文件所在目录。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::lifecycle::{DEFAULT_MIN_FREE_MEMORY, DEFAULT_USER_CACHE_CAPACITY, LifecycleSettings, Period};
use crate::model::{DomainName, PolicyAction, UserId};
use crate::wipe::WipeSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value for `{key}`: {detail}")]
    Invalid { key: String, detail: String },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            detail: detail.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComplianceConfig {
    pub audit: AuditSection,
    pub lifecycle: LifecycleSection,
    pub wipe: WipeSection,
    pub notifications: NotificationsSection,
    pub identity: IdentitySection,
    pub domains: Vec<DomainSection>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSection {
    /// JSON Lines 轨迹文件。
    pub path: PathBuf,
    /// 打开轨迹时重算哈希链。
    pub verify_on_open: bool,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("audit-trail.jsonl"),
            verify_on_open: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleSection {
    /// 参考时间（最近活跃，缺省为注册时间）之后多久到期。
    pub interval: Period,
    /// 通知状态文件。
    pub state_path: PathBuf,
    pub min_free_memory: u64,
    pub user_cache_capacity: usize,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            interval: Period {
                years: 2,
                ..Period::default()
            },
            state_path: PathBuf::from("lifecycle-notifications.json"),
            min_free_memory: DEFAULT_MIN_FREE_MEMORY,
            user_cache_capacity: DEFAULT_USER_CACHE_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WipeSection {
    /// 单个处理器的等待上限，只允许不含年、月的时长。
    pub handler_timeout: Option<Period>,
    /// 部署中预期存在的业务域。
    pub expected_domains: Vec<DomainName>,
    /// 为 `true` 时预期业务域缺少处理器即启动失败，而不是回退为忽略。
    pub strict_domains: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationsSection {
    /// 已发出通知的 JSON Lines 发件箱；缺省时只写日志。
    pub outbox: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentitySection {
    /// 用户快照文件。
    pub users_path: PathBuf,
    /// 不可擦除的系统账号。
    pub protected: Vec<UserId>,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            users_path: PathBuf::from("users.json"),
            protected: Vec::new(),
        }
    }
}

/// 一个由文件宿主管理的业务域。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainSection {
    pub name: DomainName,
    pub action: PolicyAction,
    /// 业务域数据文件；`ignore` 业务域可省略。
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// 匿名化时改写的字段。
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ComplianceConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取、解析并校验配置文件，相对路径按配置文件所在目录解析。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn resolve_relative_to(&mut self, base: &Path) {
        let rebase = |target: &mut PathBuf| {
            if target.is_relative() {
                *target = base.join(&*target);
            }
        };
        rebase(&mut self.audit.path);
        rebase(&mut self.lifecycle.state_path);
        rebase(&mut self.identity.users_path);
        if let Some(outbox) = self.notifications.outbox.as_mut() {
            rebase(outbox);
        }
        for domain in &mut self.domains {
            if let Some(path) = domain.path.as_mut() {
                rebase(path);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle.interval.is_zero() {
            return Err(ConfigError::invalid("lifecycle.interval", "must be a non-zero period"));
        }
        if self.lifecycle.user_cache_capacity == 0 {
            return Err(ConfigError::invalid("lifecycle.user_cache_capacity", "must be at least 1"));
        }
        if let Some(timeout) = &self.wipe.handler_timeout {
            match timeout.fixed_duration() {
                Some(duration) if !duration.is_zero() => {}
                Some(_) => return Err(ConfigError::invalid("wipe.handler_timeout", "must be positive")),
                None => {
                    return Err(ConfigError::invalid(
                        "wipe.handler_timeout",
                        "must not use year or month components",
                    ));
                }
            }
        }
        for (index, domain) in self.domains.iter().enumerate() {
            let key = format!("domains[{index}]");
            if domain.name.as_str().trim().is_empty() {
                return Err(ConfigError::invalid(key, "name must not be empty"));
            }
            if self.domains[..index].iter().any(|earlier| earlier.name == domain.name) {
                return Err(ConfigError::invalid(key, format!("duplicate domain `{}`", domain.name)));
            }
            if domain.action != PolicyAction::Ignore && domain.path.is_none() {
                return Err(ConfigError::invalid(key, format!("domain `{}` needs a data path", domain.name)));
            }
            if domain.action == PolicyAction::Anonymize && domain.fields.is_empty() {
                return Err(ConfigError::invalid(
                    key,
                    format!("anonymized domain `{}` must list its fields", domain.name),
                ));
            }
        }
        Ok(())
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.wipe.handler_timeout.as_ref().and_then(Period::fixed_duration)
    }

    pub fn wipe_settings(&self) -> WipeSettings {
        WipeSettings {
            handler_timeout: self.handler_timeout(),
            expected_domains: self.wipe.expected_domains.clone(),
        }
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            min_free_memory: self.lifecycle.min_free_memory,
            user_cache_capacity: self.lifecycle.user_cache_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ComplianceConfig::from_toml_str("").unwrap();
        assert_eq!(config.lifecycle.interval.to_string(), "P2Y");
        assert_eq!(config.lifecycle.min_free_memory, 6_316_032);
        assert!(!config.wipe.strict_domains);
        assert_eq!(config.handler_timeout(), None);
    }

    #[test]
    fn full_document_parses() {
        let config = ComplianceConfig::from_toml_str(
            r#"
            [audit]
            path = "trail.jsonl"

            [lifecycle]
            interval = "P18M"

            [wipe]
            handler_timeout = "PT5S"
            expected_domains = ["profile", "newsletter"]
            strict_domains = true

            [identity]
            protected = ["1"]

            [[domains]]
            name = "profile"
            action = "anonymize"
            path = "profile.json"
            fields = ["email", "name"]

            [[domains]]
            name = "comments"
            action = "erase"
            path = "comments.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.lifecycle.interval.months, 18);
        assert_eq!(config.handler_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.wipe_settings().expected_domains.len(), 2);
        assert_eq!(config.domains[1].action, PolicyAction::Erase);
        assert_eq!(config.identity.protected, [UserId::from("1")]);
    }

    #[test]
    fn invalid_values_are_reported_by_key() {
        let err = ComplianceConfig::from_toml_str("[wipe]\nhandler_timeout = \"P1M\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "wipe.handler_timeout"));

        let err = ComplianceConfig::from_toml_str("[lifecycle]\ninterval = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = ComplianceConfig::from_toml_str("[audit]\nunknown = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = ComplianceConfig::from_toml_str(
            "[[domains]]\nname = \"a\"\naction = \"ignore\"\n[[domains]]\nname = \"a\"\naction = \"ignore\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate domain"));
    }

    #[test]
    fn relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erasure.toml");
        std::fs::write(&path, "[audit]\npath = \"var/trail.jsonl\"\n").unwrap();
        let config = ComplianceConfig::from_path(&path).unwrap();
        assert_eq!(config.audit.path, dir.path().join("var/trail.jsonl"));
        assert_eq!(config.identity.users_path, dir.path().join("users.json"));
    }
}
