//! 命令行集成测试夹具：临时目录中的完整部署（配置、用户快照、业务域文件）与模拟时钟。

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use erasure_cli::{Console, Runtime};
use erasure_core::{
    AuditTrailStore, ComplianceConfig, JsonLinesAuditTrail, MockClock, RequesterIp, UserTrailEntry,
};
use serde_json::Value;

pub const CONFIG: &str = r#"
[audit]
path = "audit-trail.jsonl"
verify_on_open = true

[lifecycle]
interval = "P1Y"
state_path = "lifecycle-notifications.json"

[wipe]
expected_domains = ["profile", "comments", "newsletter"]

[notifications]
outbox = "outbox.jsonl"

[identity]
users_path = "users.json"
protected = ["5"]

[[domains]]
name = "profile"
action = "anonymize"
path = "profile.json"
fields = ["email", "name"]

[[domains]]
name = "comments"
action = "erase"
path = "comments.json"

[[domains]]
name = "analytics"
action = "ignore"
"#;

pub const USERS: &str = r#"[
  {"id": "1", "username": "root", "name": "Root", "email": "root@example.org",
   "registered_at": "2015-01-01T00:00:00Z", "last_activity": "2019-05-01T00:00:00Z", "administrator": true},
  {"id": "2", "username": "alice", "name": "Alice", "email": "alice@example.org",
   "registered_at": "2016-01-01T00:00:00Z", "last_activity": "2017-01-01T00:00:00Z"},
  {"id": "3", "username": "bob", "name": "Bob", "email": "bob@example.org",
   "registered_at": "2016-01-01T00:00:00Z", "last_activity": "2017-02-01T00:00:00Z"},
  {"id": "4", "username": "carol", "name": "Carol", "email": "carol@example.org",
   "registered_at": "2016-01-01T00:00:00Z", "last_activity": "2019-05-20T00:00:00Z"},
  {"id": "5", "username": "system", "name": "System", "email": "system@example.org",
   "registered_at": "2016-01-01T00:00:00Z"}
]"#;

pub const PROFILE: &str = r#"{
  "2": {"email": "alice@example.org", "name": "Alice", "theme": "dark"},
  "3": {"email": "bob@example.org", "name": "Bob"}
}"#;

pub const COMMENTS: &str = r#"{
  "2": {"body": "first!", "posted_at": "2017-01-01"}
}"#;

pub fn at(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("valid RFC 3339 timestamp")
}

pub fn console(input: &str) -> Console<&[u8], Vec<u8>> {
    Console::new(input.as_bytes(), Vec::new())
}

pub fn output(console: Console<&[u8], Vec<u8>>) -> String {
    String::from_utf8(console.into_output()).expect("console output is UTF-8")
}

/// 以 2019-06-01 为“现在”的部署目录。
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub clock: MockClock,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temporary directory");
        for (name, content) in [
            ("erasure.toml", CONFIG),
            ("users.json", USERS),
            ("profile.json", PROFILE),
            ("comments.json", COMMENTS),
        ] {
            std::fs::write(dir.path().join(name), content).expect("fixture file");
        }
        Self {
            dir,
            clock: MockClock::new(at("2019-06-01T00:00:00Z")),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config_arg(&self) -> String {
        format!("--config={}", self.path("erasure.toml").display())
    }

    /// 与 `Runtime::load` 相同的装配流程，但使用夹具时钟。
    pub fn runtime(&self, config: Option<&Path>) -> anyhow::Result<Runtime> {
        let path = config.map_or_else(|| self.path("erasure.toml"), Path::to_path_buf);
        let config = ComplianceConfig::from_path(&path)?;
        Runtime::from_config(config, Arc::new(self.clock.clone()))
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).unwrap_or_default()
    }

    pub fn json(&self, name: &str) -> Value {
        serde_json::from_str(&self.read(name)).expect("fixture JSON")
    }

    pub fn user(&self, id: &str) -> Value {
        self.json("users.json")
            .as_array()
            .and_then(|users| users.iter().find(|user| user["id"] == id).cloned())
            .expect("user present in snapshot")
    }

    pub fn trail(&self) -> Vec<UserTrailEntry> {
        JsonLinesAuditTrail::open(self.path("audit-trail.jsonl"), Arc::new(self.clock.clone()), RequesterIp::Cli)
            .and_then(|trail| trail.all())
            .expect("readable audit trail")
    }

    pub fn outbox_lines(&self) -> Vec<Value> {
        self.read("outbox.jsonl")
            .lines()
            .map(|line| serde_json::from_str(line).expect("outbox line"))
            .collect()
    }
}
