//! 单文件业务域处理器。
//!
//! # 教案式说明
//! - **意图（Why）**：小型部署的业务数据（资料、订阅、留言等）常以 JSON 文件保存；
//!   每个 `[[domains]]` 配置项对应一个文件和一个处理器实例。
//! - **契约（What）**：
//!   - 文件是以用户 id 为键的 JSON 对象，值为该用户在本域的记录（通常是对象）；
//!   - `erase`：删除整条记录，报告记录中的每个字段；
//!   - `anonymize`：把配置列出的字段改写为 [`ANONYMIZED_PLACEHOLDER`]，已改写过的字段不再报告；
//!   - dry-run 只计算报告，不写文件；文件不存在视为“无数据”。
//! - **风险（Trade-offs）**：每次调用整文件读写，适合小体量数据；同一进程内的并发调用由互斥锁串行化。

use std::path::{Path, PathBuf};

use erasure_core::{DomainHandler, FieldChange, HandlerError, HandlerRequest, PolicyAction};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::{HostFileError, load_json, store_json};

/// 匿名化字段写入的固定值。
pub const ANONYMIZED_PLACEHOLDER: &str = "[anonymized]";

#[derive(Debug)]
pub struct JsonDomainHandler {
    path: PathBuf,
    fields: Vec<String>,
    lock: Mutex<()>,
}

impl JsonDomainHandler {
    pub fn new(path: impl Into<PathBuf>, fields: Vec<String>) -> Self {
        Self {
            path: path.into(),
            fields,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn erase(records: &mut Map<String, Value>, user_id: &str) -> Vec<FieldChange> {
        match records.remove(user_id) {
            Some(Value::Object(fields)) => fields.keys().map(FieldChange::erased).collect(),
            Some(_) => vec![FieldChange::erased("value")],
            None => Vec::new(),
        }
    }

    fn anonymize(&self, records: &mut Map<String, Value>, user_id: &str) -> Result<Vec<FieldChange>, HandlerError> {
        let Some(record) = records.get_mut(user_id) else {
            return Ok(Vec::new());
        };
        let Value::Object(fields) = record else {
            return Err(HandlerError::failed(format!(
                "record for user `{user_id}` is not an object and cannot be anonymized"
            )));
        };
        let mut changes = Vec::new();
        for name in &self.fields {
            if let Some(value) = fields.get_mut(name)
                && !value.is_null()
                && value.as_str() != Some(ANONYMIZED_PLACEHOLDER)
            {
                *value = Value::String(ANONYMIZED_PLACEHOLDER.to_owned());
                changes.push(FieldChange::anonymized(name.clone()));
            }
        }
        Ok(changes)
    }
}

fn failed(err: HostFileError) -> HandlerError {
    HandlerError::failed(err.to_string())
}

impl DomainHandler for JsonDomainHandler {
    fn handle(&self, request: &HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError> {
        let _guard = self.lock.lock();
        let mut records: Map<String, Value> = load_json(&self.path, true).map_err(failed)?;
        let user_id = request.user_id.as_str();
        let changes = match request.action {
            PolicyAction::Erase => Self::erase(&mut records, user_id),
            PolicyAction::Anonymize => self.anonymize(&mut records, user_id)?,
            PolicyAction::Ignore => Vec::new(),
        };
        if !request.dry_run && !changes.is_empty() {
            store_json(&self.path, &records).map_err(failed)?;
        }
        Ok(changes)
    }
}
