//! `items` 列的结构化编码。
//!
//! 旧格式曾以逗号拼接描述符，字段名中出现逗号或引号即无法还原；这里统一使用 JSON 数组。

use crate::error::{AuditStoreError, CorruptRecordError};
use crate::model::ChangeDescriptor;

use super::entry::EntryId;

/// 将描述符列表编码为 JSON 数组文本；空列表编码为 `[]`。
pub fn encode_items(items: &[ChangeDescriptor]) -> Result<String, AuditStoreError> {
    serde_json::to_string(items).map_err(|err| AuditStoreError::Encode {
        detail: err.to_string(),
    })
}

/// 解码 `items` 列。
///
/// ## 契约说明（What）
/// - 只接受 JSON 数组；空文本、`null`、对象或元素缺字段均视为损坏。
/// - 不做任何“回退为空列表”的宽松处理。
pub fn decode_items(raw: &str, entry: EntryId) -> Result<Vec<ChangeDescriptor>, CorruptRecordError> {
    if raw.trim().is_empty() {
        return Err(CorruptRecordError::at_entry(entry, "items column is empty"));
    }
    serde_json::from_str::<Vec<ChangeDescriptor>>(raw)
        .map_err(|err| CorruptRecordError::at_entry(entry, format!("malformed items encoding: {err}")))
}
