use serde::Serialize;
use sha2::{Digest, Sha256};

use super::entry::{EntryId, UserTrailEntry};
use crate::error::{AuditStoreError, CorruptRecordError};

/// 链首条目的“前一摘要”。
pub const GENESIS_DIGEST: &str = "";

/// 参与摘要计算的字段视图；字段顺序即规范化顺序，不含 `digest` 本身。
#[derive(Serialize)]
struct DigestView<'a> {
    id: EntryId,
    user_id: &'a str,
    created_at: &'a chrono::DateTime<chrono::Utc>,
    created_by: Option<&'a str>,
    requester_ip: String,
    items: &'a [crate::model::ChangeDescriptor],
}

/// 计算条目的链式摘要：`SHA-256(previous || 0x1f || canonical_json(entry))`，输出小写十六进制。
pub fn entry_digest(previous: &str, entry: &UserTrailEntry) -> Result<String, AuditStoreError> {
    let view = DigestView {
        id: entry.id,
        user_id: entry.user_id.as_str(),
        created_at: &entry.created_at,
        created_by: entry.created_by.as_ref().map(|actor| actor.as_str()),
        requester_ip: entry.requester_ip.to_string(),
        items: &entry.items,
    };
    let canonical = serde_json::to_vec(&view).map_err(|err| AuditStoreError::Encode {
        detail: err.to_string(),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update([0x1f]);
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// 按顺序重算整条链，返回校验通过的条目数。
///
/// 编号不连续、摘要不匹配都会以 [`CorruptRecordError`] 报告第一处断点。
pub fn verify_chain(entries: &[UserTrailEntry]) -> Result<usize, AuditStoreError> {
    let mut previous = GENESIS_DIGEST.to_owned();
    let mut expected_id = EntryId::FIRST;
    for entry in entries {
        if entry.id != expected_id {
            return Err(CorruptRecordError::at_entry(
                entry.id,
                format!("expected entry #{expected_id}, sequence has a gap"),
            )
            .into());
        }
        let recomputed = entry_digest(&previous, entry)?;
        if recomputed != entry.digest {
            return Err(CorruptRecordError::at_entry(entry.id, "digest does not match chain").into());
        }
        previous = recomputed;
        expected_id = expected_id.next();
    }
    Ok(entries.len())
}
