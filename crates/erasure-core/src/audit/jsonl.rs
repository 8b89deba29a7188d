//! JSON Lines 文件审计轨迹。
//!
//! # 设计目标（Why）
//! - 给 CLI 宿主一个零依赖外部服务的持久化轨迹：每行一个条目，只追加不改写。
//!
//! # 契约概览（What）
//! - 行格式与 [`UserTrailEntry`] 一致，但 `items` 列以 JSON 文本字符串保存，读取时经
//!   [`decode_items`] 严格解码。
//! - `append` 在返回前完成 `flush` 与 `sync_data`，返回即代表条目已落盘。
//! - 追加失败时把文件截回写入前的长度，编号与链尾摘要保持不变；截断本身也失败时，
//!   实例进入不可用状态，后续追加一律返回 [`AuditStoreError::Poisoned`]。
//! - 读路径遇到无法解析的行，返回带行号的 [`CorruptRecordError`]。
//!
//! # 风险与注意事项（Trade-offs）
//! - 每次查询都全量扫描文件；轨迹规模受限于单机运维场景。

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::chain::GENESIS_DIGEST;
use super::encoding::{decode_items, encode_items};
use super::entry::{EntryId, NewTrailEntry, UserTrailEntry};
use super::query::TrailQuery;
use super::store::AuditTrailStore;
use crate::clock::Clock;
use crate::error::{AuditStoreError, CorruptRecordError};
use crate::model::{RequesterIp, UserId};

/// 文件中的一行。
#[derive(Debug, Serialize, Deserialize)]
struct TrailRow {
    id: EntryId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    created_by: Option<UserId>,
    requester_ip: RequesterIp,
    items: Option<String>,
    digest: String,
}

impl TrailRow {
    fn from_entry(entry: &UserTrailEntry) -> Result<Self, AuditStoreError> {
        Ok(Self {
            id: entry.id,
            user_id: entry.user_id.clone(),
            created_at: entry.created_at,
            created_by: entry.created_by.clone(),
            requester_ip: entry.requester_ip,
            items: Some(encode_items(&entry.items)?),
            digest: entry.digest.clone(),
        })
    }

    fn into_entry(self) -> Result<UserTrailEntry, CorruptRecordError> {
        let raw = self
            .items
            .ok_or_else(|| CorruptRecordError::at_entry(self.id, "items column is null"))?;
        Ok(UserTrailEntry {
            id: self.id,
            user_id: self.user_id,
            created_at: self.created_at,
            created_by: self.created_by,
            requester_ip: self.requester_ip,
            items: decode_items(&raw, self.id)?,
            digest: self.digest,
        })
    }
}

struct Cursor {
    next_id: EntryId,
    last_digest: String,
    poisoned: bool,
}

/// 追加写入 JSON Lines 文件的审计轨迹。
pub struct JsonLinesAuditTrail {
    path: PathBuf,
    cursor: Mutex<Cursor>,
    clock: Arc<dyn Clock>,
    origin: RequesterIp,
}

impl JsonLinesAuditTrail {
    /// 打开（必要时创建）轨迹文件，并从已有内容恢复下一个编号与链尾摘要。
    ///
    /// 已有内容中的损坏行会让打开失败，而不是在其后继续追加。
    pub fn open(
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        origin: RequesterIp,
    ) -> Result<Self, AuditStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| io_error(&path, source))?;
        }
        let entries = read_entries(&path)?;
        let cursor = match entries.last() {
            Some(last) => Cursor {
                next_id: last.id.next(),
                last_digest: last.digest.clone(),
                poisoned: false,
            },
            None => Cursor {
                next_id: EntryId::FIRST,
                last_digest: GENESIS_DIGEST.to_owned(),
                poisoned: false,
            },
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "audit trail opened");
        Ok(Self {
            path,
            cursor: Mutex::new(cursor),
            clock,
            origin,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditTrailStore for JsonLinesAuditTrail {
    fn append(&self, entry: NewTrailEntry) -> Result<EntryId, AuditStoreError> {
        let mut cursor = self.cursor.lock();
        if cursor.poisoned {
            return Err(AuditStoreError::Poisoned {
                path: self.path.clone(),
            });
        }
        let id = cursor.next_id;
        let sealed = UserTrailEntry::seal(entry, id, self.clock.now(), self.origin, &cursor.last_digest)?;
        let row = TrailRow::from_entry(&sealed)?;
        let mut line = serde_json::to_string(&row).map_err(|err| AuditStoreError::Encode {
            detail: err.to_string(),
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| io_error(&self.path, source))?;
        match append_durably(&mut file, line.as_bytes()) {
            Ok(()) => {}
            Err(AppendFailure::RolledBack(source)) => return Err(io_error(&self.path, source)),
            Err(AppendFailure::Dirty { source, rollback }) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %source,
                    rollback_error = %rollback,
                    "audit append failed and could not be rolled back"
                );
                cursor.poisoned = true;
                return Err(io_error(&self.path, source));
            }
        }

        cursor.next_id = id.next();
        cursor.last_digest = sealed.digest;
        Ok(id)
    }

    fn find_by_user(&self, query: &TrailQuery) -> Result<Vec<UserTrailEntry>, AuditStoreError> {
        let _cursor = self.cursor.lock();
        Ok(query.apply(read_entries(&self.path)?))
    }

    fn all(&self) -> Result<Vec<UserTrailEntry>, AuditStoreError> {
        let _cursor = self.cursor.lock();
        read_entries(&self.path)
    }
}

/// 可回滚的追加目标；`File` 是唯一的生产实现。
trait AppendTarget: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn current_len(&self) -> io::Result<u64> {
        self.metadata().map(|meta| meta.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

#[derive(Debug)]
enum AppendFailure {
    /// 文件已恢复到写入前的长度。
    RolledBack(io::Error),
    /// 尾部可能残留半行或未确认落盘的整行。
    Dirty { source: io::Error, rollback: io::Error },
}

/// 写入一整行并落盘；任一步失败都把文件截回写入前的长度。
fn append_durably<T: AppendTarget>(target: &mut T, line: &[u8]) -> Result<(), AppendFailure> {
    let len = target.current_len().map_err(AppendFailure::RolledBack)?;
    let written = target
        .write_all(line)
        .and_then(|()| target.flush())
        .and_then(|()| target.sync());
    match written {
        Ok(()) => Ok(()),
        Err(source) => match target.truncate_to(len) {
            Ok(()) => Err(AppendFailure::RolledBack(source)),
            Err(rollback) => Err(AppendFailure::Dirty { source, rollback }),
        },
    }
}

fn read_entries(path: &Path) -> Result<Vec<UserTrailEntry>, AuditStoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io_error(path, source)),
    };
    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| io_error(path, source))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: TrailRow = serde_json::from_str(&line)
            .map_err(|err| CorruptRecordError::at_line(index + 1, err.to_string()))?;
        entries.push(row.into_entry()?);
    }
    Ok(entries)
}

fn io_error(path: &Path, source: std::io::Error) -> AuditStoreError {
    AuditStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(MockClock::new("2021-03-04T05:06:07Z".parse().unwrap()))
    }

    #[test]
    fn reopen_continues_sequence_and_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trail.jsonl");
        {
            let trail = JsonLinesAuditTrail::open(&path, clock(), RequesterIp::Cli).unwrap();
            trail.append(NewTrailEntry::new(UserId::from("1"))).unwrap();
        }
        let trail = JsonLinesAuditTrail::open(&path, clock(), RequesterIp::Cli).unwrap();
        assert_eq!(trail.append(NewTrailEntry::new(UserId::from("2"))).unwrap(), EntryId(2));
        assert_eq!(trail.verify_chain().unwrap(), 2);
    }

    #[test]
    fn null_items_column_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trail.jsonl");
        let trail = JsonLinesAuditTrail::open(&path, clock(), RequesterIp::Cli).unwrap();
        trail.append(NewTrailEntry::new(UserId::from("1"))).unwrap();

        let text = std::fs::read_to_string(&path).unwrap().replace("\"items\":\"[]\"", "\"items\":null");
        std::fs::write(&path, text).unwrap();

        let err = trail.all().unwrap_err();
        match err {
            AuditStoreError::Corrupt(corrupt) => assert_eq!(corrupt.record, "#1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    /// 内存中的追加目标，可在写入中途或落盘阶段注入失败。
    #[derive(Default)]
    struct FlakyTarget {
        bytes: Vec<u8>,
        fail_write_after: Option<usize>,
        fail_sync: bool,
        fail_truncate: bool,
    }

    impl Write for FlakyTarget {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.fail_write_after {
                Some(0) => Err(io::Error::other("disk full")),
                Some(limit) => {
                    let n = limit.min(buf.len());
                    self.bytes.extend_from_slice(&buf[..n]);
                    self.fail_write_after = Some(limit - n);
                    Ok(n)
                }
                None => {
                    self.bytes.extend_from_slice(buf);
                    Ok(buf.len())
                }
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AppendTarget for FlakyTarget {
        fn current_len(&self) -> io::Result<u64> {
            Ok(self.bytes.len() as u64)
        }

        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            if self.fail_truncate {
                return Err(io::Error::other("read-only file system"));
            }
            self.bytes.truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync {
                Err(io::Error::other("EIO"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn failed_sync_truncates_the_written_line() {
        let mut target = FlakyTarget {
            bytes: b"{\"id\":1}\n".to_vec(),
            fail_sync: true,
            ..FlakyTarget::default()
        };

        let err = append_durably(&mut target, b"{\"id\":2}\n").unwrap_err();

        assert!(matches!(err, AppendFailure::RolledBack(_)), "{err:?}");
        assert_eq!(target.bytes, b"{\"id\":1}\n");
    }

    #[test]
    fn short_write_leaves_no_partial_line() {
        let mut target = FlakyTarget {
            fail_write_after: Some(4),
            ..FlakyTarget::default()
        };

        let err = append_durably(&mut target, b"{\"id\":1}\n").unwrap_err();

        assert!(matches!(err, AppendFailure::RolledBack(_)), "{err:?}");
        assert!(target.bytes.is_empty());
    }

    #[test]
    fn failed_rollback_is_reported_as_dirty() {
        let mut target = FlakyTarget {
            fail_sync: true,
            fail_truncate: true,
            ..FlakyTarget::default()
        };

        let err = append_durably(&mut target, b"{}\n").unwrap_err();

        assert!(matches!(err, AppendFailure::Dirty { .. }), "{err:?}");
    }

    #[test]
    fn poisoned_trail_refuses_appends_and_keeps_its_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trail.jsonl");
        let trail = JsonLinesAuditTrail::open(&path, clock(), RequesterIp::Cli).unwrap();
        trail.append(NewTrailEntry::new(UserId::from("1"))).unwrap();
        trail.cursor.lock().poisoned = true;

        let err = trail.append(NewTrailEntry::new(UserId::from("2"))).unwrap_err();

        assert!(matches!(err, AuditStoreError::Poisoned { .. }), "{err}");
        assert_eq!(trail.all().unwrap().len(), 1);
        let reopened = JsonLinesAuditTrail::open(&path, clock(), RequesterIp::Cli).unwrap();
        assert_eq!(reopened.append(NewTrailEntry::new(UserId::from("2"))).unwrap(), EntryId(2));
        assert_eq!(reopened.verify_chain().unwrap(), 2);
    }

    #[test]
    fn garbage_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trail.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        let err = JsonLinesAuditTrail::open(&path, clock(), RequesterIp::Cli)
            .err()
            .expect("corrupt file must not open");
        assert!(err.to_string().contains("at line 1"), "{err}");
    }
}
