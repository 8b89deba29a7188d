//! JSON Lines 通知发件箱。
//!
//! 每条通知追加为一行 [`OutboxMessage`]，由外部邮件投递进程消费。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use erasure_core::{Clock, LifecycleNotifier, NotifyError, UserId, UserRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub user_id: UserId,
    pub username: String,
    pub name: String,
    pub email: String,
    /// 承诺的删除时间。
    pub delete_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
}

pub struct OutboxNotifier {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, message: &OutboxMessage) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(message).map_err(std::io::Error::other)?;
        line.push(b'\n');
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        file.sync_data()
    }
}

impl LifecycleNotifier for OutboxNotifier {
    fn send_notice(&self, user: &UserRecord, when: DateTime<Utc>) -> Result<(), NotifyError> {
        let message = OutboxMessage {
            user_id: user.id.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            delete_at: when,
            queued_at: self.clock.now(),
        };
        self.append(&message).map_err(|err| {
            NotifyError::Delivery(format!("cannot append to outbox `{}`: {err}", self.path.display()))
        })?;
        tracing::info!(user_id = %user.id, delete_at = %when, "pending deletion notice queued");
        Ok(())
    }
}
