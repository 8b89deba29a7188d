//! `users.json` 身份库。
//!
//! 文件内容是用户数组，每个元素是 [`UserRecord`] 的字段加上可选的 `administrator` 标记：
//!
//! ```json
//! [{"id": "7", "username": "alice", "name": "Alice", "email": "alice@example.org",
//!   "registered_at": "2017-03-01T00:00:00Z", "administrator": true}]
//! ```

use std::path::{Path, PathBuf};

use erasure_core::{IdentityError, IdentityStore, UserId, UserRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{HostFileError, load_json, store_json};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct HostUser {
    #[serde(flatten)]
    record: UserRecord,
    #[serde(default)]
    administrator: bool,
}

#[derive(Debug)]
pub struct JsonIdentityStore {
    path: PathBuf,
    users: Mutex<Vec<HostUser>>,
}

impl JsonIdentityStore {
    /// 打开用户快照；文件必须存在。
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HostFileError> {
        let path = path.into();
        let users: Vec<HostUser> = load_json(&path, false)?;
        tracing::debug!(path = %path.display(), users = users.len(), "identity snapshot loaded");
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn backend(err: HostFileError) -> IdentityError {
    IdentityError::Backend(err.to_string())
}

impl IdentityStore for JsonIdentityStore {
    fn exists(&self, user_id: &UserId) -> Result<bool, IdentityError> {
        Ok(self.users.lock().iter().any(|user| &user.record.id == user_id))
    }

    fn is_last_administrator(&self, user_id: &UserId) -> Result<bool, IdentityError> {
        let users = self.users.lock();
        let is_active_admin = |user: &&HostUser| user.administrator && !user.record.wiped;
        let Some(target) = users.iter().find(|user| &user.record.id == user_id) else {
            return Ok(false);
        };
        if !is_active_admin(&target) {
            return Ok(false);
        }
        Ok(users.iter().filter(is_active_admin).count() == 1)
    }

    fn disable_login(&self, user_id: &UserId) -> Result<(), IdentityError> {
        let mut users = self.users.lock();
        let mut updated = users.clone();
        let user = updated
            .iter_mut()
            .find(|user| &user.record.id == user_id)
            .ok_or_else(|| IdentityError::NotFound(user_id.clone()))?;
        if user.record.wiped {
            return Ok(());
        }
        user.record.wiped = true;
        store_json(&self.path, &updated).map_err(backend)?;
        *users = updated;
        tracing::info!(%user_id, "login disabled");
        Ok(())
    }

    fn get_user(&self, user_id: &UserId) -> Result<UserRecord, IdentityError> {
        self.users
            .lock()
            .iter()
            .find(|user| &user.record.id == user_id)
            .map(|user| user.record.clone())
            .ok_or_else(|| IdentityError::NotFound(user_id.clone()))
    }

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, IdentityError> {
        Ok(self
            .users
            .lock()
            .iter()
            .find(|user| user.record.username == username)
            .map(|user| user.record.clone()))
    }

    fn list_users(&self) -> Result<Vec<UserRecord>, IdentityError> {
        Ok(self.users.lock().iter().map(|user| user.record.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = r#"[
        {"id": "1", "username": "root", "name": "Root", "email": "root@example.org",
         "registered_at": "2017-01-01T00:00:00Z", "administrator": true},
        {"id": "2", "username": "alice", "name": "Alice", "email": "alice@example.org",
         "registered_at": "2017-01-01T00:00:00Z", "last_activity": "2018-02-01T00:00:00Z"}
    ]"#;

    #[test]
    fn disable_login_persists_wiped_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, USERS).unwrap();

        let store = JsonIdentityStore::open(&path).unwrap();
        assert!(store.is_last_administrator(&UserId::from("1")).unwrap());
        assert!(!store.is_last_administrator(&UserId::from("2")).unwrap());
        store.disable_login(&UserId::from("2")).unwrap();

        let reopened = JsonIdentityStore::open(&path).unwrap();
        let alice = reopened.find_by_username("alice").unwrap().unwrap();
        assert!(alice.wiped);
        assert_eq!(alice.last_activity, Some("2018-02-01T00:00:00Z".parse().unwrap()));
        assert!(reopened.is_last_administrator(&UserId::from("1")).unwrap());
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonIdentityStore::open(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, HostFileError::Io { .. }));
    }

    #[test]
    fn unknown_user_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, USERS).unwrap();
        let store = JsonIdentityStore::open(&path).unwrap();

        assert!(!store.exists(&UserId::from("9")).unwrap());
        assert_eq!(
            store.disable_login(&UserId::from("9")).unwrap_err(),
            IdentityError::NotFound(UserId::from("9"))
        );
    }
}
