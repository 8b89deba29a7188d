//! 宿主身份库接口。
//!
//! 擦除引擎只依赖这里列出的几个能力；宿主的用户/会话存储本身不在本 crate 范围内。

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::IdentityError;
use crate::model::{UserId, UserRecord};

/// 宿主身份库。
///
/// ## 契约说明（What）
/// - `disable_login` 是擦除的终态步骤：调用成功后该用户不可再认证，且快照中的 `wiped` 置位。
/// - `is_last_administrator`：用户是唯一一个尚未被擦除的管理员时返回 `true`。
/// - 所有方法在后端不可用时返回 [`IdentityError::Backend`]。
pub trait IdentityStore: Send + Sync {
    fn exists(&self, user_id: &UserId) -> Result<bool, IdentityError>;

    fn is_last_administrator(&self, user_id: &UserId) -> Result<bool, IdentityError>;

    fn disable_login(&self, user_id: &UserId) -> Result<(), IdentityError>;

    fn get_user(&self, user_id: &UserId) -> Result<UserRecord, IdentityError>;

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, IdentityError>;

    fn list_users(&self) -> Result<Vec<UserRecord>, IdentityError>;
}

#[derive(Clone, Debug)]
struct StoredUser {
    record: UserRecord,
    administrator: bool,
}

/// 内存身份库，供测试与嵌入式宿主使用。
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    users: RwLock<BTreeMap<UserId, StoredUser>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: UserRecord, administrator: bool) {
        self.users.write().insert(
            record.id.clone(),
            StoredUser {
                record,
                administrator,
            },
        );
    }

    /// 更新最近活跃时间，模拟用户重新登录。
    pub fn touch(&self, user_id: &UserId, at: chrono::DateTime<chrono::Utc>) -> Result<(), IdentityError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| IdentityError::NotFound(user_id.clone()))?;
        user.record.last_activity = Some(at);
        Ok(())
    }
}

impl IdentityStore for InMemoryIdentityStore {
    fn exists(&self, user_id: &UserId) -> Result<bool, IdentityError> {
        Ok(self.users.read().contains_key(user_id))
    }

    fn is_last_administrator(&self, user_id: &UserId) -> Result<bool, IdentityError> {
        let users = self.users.read();
        let Some(user) = users.get(user_id) else {
            return Ok(false);
        };
        if !user.administrator || user.record.wiped {
            return Ok(false);
        }
        let active_admins = users
            .values()
            .filter(|candidate| candidate.administrator && !candidate.record.wiped)
            .count();
        Ok(active_admins == 1)
    }

    fn disable_login(&self, user_id: &UserId) -> Result<(), IdentityError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| IdentityError::NotFound(user_id.clone()))?;
        user.record.wiped = true;
        Ok(())
    }

    fn get_user(&self, user_id: &UserId) -> Result<UserRecord, IdentityError> {
        self.users
            .read()
            .get(user_id)
            .map(|user| user.record.clone())
            .ok_or_else(|| IdentityError::NotFound(user_id.clone()))
    }

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, IdentityError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.record.username == username)
            .map(|user| user.record.clone()))
    }

    fn list_users(&self) -> Result<Vec<UserRecord>, IdentityError> {
        Ok(self.users.read().values().map(|user| user.record.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> UserRecord {
        UserRecord {
            id: UserId::from(id),
            username: format!("user{id}"),
            name: format!("User {id}"),
            email: format!("user{id}@example.invalid"),
            registered_at: "2018-01-01T00:00:00Z".parse().unwrap(),
            last_activity: None,
            wiped: false,
        }
    }

    #[test]
    fn last_administrator_counts_only_unwiped_admins() {
        let store = InMemoryIdentityStore::new();
        store.insert(record("1"), true);
        store.insert(record("2"), true);
        store.insert(record("3"), false);
        assert!(!store.is_last_administrator(&UserId::from("1")).unwrap());

        store.disable_login(&UserId::from("2")).unwrap();
        assert!(store.is_last_administrator(&UserId::from("1")).unwrap());
        assert!(!store.is_last_administrator(&UserId::from("3")).unwrap());
    }

    #[test]
    fn disable_login_marks_record_wiped() {
        let store = InMemoryIdentityStore::new();
        store.insert(record("9"), false);
        store.disable_login(&UserId::from("9")).unwrap();
        assert!(store.get_user(&UserId::from("9")).unwrap().wiped);
        assert_eq!(
            store.disable_login(&UserId::from("10")),
            Err(IdentityError::NotFound(UserId::from("10")))
        );
    }
}
