//! 协作方测试桩集合。
//!
//! # 设计定位（Why）
//! - 擦除引擎与调度器的测试都需要业务域处理器、通知投递、资源探针与失败的存储；
//!   集中在这里避免各测试文件重复定义，接口调整时也只需修改一处。
//!
//! # 契约说明（What）
//! - 记录型桩（`Recording*`）把每次调用保存下来供断言；
//! - 失败型桩总是返回预设错误；
//! - 这些类型仅用于测试与演示，生产代码不应依赖。

pub mod handlers {
    //! 业务域处理器桩。

    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::model::{FieldChange, PolicyAction, UserId};
    use crate::policy::{DomainHandler, HandlerError, HandlerRequest};

    /// 一次处理器调用的快照。
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct RecordedCall {
        pub user_id: UserId,
        pub action: PolicyAction,
        pub dry_run: bool,
    }

    /// 返回固定字段列表并记录调用；只有非 dry-run 调用才计入 `mutations`。
    #[derive(Clone, Debug, Default)]
    pub struct RecordingHandler {
        fields: Vec<String>,
        calls: Arc<Mutex<Vec<RecordedCall>>>,
        mutations: Arc<Mutex<Vec<UserId>>>,
    }

    impl RecordingHandler {
        pub fn new<I, S>(fields: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                fields: fields.into_iter().map(Into::into).collect(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().clone()
        }

        /// 真正“修改过数据”的用户列表。
        pub fn mutations(&self) -> Vec<UserId> {
            self.mutations.lock().clone()
        }
    }

    impl DomainHandler for RecordingHandler {
        fn handle(&self, request: &HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError> {
            self.calls.lock().push(RecordedCall {
                user_id: request.user_id.clone(),
                action: request.action,
                dry_run: request.dry_run,
            });
            if !request.dry_run {
                self.mutations.lock().push(request.user_id.clone());
            }
            Ok(self
                .fields
                .iter()
                .map(|field| match request.action {
                    PolicyAction::Anonymize => FieldChange::anonymized(field.clone()),
                    _ => FieldChange::erased(field.clone()),
                })
                .collect())
        }
    }

    #[derive(Clone, Debug)]
    pub struct FailingHandler {
        pub detail: String,
    }

    impl FailingHandler {
        pub fn new(detail: impl Into<String>) -> Self {
            Self { detail: detail.into() }
        }
    }

    impl DomainHandler for FailingHandler {
        fn handle(&self, _request: &HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError> {
            Err(HandlerError::failed(self.detail.clone()))
        }
    }

    #[derive(Clone, Copy, Debug, Default)]
    pub struct PanickingHandler;

    impl DomainHandler for PanickingHandler {
        fn handle(&self, _request: &HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError> {
            panic!("domain storage exploded");
        }
    }

    /// 睡眠指定时长后返回空结果。
    #[derive(Clone, Copy, Debug)]
    pub struct SlowHandler {
        pub delay: Duration,
    }

    impl DomainHandler for SlowHandler {
        fn handle(&self, _request: &HandlerRequest<'_>) -> Result<Vec<FieldChange>, HandlerError> {
            std::thread::sleep(self.delay);
            Ok(Vec::new())
        }
    }
}

pub mod lifecycle {
    //! 通知投递与资源探针桩。

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    use crate::error::NotifyError;
    use crate::lifecycle::{LifecycleNotifier, ResourceProbe};
    use crate::model::{UserId, UserRecord};

    /// 记录所有投递；`fail_next` 让下一次投递失败。
    #[derive(Clone, Debug, Default)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<(UserId, DateTime<Utc>)>>>,
        fail_next: Arc<AtomicBool>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<(UserId, DateTime<Utc>)> {
            self.sent.lock().clone()
        }

        pub fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }
    }

    impl LifecycleNotifier for RecordingNotifier {
        fn send_notice(&self, user: &UserRecord, when: DateTime<Utc>) -> Result<(), NotifyError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(NotifyError::Delivery("mail relay unavailable".into()));
            }
            self.sent.lock().push((user.id.clone(), when));
            Ok(())
        }
    }

    /// 前 `healthy_reads` 次报告 `available`，之后报告 `exhausted`。
    #[derive(Debug)]
    pub struct FixedProbe {
        reads: AtomicUsize,
        healthy_reads: usize,
        available: u64,
        exhausted: u64,
    }

    impl FixedProbe {
        pub fn always(available: u64) -> Self {
            Self::degrading(usize::MAX, available, available)
        }

        pub fn degrading(healthy_reads: usize, available: u64, exhausted: u64) -> Self {
            Self {
                reads: AtomicUsize::new(0),
                healthy_reads,
                available,
                exhausted,
            }
        }
    }

    impl ResourceProbe for FixedProbe {
        fn available_bytes(&self) -> Option<u64> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst);
            Some(if read < self.healthy_reads {
                self.available
            } else {
                self.exhausted
            })
        }
    }
}

pub mod stores {
    //! 总是失败的存储桩。

    use crate::audit::{AuditTrailStore, EntryId, NewTrailEntry, TrailQuery, UserTrailEntry};
    use crate::error::{AuditStoreError, IdentityError};
    use crate::identity::IdentityStore;
    use crate::model::{UserId, UserRecord};

    /// 追加总是以 I/O 错误失败的轨迹。
    #[derive(Clone, Copy, Debug, Default)]
    pub struct UnwritableAuditTrail;

    impl AuditTrailStore for UnwritableAuditTrail {
        fn append(&self, _entry: NewTrailEntry) -> Result<EntryId, AuditStoreError> {
            Err(AuditStoreError::Io {
                path: "unwritable-trail".into(),
                source: std::io::Error::other("disk full"),
            })
        }

        fn find_by_user(&self, _query: &TrailQuery) -> Result<Vec<UserTrailEntry>, AuditStoreError> {
            Ok(Vec::new())
        }

        fn all(&self) -> Result<Vec<UserTrailEntry>, AuditStoreError> {
            Ok(Vec::new())
        }
    }

    /// 所有操作都返回后端错误的身份库。
    #[derive(Clone, Copy, Debug, Default)]
    pub struct UnavailableIdentityStore;

    impl UnavailableIdentityStore {
        fn down<T>() -> Result<T, IdentityError> {
            Err(IdentityError::Backend("identity backend offline".into()))
        }
    }

    impl IdentityStore for UnavailableIdentityStore {
        fn exists(&self, _user_id: &UserId) -> Result<bool, IdentityError> {
            Self::down()
        }

        fn is_last_administrator(&self, _user_id: &UserId) -> Result<bool, IdentityError> {
            Self::down()
        }

        fn disable_login(&self, _user_id: &UserId) -> Result<(), IdentityError> {
            Self::down()
        }

        fn get_user(&self, _user_id: &UserId) -> Result<UserRecord, IdentityError> {
            Self::down()
        }

        fn find_by_username(&self, _username: &str) -> Result<Option<UserRecord>, IdentityError> {
            Self::down()
        }

        fn list_users(&self) -> Result<Vec<UserRecord>, IdentityError> {
            Self::down()
        }
    }
}
