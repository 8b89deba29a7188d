//! 基于 JSON 文件的宿主协作方。
//!
//! # 设计定位（Why）
//! - 核心 crate 只定义身份库、业务域处理器与通知投递的 trait；运维命令行需要一套能直接落地的实现，
//!   让小型部署不必先接入数据库即可执行擦除与生命周期通知。
//!
//! # 契约说明（What）
//! - 所有文件都是 UTF-8 JSON；写入先落到同目录的 `.tmp` 文件再重命名替换；
//! - 读失败与内容损坏以 [`HostFileError`] 报告，由各实现映射到对应 trait 的错误类型。

pub mod domains;
pub mod identity;
pub mod outbox;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use domains::{ANONYMIZED_PLACEHOLDER, JsonDomainHandler};
pub use identity::JsonIdentityStore;
pub use outbox::{OutboxMessage, OutboxNotifier};

#[derive(Debug, Error)]
pub enum HostFileError {
    #[error("cannot access `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` is not valid JSON for this store: {detail}", path.display())]
    Corrupt { path: PathBuf, detail: String },
}

/// 读取 JSON 文件；`missing_ok` 为真时，文件不存在或为空返回 `T::default()`。
pub(crate) fn load_json<T>(path: &Path, missing_ok: bool) -> Result<T, HostFileError>
where
    T: DeserializeOwned + Default,
{
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if missing_ok && err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(HostFileError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&text).map_err(|err| HostFileError::Corrupt {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })
}

pub(crate) fn store_json<T: Serialize>(path: &Path, value: &T) -> Result<(), HostFileError> {
    let io = |source| HostFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    let text = serde_json::to_string_pretty(value).map_err(|err| HostFileError::Corrupt {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;
    let staging = path.with_extension("tmp");
    std::fs::write(&staging, text).map_err(io)?;
    std::fs::rename(&staging, path).map_err(io)
}
