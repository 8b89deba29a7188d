//! 日志订阅器安装。
//!
//! # 教案式说明
//! - **意图（Why）**：命令行的标准输出留给操作员阅读的结果，结构化日志统一写到标准错误。
//! - **契约（What）**：
//!   - 过滤规则来自 `RUST_LOG`，缺省或解析失败时为 `info`；
//!   - `debug = true` 时忽略环境变量，强制 `debug`；
//!   - 全局订阅器已存在时返回错误而不是 panic，调用方可以忽略。

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

pub fn install(debug: bool) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(build_env_filter(debug))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
}

fn build_env_filter(debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
