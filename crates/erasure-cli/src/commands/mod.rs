//! 命令实现。
//!
//! 每个命令提供 `run`（按命令行装配运行时）与 `run_with`（由调用方提供装配函数，测试用它注入模拟时钟）。
//! 命令把所有结果折算为 [`Exit`](crate::exit::Exit)，不向入口返回错误。

pub mod account_delete;
pub mod lifecycle_notify;

use std::path::{Path, PathBuf};

use clap::Args;

/// 两个命令共有的参数。
#[derive(Clone, Debug, Default, Args)]
pub struct CommonArgs {
    /// TOML configuration file (defaults to ./erasure.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level regardless of RUST_LOG
    #[arg(long)]
    pub debug: bool,
}

impl CommonArgs {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

