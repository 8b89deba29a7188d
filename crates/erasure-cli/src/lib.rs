#![deny(unsafe_code)]
#![doc = "erasure-cli: `account-delete` 与 `lifecycle-notify` 运维命令的实现。"]
#![doc = ""]
#![doc = "二进制入口只负责解析参数、安装日志并把退出码交还给进程；命令逻辑位于 [`commands`]，"]
#![doc = "以便集成测试直接驱动（标准输入输出替换为内存缓冲）。"]

//! # 模块导览
//!
//! - [`bootstrap`]：从配置组装身份库、审计轨迹、策略注册表、擦除引擎与生命周期调度器。
//! - [`host`]：基于 JSON 文件的宿主协作方（身份库、业务域处理器、通知发件箱）。
//! - [`commands`]：两个命令的参数定义与执行流程。
//! - [`console`]：交互确认。
//! - [`exit`]：进程退出码。
//! - [`resource`]：`/proc` 内存探针。
//! - [`telemetry`]：`tracing` 订阅器安装。

pub mod bootstrap;
pub mod commands;
pub mod console;
pub mod exit;
pub mod host;
pub mod resource;
pub mod telemetry;

pub use bootstrap::Runtime;
pub use console::Console;
pub use exit::Exit;
