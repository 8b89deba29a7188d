//! 进程退出码。
//!
//! 数值与既有运维脚本约定保持一致，脚本依赖这些数值判断失败类别，不可随意调整。

use std::process::ExitCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Exit {
    Success = 0,
    /// 操作员在确认提示处拒绝。
    Aborted = 1,
    /// 运行中读写身份库或通知状态失败（对应 `EX_IOERR`）。
    StoreFailure = 74,
    /// 配置读取、校验或存储初始化失败（对应 `EX_CONFIG`）。
    Config = 78,
    /// `lifecycle-notify` 未给出 `--period`。
    PeriodMissing = 101,
    /// `--period` 不是合法的 ISO-8601 时长。
    PeriodInvalid = 102,
    /// 擦除失败、部分失败或用户不满足擦除资格。
    WipeFailed = 127,
    UserNotFound = 254,
    /// 既没有 `--username` 也没有 `--id`。
    NoIdentifier = 255,
}

impl Exit {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit.code())
    }
}
