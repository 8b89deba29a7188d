//! `account-delete`：由管理员发起的单用户擦除。
//!
//! # 教案式说明
//! - **意图（Why）**：运维人员按用户名或 id 擦除一个账号，执行前核对用户信息并确认。
//! - **契约（What）**：
//!   - 未给出 `--username`/`--id`，或给出的值为空白 → 255；用户名或 id 不存在 → 254；
//!   - 用户不满足擦除资格、擦除失败或部分业务域失败 → 127；
//!   - 确认提示处拒绝 → 1；`--force` 跳过确认；
//!   - `--dry-run` 打印将要发生的变更，不提示、不落盘；预览中出现失败的业务域 → 127，否则 0；
//!   - 配置或存储装配失败 → 78。
//! - **逻辑（How）**：查找用户 → 打印用户信息 → 预检资格 → （dry-run 预览 | 确认 → 擦除）→ 汇报结果。

use std::io::{BufRead, Write};
use std::path::Path;

use clap::Parser;
use erasure_core::{
    IdentityError, IdentityStore, Initiator, RequesterIp, UserId, UserRecord, WipeReport, WipeRequest,
};

use super::CommonArgs;
use crate::bootstrap::Runtime;
use crate::console::Console;
use crate::exit::Exit;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "account-delete",
    about = "Erase or anonymize a user's personal data and disable the account",
    version
)]
pub struct Args {
    /// Username of the account to wipe
    #[arg(long, conflicts_with = "id")]
    pub username: Option<String>,

    /// Id of the account to wipe
    #[arg(long)]
    pub id: Option<String>,

    /// Do not ask for confirmation
    #[arg(long)]
    pub force: bool,

    /// Show what would change without modifying anything
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// 命令行给出的查找键，空白值视为未给出。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Identifier<'a> {
    Username(&'a str),
    Id(&'a str),
}

impl Args {
    fn identifier(&self) -> Option<Identifier<'_>> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().map(str::trim).filter(|value| !value.is_empty())
        }
        present(&self.username)
            .map(Identifier::Username)
            .or_else(|| present(&self.id).map(Identifier::Id))
    }
}

pub fn run<R: BufRead, W: Write>(args: &Args, console: &mut Console<R, W>) -> Exit {
    run_with(args, console, Runtime::load)
}
pub fn run_with<R, W, L>(args: &Args, console: &mut Console<R, W>, load: L) -> Exit
where
    R: BufRead,
    W: Write,
    L: FnOnce(Option<&Path>) -> anyhow::Result<Runtime>,
{
    let Some(identifier) = args.identifier() else {
        console.line("You must specify either --username or --id");
        return Exit::NoIdentifier;
    };
    let runtime = match load(args.common.config_path()) {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "runtime bootstrap failed");
            console.line(format!("[FAILED] {err:#}"));
            return Exit::Config;
        }
    };
    execute(args, identifier, &runtime, console)
}

fn execute<R: BufRead, W: Write>(
    args: &Args,
    identifier: Identifier<'_>,
    runtime: &Runtime,
    console: &mut Console<R, W>,
) -> Exit {
    let user = match lookup(runtime, identifier) {
        Ok(Some(user)) => user,
        Ok(None) => {
            console.line("User not found");
            return Exit::UserNotFound;
        }
        Err(err) => {
            console.line(format!("[FAILED] {err}"));
            return Exit::WipeFailed;
        }
    };

    console.line(format!("Username: {}", user.username));
    console.line(format!("Name: {}", user.name));
    console.line(format!("Email: {}", user.email));

    if let Err(reason) = runtime
        .engine
        .guard()
        .check_eligibility(&user.id, Initiator::Admin, runtime.clock.now())
    {
        console.line(format!("[FAILED] User cannot be wiped: {reason}"));
        return Exit::WipeFailed;
    }

    let request = WipeRequest::new(user.id.clone(), Initiator::Admin).with_requester_ip(RequesterIp::Cli);

    if args.dry_run {
        return match runtime.engine.wipe(request.dry_run(true)) {
            Ok(report) => {
                print_changes(console, &report);
                let failed: Vec<String> = report.failed_domains().map(ToString::to_string).collect();
                console.line("[DRY-RUN] No changes were made");
                if failed.is_empty() {
                    Exit::Success
                } else {
                    console.line(format!("[FAILED] Data domains could not be processed: {}", failed.join(", ")));
                    Exit::WipeFailed
                }
            }
            Err(err) => {
                console.line(format!("[FAILED] {err}"));
                Exit::WipeFailed
            }
        };
    }

    if !args.force && !console.confirm("Are you sure you want to proceed") {
        console.line("Operation aborted at your request");
        return Exit::Aborted;
    }

    match runtime.engine.wipe(request) {
        Ok(report) => {
            print_changes(console, &report);
            finish(console, &user, &report)
        }
        Err(err) => {
            console.line(format!("[FAILED] {err}"));
            Exit::WipeFailed
        }
    }
}

fn lookup(runtime: &Runtime, identifier: Identifier<'_>) -> Result<Option<UserRecord>, IdentityError> {
    let id = match identifier {
        Identifier::Username(username) => return runtime.identity.find_by_username(username),
        Identifier::Id(id) => id,
    };
    match runtime.identity.get_user(&UserId::from(id)) {
        Ok(user) => Ok(Some(user)),
        Err(IdentityError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

fn print_changes<R: BufRead, W: Write>(console: &mut Console<R, W>, report: &WipeReport) {
    for descriptor in report.descriptors() {
        let mut line = format!("  {}.{}: {}", descriptor.domain, descriptor.field, descriptor.action);
        if let Some(detail) = &descriptor.detail {
            line.push_str(&format!(" ({detail})"));
        }
        console.line(line);
    }
}

fn finish<R: BufRead, W: Write>(console: &mut Console<R, W>, user: &UserRecord, report: &WipeReport) -> Exit {
    let failed: Vec<String> = report.failed_domains().map(ToString::to_string).collect();
    if !failed.is_empty() {
        console.line(format!("[FAILED] Data domains could not be processed: {}", failed.join(", ")));
    }
    if !report.login_disabled {
        console.line("[FAILED] Login could not be disabled");
    }
    if report.any_failures {
        return Exit::WipeFailed;
    }
    match report.entry_id {
        Some(entry_id) => console.line(format!("[OK] User {} wiped (audit entry #{entry_id})", user.username)),
        None => console.line(format!("[OK] User {} wiped", user.username)),
    }
    Exit::Success
}
