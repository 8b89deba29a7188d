//! `lifecycle-notify`：通知长期不活跃的用户其账号将被删除。
//!
//! # 教案式说明
//! - **意图（Why）**：生命周期策略分两步执行：先按 `--period` 承诺一个删除日期并通知用户，
//!   到期后再擦除；该命令负责第一步，`--wipe-due` 时顺带执行第二步。
//! - **契约（What）**：
//!   - `--period` 在读取配置之前校验：缺失 → 101，非法或为零 → 102；
//!   - 承诺删除时间 = 当前时间 + period；
//!   - `--confirm=1`（缺省）先整体确认，再逐个用户确认；`--confirm=0` 无人值守；
//!   - 没有候选用户、操作员整体拒绝、以及正常结束都以 0 退出；
//!   - 配置装配失败 → 78，运行中读写身份库或通知状态失败 → 74。
//! - **逻辑（How）**：`[wipe-due]` → 列出候选 → 整体确认 → 调度器批处理（逐个确认、事件回显）→ 打印摘要。

use std::io::{BufRead, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use erasure_core::lifecycle::{SweepEvent, SweepObserver};
use erasure_core::{LifecycleStatus, Period, SweepParams, SweepSummary, UserRecord};

use super::CommonArgs;
use crate::bootstrap::Runtime;
use crate::console::Console;
use crate::exit::Exit;
use crate::resource::peak_memory_bytes;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Clone, Debug, Parser)]
#[command(
    name = "lifecycle-notify",
    about = "Notify inactive users that their accounts are scheduled for deletion",
    version
)]
pub struct Args {
    /// ISO-8601 period between now and the promised deletion date, e.g. P30D
    #[arg(long, value_name = "DURATION")]
    pub period: Option<String>,

    /// Ask for confirmation before the run and for every user (0 disables prompts)
    #[arg(long, value_name = "0|1", action = ArgAction::Set, default_value = "1", value_parser = BoolishValueParser::new())]
    pub confirm: bool,

    /// Report who would be notified without sending or recording anything
    #[arg(long)]
    pub dry_run: bool,

    /// Wipe previously notified users whose deletion date has passed before notifying
    #[arg(long)]
    pub wipe_due: bool,

    #[command(flatten)]
    pub common: CommonArgs,
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
    let period = match parse_period(args.period.as_deref()) {
        Ok(period) => period,
        Err((exit, message)) => {
            console.line(message);
            return exit;
        }
    };
    let runtime = match load(args.common.config_path()) {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "runtime bootstrap failed");
            console.line(format!("[FAILED] {err:#}"));
            return Exit::Config;
        }
    };
    execute(args, period, &runtime, console)
}

fn parse_period(raw: Option<&str>) -> Result<Period, (Exit, String)> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Err((
            Exit::PeriodMissing,
            "You must specify a notification period with --period (for example --period=P30D)".to_owned(),
        ));
    };
    match raw.parse::<Period>() {
        Ok(period) if period.is_zero() => Err((
            Exit::PeriodInvalid,
            format!("Invalid period `{raw}`: the deletion date must lie in the future"),
        )),
        Ok(period) => Ok(period),
        Err(err) => Err((Exit::PeriodInvalid, format!("Invalid period: {err}"))),
    }
}

fn execute<R: BufRead, W: Write>(args: &Args, period: Period, runtime: &Runtime, console: &mut Console<R, W>) -> Exit {
    let now = runtime.clock.now();
    let Some(when) = period.add_to(now) else {
        console.line(format!("Invalid period `{period}`: the deletion date is out of range"));
        return Exit::PeriodInvalid;
    };
    let scheduler = &runtime.scheduler;

    if args.wipe_due && !wipe_due(runtime, now, args.dry_run, console) {
        return Exit::StoreFailure;
    }

    console.line(format!("Notifying users to be deleted by {}", when.format(TIMESTAMP_FORMAT)));
    if args.dry_run {
        console.line("*** DRY RUN: no notification will be sent or recorded ***");
    }

    let candidates = match scheduler.due_user_ids(when) {
        Ok(candidates) => candidates,
        Err(err) => {
            console.line(format!("[FAILED] {err}"));
            return Exit::StoreFailure;
        }
    };
    if candidates.is_empty() {
        console.line("No end of life user records were found.");
        return Exit::Success;
    }
    if args.confirm
        && !console.confirm(&format!("{} user(s) are due for deletion. Send notifications", candidates.len()))
    {
        console.line("Operation aborted at your request");
        return Exit::Success;
    }

    let mut observer = ConsoleObserver {
        console: &mut *console,
        per_user: args.confirm,
    };
    let summary = match scheduler.run_notify_sweep(
        SweepParams {
            when,
            dry_run: args.dry_run,
        },
        &mut observer,
    ) {
        Ok(summary) => summary,
        Err(err) => {
            console.line(format!("[FAILED] {err}"));
            return Exit::StoreFailure;
        }
    };

    print_summary(console, &summary, args.dry_run);
    match scheduler.status(now) {
        Ok(status) => print_status(console, &status),
        Err(err) => tracing::warn!(error = %err, "lifecycle status unavailable"),
    }
    Exit::Success
}

/// 执行到期擦除；返回 `false` 表示通知状态或身份库不可用。
fn wipe_due<R: BufRead, W: Write>(runtime: &Runtime, now: DateTime<Utc>, dry_run: bool, console: &mut Console<R, W>) -> bool {
    if dry_run {
        console.line("Skipping --wipe-due during a dry run");
        return true;
    }
    let results = match runtime.scheduler.wipe_due(&runtime.engine, now) {
        Ok(results) => results,
        Err(err) => {
            console.line(format!("[FAILED] {err}"));
            return false;
        }
    };
    let mut wiped = 0usize;
    for result in &results {
        let due = result.due_at.format(TIMESTAMP_FORMAT);
        if result.outcome.as_ref().is_ok_and(|report| report.entry_id.is_some()) {
            wiped += 1;
        }
        match &result.outcome {
            _ if result.withdrawn => {
                console.line(format!("Withdrew notice for user {}: active again since notification", result.user_id));
            }
            Ok(report) if !report.any_failures => {
                console.line(format!("[OK] Wiped user {} (deletion date {due})", result.user_id));
            }
            Ok(report) => {
                let failed: Vec<String> = report.failed_domains().map(ToString::to_string).collect();
                console.line(format!(
                    "[FAILED] Wiped user {} with failures in: {}",
                    result.user_id,
                    failed.join(", ")
                ));
            }
            Err(err) => console.line(format!("[FAILED] Could not wipe user {}: {err}", result.user_id)),
        }
    }
    console.line(format!("Users wiped after notice: {wiped}"));
    true
}

/// 把批处理事件回显给操作员，并在逐个确认模式下提问。
struct ConsoleObserver<'c, R, W> {
    console: &'c mut Console<R, W>,
    per_user: bool,
}

impl<R: BufRead, W: Write> SweepObserver for ConsoleObserver<'_, R, W> {
    fn confirm(&mut self, user: &UserRecord, _when: DateTime<Utc>) -> bool {
        if !self.per_user {
            return true;
        }
        self.console.line(format!(
            "User {} ({}) <{}>, last active {}",
            user.username,
            user.id,
            user.email,
            user.lifecycle_reference().format(TIMESTAMP_FORMAT)
        ));
        self.console.confirm("Notify this user")
    }

    fn on_event(&mut self, event: &SweepEvent<'_>) {
        let line = match event {
            SweepEvent::Notified { user } => format!("  notified {} <{}>", user.username, user.email),
            SweepEvent::WouldNotify { user } => format!("  would notify {} <{}>", user.username, user.email),
            SweepEvent::AlreadyNotified { user_id, notified_at } => format!(
                "  user {user_id} was already notified on {}",
                notified_at.format(TIMESTAMP_FORMAT)
            ),
            SweepEvent::Ineligible { user_id, reason } => format!("  cannot notify user {user_id}: {reason}"),
            SweepEvent::Declined { user_id } => format!("  skipped user {user_id} at your request"),
            SweepEvent::Failed { user_id, error } => format!("  failed to notify user {user_id}: {error}"),
            SweepEvent::LowMemory { available, required } => format!(
                "Stopping early: {} of memory available, {} required",
                format_bytes(*available),
                format_bytes(*required)
            ),
        };
        self.console.line(line);
    }
}

fn print_summary<R: BufRead, W: Write>(console: &mut Console<R, W>, summary: &SweepSummary, dry_run: bool) {
    console.line("");
    console.line(format!("Elapsed time: {:.2}s", summary.elapsed.as_secs_f64()));
    console.line(format!(
        "Peak memory: {}",
        peak_memory_bytes().map_or_else(|| "unavailable".to_owned(), format_bytes)
    ));
    console.line(format!("Users found: {}", summary.found));
    if dry_run {
        console.line(format!("Users that would be notified: {}", summary.notified));
    } else {
        console.line(format!("Users notified: {}", summary.notified));
    }
    console.line(format!("Failed to notify: {}", summary.failed));
    console.line(format!("Cannot notify: {}", summary.cannot_notify()));
    console.line(format!("Already notified: {}", summary.already_notified));
    if summary.stopped_early {
        console.line("Run stopped early: available memory fell below the configured minimum");
    }
}

fn print_status<R: BufRead, W: Write>(console: &mut Console<R, W>, status: &LifecycleStatus) {
    let next = status
        .next_wipe_at
        .map_or_else(|| "none".to_owned(), |at| at.format(TIMESTAMP_FORMAT).to_string());
    console.line(format!(
        "Pending deletions: {} notified, {} past their deletion date, next {next}",
        status.notified, status.awaiting_wipe
    ));
}

fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MiB", bytes as f64 / MIB)
}
