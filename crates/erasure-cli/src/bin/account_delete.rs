//! `account-delete` 入口。

use std::process::ExitCode;

use clap::Parser;
use erasure_cli::commands::account_delete::{self, Args};
use erasure_cli::{Console, telemetry};

fn main() -> ExitCode {
    let args = Args::parse();
    let _ = telemetry::install(args.common.debug);
    let mut console = Console::stdio();
    account_delete::run(&args, &mut console).into()
}
