//! `/proc` 内存读数：批处理的可用内存探针与运行摘要中的峰值内存。
//!
//! 读取均有上限（[`MAX_PROC_READ`]），超出上限的内容视为异常并丢弃；
//! 非 Linux 平台读不到文件时返回 `None`，调度器据此视为资源充足。

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use erasure_core::ResourceProbe;

/// 单个 `/proc` 文件的读取上限。
pub const MAX_PROC_READ: usize = 16 * 1024;

const MEMINFO_PATH: &str = "/proc/meminfo";
const SELF_STATUS_PATH: &str = "/proc/self/status";

/// 读取 `MemAvailable` 的探针。
#[derive(Clone, Debug)]
pub struct MeminfoProbe {
    path: PathBuf,
}

impl MeminfoProbe {
    pub fn new() -> Self {
        Self::with_path(MEMINFO_PATH)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MeminfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for MeminfoProbe {
    fn available_bytes(&self) -> Option<u64> {
        read_bounded_file(&self.path).and_then(|text| kib_field(&text, "MemAvailable"))
    }
}

/// 本进程的常驻内存峰值（`VmHWM`）。
pub fn peak_memory_bytes() -> Option<u64> {
    read_bounded_file(Path::new(SELF_STATUS_PATH)).and_then(|text| kib_field(&text, "VmHWM"))
}

/// 解析 `Key:   1234 kB` 形式的行，返回字节数。
fn kib_field(text: &str, key: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        let mut parts = rest.split_whitespace();
        let value: u64 = parts.next()?.parse().ok()?;
        match parts.next() {
            Some("kB") | None => value.checked_mul(1024),
            Some(_) => None,
        }
    })
}

fn read_bounded_file(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file.take(MAX_PROC_READ as u64 + 1));
    let mut buf = String::new();
    reader.read_to_string(&mut buf).ok()?;
    if buf.len() > MAX_PROC_READ {
        return None;
    }
    Some(buf)
}
