//! 操作员交互：输出与 `[Y/N]` 确认。

use std::io::{self, BufRead, Write};

/// 绑定一对输入输出流的控制台。
///
/// 二进制入口使用标准输入输出；测试传入内存缓冲，从而断言提示文本与退出码。
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// 输出一行；写失败（例如管道已关闭）时静默丢弃。
    pub fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.output, "{}", text.as_ref());
    }

    /// 打印 `question [Y/N]? ` 并读取一行回答。
    ///
    /// 只有 `y`/`yes`（不区分大小写）视为同意；输入结束或读失败视为拒绝。
    pub fn confirm(&mut self, question: &str) -> bool {
        let _ = write!(self.output, "{question} [Y/N]? ");
        let _ = self.output.flush();
        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) | Err(_) => {
                self.line("");
                false
            }
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl Console<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}
