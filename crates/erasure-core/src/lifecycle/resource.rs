/// 批处理过程中的可用内存探针。
///
/// 调度器在处理每个用户之前询问一次；可用量低于阈值时提前结束本轮，而不是报错。
/// 返回 `None` 表示平台无法测量，调度器视为资源充足。
pub trait ResourceProbe: Send + Sync {
    fn available_bytes(&self) -> Option<u64>;
}

/// 永远报告“无法测量”的探针。
#[derive(Clone, Copy, Debug, Default)]
pub struct UnboundedProbe;

impl ResourceProbe for UnboundedProbe {
    fn available_bytes(&self) -> Option<u64> {
        None
    }
}
