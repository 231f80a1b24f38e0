//! 抢购尝试上下文
//!
//! 封装"第几个线程的第几次尝试"这一信息

use std::fmt::Display;

/// 抢购尝试上下文
///
/// 传给每个接口调用，仅用于日志标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCtx {
    /// 抢购线程编号（从1开始）
    pub worker_id: usize,

    /// 本线程第几次尝试（从1开始）
    pub attempt: u64,
}

impl AttemptCtx {
    pub fn new(worker_id: usize, attempt: u64) -> Self {
        Self { worker_id, attempt }
    }
}

impl Display for AttemptCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[抢购线程 #{} 第 {} 次]", self.worker_id, self.attempt)
    }
}
