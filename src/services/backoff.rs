//! 重试等待策略

use crate::models::RATE_LIMITED_CODE;
use rand::Rng;
use std::time::Duration;

/// 两次尝试之间等待多久
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    /// 不等待（测试用）
    Immediate,
    Fixed(Duration),
    /// 在 [min, max] 之间随机，避免多个线程同步撞击接口
    Jittered { min: Duration, max: Duration },
    /// base * 2^(attempt-1)，不超过 max
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// 第 `attempt` 次（从 1 开始）失败后的等待时间
    pub fn delay(&self, attempt: u64) -> Duration {
        match self {
            Backoff::Immediate => Duration::ZERO,
            Backoff::Fixed(d) => *d,
            Backoff::Jittered { min, max } => {
                if max <= min {
                    return *min;
                }
                let (lo, hi) = (min.as_millis() as u64, max.as_millis() as u64);
                Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
            }
            Backoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(20) as u32;
                base.saturating_mul(1u32 << shift).min(*max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Jittered {
            min: Duration::from_millis(100),
            max: Duration::from_millis(1000),
        }
    }
}

/// 提交失败后的重试策略
///
/// 默认所有拒绝原因一视同仁；`rate_limited` 可以给"提交过快"单独配置等待
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    pub rate_limited: Option<Backoff>,
}

impl RetryPolicy {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            rate_limited: None,
        }
    }

    pub fn with_rate_limited(mut self, backoff: Backoff) -> Self {
        self.rate_limited = Some(backoff);
        self
    }

    /// 普通失败后的等待
    pub fn delay(&self, attempt: u64) -> Duration {
        self.backoff.delay(attempt)
    }

    /// 被服务端拒绝后的等待
    pub fn delay_after_rejection(&self, code: i64, attempt: u64) -> Duration {
        match (&self.rate_limited, code) {
            (Some(backoff), RATE_LIMITED_CODE) => backoff.delay(attempt),
            _ => self.backoff.delay(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}
