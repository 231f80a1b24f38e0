//! 定时触发 - 业务能力层
//!
//! 按轮询间隔反复检查校正后的时间，而不是一次睡到开抢时刻：
//! 长时间休眠期间本地时钟的漂移不会被重新检查。

use crate::infrastructure::{Clock, StopSignal};
use crate::models::PurchaseTarget;
use crate::services::remote_clock::ClockOffset;
use chrono::{Local, TimeZone};
use tracing::{debug, info};

/// 等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// 到点了，`polls` 为经过的轮询次数
    Fired { polls: u64 },
    /// 等待期间收到停止信号
    Cancelled,
}

pub struct TriggerScheduler<C> {
    clock: C,
}

impl<C: Clock> TriggerScheduler<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// 阻塞直到 `本地时间 - 偏差 >= 开抢时刻`，没有等待上限
    pub async fn wait_until(
        &self,
        target: &PurchaseTarget,
        offset: ClockOffset,
        stop: &StopSignal,
    ) -> TriggerOutcome {
        info!(
            "⏳ 正在等待抢购时间: {}, 检测到时间差: {}",
            format_millis(target.fire_at_millis),
            offset
        );

        let mut polls = 0u64;
        loop {
            if stop.is_raised() {
                info!("等待开抢时收到停止信号");
                return TriggerOutcome::Cancelled;
            }

            let now = offset.corrected(self.clock.now_millis());
            if now >= target.fire_at_millis {
                info!("⏰ 时间到达，开始执行...");
                return TriggerOutcome::Fired { polls };
            }
            debug!("距离开抢还有 {} ms", target.fire_at_millis - now);

            if stop.sleep(target.polling_interval).await {
                info!("等待开抢时收到停止信号");
                return TriggerOutcome::Cancelled;
            }
            polls += 1;
        }
    }
}

fn format_millis(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| millis.to_string())
}
