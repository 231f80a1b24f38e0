//! 服务器时间同步 - 业务能力层
//!
//! 只负责"本地时间比京东快多少毫秒"，每次会话测量一次

use crate::error::{Result, SeckillError};
use crate::infrastructure::Clock;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// 报告服务器时间的接口
#[async_trait]
pub trait ServerTimeProbe: Send + Sync {
    /// 服务器当前毫秒时间戳
    async fn server_time_millis(&self) -> Result<i64>;
}

#[async_trait]
impl<P: ServerTimeProbe + ?Sized> ServerTimeProbe for Arc<P> {
    async fn server_time_millis(&self) -> Result<i64> {
        (**self).server_time_millis().await
    }
}

/// 本地时间 - 服务器时间（毫秒），正数表示本地偏快
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockOffset(i64);

impl ClockOffset {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    /// 把本地时间换算成服务器时间
    pub fn corrected(self, local_millis: i64) -> i64 {
        local_millis - self.0
    }
}

impl fmt::Display for ClockOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ms", self.0)
    }
}

/// 服务器时间同步
pub struct RemoteClock<P, C> {
    probe: P,
    clock: C,
}

impl<P: ServerTimeProbe, C: Clock> RemoteClock<P, C> {
    pub fn new(probe: P, clock: C) -> Self {
        Self { probe, clock }
    }

    /// 单次采样测量时钟偏差
    ///
    /// 服务器时间加上一半往返耗时作为收到响应时刻的服务器时间
    pub async fn measure_offset(&self) -> Result<ClockOffset> {
        let started = self.clock.now_millis();
        let server_time = self.probe.server_time_millis().await.map_err(|e| {
            error!("获取京东服务器时间失败: {}", e);
            match e {
                SeckillError::ClockUnavailable(_) => e,
                other => SeckillError::ClockUnavailable(other.to_string()),
            }
        })?;
        let local_now = self.clock.now_millis();
        let elapsed = local_now - started;
        let corrected_server = server_time + elapsed / 2;
        let offset = ClockOffset(local_now - corrected_server);

        info!(
            "⏱ 本地与京东时间差: {} (请求耗时 {} ms)",
            offset, elapsed
        );
        Ok(offset)
    }

    /// 按偏差校正后的当前时间
    pub fn corrected_local_time(&self, offset: ClockOffset) -> i64 {
        offset.corrected(self.clock.now_millis())
    }
}
