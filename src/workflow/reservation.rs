//! 预约流程 - 流程层
//!
//! 获取预约链接 → 访问预约链接，两步都失败重试，直到成功或被停止

use crate::error::Result;
use crate::infrastructure::StopSignal;
use crate::services::Backoff;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 预约相关接口
#[async_trait]
pub trait ReserveApi: Send + Sync {
    /// 获取商品的预约链接
    async fn fetch_reserve_url(&self) -> Result<String>;
    /// 访问预约链接
    async fn visit_reserve_url(&self, url: &str) -> Result<()>;
}

/// 预约结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    Cancelled,
}

pub struct ReservationFlow<R> {
    api: Arc<R>,
    backoff: Backoff,
}

impl<R: ReserveApi> ReservationFlow<R> {
    pub fn new(api: Arc<R>, backoff: Backoff) -> Self {
        Self { api, backoff }
    }

    pub async fn run(&self, stop: &StopSignal) -> ReserveOutcome {
        let mut attempt = 0u64;
        loop {
            if stop.is_raised() {
                return ReserveOutcome::Cancelled;
            }
            attempt += 1;

            match self.api.fetch_reserve_url().await {
                Ok(url) => return self.visit_until_done(&url, stop).await,
                Err(e) => error!("预约失败. Error - {}", e),
            }

            if stop.sleep(self.backoff.delay(attempt)).await {
                return ReserveOutcome::Cancelled;
            }
        }
    }

    async fn visit_until_done(&self, url: &str, stop: &StopSignal) -> ReserveOutcome {
        let mut attempt = 0u64;
        loop {
            if stop.is_raised() {
                return ReserveOutcome::Cancelled;
            }
            attempt += 1;

            match self.api.visit_reserve_url(url).await {
                Ok(()) => {
                    info!("✓ 预约成功，已获得抢购资格 / 您已成功预约过了，无需重复预约");
                    return ReserveOutcome::Reserved;
                }
                Err(e) => warn!("预约失败正在重试... {}", e),
            }

            if stop.sleep(self.backoff.delay(attempt)).await {
                return ReserveOutcome::Cancelled;
            }
        }
    }
}
