//! 抢购目标
//!
//! 描述"抢哪个商品、抢几个、几点开抢"

use crate::config::Config;
use crate::error::{Result, SeckillError};
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use std::time::Duration;

/// 抢购目标，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseTarget {
    /// 商品 sku
    pub sku_id: String,
    /// 抢购数量
    pub quantity: u32,
    /// 开抢时刻（本地毫秒时间戳）
    pub fire_at_millis: i64,
    /// 等待开抢时的轮询间隔
    pub polling_interval: Duration,
    /// 二维码登录最大轮询次数
    pub max_login_polls: u32,
}

impl PurchaseTarget {
    /// 根据配置构建今天的抢购目标
    pub fn from_config(config: &Config) -> Result<Self> {
        let time_of_day = parse_buy_time(&config.buy_time)?;
        let fire_at_millis = fire_instant_on(Local::now().date_naive(), time_of_day)?;

        Ok(Self {
            sku_id: config.sku_id.clone(),
            quantity: config.seckill_num,
            fire_at_millis,
            polling_interval: Duration::from_millis(config.polling_interval_ms),
            max_login_polls: config.max_login_polls,
        })
    }

    /// 开抢时刻是否已经过去
    pub fn is_overdue(&self) -> bool {
        self.fire_at_millis < Local::now().timestamp_millis()
    }
}

/// 解析 `HH:MM:SS.fff` 格式的抢购时间
pub fn parse_buy_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S%.f").map_err(|e| {
        SeckillError::Config(format!(
            "抢购时间 '{}' 格式错误，应为 HH:MM:SS.fff: {}",
            raw, e
        ))
    })
}

/// 指定日期 + 时刻 对应的本地毫秒时间戳
pub fn fire_instant_on(date: NaiveDate, time_of_day: NaiveTime) -> Result<i64> {
    let naive = date.and_time(time_of_day);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| SeckillError::Config(format!("本地时间 {} 不存在", naive)))
}
