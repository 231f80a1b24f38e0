//! 程序配置
//!
//! 从 TOML 文件加载，再用环境变量覆盖敏感字段，最后统一校验。

use crate::error::{Result, SeckillError};
use crate::models::target::parse_buy_time;
use crate::workflow::LoopMode;
use serde::Deserialize;
use std::path::Path;

/// 京东各接口地址及对应的 Referer
///
/// Referer 中的 `{}` 依次替换为 sku / 数量 / 时间戳
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub user_order_list: String,
    pub qr_image_show: String,
    pub qr_image_show_refer: String,
    pub qr_ticket: String,
    pub qr_ticket_refer: String,
    pub qr_ticket_validate: String,
    pub qr_ticket_validate_refer: String,
    pub user_info: String,
    pub user_info_refer: String,
    pub product_info: String,
    pub yushow: String,
    pub yushow_refer: String,
    pub get_seckill_link: String,
    pub get_seckill_link_refer: String,
    pub request_seckill_refer: String,
    pub request_seckill_checkout: String,
    pub request_seckill_checkout_refer: String,
    pub seckill_init: String,
    pub submit_order: String,
    pub submit_order_refer: String,
    pub jd_time_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            user_order_list: "https://order.jd.com/center/list.action".to_string(),
            qr_image_show: "https://qr.m.jd.com/show".to_string(),
            qr_image_show_refer: "https://passport.jd.com/new/login.aspx".to_string(),
            qr_ticket: "https://qr.m.jd.com/check".to_string(),
            qr_ticket_refer: "https://passport.jd.com/new/login.aspx".to_string(),
            qr_ticket_validate: "https://passport.jd.com/uc/qrCodeTicketValidation".to_string(),
            qr_ticket_validate_refer: "https://passport.jd.com/uc/login?ltype=logout".to_string(),
            user_info: "https://passport.jd.com/user/petName/getUserInfoForMiniJd.action"
                .to_string(),
            user_info_refer: "https://order.jd.com/center/list.action".to_string(),
            product_info: "https://item.jd.com/{}.html".to_string(),
            yushow: "https://yushou.jd.com/youshouinfo.action".to_string(),
            yushow_refer: "https://item.jd.com/{}.html".to_string(),
            get_seckill_link: "https://itemko.jd.com/itemShowBtn".to_string(),
            get_seckill_link_refer: "https://item.jd.com/{}.html".to_string(),
            request_seckill_refer: "https://item.jd.com/{}.html".to_string(),
            request_seckill_checkout: "https://marathon.jd.com/seckill/seckill.action".to_string(),
            request_seckill_checkout_refer: "https://item.jd.com/{}.html".to_string(),
            seckill_init: "https://marathon.jd.com/seckillnew/orderService/pc/init.action"
                .to_string(),
            submit_order: "https://marathon.jd.com/seckillnew/orderService/pc/submitOrder.action"
                .to_string(),
            submit_order_refer:
                "https://marathon.jd.com/seckill/seckill.action?skuId={}&num={}&rid={}".to_string(),
            jd_time_api: "https://a.jd.com//ajax/queryServerData.html".to_string(),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 商品 sku
    pub sku_id: String,
    /// 每天的抢购时间，格式 09:59:59.500
    pub buy_time: String,
    /// 抢购数量
    pub seckill_num: u32,
    /// 并发抢购线程数
    pub worker_count: usize,
    /// 支付密码
    pub payment_pwd: String,
    /// 设备 eid
    pub eid: String,
    /// 设备指纹 fp
    pub fp: String,

    // --- 时间同步 ---
    /// 等待抢购时间时的轮询间隔
    pub polling_interval_ms: u64,
    /// 服务器时间接口超时
    pub time_api_timeout_ms: u64,

    // --- 登录 ---
    /// 二维码状态最大轮询次数
    pub max_login_polls: u32,
    /// 二维码状态轮询间隔
    pub login_poll_interval_ms: u64,
    /// Cookie 保存目录
    pub cookie_folder: String,
    /// Cookie 所属的主域名
    pub cookie_domain: String,
    /// 二维码图片保存路径
    pub qr_image_file: String,

    // --- 重试 ---
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
    /// "提交过快" 时单独使用的等待时间，不设置则与其它失败相同
    pub rate_limited_wait_ms: Option<u64>,
    pub loop_mode: LoopMode,

    // --- 其它 ---
    /// 普通请求超时
    pub request_timeout_ms: u64,
    /// 日志文件，为空时只输出到终端
    pub log_file: Option<String>,

    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sku_id: String::new(),
            buy_time: "09:59:59.500".to_string(),
            seckill_num: 2,
            worker_count: 5,
            payment_pwd: String::new(),
            eid: String::new(),
            fp: String::new(),
            polling_interval_ms: 500,
            time_api_timeout_ms: 1000,
            max_login_polls: 85,
            login_poll_interval_ms: 4000,
            cookie_folder: "./cookies/".to_string(),
            cookie_domain: "jd.com".to_string(),
            qr_image_file: "qr_code.png".to_string(),
            min_wait_ms: 100,
            max_wait_ms: 1000,
            rate_limited_wait_ms: None,
            loop_mode: LoopMode::default(),
            request_timeout_ms: 10_000,
            log_file: Some("running.log".to_string()),
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// 从 TOML 文件加载配置，文件不存在时使用默认值
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| SeckillError::io(path.display().to_string(), e))?;
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// 解析 TOML 文本
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SeckillError::Config(e.to_string()))
    }

    /// 用环境变量覆盖敏感字段
    pub fn with_env_overrides(self) -> Self {
        Self {
            sku_id: std::env::var("SKU_ID").unwrap_or(self.sku_id),
            buy_time: std::env::var("BUY_TIME").unwrap_or(self.buy_time),
            payment_pwd: std::env::var("PAYMENT_PWD").unwrap_or(self.payment_pwd),
            eid: std::env::var("EID").unwrap_or(self.eid),
            fp: std::env::var("FP").unwrap_or(self.fp),
            worker_count: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.worker_count),
            ..self
        }
    }

    /// 校验必填项，缺失时程序无法启动
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("sku_id", &self.sku_id),
            ("payment_pwd", &self.payment_pwd),
            ("eid", &self.eid),
            ("fp", &self.fp),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(SeckillError::Config(format!("缺少必填配置项 {}", name)));
            }
        }
        parse_buy_time(&self.buy_time)?;
        if self.worker_count == 0 {
            return Err(SeckillError::Config("worker_count 不能为 0".to_string()));
        }
        if self.polling_interval_ms == 0 {
            return Err(SeckillError::Config("polling_interval_ms 不能为 0".to_string()));
        }
        if self.min_wait_ms > self.max_wait_ms {
            return Err(SeckillError::Config(format!(
                "min_wait_ms ({}) 大于 max_wait_ms ({})",
                self.min_wait_ms, self.max_wait_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
sku_id = "100012043978"
buy_time = "11:59:59.500"
payment_pwd = "123456"
eid = "EID"
fp = "FP"
loop_mode = "full"

[endpoints]
jd_time_api = "http://127.0.0.1:9/time"
"#;

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.sku_id, "100012043978");
        assert_eq!(config.buy_time, "11:59:59.500");
        assert_eq!(config.loop_mode, LoopMode::Full);
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.max_login_polls, 85);
        assert_eq!(config.endpoints.jd_time_api, "http://127.0.0.1:9/time");
        assert_eq!(
            config.endpoints.qr_ticket,
            Endpoints::default().qr_ticket,
            "未配置的接口使用默认地址"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_secret_is_rejected() {
        let config = Config {
            payment_pwd: String::new(),
            ..Config::from_toml_str(SAMPLE).unwrap()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("payment_pwd"));
    }

    #[test]
    fn malformed_buy_time_is_rejected() {
        let config = Config {
            buy_time: "noon".to_string(),
            ..Config::from_toml_str(SAMPLE).unwrap()
        };
        assert!(matches!(config.validate(), Err(SeckillError::Config(_))));
    }

    #[test]
    fn zero_polling_interval_is_rejected() {
        let config = Config {
            polling_interval_ms: 0,
            ..Config::from_toml_str(SAMPLE).unwrap()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("polling_interval_ms"));
    }
}
