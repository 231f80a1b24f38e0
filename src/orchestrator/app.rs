//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 持有配置、京东客户端、Cookie 存储和登录会话，对外提供两个操作：
//!
//! 1. **预约**：登录 → 保存 Cookie → 预约
//! 2. **抢购**：登录 → 保存 Cookie → 同步服务器时间 → 等待开抢 → 多线程抢购
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有 `JdClient` 和 `AuthSession` 的模块
//! - **登录前置**：两个操作开始前都调用 `ensure_authenticated`
//! - **向下委托**：具体的等待、重试、并发交给 services / workflow / worker_pool

use crate::clients::JdClient;
use crate::config::Config;
use crate::infrastructure::{CookieVault, SystemClock, StopSignal};
use crate::models::{OrderSecrets, PurchaseTarget, WorkerOutcome};
use crate::orchestrator::worker_pool::WorkerPool;
use crate::services::{
    AuthSession, Backoff, FileQrPresenter, LoginPolling, RemoteClock, RetryPolicy,
    TriggerOutcome, TriggerScheduler,
};
use crate::utils::logging::{log_startup, log_user_and_sku, print_final_stats};
use crate::workflow::{ReservationFlow, ReserveOutcome};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 获取不到昵称时保存 Cookie 用的文件名
const FALLBACK_ACCOUNT: &str = "jd_user";

/// 应用主结构
pub struct App {
    config: Config,
    client: Arc<JdClient>,
    vault: CookieVault,
    target: PurchaseTarget,
    session: AuthSession<JdClient, FileQrPresenter>,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        config.validate().context("配置校验失败")?;
        log_startup(&config);

        let client = Arc::new(JdClient::new(&config).context("无法创建京东客户端")?);

        // 加载本地 Cookie
        let vault = CookieVault::new(&config.cookie_folder);
        match vault.load_first() {
            Ok(Some((name, blob))) => {
                client.import_credentials(&blob);
                info!("✓ 已加载账号 {} 的登录信息 (保存于 {})", name, blob.saved_at.format("%Y-%m-%d %H:%M:%S"));
            }
            Ok(None) => info!("本地没有保存的登录信息"),
            Err(e) => warn!("⚠️ 加载本地 Cookie 失败: {}", e),
        }

        let target = PurchaseTarget::from_config(&config)?;
        let session = AuthSession::new(
            client.clone(),
            FileQrPresenter::new(&config.qr_image_file),
            LoginPolling::for_target(&target, Duration::from_millis(config.login_poll_interval_ms)),
        );

        Ok(Self {
            config,
            client,
            vault,
            target,
            session,
        })
    }

    /// 预约
    pub async fn reserve(&mut self, stop: &StopSignal) -> Result<ReserveOutcome> {
        let nickname = self.login(stop).await?;
        let title = self.sku_title().await;
        log_user_and_sku(&nickname, title.as_deref());

        let flow = ReservationFlow::new(self.client.clone(), self.retry_backoff());
        let outcome = flow.run(stop).await;
        if outcome == ReserveOutcome::Cancelled {
            warn!("预约已取消");
        }
        Ok(outcome)
    }

    /// 抢购
    pub async fn purchase(&mut self, stop: &StopSignal) -> Result<WorkerOutcome> {
        let nickname = self.login(stop).await?;
        let title = self.sku_title().await;
        log_user_and_sku(&nickname, title.as_deref());

        if self.target.is_overdue() {
            warn!("⚠️ 今天的抢购时间 {} 已过，将立即开始", self.config.buy_time);
        }

        let offset = RemoteClock::new(self.client.clone(), SystemClock)
            .measure_offset()
            .await
            .context("无法同步京东服务器时间，放弃抢购")?;

        let scheduler = TriggerScheduler::new(SystemClock);
        match scheduler.wait_until(&self.target, offset, stop).await {
            TriggerOutcome::Fired { polls } => {
                info!("共等待 {} 个轮询周期", polls);
            }
            TriggerOutcome::Cancelled => {
                warn!("等待开抢时被取消");
                return Ok(WorkerOutcome::Exhausted);
            }
        }

        let pool = WorkerPool::new(
            self.client.clone(),
            OrderSecrets {
                payment_pwd: self.config.payment_pwd.clone(),
                eid: self.config.eid.clone(),
                fp: self.config.fp.clone(),
            },
            retry_policy(&self.config),
            self.config.loop_mode,
        );
        let outcome = pool.run(&self.target, self.config.worker_count, stop).await;

        print_final_stats(&outcome, self.config.log_file.as_deref());
        Ok(outcome)
    }

    /// 确保已登录，并以昵称保存 Cookie
    async fn login(&mut self, stop: &StopSignal) -> Result<String> {
        self.session
            .ensure_authenticated(stop)
            .await
            .context("登录失败")?;

        let nickname = match self.client.fetch_nickname().await {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) => FALLBACK_ACCOUNT.to_string(),
            Err(e) => {
                warn!("⚠️ 获取用户信息失败: {}", e);
                FALLBACK_ACCOUNT.to_string()
            }
        };

        match self.vault.save(&nickname, &self.client.export_credentials()) {
            Ok(path) => info!("✓ 登录信息已保存至 {}", path.display()),
            Err(e) => warn!("⚠️ 保存 Cookie 失败: {}", e),
        }
        Ok(nickname)
    }

    async fn sku_title(&self) -> Option<String> {
        match self.client.fetch_sku_title().await {
            Ok(title) => title,
            Err(e) => {
                warn!("⚠️ 获取商品名称失败: {}", e);
                None
            }
        }
    }

    fn retry_backoff(&self) -> Backoff {
        jittered(&self.config)
    }
}

fn jittered(config: &Config) -> Backoff {
    Backoff::Jittered {
        min: Duration::from_millis(config.min_wait_ms),
        max: Duration::from_millis(config.max_wait_ms),
    }
}

/// 按配置构建抢购线程的重试策略
pub fn retry_policy(config: &Config) -> RetryPolicy {
    let policy = RetryPolicy::new(jittered(config));
    match config.rate_limited_wait_ms {
        Some(ms) => policy.with_rate_limited(Backoff::Fixed(Duration::from_millis(ms))),
        None => policy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_knob_is_off_by_default() {
        let policy = retry_policy(&Config::default());
        assert_eq!(
            policy.backoff,
            Backoff::Jittered {
                min: Duration::from_millis(100),
                max: Duration::from_millis(1000),
            }
        );
        assert_eq!(policy.rate_limited, None);
    }

    #[test]
    fn rate_limit_knob_uses_fixed_wait() {
        let config = Config {
            rate_limited_wait_ms: Some(3000),
            ..Config::default()
        };
        assert_eq!(
            retry_policy(&config).rate_limited,
            Some(Backoff::Fixed(Duration::from_secs(3)))
        );
    }

    #[test]
    fn invalid_config_fails_initialization() {
        let err = App::initialize(Config::default()).err().unwrap();
        assert!(format!("{:#}", err).contains("sku_id"));
    }
}
