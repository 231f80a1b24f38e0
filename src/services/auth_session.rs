//! 登录会话 - 业务能力层
//!
//! 状态机：`Anonymous → PendingQrChallenge → Authenticated`，
//! 校验失败时 `Authenticated → Anonymous`。
//!
//! 所有抢购操作开始前都调用 [`AuthSession::ensure_authenticated`]，
//! 它返回时会话要么已登录，要么返回错误，不会停在 `PendingQrChallenge`。

use crate::error::{Result, SeckillError};
use crate::infrastructure::StopSignal;
use crate::models::PurchaseTarget;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    PendingQrChallenge,
    Authenticated,
}

/// 一次二维码状态轮询的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketPoll {
    /// 用户已确认，拿到 ticket
    Ready(String),
    /// 还没扫 / 已扫未确认，继续等
    Pending { code: i64, message: String },
    /// 二维码过期或被取消，不必继续轮询
    Rejected { code: i64, message: String },
}

/// 登录相关接口
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// 访问需要登录的页面，2xx 返回 true
    async fn probe_credentials(&self) -> Result<bool>;
    /// 下载登录二维码
    async fn fetch_qr_image(&self) -> Result<Vec<u8>>;
    /// 查询二维码扫描状态
    async fn poll_ticket(&self) -> Result<TicketPoll>;
    /// 用 ticket 换取登录态
    async fn validate_ticket(&self, ticket: &str) -> Result<bool>;
}

/// 把二维码展示给用户
pub trait QrPresenter: Send + Sync {
    fn present(&self, image: &[u8]) -> Result<()>;
}

/// 二维码轮询参数
#[derive(Debug, Clone, Copy)]
pub struct LoginPolling {
    pub max_polls: u32,
    pub interval: Duration,
}

impl Default for LoginPolling {
    fn default() -> Self {
        Self {
            max_polls: 85,
            interval: Duration::from_secs(4),
        }
    }
}

impl LoginPolling {
    /// 最大轮询次数取自抢购目标
    pub fn for_target(target: &PurchaseTarget, interval: Duration) -> Self {
        Self {
            max_polls: target.max_login_polls,
            interval,
        }
    }
}

/// 登录会话
pub struct AuthSession<A, P> {
    api: Arc<A>,
    presenter: P,
    polling: LoginPolling,
    state: SessionState,
}

impl<A: AuthApi, P: QrPresenter> AuthSession<A, P> {
    pub fn new(api: Arc<A>, presenter: P, polling: LoginPolling) -> Self {
        Self {
            api,
            presenter,
            polling,
            state: SessionState::Anonymous,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// 验证当前 cookie 是否有效
    ///
    /// 可以随时调用；失败时已登录的会话回到 `Anonymous`
    pub async fn verify_credentials(&mut self) -> bool {
        let valid = match self.api.probe_credentials().await {
            Ok(valid) => valid,
            Err(e) => {
                error!("验证cookies失败. Error - {}", e);
                false
            }
        };

        if valid {
            self.state = SessionState::Authenticated;
        } else if self.state == SessionState::Authenticated {
            warn!("⚠️ 登录状态已失效");
            self.state = SessionState::Anonymous;
        }
        valid
    }

    /// 下载二维码并展示给用户
    pub async fn begin_qr_challenge(&mut self) -> Result<()> {
        if self.state == SessionState::Authenticated {
            return Err(SeckillError::LoginFailed(
                "已登录的会话不能发起二维码登录".to_string(),
            ));
        }

        let image = self.api.fetch_qr_image().await.map_err(|e| {
            self.state = SessionState::Anonymous;
            SeckillError::LoginFailed(format!("二维码下载失败: {}", e))
        })?;

        self.presenter.present(&image).map_err(|e| {
            self.state = SessionState::Anonymous;
            SeckillError::LoginFailed(format!("二维码展示失败: {}", e))
        })?;

        info!("检索二维码成功. 请打开京东APP扫描登陆...");
        self.state = SessionState::PendingQrChallenge;
        Ok(())
    }

    /// 轮询二维码状态直到拿到 ticket
    ///
    /// 收到停止信号时回到 `Anonymous` 并返回 `Cancelled`
    pub async fn poll_challenge_ticket(&mut self, stop: &StopSignal) -> Result<String> {
        if self.state != SessionState::PendingQrChallenge {
            return Err(SeckillError::LoginFailed(
                "尚未获取二维码，无法查询扫码状态".to_string(),
            ));
        }

        for poll in 1..=self.polling.max_polls {
            if stop.is_raised() {
                return self.cancel_challenge();
            }

            match self.api.poll_ticket().await {
                Ok(TicketPoll::Ready(ticket)) => {
                    info!("二维码扫描成功 (第 {} 次查询)", poll);
                    return Ok(ticket);
                }
                Ok(TicketPoll::Pending { code, message }) => {
                    info!("Code: {}, Message: {}", code, message);
                }
                Ok(TicketPoll::Rejected { code, message }) => {
                    self.state = SessionState::Anonymous;
                    return Err(SeckillError::LoginFailed(format!(
                        "Code: {}, Message: {}",
                        code, message
                    )));
                }
                Err(e) => {
                    warn!("检索二维码登陆状态失败 ({}/{}): {}", poll, self.polling.max_polls, e);
                }
            }

            if poll < self.polling.max_polls && stop.sleep(self.polling.interval).await {
                return self.cancel_challenge();
            }
        }

        self.state = SessionState::Anonymous;
        Err(SeckillError::LoginTimeout {
            attempts: self.polling.max_polls,
        })
    }

    fn cancel_challenge<T>(&mut self) -> Result<T> {
        warn!("收到停止信号，放弃二维码登录");
        self.state = SessionState::Anonymous;
        Err(SeckillError::Cancelled)
    }

    /// 验证 ticket，成功后进入已登录状态
    pub async fn redeem_ticket(&mut self, ticket: &str) -> Result<()> {
        match self.api.validate_ticket(ticket).await {
            Ok(true) => {
                self.state = SessionState::Authenticated;
                info!("二维码登录成功!!!");
                Ok(())
            }
            Ok(false) => {
                self.state = SessionState::Anonymous;
                Err(SeckillError::LoginFailed("Ticket 验证未通过".to_string()))
            }
            Err(e) => {
                self.state = SessionState::Anonymous;
                Err(SeckillError::LoginFailed(format!("验证 Ticket 失败: {}", e)))
            }
        }
    }

    /// 确保已登录：cookie 有效则直接返回，否则走完整的二维码登录
    pub async fn ensure_authenticated(&mut self, stop: &StopSignal) -> Result<()> {
        if self.verify_credentials().await {
            info!("登陆成功!!!");
            return Ok(());
        }

        info!("需要登陆, 请开始扫描二维码登录...");
        let result = self.run_qr_login(stop).await;
        if result.is_err() && self.state == SessionState::PendingQrChallenge {
            self.state = SessionState::Anonymous;
        }
        result
    }

    async fn run_qr_login(&mut self, stop: &StopSignal) -> Result<()> {
        if stop.is_raised() {
            return Err(SeckillError::Cancelled);
        }
        self.begin_qr_challenge().await?;
        let ticket = self.poll_challenge_ticket(stop).await?;
        self.redeem_ticket(&ticket).await
    }
}
