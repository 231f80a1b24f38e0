//! 抢购线程 - 流程层
//!
//! 核心职责：定义"一次抢购尝试"的完整流程，并在失败后不断重试
//!
//! 流程顺序：
//! 1. 获取并访问抢购链接（可选，可重复）
//! 2. 访问结算页，建立服务端状态（失败忽略）
//! 3. 获取秒杀初始化信息（地址、发票、token）
//! 4. 组装订单参数（无 I/O）
//! 5. 提交订单
//!
//! 除了抢到和被停止，任何结果都只会让循环等一会儿再来

use crate::error::{Result, SeckillError};
use crate::infrastructure::StopSignal;
use crate::models::{AttemptResult, OrderInitInfo, OrderPayload, OrderSecrets, PurchaseTarget, WorkerOutcome};
use crate::services::RetryPolicy;
use crate::workflow::attempt_ctx::AttemptCtx;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 每轮循环执行哪些步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// 每轮都执行 1-5
    Full,
    /// 1-2 成功一次后，每轮只执行 3-5
    #[default]
    Lean,
    /// 每轮只执行 3-5
    SubmitOnly,
}

/// 抢购相关接口
///
/// 所有线程共享同一份登录态，只读
#[async_trait]
pub trait SeckillApi: Send + Sync {
    /// 获取并访问商品的抢购链接，返回链接
    async fn acquire_route(&self, ctx: &AttemptCtx) -> Result<String>;
    /// 访问抢购订单结算页面
    async fn prime_checkout(&self, ctx: &AttemptCtx) -> Result<()>;
    /// 获取秒杀初始化信息
    async fn fetch_order_init(&self, ctx: &AttemptCtx) -> Result<OrderInitInfo>;
    /// 提交订单，返回原始响应
    async fn submit_order(&self, ctx: &AttemptCtx, payload: &OrderPayload) -> Result<String>;
}

/// 抢购线程
pub struct SubmissionWorker<S> {
    id: usize,
    api: Arc<S>,
    target: Arc<PurchaseTarget>,
    secrets: Arc<OrderSecrets>,
    policy: RetryPolicy,
    mode: LoopMode,
}

impl<S: SeckillApi> SubmissionWorker<S> {
    pub fn new(
        id: usize,
        api: Arc<S>,
        target: Arc<PurchaseTarget>,
        secrets: Arc<OrderSecrets>,
        policy: RetryPolicy,
        mode: LoopMode,
    ) -> Self {
        Self {
            id,
            api,
            target,
            secrets,
            policy,
            mode,
        }
    }

    /// 循环抢购直到成功或收到停止信号
    ///
    /// 抢到后由本线程发出停止信号通知其它线程。
    /// 登录失效时返回 `SessionInvalid`，不会自行重新登录。
    pub async fn run(&self, stop: &StopSignal) -> Result<WorkerOutcome> {
        info!("[抢购线程 #{}] 🚀 开始抢购 sku {}", self.id, self.target.sku_id);

        let mut routed = false;
        let mut attempt = 0u64;

        loop {
            if stop.is_raised() {
                info!("[抢购线程 #{}] 收到停止信号，共尝试 {} 次", self.id, attempt);
                return Ok(WorkerOutcome::Exhausted);
            }

            attempt += 1;
            let ctx = AttemptCtx::new(self.id, attempt);

            let delay = match self.attempt_once(&ctx, &mut routed, stop).await {
                Ok(AttemptResult::Accepted(order)) => {
                    stop.raise();
                    info!(
                        "{} 🎉 抢购成功，订单号:{}, 总价:{}, 电脑端付款链接:{}",
                        ctx, order.order_id, order.total_money, order.pay_url
                    );
                    return Ok(WorkerOutcome::Success(order));
                }
                Ok(AttemptResult::Rejected { code, message }) => {
                    info!("{} 抢购失败，返回信息: [{}] {}", ctx, code, message);
                    self.policy.delay_after_rejection(code, attempt)
                }
                Ok(AttemptResult::TransientFailure(cause)) => {
                    warn!("{} 抢购失败，{}", ctx, cause);
                    self.policy.delay(attempt)
                }
                Err(SeckillError::Cancelled) => {
                    info!("{} 收到停止信号，放弃本轮尝试", ctx);
                    return Ok(WorkerOutcome::Exhausted);
                }
                Err(e) if e.is_fatal_for_worker() => {
                    error!("{} ❌ 抢购线程终止: {}", ctx, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("{} 抢购失败. Error - {}", ctx, e);
                    self.policy.delay(attempt)
                }
            };

            if stop.sleep(delay).await {
                info!("[抢购线程 #{}] 收到停止信号，共尝试 {} 次", self.id, attempt);
                return Ok(WorkerOutcome::Exhausted);
            }
        }
    }

    /// 执行一轮完整尝试
    ///
    /// 每次请求前检查停止信号，已停止则返回 `Cancelled`
    async fn attempt_once(
        &self,
        ctx: &AttemptCtx,
        routed: &mut bool,
        stop: &StopSignal,
    ) -> Result<AttemptResult> {
        let needs_route = match self.mode {
            LoopMode::Full => true,
            LoopMode::Lean => !*routed,
            LoopMode::SubmitOnly => false,
        };

        if needs_route {
            ensure_running(stop)?;
            let url = self.api.acquire_route(ctx).await?;
            debug!("{} 抢购链接: {}", ctx, url);
            ensure_running(stop)?;
            if let Err(e) = self.api.prime_checkout(ctx).await {
                debug!("{} 访问结算页失败（忽略）: {}", ctx, e);
            }
            *routed = true;
        }

        ensure_running(stop)?;
        let init = self.api.fetch_order_init(ctx).await?;
        let payload = OrderPayload::assemble(&init, &self.target, &self.secrets);

        ensure_running(stop)?;
        info!("{} 提交抢购订单...", ctx);
        match self.api.submit_order(ctx, &payload).await {
            Ok(body) => Ok(AttemptResult::from_submit_body(&body)),
            Err(SeckillError::SessionInvalid) => Err(SeckillError::SessionInvalid),
            Err(e) => Ok(AttemptResult::TransientFailure(e.to_string())),
        }
    }
}

fn ensure_running(stop: &StopSignal) -> Result<()> {
    if stop.is_raised() {
        return Err(SeckillError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{AcceptedOrder, RATE_LIMITED_CODE};
    use crate::services::Backoff;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    pub(crate) const INIT_BODY: &str = r#"{"addressList":[{"id":1,"name":"张三","provinceId":1,"cityId":2,"countyId":3,"townId":0,"addressDetail":"某街道","mobile":"138****0000","mobileKey":"k"}],"token":"tk"}"#;

    pub(crate) fn rejected_body() -> String {
        r#"{"errorMessage":"很遗憾没有抢到，再接再厉哦。","orderId":0,"resultCode":60074,"skuId":0,"success":false}"#.to_string()
    }

    pub(crate) fn accepted_body(order_id: &str) -> String {
        format!(
            r#"{{"orderId":"{}","pcUrl":"//trade.jd.com/pay","resultCode":0,"success":true,"totalMoney":"1499.00"}}"#,
            order_id
        )
    }

    /// 按脚本返回提交结果的假接口，脚本用完后一直返回"没抢到"
    #[derive(Default)]
    pub(crate) struct ScriptedSeckill {
        pub submits: Mutex<VecDeque<Result<String>>>,
        pub inits: Mutex<VecDeque<Result<OrderInitInfo>>>,
        pub route_calls: AtomicUsize,
        pub prime_calls: AtomicUsize,
        pub init_calls: AtomicUsize,
        pub submit_calls: AtomicUsize,
    }

    impl ScriptedSeckill {
        pub fn with_submits(submits: Vec<Result<String>>) -> Self {
            Self {
                submits: Mutex::new(submits.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SeckillApi for ScriptedSeckill {
        async fn acquire_route(&self, _ctx: &AttemptCtx) -> Result<String> {
            self.route_calls.fetch_add(1, Ordering::SeqCst);
            Ok("https://marathon.jd.com/captcha.html?skuId=1".to_string())
        }

        async fn prime_checkout(&self, _ctx: &AttemptCtx) -> Result<()> {
            self.prime_calls.fetch_add(1, Ordering::SeqCst);
            Err(SeckillError::Decode("结算页异常".to_string()))
        }

        async fn fetch_order_init(&self, _ctx: &AttemptCtx) -> Result<OrderInitInfo> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            match self.inits.lock().unwrap().pop_front() {
                Some(scripted) => scripted,
                None => OrderInitInfo::from_body(INIT_BODY),
            }
        }

        async fn submit_order(&self, _ctx: &AttemptCtx, payload: &OrderPayload) -> Result<String> {
            assert_eq!(payload.get("token"), Some("tk"));
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            self.submits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(rejected_body()))
        }
    }

    pub(crate) fn target() -> Arc<PurchaseTarget> {
        Arc::new(PurchaseTarget {
            sku_id: "100012043978".to_string(),
            quantity: 2,
            fire_at_millis: 0,
            polling_interval: Duration::from_millis(500),
            max_login_polls: 85,
        })
    }

    pub(crate) fn secrets() -> Arc<OrderSecrets> {
        Arc::new(OrderSecrets {
            payment_pwd: "654321".to_string(),
            eid: "EID".to_string(),
            fp: "FP".to_string(),
        })
    }

    fn worker(api: Arc<ScriptedSeckill>, mode: LoopMode) -> SubmissionWorker<ScriptedSeckill> {
        SubmissionWorker::new(
            1,
            api,
            target(),
            secrets(),
            RetryPolicy::new(Backoff::Immediate),
            mode,
        )
    }

    #[tokio::test]
    async fn ten_rejections_then_accept_makes_eleven_submits() {
        let mut script: Vec<Result<String>> = (0..10).map(|_| Ok(rejected_body())).collect();
        script.push(Ok(accepted_body("820227001")));
        let api = Arc::new(ScriptedSeckill::with_submits(script));
        let stop = StopSignal::new();

        let outcome = worker(api.clone(), LoopMode::Lean).run(&stop).await.unwrap();

        assert_eq!(
            outcome,
            WorkerOutcome::Success(AcceptedOrder {
                order_id: "820227001".to_string(),
                total_money: "1499.00".to_string(),
                pay_url: "https://trade.jd.com/pay".to_string(),
            })
        );
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 11);
        assert!(stop.is_raised(), "抢到后应通知其它线程");
    }

    #[tokio::test]
    async fn garbled_response_keeps_looping() {
        let api = Arc::new(ScriptedSeckill::with_submits(vec![
            Ok("<html>系统繁忙</html>".to_string()),
            Err(SeckillError::Decode("connection reset".to_string())),
            Ok(accepted_body("9")),
        ]));

        let outcome = worker(api.clone(), LoopMode::SubmitOnly)
            .run(&StopSignal::new())
            .await
            .unwrap();

        assert!(matches!(outcome, WorkerOutcome::Success(ref o) if o.order_id == "9"));
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 3);
        assert_eq!(api.route_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn init_failure_skips_submit_and_retries() {
        let api = Arc::new(ScriptedSeckill::with_submits(vec![Ok(accepted_body("7"))]));
        api.inits.lock().unwrap().extend([
            Err(SeckillError::OrderInitUnavailable("<html>".to_string())),
            Err(SeckillError::Decode("bad".to_string())),
        ]);

        let outcome = worker(api.clone(), LoopMode::SubmitOnly)
            .run(&StopSignal::new())
            .await
            .unwrap();

        assert!(matches!(outcome, WorkerOutcome::Success(_)));
        assert_eq!(api.init_calls.load(Ordering::SeqCst), 3);
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lean_mode_routes_once_full_mode_every_time() {
        let script = || vec![Ok(rejected_body()), Ok(rejected_body()), Ok(accepted_body("1"))];

        let lean = Arc::new(ScriptedSeckill::with_submits(script()));
        worker(lean.clone(), LoopMode::Lean).run(&StopSignal::new()).await.unwrap();
        assert_eq!(lean.route_calls.load(Ordering::SeqCst), 1);
        assert_eq!(lean.prime_calls.load(Ordering::SeqCst), 1);

        let full = Arc::new(ScriptedSeckill::with_submits(script()));
        worker(full.clone(), LoopMode::Full).run(&StopSignal::new()).await.unwrap();
        assert_eq!(full.route_calls.load(Ordering::SeqCst), 3);
        assert_eq!(full.prime_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn raised_signal_stops_before_next_call() {
        let api = Arc::new(ScriptedSeckill::default());
        let stop = StopSignal::new();
        stop.raise();

        let outcome = worker(api.clone(), LoopMode::Lean).run(&stop).await.unwrap();

        assert_eq!(outcome, WorkerOutcome::Exhausted);
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn endless_rejections_run_until_cancelled() {
        let api = Arc::new(ScriptedSeckill::default());
        let stop = StopSignal::new();
        let w = SubmissionWorker::new(
            1,
            api.clone(),
            target(),
            secrets(),
            RetryPolicy::new(Backoff::Fixed(Duration::from_millis(100))),
            LoopMode::Lean,
        );
        let raiser = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_050)).await;
            raiser.raise();
        });

        let outcome = w.run(&stop).await.unwrap();

        assert_eq!(outcome, WorkerOutcome::Exhausted);
        let calls = api.submit_calls.load(Ordering::SeqCst);
        assert!((10..=12).contains(&calls), "submit calls = {}", calls);
    }

    #[tokio::test]
    async fn session_invalid_ends_worker_with_error() {
        let api = Arc::new(ScriptedSeckill::default());
        api.inits
            .lock()
            .unwrap()
            .push_back(Err(SeckillError::SessionInvalid));

        let result = worker(api.clone(), LoopMode::SubmitOnly)
            .run(&StopSignal::new())
            .await;

        assert!(matches!(result, Err(SeckillError::SessionInvalid)));
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_rejection_uses_its_own_backoff() {
        let rate_limited = format!(
            r#"{{"errorMessage":"抱歉，您提交过快","resultCode":{},"success":false}}"#,
            RATE_LIMITED_CODE
        );
        let api = Arc::new(ScriptedSeckill::with_submits(vec![
            Ok(rate_limited),
            Ok(accepted_body("1")),
        ]));
        let policy = RetryPolicy::new(Backoff::Fixed(Duration::from_millis(10)))
            .with_rate_limited(Backoff::Fixed(Duration::from_secs(2)));
        let w = SubmissionWorker::new(1, api, target(), secrets(), policy, LoopMode::SubmitOnly);
        let started = tokio::time::Instant::now();

        w.run(&StopSignal::new()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    /// 获取抢购链接期间被其它线程抢到
    struct StoppedMidRoute {
        inner: ScriptedSeckill,
        stop: StopSignal,
    }

    #[async_trait]
    impl SeckillApi for StoppedMidRoute {
        async fn acquire_route(&self, ctx: &AttemptCtx) -> Result<String> {
            let url = self.inner.acquire_route(ctx).await;
            self.stop.raise();
            url
        }

        async fn prime_checkout(&self, ctx: &AttemptCtx) -> Result<()> {
            self.inner.prime_checkout(ctx).await
        }

        async fn fetch_order_init(&self, ctx: &AttemptCtx) -> Result<OrderInitInfo> {
            self.inner.fetch_order_init(ctx).await
        }

        async fn submit_order(&self, ctx: &AttemptCtx, payload: &OrderPayload) -> Result<String> {
            self.inner.submit_order(ctx, payload).await
        }
    }

    #[tokio::test]
    async fn signal_raised_mid_attempt_skips_remaining_calls() {
        let stop = StopSignal::new();
        let api = Arc::new(StoppedMidRoute {
            inner: ScriptedSeckill::with_submits(vec![Ok(accepted_body("late"))]),
            stop: stop.clone(),
        });
        let w = SubmissionWorker::new(
            1,
            api.clone(),
            target(),
            secrets(),
            RetryPolicy::new(Backoff::Immediate),
            LoopMode::Full,
        );

        let outcome = w.run(&stop).await.unwrap();

        assert_eq!(outcome, WorkerOutcome::Exhausted);
        assert_eq!(api.inner.route_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.inner.prime_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.inner.init_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.inner.submit_calls.load(Ordering::SeqCst), 0);
    }
}
