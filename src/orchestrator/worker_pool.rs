//! 并发抢购池 - 编排层
//!
//! ## 职责
//!
//! 同时启动 N 个抢购线程，谁先抢到就用谁的结果。
//!
//! ## 设计特点
//!
//! - **先成功者胜**：第一个 `Accepted` 发出停止信号，池立即返回该结果
//! - **线程独立**：除停止信号外不共享任何可变状态，由京东服务端裁决谁抢到
//! - **只读共享登录态**：线程只拿到 `SeckillApi`，无法触发重新登录

use crate::infrastructure::StopSignal;
use crate::models::{OrderSecrets, PurchaseTarget, WorkerOutcome};
use crate::services::RetryPolicy;
use crate::workflow::{LoopMode, SeckillApi, SubmissionWorker};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub struct WorkerPool<S> {
    api: Arc<S>,
    secrets: Arc<OrderSecrets>,
    policy: RetryPolicy,
    mode: LoopMode,
}

impl<S: SeckillApi + 'static> WorkerPool<S> {
    pub fn new(api: Arc<S>, secrets: OrderSecrets, policy: RetryPolicy, mode: LoopMode) -> Self {
        Self {
            api,
            secrets: Arc::new(secrets),
            policy,
            mode,
        }
    }

    /// 启动 `worker_count` 个抢购线程并等待第一个成功结果
    ///
    /// `external` 被触发或所有线程都结束且无人抢到时返回 `Exhausted`
    pub async fn run(
        &self,
        target: &PurchaseTarget,
        worker_count: usize,
        external: &StopSignal,
    ) -> WorkerOutcome {
        let worker_count = worker_count.max(1);
        let target = Arc::new(target.clone());
        let stop = StopSignal::new();

        log_pool_start(worker_count, &target);

        let mut workers = JoinSet::new();
        for id in 1..=worker_count {
            let worker = SubmissionWorker::new(
                id,
                self.api.clone(),
                target.clone(),
                self.secrets.clone(),
                self.policy.clone(),
                self.mode,
            );
            let stop = stop.clone();
            workers.spawn(async move { (id, worker.run(&stop).await) });
        }

        let mut finished = 0usize;
        loop {
            tokio::select! {
                joined = workers.join_next() => {
                    let Some(joined) = joined else {
                        warn!("⚠️ 全部 {} 个抢购线程已结束，未抢到", worker_count);
                        return WorkerOutcome::Exhausted;
                    };
                    finished += 1;
                    match joined {
                        Ok((id, Ok(WorkerOutcome::Success(order)))) => {
                            stop.raise();
                            // 其余线程在下一轮循环开始前自行退出
                            workers.detach_all();
                            info!("✅ 抢购线程 #{} 抢购成功，订单号: {}", id, order.order_id);
                            return WorkerOutcome::Success(order);
                        }
                        Ok((id, Ok(WorkerOutcome::Exhausted))) => {
                            info!("抢购线程 #{} 已停止 ({}/{})", id, finished, worker_count);
                        }
                        Ok((id, Err(e))) => {
                            error!("❌ 抢购线程 #{} 异常结束: {} ({}/{})", id, e, finished, worker_count);
                        }
                        Err(e) => {
                            error!("❌ 抢购线程执行失败: {}", e);
                        }
                    }
                }
                _ = external.raised(), if !stop.is_raised() => {
                    warn!("收到停止信号，通知所有抢购线程退出...");
                    stop.raise();
                }
            }
        }
    }
}

fn log_pool_start(worker_count: usize, target: &PurchaseTarget) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始抢购 - 多线程抢购模式");
    info!("📦 商品: {} × {}", target.sku_id, target.quantity);
    info!("📊 抢购线程数: {}", worker_count);
    info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SeckillError};
    use crate::models::{OrderInitInfo, OrderPayload};
    use crate::services::Backoff;
    use crate::workflow::submission_worker::tests::{accepted_body, rejected_body, secrets, target, INIT_BODY};
    use crate::workflow::AttemptCtx;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// 第 `winner` 号线程第一次提交即成功，其余线程永远"没抢到"
    struct RaceBackend {
        winner: Option<usize>,
        accepted: AtomicBool,
        calls: Mutex<HashMap<usize, usize>>,
        calls_after_accept: Mutex<HashMap<usize, usize>>,
    }

    impl RaceBackend {
        fn new(winner: Option<usize>) -> Self {
            Self {
                winner,
                accepted: AtomicBool::new(false),
                calls: Mutex::new(HashMap::new()),
                calls_after_accept: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl SeckillApi for RaceBackend {
        async fn acquire_route(&self, _ctx: &AttemptCtx) -> Result<String> {
            Ok("https://marathon.jd.com/captcha.html".to_string())
        }

        async fn prime_checkout(&self, _ctx: &AttemptCtx) -> Result<()> {
            Ok(())
        }

        async fn fetch_order_init(&self, _ctx: &AttemptCtx) -> Result<OrderInitInfo> {
            OrderInitInfo::from_body(INIT_BODY)
        }

        async fn submit_order(&self, ctx: &AttemptCtx, _payload: &OrderPayload) -> Result<String> {
            if self.accepted.load(Ordering::SeqCst) {
                *self.calls_after_accept.lock().unwrap().entry(ctx.worker_id).or_default() += 1;
            }
            *self.calls.lock().unwrap().entry(ctx.worker_id).or_default() += 1;

            if self.winner == Some(ctx.worker_id) {
                self.accepted.store(true, Ordering::SeqCst);
                return Ok(accepted_body(&format!("order-{}", ctx.worker_id)));
            }
            Ok(rejected_body())
        }
    }

    fn pool(api: Arc<RaceBackend>, backoff: Backoff) -> WorkerPool<RaceBackend> {
        WorkerPool::new(
            api,
            (*secrets()).clone(),
            RetryPolicy::new(backoff),
            LoopMode::Lean,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_success_wins_and_siblings_stop() {
        let api = Arc::new(RaceBackend::new(Some(3)));
        let pool = pool(api.clone(), Backoff::Fixed(Duration::from_millis(5)));

        let outcome = pool.run(&target(), 5, &StopSignal::new()).await;

        let order = match outcome {
            WorkerOutcome::Success(order) => order,
            other => panic!("expected success, got {:?}", other),
        };
        assert_eq!(order.order_id, "order-3");

        // 给其它线程时间观察停止信号
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after = api.calls_after_accept.lock().unwrap().clone();
        for id in [1, 2, 4, 5] {
            let n = after.get(&id).copied().unwrap_or(0);
            assert!(n <= 1, "worker #{} made {} calls after cancellation", id, n);
        }
        assert_eq!(api.calls.lock().unwrap().get(&3), Some(&1));

        let snapshot = api.calls.lock().unwrap().clone();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*api.calls.lock().unwrap(), snapshot, "停止后不应再有请求");
    }

    #[tokio::test(start_paused = true)]
    async fn external_stop_exhausts_pool() {
        let api = Arc::new(RaceBackend::new(None));
        let pool = pool(api.clone(), Backoff::Fixed(Duration::from_millis(100)));
        let external = StopSignal::new();
        let raiser = external.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(550)).await;
            raiser.raise();
        });

        let outcome = pool.run(&target(), 3, &external).await;

        assert_eq!(outcome, WorkerOutcome::Exhausted);
        assert_eq!(api.calls.lock().unwrap().len(), 3);
    }

    struct ExpiredSession;

    #[async_trait]
    impl SeckillApi for ExpiredSession {
        async fn acquire_route(&self, _ctx: &AttemptCtx) -> Result<String> {
            Err(SeckillError::SessionInvalid)
        }

        async fn prime_checkout(&self, _ctx: &AttemptCtx) -> Result<()> {
            Ok(())
        }

        async fn fetch_order_init(&self, _ctx: &AttemptCtx) -> Result<OrderInitInfo> {
            Err(SeckillError::SessionInvalid)
        }

        async fn submit_order(&self, _ctx: &AttemptCtx, _payload: &OrderPayload) -> Result<String> {
            unreachable!("登录失效后不应提交订单")
        }
    }

    #[tokio::test]
    async fn all_workers_failing_exhausts_pool() {
        let pool = WorkerPool::new(
            Arc::new(ExpiredSession),
            (*secrets()).clone(),
            RetryPolicy::new(Backoff::Immediate),
            LoopMode::Full,
        );

        let outcome = pool.run(&target(), 4, &StopSignal::new()).await;

        assert_eq!(outcome, WorkerOutcome::Exhausted);
    }

    /// 1 号线程获取抢购链接很慢，2 号线程第一次提交即成功
    struct SlowRouteBackend {
        accepted: AtomicBool,
        calls_after_accept: Mutex<HashMap<usize, usize>>,
        submits_after_accept: Mutex<HashMap<usize, usize>>,
    }

    impl SlowRouteBackend {
        fn new() -> Self {
            Self {
                accepted: AtomicBool::new(false),
                calls_after_accept: Mutex::new(HashMap::new()),
                submits_after_accept: Mutex::new(HashMap::new()),
            }
        }

        fn record(&self, worker_id: usize) {
            if self.accepted.load(Ordering::SeqCst) {
                *self.calls_after_accept.lock().unwrap().entry(worker_id).or_default() += 1;
            }
        }
    }

    #[async_trait]
    impl SeckillApi for SlowRouteBackend {
        async fn acquire_route(&self, ctx: &AttemptCtx) -> Result<String> {
            self.record(ctx.worker_id);
            if ctx.worker_id == 1 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok("https://marathon.jd.com/captcha.html".to_string())
        }

        async fn prime_checkout(&self, ctx: &AttemptCtx) -> Result<()> {
            self.record(ctx.worker_id);
            Ok(())
        }

        async fn fetch_order_init(&self, ctx: &AttemptCtx) -> Result<OrderInitInfo> {
            self.record(ctx.worker_id);
            OrderInitInfo::from_body(INIT_BODY)
        }

        async fn submit_order(&self, ctx: &AttemptCtx, _payload: &OrderPayload) -> Result<String> {
            if self.accepted.load(Ordering::SeqCst) {
                *self.submits_after_accept.lock().unwrap().entry(ctx.worker_id).or_default() += 1;
            }
            self.record(ctx.worker_id);

            if ctx.worker_id == 2 {
                self.accepted.store(true, Ordering::SeqCst);
                return Ok(accepted_body("order-2"));
            }
            Ok(rejected_body())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sibling_mid_route_stops_before_submitting() {
        let api = Arc::new(SlowRouteBackend::new());
        let pool = WorkerPool::new(
            api.clone(),
            (*secrets()).clone(),
            RetryPolicy::new(Backoff::Fixed(Duration::from_millis(5))),
            LoopMode::Full,
        );

        let outcome = pool.run(&target(), 2, &StopSignal::new()).await;

        let order = match outcome {
            WorkerOutcome::Success(order) => order,
            other => panic!("expected success, got {:?}", other),
        };
        assert_eq!(order.order_id, "order-2");

        // 等 1 号线程拿到抢购链接
        tokio::time::sleep(Duration::from_millis(400)).await;
        let after = api.calls_after_accept.lock().unwrap().get(&1).copied().unwrap_or(0);
        assert!(after <= 1, "worker #1 made {} calls after cancellation", after);
        assert!(
            api.submits_after_accept.lock().unwrap().is_empty(),
            "停止后不应再提交订单"
        );
    }
}
