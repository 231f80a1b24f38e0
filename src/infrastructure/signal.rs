//! 停止信号
//!
//! 一次性广播：任意一方 `raise()` 之后，所有持有者都能观察到，且不可撤销

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// 发出停止信号
    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等待直到信号发出
    pub async fn raised(&self) {
        let mut rx = self.rx.clone();
        // sender 由 self 持有，不会提前关闭
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// 休眠 `delay`，期间收到停止信号立即返回
    ///
    /// 返回 `true` 表示被停止
    pub async fn sleep(&self, delay: Duration) -> bool {
        if self.is_raised() {
            return true;
        }
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return self.is_raised();
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => self.is_raised(),
            _ = self.raised() => true,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
