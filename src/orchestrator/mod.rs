//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责资源持有和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理配置、京东客户端、Cookie 存储、登录会话
//! - 提供"预约"和"抢购"两个操作
//! - 同步服务器时间并等待开抢
//!
//! ### `worker_pool` - 并发抢购池
//! - 启动 N 个抢购线程
//! - 第一个抢到的线程胜出，其余线程收到停止信号后退出
//!
//! ## 层次关系
//!
//! ```text
//! app (登录 / 校时 / 等待)
//!     ↓
//! worker_pool (N 个 SubmissionWorker)
//!     ↓
//! workflow::SubmissionWorker (单个线程的重试循环)
//!     ↓
//! services (能力层：remote_clock / auth_session / trigger_scheduler / backoff)
//!     ↓
//! infrastructure (基础设施：clock / signal / codec / cookie_vault)
//! ```

pub mod app;
pub mod worker_pool;

pub use app::App;
pub use worker_pool::WorkerPool;
