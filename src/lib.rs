//! # JD Seckill
//!
//! 京东秒杀（抢购）自动化：二维码登录、校准服务器时间、定时多线程提交订单
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 与业务无关的底层能力
//! - `Clock` - 本地毫秒时钟（测试中可替换）
//! - `StopSignal` - 一次性广播的停止信号
//! - `codec` - JSON / JSONP 解析、页面标题提取
//! - `CookieVault` - 登录信息的本地存储
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务只做一件事
//! - `RemoteClock` - 测量本地与京东服务器的时间差
//! - `AuthSession` - 登录状态机（cookie 校验 / 二维码登录）
//! - `TriggerScheduler` - 等待开抢时刻
//! - `RetryPolicy` - 失败后的等待策略
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次抢购尝试"的完整流程
//! - `AttemptCtx` - 上下文封装（线程编号 + 尝试次数）
//! - `SubmissionWorker` - 抢购循环（获取链接 → 结算页 → 初始化 → 提交）
//! - `ReservationFlow` - 预约流程
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 应用入口，持有客户端和会话
//! - `orchestrator/worker_pool` - 多线程抢购，先成功者胜
//!
//! 京东接口的 HTTP 实现位于 `clients/`，通过 trait 注入到上面各层。
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::JdClient;
pub use config::Config;
pub use error::{Result, SeckillError};
pub use infrastructure::StopSignal;
pub use models::{AcceptedOrder, PurchaseTarget, WorkerOutcome};
pub use orchestrator::{App, WorkerPool};
pub use services::{AuthSession, RemoteClock, TriggerScheduler};
pub use workflow::{AttemptCtx, ReservationFlow, SubmissionWorker};
