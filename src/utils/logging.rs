/// 日志工具模块
///
/// 提供启动信息和最终结果的输出格式
use crate::config::Config;
use crate::models::WorkerOutcome;
use tracing::{info, warn};

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 程序启动 - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("📦 商品 sku: {} × {}", config.sku_id, config.seckill_num);
    info!("⏰ 抢购时间: {}", config.buy_time);
    info!("📊 抢购线程数: {}", config.worker_count);
    info!("{}", "=".repeat(60));
}

/// 记录登录用户和商品信息
///
/// # 参数
/// - `nickname`: 用户昵称
/// - `title`: 商品名称，获取失败时为 `None`
pub fn log_user_and_sku(nickname: &str, title: Option<&str>) {
    info!("用户: {}", nickname);
    match title {
        Some(title) => info!("商品名称: {}", title),
        None => warn!("⚠️ 未能获取商品名称"),
    }
}

/// 打印抢购最终结果
///
/// # 参数
/// - `outcome`: 抢购池返回的结果
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(outcome: &WorkerOutcome, log_file_path: Option<&str>) {
    info!("\n{}", "=".repeat(60));
    info!("📊 抢购结束");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    match outcome {
        WorkerOutcome::Success(order) => {
            info!("✅ 抢购成功");
            info!("订单号: {}", order.order_id);
            info!("总价: {}", order.total_money);
            info!("电脑端付款链接: {}", order.pay_url);
        }
        WorkerOutcome::Exhausted => {
            warn!("❌ 未抢到");
        }
    }
    info!("{}", "=".repeat(60));
    if let Some(path) = log_file_path {
        info!("\n日志已保存至: {}", path);
    }
}
