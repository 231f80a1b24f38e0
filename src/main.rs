use anyhow::Result;
use clap::Parser;
use jd_seckill::workflow::ReserveOutcome;
use jd_seckill::{logger, App, Config, StopSignal, WorkerOutcome};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};

const BANNER: &str = r#"
京东秒杀抢购助手
功能列表：
 1.预约商品
 2.秒杀抢购商品
"#;

#[derive(Parser)]
#[command(name = "jd_seckill", version, about = "京东秒杀抢购助手", long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// 覆盖配置中的抢购线程数
    #[arg(short, long)]
    workers: Option<usize>,

    /// 直接选择功能（1 预约 / 2 抢购），不填则显示菜单
    choice: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let mut config = Config::from_file(&cli.config)?;
    if let Some(workers) = cli.workers {
        config.worker_count = workers;
    }

    // 初始化日志
    logger::init(config.log_file.as_deref());

    let choice = match cli.choice {
        Some(choice) => choice,
        None => prompt_choice()?,
    };

    let stop = StopSignal::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到 Ctrl-C，正在停止...");
            ctrl_c.raise();
        }
    });

    match choice.trim() {
        "1" => {
            let mut app = App::initialize(config)?;
            if app.reserve(&stop).await? == ReserveOutcome::Reserved {
                info!("预约完成");
            }
        }
        "2" => {
            let mut app = App::initialize(config)?;
            if let WorkerOutcome::Exhausted = app.purchase(&stop).await? {
                info!("本次抢购结束，未抢到");
            }
        }
        _ => {
            error!("目前没有提供此功能...");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// 打印菜单并从标准输入读取选择
fn prompt_choice() -> Result<String> {
    println!("{}", BANNER);
    print!("请选择:");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
