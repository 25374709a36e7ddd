use clap::{Arg, Command};
use rustgrid::core::config::{ApiKeys, Config};
use rustgrid::core::exchange::ExchangeGateway;
use rustgrid::exchanges::BinanceGateway;
use rustgrid::strategies::{HedgeGridConfig, HedgeGridStrategy};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载环境变量
    dotenv::dotenv().ok();

    // 解析命令行参数
    let matches = Command::new("RustGrid")
        .version("0.1.0")
        .about("币安USDⓈ-M合约双向对冲网格策略")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .required(true),
        )
        .get_matches();

    let config_file = matches.get_one::<String>("config").unwrap();

    // 读取策略配置
    let config = HedgeGridConfig::from_yaml_file(config_file)?;

    // 按配置设置日志级别
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.strategy.log_level),
    )
    .init();

    log::info!(
        "启动策略: {} with config: {}, 日志级别: {}",
        config.strategy.name,
        config_file,
        config.strategy.log_level
    );

    // 交易所凭证与端点
    let keys = ApiKeys::from_env(&config.account.env_prefix)?;
    let endpoints = Config::new(config.account.testnet);
    let gateway = Arc::new(BinanceGateway::new(
        endpoints.clone(),
        keys,
        &config.symbol.contract,
    ));

    // 启动前校对一次时钟，偏差过大会导致签名超出recvWindow
    match gateway.get_server_time().await {
        Ok(server_time) => {
            let local_time = chrono::Utc::now();
            let offset_ms = server_time.timestamp_millis() - local_time.timestamp_millis();
            log::info!(
                "⏰ 时间校对: 服务器 {} - 本地 {} = 偏移 {}ms",
                server_time.format("%H:%M:%S"),
                local_time.format("%H:%M:%S%.3f"),
                offset_ms
            );
        }
        Err(e) => {
            log::warn!("⚠️ 获取服务器时间失败: {}，使用本地时间", e);
        }
    }

    let strategy = HedgeGridStrategy::new(config, endpoints, gateway);
    strategy.start().await?;

    // 保持运行直到收到停止信号
    tokio::signal::ctrl_c().await?;
    log::info!("收到停止信号，正在关闭策略...");
    strategy.stop().await;

    Ok(())
}
