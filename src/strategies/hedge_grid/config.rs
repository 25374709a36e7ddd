use serde::{Deserialize, Serialize};

use crate::core::types::Result;
use crate::utils::contract_symbol;

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_exchange() -> String {
    "binance".to_string()
}

fn default_env_prefix() -> String {
    "BINANCE".to_string()
}

fn default_spacing() -> f64 {
    0.001
}

fn default_initial_quantity() -> f64 {
    50.0
}

fn default_leverage() -> u32 {
    20
}

fn default_order_first_time_secs() -> u64 {
    10
}

fn default_requote_min_interval_secs() -> u64 {
    15
}

fn default_valid_qty_fraction() -> f64 {
    0.7
}

fn default_price_drift_threshold() -> f64 {
    0.002
}

fn default_hedge_attempt_interval_secs() -> u64 {
    5
}

fn default_settle_delay_ms() -> u64 {
    1_000
}

fn default_grace_period_secs() -> u64 {
    15
}

fn default_account_usage_ratio() -> f64 {
    0.6
}

fn default_single_order_ratio() -> f64 {
    0.1
}

fn default_concurrent_order_count() -> u32 {
    4
}

fn default_min_order_value() -> f64 {
    5.0
}

fn default_max_order_value() -> f64 {
    100.0
}

fn default_quantity_cache_secs() -> u64 {
    30
}

fn default_stop_loss_ratio() -> f64 {
    0.05
}

fn default_extreme_loss_pct() -> f64 {
    -20.0
}

fn default_margin_high() -> f64 {
    0.85
}

fn default_margin_medium() -> f64 {
    0.70
}

fn default_account_refresh_secs() -> u64 {
    60
}

fn default_position_refresh_secs() -> u64 {
    30
}

fn default_metrics_log_interval_ticks() -> u64 {
    60
}

fn default_snapshot_interval_secs() -> u64 {
    10
}

fn default_orders_cooldown_secs() -> u64 {
    3
}

fn default_fast_cooldown_secs() -> u64 {
    1
}

fn default_fast_market_threshold() -> f64 {
    0.002
}

fn default_fast_market_window_secs() -> u64 {
    10
}

fn default_api_weight_limit() -> u32 {
    1_200
}

fn default_fetch_orders_weight() -> u32 {
    1
}

fn default_safety_margin() -> f64 {
    0.8
}

fn default_tick_interval_secs() -> u64 {
    1
}

fn default_tick_throttle_ms() -> u64 {
    500
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_max_reconnect_delay_secs() -> u64 {
    60
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_stale_timeout_secs() -> u64 {
    60
}

fn default_listen_key_keepalive_secs() -> u64 {
    1_800
}

/// 对冲网格策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeGridConfig {
    pub strategy: StrategyInfo,
    #[serde(default)]
    pub account: AccountSettings,
    pub symbol: SymbolSettings,
    #[serde(default)]
    pub grid: GridSettings,
    #[serde(default)]
    pub hedge: HedgeSettings,
    #[serde(default)]
    pub quantity: QuantitySettings,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub websocket: WebsocketSettings,
}

impl HedgeGridConfig {
    /// 从YAML文件加载配置
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::core::error::ExchangeError::ConfigError(format!(
                "读取配置文件{}失败: {}",
                path, e
            ))
        })?;
        let config: HedgeGridConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// 交易对符号，如 DOGEUSDC
    pub fn contract_symbol(&self) -> String {
        contract_symbol(&self.symbol.coin, &self.symbol.contract)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSettings {
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// API密钥环境变量前缀（{PREFIX}_API_KEY / {PREFIX}_API_SECRET）
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
    #[serde(default)]
    pub testnet: bool,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            env_prefix: default_env_prefix(),
            testnet: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSettings {
    /// 币种，如 DOGE
    pub coin: String,
    /// 合约计价货币，如 USDC
    pub contract: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSettings {
    /// 网格间距（价格比例）
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    /// 固定模式下的单笔下单数量
    #[serde(default = "default_initial_quantity")]
    pub initial_quantity: f64,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// 同侧两次下单的最小间隔
    #[serde(default = "default_order_first_time_secs")]
    pub order_first_time_secs: u64,
    /// 重新挂单的最小间隔
    #[serde(default = "default_requote_min_interval_secs")]
    pub requote_min_interval_secs: u64,
    /// 挂单量低于目标数量的该比例视为失效
    #[serde(default = "default_valid_qty_fraction")]
    pub valid_qty_fraction: f64,
    /// 中间价漂移超过该比例才触发网格检查
    #[serde(default = "default_price_drift_threshold")]
    pub price_drift_threshold: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            spacing: default_spacing(),
            initial_quantity: default_initial_quantity(),
            leverage: default_leverage(),
            order_first_time_secs: default_order_first_time_secs(),
            requote_min_interval_secs: default_requote_min_interval_secs(),
            valid_qty_fraction: default_valid_qty_fraction(),
            price_drift_threshold: default_price_drift_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeSettings {
    /// 双侧持仓同时为零时是否执行对冲开仓
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 对冲开仓尝试的最小间隔
    #[serde(default = "default_hedge_attempt_interval_secs")]
    pub attempt_interval_secs: u64,
    /// 撤单与成对下单之间的等待时间
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// 对冲开仓完成后的静默期，期间不重新挂单
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

impl Default for HedgeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            attempt_interval_secs: default_hedge_attempt_interval_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantitySettings {
    /// 动态数量计算开关，关闭时使用grid.initial_quantity
    #[serde(default = "default_true")]
    pub dynamic_enabled: bool,
    /// 可用资金中允许同时占用的比例
    #[serde(default = "default_account_usage_ratio")]
    pub account_usage_ratio: f64,
    /// 单笔订单占可用资金的比例
    #[serde(default = "default_single_order_ratio")]
    pub single_order_ratio: f64,
    /// 同时在场的订单数量估计
    #[serde(default = "default_concurrent_order_count")]
    pub concurrent_order_count: u32,
    /// 单笔订单最小名义价值
    #[serde(default = "default_min_order_value")]
    pub min_order_value: f64,
    /// 单笔订单最大名义价值
    #[serde(default = "default_max_order_value")]
    pub max_order_value: f64,
    /// 计算结果缓存时长
    #[serde(default = "default_quantity_cache_secs")]
    pub cache_secs: u64,
}

impl Default for QuantitySettings {
    fn default() -> Self {
        Self {
            dynamic_enabled: true,
            account_usage_ratio: default_account_usage_ratio(),
            single_order_ratio: default_single_order_ratio(),
            concurrent_order_count: default_concurrent_order_count(),
            min_order_value: default_min_order_value(),
            max_order_value: default_max_order_value(),
            cache_secs: default_quantity_cache_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    /// 止损阈值：未实现亏损超过名义价值的该比例触发减仓
    #[serde(default = "default_stop_loss_ratio")]
    pub stop_loss_ratio: f64,
    /// 极端亏损阈值（盈亏百分比）
    #[serde(default = "default_extreme_loss_pct")]
    pub extreme_loss_pct: f64,
    /// 保证金高风险阈值
    #[serde(default = "default_margin_high")]
    pub margin_high: f64,
    /// 保证金中风险阈值
    #[serde(default = "default_margin_medium")]
    pub margin_medium: f64,
    #[serde(default = "default_account_refresh_secs")]
    pub account_refresh_secs: u64,
    #[serde(default = "default_position_refresh_secs")]
    pub position_refresh_secs: u64,
    /// 每多少个调度周期输出一次风险指标
    #[serde(default = "default_metrics_log_interval_ticks")]
    pub metrics_log_interval_ticks: u64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            stop_loss_ratio: default_stop_loss_ratio(),
            extreme_loss_pct: default_extreme_loss_pct(),
            margin_high: default_margin_high(),
            margin_medium: default_margin_medium(),
            account_refresh_secs: default_account_refresh_secs(),
            position_refresh_secs: default_position_refresh_secs(),
            metrics_log_interval_ticks: default_metrics_log_interval_ticks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// 周期性持仓/挂单快照间隔
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
    /// 挂单查询的常规冷却时间
    #[serde(default = "default_orders_cooldown_secs")]
    pub orders_cooldown_secs: u64,
    /// 快速行情下的挂单查询冷却时间
    #[serde(default = "default_fast_cooldown_secs")]
    pub fast_cooldown_secs: u64,
    /// 窗口内价格波动超过该比例视为快速行情
    #[serde(default = "default_fast_market_threshold")]
    pub fast_market_threshold: f64,
    #[serde(default = "default_fast_market_window_secs")]
    pub fast_market_window_secs: u64,
    /// 每分钟API权重预算
    #[serde(default = "default_api_weight_limit")]
    pub api_weight_limit_per_minute: u32,
    #[serde(default = "default_fetch_orders_weight")]
    pub fetch_orders_weight: u32,
    /// 权重预算安全系数
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: default_snapshot_interval_secs(),
            orders_cooldown_secs: default_orders_cooldown_secs(),
            fast_cooldown_secs: default_fast_cooldown_secs(),
            fast_market_threshold: default_fast_market_threshold(),
            fast_market_window_secs: default_fast_market_window_secs(),
            api_weight_limit_per_minute: default_api_weight_limit(),
            fetch_orders_weight: default_fetch_orders_weight(),
            safety_margin: default_safety_margin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// 启动时是否先清理账户（撤单+平仓）
    #[serde(default)]
    pub startup_cleanup: bool,
    /// 停机时是否清理账户
    #[serde(default = "default_true")]
    pub shutdown_cleanup: bool,
    /// 调度循环周期
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// 行情tick的最小处理间隔
    #[serde(default = "default_tick_throttle_ms")]
    pub tick_throttle_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            startup_cleanup: false,
            shutdown_cleanup: true,
            tick_interval_secs: default_tick_interval_secs(),
            tick_throttle_ms: default_tick_throttle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketSettings {
    /// 行情WebSocket地址覆盖，缺省按主网/测试网选择
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_max_reconnect_delay_secs")]
    pub max_reconnect_delay_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_stale_timeout_secs")]
    pub stale_timeout_secs: u64,
    /// ListenKey续期间隔（Binance 60分钟过期，取一半）
    #[serde(default = "default_listen_key_keepalive_secs")]
    pub listen_key_keepalive_secs: u64,
}

impl Default for WebsocketSettings {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_reconnect_delay_secs: default_max_reconnect_delay_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            stale_timeout_secs: default_stale_timeout_secs(),
            listen_key_keepalive_secs: default_listen_key_keepalive_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
strategy:
  name: hedge_grid
symbol:
  coin: DOGE
  contract: USDC
"#;
        let config: HedgeGridConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.strategy.name, "hedge_grid");
        assert_eq!(config.strategy.log_level, "INFO");
        assert_eq!(config.contract_symbol(), "DOGEUSDC");
        assert_eq!(config.grid.spacing, 0.001);
        assert_eq!(config.grid.order_first_time_secs, 10);
        assert_eq!(config.hedge.attempt_interval_secs, 5);
        assert!(config.hedge.enabled);
        assert_eq!(config.quantity.concurrent_order_count, 4);
        assert_eq!(config.risk.margin_high, 0.85);
        assert_eq!(config.sync.snapshot_interval_secs, 10);
        assert!(!config.execution.startup_cleanup);
        assert!(config.execution.shutdown_cleanup);
        assert_eq!(config.websocket.listen_key_keepalive_secs, 1_800);
    }

    #[test]
    fn test_overrides_apply() {
        let yaml = r#"
strategy:
  name: hedge_grid
  log_level: DEBUG
symbol:
  coin: btc
  contract: usdt
grid:
  spacing: 0.002
  initial_quantity: 10.0
hedge:
  enabled: false
quantity:
  dynamic_enabled: false
"#;
        let config: HedgeGridConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.strategy.log_level, "DEBUG");
        assert_eq!(config.contract_symbol(), "BTCUSDT");
        assert_eq!(config.grid.spacing, 0.002);
        assert_eq!(config.grid.initial_quantity, 10.0);
        assert!(!config.hedge.enabled);
        assert!(!config.quantity.dynamic_enabled);
        // 未覆盖的字段保持默认
        assert_eq!(config.grid.requote_min_interval_secs, 15);
    }
}
