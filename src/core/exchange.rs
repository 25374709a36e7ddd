use crate::core::types::{
    AccountSummary, Order, OrderRequest, PositionDetail, Result, SymbolRules,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 交易所网关接口
///
/// 策略引擎、风控与台账只通过这个窄接口与交易所交互。
/// 下单失败不向调用方抛错（返回None并记录原因），由下一轮评估自愈；
/// 撤单遇到订单不存在按良性竞态处理（`ExchangeError::is_order_missing`）。
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    /// 获取多空持仓数量 (long_size, short_size)
    ///
    /// 网络瞬断时返回最近一次成功查询的缓存值，不向调用方报错。
    async fn get_position(&self, symbol: &str) -> (f64, f64);

    /// 获取当前交易对的全部挂单
    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<Order>>;

    /// 下单，任何失败都返回None并按失败类别记录日志
    async fn place_order(&self, request: OrderRequest) -> Option<Order>;

    /// 撤单
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// 获取账户资金汇总
    async fn fetch_account_summary(&self) -> Result<AccountSummary>;

    /// 获取指定交易对的持仓明细（双向持仓两条记录）
    async fn fetch_position_detail(&self, symbol: &str) -> Result<Vec<PositionDetail>>;

    /// 撤销全部挂单，返回是否成功
    async fn cancel_all_orders(&self, symbol: &str) -> bool;

    /// 市价平掉全部持仓（reduce-only），返回是否成功
    async fn close_all_positions(&self, symbol: &str) -> bool;

    /// 清理账户：撤单、平仓并确认，启动/停机时使用，可重复调用
    async fn cleanup_account(&self, symbol: &str) -> bool;

    /// 确认并开启双向持仓模式，失败视为致命错误
    async fn setup_hedge_mode(&self) -> Result<()>;

    /// 设置杠杆倍数，"无需修改"视为成功
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// 获取交易对精度与下单限制
    async fn fetch_symbol_rules(&self, symbol: &str) -> Result<SymbolRules>;

    /// 创建用户数据流ListenKey
    async fn create_listen_key(&self) -> Result<String>;

    /// 续期ListenKey（Binance要求60分钟内至少一次）
    async fn keepalive_listen_key(&self, listen_key: &str) -> Result<()>;

    /// 获取服务器时间，用于签名时间戳校正
    async fn get_server_time(&self) -> Result<DateTime<Utc>>;
}
