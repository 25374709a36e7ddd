use chrono::{DateTime, Utc};
/// 统一的类型定义模块
/// 网格策略与交易所网关共用的数据结构
use serde::{Deserialize, Serialize};

use crate::core::error::ExchangeError;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ExchangeError>;

// ============= 基础类型定义 =============

/// 持仓方向（双向持仓模式下多头与空头相互独立）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// 对侧持仓方向
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// 开仓订单方向：多头买入开仓，空头卖出开仓
    pub fn opening_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// 平仓订单方向：多头卖出平仓，空头买入平仓
    pub fn closing_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    pub fn from_exchange(value: &str) -> Option<Side> {
        match value {
            "LONG" => Some(Side::Long),
            "SHORT" => Some(Side::Short),
            _ => None,
        }
    }

    /// 订单ID中使用的单字符标记
    pub fn tag(&self) -> char {
        match self {
            Side::Long => 'l',
            Side::Short => 's',
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 订单买卖方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn from_exchange(value: &str) -> Option<OrderSide> {
        match value {
            "BUY" => Some(OrderSide::Buy),
            "SELL" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 订单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        }
    }
}

/// 订单状态（与交易所报文中的状态字段对应）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected,
}

impl OrderStatus {
    pub fn from_exchange(value: &str) -> Option<OrderStatus> {
        match value {
            "NEW" => Some(OrderStatus::New),
            "PARTIALLY_FILLED" => Some(OrderStatus::PartiallyFilled),
            "FILLED" => Some(OrderStatus::Filled),
            "CANCELED" => Some(OrderStatus::Canceled),
            "EXPIRED" => Some(OrderStatus::Expired),
            "REJECTED" => Some(OrderStatus::Rejected),
            _ => None,
        }
    }

    /// 终态订单不会再产生后续成交
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Expired
                | OrderStatus::Rejected
        )
    }
}

// ============= 订单请求与回报 =============

/// 下单请求
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub reduce_only: bool,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// 限价单
    pub fn limit(
        symbol: &str,
        side: OrderSide,
        position_side: Side,
        price: f64,
        quantity: f64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            position_side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            reduce_only: false,
            client_order_id: None,
        }
    }

    /// 市价单
    pub fn market(symbol: &str, side: OrderSide, position_side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            position_side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            reduce_only: false,
            client_order_id: None,
        }
    }

    pub fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn with_client_order_id(mut self, client_order_id: String) -> Self {
        self.client_order_id = Some(client_order_id);
        self
    }
}

/// 交易所回传的订单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: Side,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub quantity: f64,
    pub filled: f64,
    pub remaining: f64,
    pub reduce_only: bool,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

// ============= 账户与持仓 =============

/// 账户资金汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub currency: String,
    pub total_equity: f64,
    pub available_balance: f64,
    pub used_margin: f64,
    pub unrealized_pnl: f64,
}

impl AccountSummary {
    /// 保证金占用比例，总权益为零时视为满仓
    pub fn margin_ratio(&self) -> f64 {
        if self.total_equity > 0.0 {
            self.used_margin / self.total_equity
        } else {
            1.0
        }
    }
}

/// 单边持仓明细
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionDetail {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
    pub pnl_percentage: f64,
    pub leverage: f64,
}

impl PositionDetail {
    /// 持仓名义价值
    pub fn notional_value(&self) -> f64 {
        self.size * self.mark_price
    }
}

/// 交易对精度与下限规则，启动时从交易所获取一次
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymbolRules {
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub min_quantity: f64,
    pub min_notional: f64,
}

impl SymbolRules {
    pub fn round_price(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.price_precision as i32);
        (price * factor).round() / factor
    }

    pub fn round_quantity(&self, quantity: f64) -> f64 {
        let factor = 10f64.powi(self.quantity_precision as i32);
        (quantity * factor).round() / factor
    }

    /// 数量下限保护：不低于交易所最小下单量
    pub fn clamp_quantity(&self, quantity: f64) -> f64 {
        self.round_quantity(quantity.max(self.min_quantity))
    }
}

impl Default for SymbolRules {
    fn default() -> Self {
        Self {
            price_precision: 5,
            quantity_precision: 0,
            min_quantity: 1.0,
            min_notional: 5.0,
        }
    }
}

// ============= 行情与事件 =============

/// 盘口快照（bookTicker）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookTick {
    pub best_bid: f64,
    pub best_ask: f64,
}

impl BookTick {
    pub fn new(best_bid: f64, best_ask: f64) -> Self {
        Self { best_bid, best_ask }
    }

    /// 中间价
    pub fn mid(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }
}

/// 用户数据流中的订单生命周期事件
///
/// `cumulative_filled` 为交易所推送的累计成交量（Binance `z` 字段），
/// 同一订单的重复推送携带相同的累计值，增量由台账本地计算。
#[derive(Debug, Clone)]
pub struct OrderUpdateEvent {
    pub symbol: String,
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub side: OrderSide,
    pub position_side: Side,
    pub status: OrderStatus,
    pub quantity: f64,
    pub cumulative_filled: f64,
    pub average_price: f64,
    pub reduce_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_order_mapping() {
        assert_eq!(Side::Long.opening_order_side(), OrderSide::Buy);
        assert_eq!(Side::Long.closing_order_side(), OrderSide::Sell);
        assert_eq!(Side::Short.opening_order_side(), OrderSide::Sell);
        assert_eq!(Side::Short.closing_order_side(), OrderSide::Buy);
        assert_eq!(Side::Long.opposite(), Side::Short);
    }

    #[test]
    fn test_order_status_parsing() {
        assert_eq!(OrderStatus::from_exchange("NEW"), Some(OrderStatus::New));
        assert_eq!(
            OrderStatus::from_exchange("PARTIALLY_FILLED"),
            Some(OrderStatus::PartiallyFilled)
        );
        assert_eq!(OrderStatus::from_exchange("UNKNOWN"), None);
        assert!(OrderStatus::Filled.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
    }

    #[test]
    fn test_symbol_rules_rounding() {
        let rules = SymbolRules {
            price_precision: 5,
            quantity_precision: 0,
            min_quantity: 1.0,
            min_notional: 5.0,
        };
        assert_eq!(rules.round_price(0.123456), 0.12346);
        assert_eq!(rules.round_quantity(49.6), 50.0);
        assert_eq!(rules.clamp_quantity(0.2), 1.0);
    }

    #[test]
    fn test_margin_ratio() {
        let summary = AccountSummary {
            currency: "USDC".to_string(),
            total_equity: 1000.0,
            available_balance: 400.0,
            used_margin: 600.0,
            unrealized_pnl: -20.0,
        };
        assert!((summary.margin_ratio() - 0.6).abs() < 1e-9);

        let empty = AccountSummary {
            currency: "USDC".to_string(),
            total_equity: 0.0,
            available_balance: 0.0,
            used_margin: 0.0,
            unrealized_pnl: 0.0,
        };
        assert_eq!(empty.margin_ratio(), 1.0);
    }

    #[test]
    fn test_book_tick_mid() {
        let tick = BookTick::new(0.11998, 0.12002);
        assert!((tick.mid() - 0.12).abs() < 1e-9);
    }
}
